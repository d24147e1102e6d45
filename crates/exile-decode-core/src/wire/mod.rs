//! Schemaless protobuf wire-format decoding.
//!
//! poe.ninja serves its ladder search results as protobuf with no published
//! `.proto` file. This module reads such payloads into a generic
//! field-number tree and renders leaf values as text.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT
//! - 1: I64
//! - 2: LEN (string, bytes, embedded messages)
//! - 3/4: START_GROUP / END_GROUP
//! - 5: I32

mod coerce;
mod message;
mod varint;

pub use coerce::{Coerce, MAX_CODE_POINT};
pub use message::{
    is_nested_message, DecodedMessage, DecoderConfig, FieldNumber, Value, WireDecoder,
    NESTED_FIELD_THRESHOLD,
};
pub use varint::{decode_tag, decode_varint, VarUint, WireType};
