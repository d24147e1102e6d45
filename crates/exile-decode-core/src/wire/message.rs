//! Schemaless message decoding.
//!
//! Without a `.proto` definition a length-delimited field is ambiguous: it can
//! be a string, raw bytes, or an embedded message. The decoder resolves this
//! with [`is_nested_message`] and keeps the result as a tagged [`Value`].
//!
//! Truncated fixed-width and length-delimited fields are not errors: the
//! available bytes are kept and the reported position runs past the end of
//! the buffer. A nested probe then fails its exact-length check, while the
//! top-level decode still returns what it read.

use super::varint::{decode_tag, decode_varint, VarUint, WireType};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

/// A chunk only counts as an embedded message if one of its fields is at
/// or below this number.
pub const NESTED_FIELD_THRESHOLD: u64 = 3;

/// Field number as read from the tag, at full width
pub type FieldNumber = VarUint;

/// A single decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    /// Wire type 0
    Varint(VarUint),
    /// Wire type 1, little-endian
    Fixed64(u64),
    /// Wire type 5, little-endian
    Fixed32(u32),
    /// Length-delimited chunk that did not parse as a message
    Bytes(&'a [u8]),
    /// Length-delimited chunk accepted as a message, or a group
    Message(DecodedMessage<'a>),
}

impl<'a> Value<'a> {
    /// Returns the embedded message, if this value is one
    pub fn as_message(&self) -> Option<&DecodedMessage<'a>> {
        match self {
            Value::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this value is an opaque chunk
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Field number to values, in first-seen field order.
///
/// Repeated occurrences of a field number are appended in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMessage<'a> {
    fields: IndexMap<FieldNumber, Vec<Value<'a>>>,
}

impl<'a> DecodedMessage<'a> {
    /// Creates an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded for a field, empty if the field never occurred
    pub fn get(&self, field: u64) -> &[Value<'a>] {
        self.get_field(&VarUint::from(field))
    }

    /// Like [`get`](Self::get), for field numbers of any width
    pub fn get_field(&self, field: &FieldNumber) -> &[Value<'a>] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates fields in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&FieldNumber, &[Value<'a>])> {
        self.fields.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Iterates field numbers in first-seen order
    pub fn field_numbers(&self) -> impl Iterator<Item = &FieldNumber> + '_ {
        self.fields.keys()
    }

    /// Number of distinct field numbers
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field was decoded
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends a value to a field
    pub fn push(&mut self, field: FieldNumber, value: Value<'a>) {
        self.fields.entry(field).or_default().push(value);
    }
}

/// Decide whether a probed chunk should be kept as an embedded message.
///
/// The parse must have consumed exactly the chunk and produced at least one
/// field numbered [`NESTED_FIELD_THRESHOLD`] or lower.
pub fn is_nested_message(parsed: &DecodedMessage<'_>, consumed: usize, chunk_len: usize) -> bool {
    consumed == chunk_len
        && parsed
            .field_numbers()
            .any(|field| field.to_u64().is_some_and(|n| n <= NESTED_FIELD_THRESHOLD))
}

/// Configuration for the wire decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum nesting of embedded messages and groups
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Decodes protobuf bytes into a [`DecodedMessage`] tree without a schema
#[derive(Debug, Clone, Default)]
pub struct WireDecoder {
    config: DecoderConfig,
}

impl WireDecoder {
    /// Creates a new decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Decode a whole buffer, returning an empty message on any wire error
    pub fn decode<'a>(&self, data: &'a [u8]) -> DecodedMessage<'a> {
        match self.try_decode(data) {
            Ok((message, _)) => message,
            Err(e) if e.is_recoverable() => {
                debug!("Discarding undecodable payload of {} bytes: {}", data.len(), e);
                DecodedMessage::new()
            }
            Err(e) => {
                warn!("Unexpected decoder failure: {}", e);
                DecodedMessage::new()
            }
        }
    }

    /// Decode a whole buffer, returning the message and the position reached.
    ///
    /// The position exceeds `data.len()` when the last field was truncated.
    pub fn try_decode<'a>(&self, data: &'a [u8]) -> Result<(DecodedMessage<'a>, usize)> {
        self.parse_fields(data, 0)
    }

    fn parse_fields<'a>(&self, data: &'a [u8], depth: usize) -> Result<(DecodedMessage<'a>, usize)> {
        let mut message = DecodedMessage::new();
        let mut pos = 0;

        while pos < data.len() {
            let tag_offset = pos;
            let (field, wire_type, next) = read_key(data, pos)?;
            pos = next;

            if wire_type == WireType::EndGroup as u8 {
                return Err(Error::UnexpectedEndGroup {
                    offset: tag_offset,
                    field,
                });
            }

            let (value, next) =
                self.parse_value(data, pos, tag_offset, &field, wire_type, depth)?;
            pos = next;
            message.push(field, value);
        }

        Ok((message, pos))
    }

    fn parse_group<'a>(
        &self,
        data: &'a [u8],
        mut pos: usize,
        group_field: &FieldNumber,
        depth: usize,
    ) -> Result<(DecodedMessage<'a>, usize)> {
        if depth >= self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }

        let mut message = DecodedMessage::new();

        while pos < data.len() {
            let tag_offset = pos;
            let (field, wire_type, next) = read_key(data, pos)?;
            pos = next;

            if wire_type == WireType::EndGroup as u8 {
                if field == *group_field {
                    return Ok((message, pos));
                }
                return Err(Error::UnexpectedEndGroup {
                    offset: tag_offset,
                    field,
                });
            }

            let (value, next) =
                self.parse_value(data, pos, tag_offset, &field, wire_type, depth + 1)?;
            pos = next;
            message.push(field, value);
        }

        Err(Error::UnterminatedGroup {
            field: group_field.clone(),
        })
    }

    fn parse_value<'a>(
        &self,
        data: &'a [u8],
        pos: usize,
        tag_offset: usize,
        field: &FieldNumber,
        wire_type: u8,
        depth: usize,
    ) -> Result<(Value<'a>, usize)> {
        let wire_type = WireType::try_from(wire_type).map_err(|_| Error::UnsupportedWireType {
            offset: tag_offset,
            wire_type,
        })?;

        match wire_type {
            WireType::Varint => {
                let (value, next) = decode_varint(data, pos)?;
                Ok((Value::Varint(value), next))
            }
            WireType::I64 => {
                let (value, next) = read_fixed(data, pos, 8);
                Ok((Value::Fixed64(value), next))
            }
            WireType::Len => {
                let (length, start) = decode_varint(data, pos)?;
                let end = start.saturating_add(length.to_usize_saturating());
                let chunk = &data[start.min(data.len())..end.min(data.len())];
                Ok((self.probe_nested(chunk, depth), end))
            }
            WireType::StartGroup => {
                let (group, next) = self.parse_group(data, pos, field, depth)?;
                Ok((Value::Message(group), next))
            }
            WireType::I32 => {
                let (value, next) = read_fixed(data, pos, 4);
                Ok((Value::Fixed32(value as u32), next))
            }
            WireType::EndGroup => Err(Error::UnexpectedEndGroup {
                offset: tag_offset,
                field: field.clone(),
            }),
        }
    }

    /// Interpret a length-delimited chunk as an embedded message or raw bytes.
    ///
    /// Any wire error inside the chunk, or hitting the depth limit, leaves it
    /// as bytes.
    pub fn probe_nested<'a>(&self, chunk: &'a [u8], depth: usize) -> Value<'a> {
        if depth >= self.config.max_depth {
            trace!("Depth limit reached, keeping {} bytes opaque", chunk.len());
            return Value::Bytes(chunk);
        }

        match self.parse_fields(chunk, depth + 1) {
            Ok((message, consumed)) if is_nested_message(&message, consumed, chunk.len()) => {
                Value::Message(message)
            }
            Ok(_) => Value::Bytes(chunk),
            Err(e) => {
                trace!("Chunk of {} bytes is not a message: {}", chunk.len(), e);
                Value::Bytes(chunk)
            }
        }
    }
}

fn read_key(data: &[u8], pos: usize) -> Result<(FieldNumber, u8, usize)> {
    let (key, next) = decode_varint(data, pos)?;
    let (field, wire_type) = decode_tag(&key);
    Ok((field, wire_type, next))
}

/// Little-endian read of up to `width` bytes; short reads keep what exists
fn read_fixed(data: &[u8], pos: usize, width: usize) -> (u64, usize) {
    let end = pos.saturating_add(width);
    let available = &data[pos.min(data.len())..end.min(data.len())];
    let value = available
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    (value, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::wire::Coerce;
    use num_bigint::BigUint;
    use prost::encoding::{encode_key, encode_varint, WireType as PbWireType};

    fn len_field(field: u32, payload: &[u8], out: &mut Vec<u8>) {
        encode_key(field, PbWireType::LengthDelimited, out);
        encode_varint(payload.len() as u64, out);
        out.extend_from_slice(payload);
    }

    fn varint_field(field: u32, value: u64, out: &mut Vec<u8>) {
        encode_key(field, PbWireType::Varint, out);
        encode_varint(value, out);
    }

    #[test]
    fn test_decode_scalars() {
        let mut data = Vec::new();
        varint_field(1, 150, &mut data);
        encode_key(2, PbWireType::SixtyFourBit, &mut data);
        data.extend_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        encode_key(3, PbWireType::ThirtyTwoBit, &mut data);
        data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

        let message = WireDecoder::new().decode(&data);
        assert_eq!(message.get(1), &[Value::Varint(VarUint::from(150u64))]);
        assert_eq!(message.get(2), &[Value::Fixed64(0x0102_0304_0506_0708)]);
        assert_eq!(message.get(3), &[Value::Fixed32(0xDEAD_BEEF)]);
        assert!(message.get(4).is_empty());
    }

    #[test]
    fn test_repeated_fields_keep_order() {
        let mut data = Vec::new();
        varint_field(7, 1, &mut data);
        varint_field(2, 9, &mut data);
        varint_field(7, 2, &mut data);
        varint_field(7, 3, &mut data);

        let message = WireDecoder::new().decode(&data);
        assert_eq!(
            message.field_numbers().map(|f| f.to_u64()).collect::<Vec<_>>(),
            vec![Some(7), Some(2)]
        );
        let values: Vec<_> = message
            .get(7)
            .iter()
            .map(|v| match v {
                Value::Varint(n) => n.to_u64().unwrap(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_nested_message_detected() {
        let mut inner = Vec::new();
        len_field(1, b"abc", &mut inner);
        let mut data = Vec::new();
        len_field(5, &inner, &mut data);

        let message = WireDecoder::new().decode(&data);
        let nested = message.get(5)[0].as_message().expect("nested message");
        assert_eq!(nested.get(1), &[Value::Bytes(b"abc")]);
    }

    #[test]
    fn test_plain_string_stays_bytes() {
        let mut data = Vec::new();
        len_field(1, b"hello world", &mut data);

        let message = WireDecoder::new().decode(&data);
        assert_eq!(message.get(1), &[Value::Bytes(b"hello world")]);
    }

    #[test]
    fn test_high_field_numbers_stay_bytes() {
        // parses cleanly, but only field 9 is present
        let mut inner = Vec::new();
        varint_field(9, 1, &mut inner);
        let mut data = Vec::new();
        len_field(1, &inner, &mut data);

        let message = WireDecoder::new().decode(&data);
        assert_eq!(message.get(1), &[Value::Bytes(&inner[..])]);
    }

    #[test]
    fn test_is_nested_message_predicate() {
        let mut parsed = DecodedMessage::new();
        parsed.push(VarUint::from(3u64), Value::Fixed32(0));
        assert!(is_nested_message(&parsed, 5, 5));
        assert!(!is_nested_message(&parsed, 6, 5));

        let mut high = DecodedMessage::new();
        high.push(VarUint::from(4u64), Value::Fixed32(0));
        assert!(!is_nested_message(&high, 5, 5));
        assert!(!is_nested_message(&DecodedMessage::new(), 0, 0));
    }

    #[test]
    fn test_group_decoding() {
        let mut data = Vec::new();
        encode_key(2, PbWireType::StartGroup, &mut data);
        varint_field(1, 42, &mut data);
        encode_key(2, PbWireType::EndGroup, &mut data);
        varint_field(3, 7, &mut data);

        let message = WireDecoder::new().decode(&data);
        let group = message.get(2)[0].as_message().expect("group");
        assert_eq!(group.get(1), &[Value::Varint(VarUint::from(42u64))]);
        assert_eq!(message.get(3), &[Value::Varint(VarUint::from(7u64))]);
    }

    #[test]
    fn test_group_errors() {
        let decoder = WireDecoder::new();

        let mut mismatched = Vec::new();
        encode_key(2, PbWireType::StartGroup, &mut mismatched);
        encode_key(3, PbWireType::EndGroup, &mut mismatched);
        assert!(matches!(
            decoder.try_decode(&mismatched),
            Err(Error::UnexpectedEndGroup { field, .. }) if field == VarUint::from(3u64)
        ));

        let mut unterminated = Vec::new();
        encode_key(2, PbWireType::StartGroup, &mut unterminated);
        varint_field(1, 1, &mut unterminated);
        assert!(matches!(
            decoder.try_decode(&unterminated),
            Err(Error::UnterminatedGroup { field }) if field == VarUint::from(2u64)
        ));

        let mut stray = Vec::new();
        encode_key(4, PbWireType::EndGroup, &mut stray);
        assert!(matches!(
            decoder.try_decode(&stray),
            Err(Error::UnexpectedEndGroup { field, .. }) if field == VarUint::from(4u64)
        ));
        assert!(decoder.decode(&stray).is_empty());
    }

    #[test]
    fn test_unsupported_wire_type() {
        // field 1, wire type 6
        let data = [0x0E, 0x00];
        assert!(matches!(
            WireDecoder::new().try_decode(&data),
            Err(Error::UnsupportedWireType { wire_type: 6, offset: 0 })
        ));
    }

    #[test]
    fn test_truncated_varint_yields_empty_message() {
        let data = [0x08, 0x80];
        assert!(WireDecoder::new().decode(&data).is_empty());
    }

    #[test]
    fn test_truncated_fixed_field_keeps_partial_value() {
        // field 1, wire type 1, only two bytes follow
        let data = [0x09, 0x01, 0x02];
        let (message, consumed) = WireDecoder::new().try_decode(&data).unwrap();
        assert_eq!(message.get(1), &[Value::Fixed64(0x0201)]);
        assert_eq!(consumed, 9);
    }

    #[test]
    fn test_truncated_chunk_is_not_nested() {
        let mut inner = Vec::new();
        len_field(1, b"abcdef", &mut inner);
        inner.truncate(inner.len() - 2);
        let mut data = Vec::new();
        len_field(2, &inner, &mut data);

        let message = WireDecoder::new().decode(&data);
        assert_eq!(message.get(2), &[Value::Bytes(&inner[..])]);
    }

    #[test]
    fn test_depth_limit_keeps_deep_chunks_opaque() {
        let mut payload = Vec::new();
        len_field(1, b"x", &mut payload);
        for _ in 0..4 {
            let mut wrapped = Vec::new();
            len_field(1, &payload, &mut wrapped);
            payload = wrapped;
        }

        let shallow = WireDecoder::with_config(DecoderConfig::new().max_depth(2));
        let message = shallow.decode(&payload);
        let level1 = message.get(1)[0].as_message().expect("level 1");
        let level2 = level1.get(1)[0].as_message().expect("level 2");
        assert!(level2.get(1)[0].as_bytes().is_some());

        let deep = WireDecoder::new().decode(&payload);
        assert!(deep.get(1)[0].as_message().is_some());
    }

    #[test]
    fn test_depth_limit_rejects_deep_groups() {
        let mut data = Vec::new();
        for _ in 0..3 {
            encode_key(1, PbWireType::StartGroup, &mut data);
        }
        for _ in 0..3 {
            encode_key(1, PbWireType::EndGroup, &mut data);
        }

        let shallow = WireDecoder::with_config(DecoderConfig::new().max_depth(2));
        assert!(matches!(
            shallow.try_decode(&data),
            Err(Error::DepthExceeded { limit: 2 })
        ));
        assert!(WireDecoder::new().try_decode(&data).is_ok());
    }

    #[test]
    fn test_wide_field_key_keeps_chunk_nested() {
        // key 2^64 (field 2^61, varint) = 0x41, then field 1 = 0x42
        let mut inner = vec![0x80; 9];
        inner.extend([0x02, 0x41, 0x08, 0x42]);
        let mut data = Vec::new();
        len_field(1, &inner, &mut data);

        let message = WireDecoder::new().decode(&data);
        let nested = message.get(1)[0].as_message().expect("nested message");
        let wide = VarUint::from(BigUint::from(1u8) << 61u32);

        assert_eq!(
            nested.field_numbers().cloned().collect::<Vec<_>>(),
            vec![wide.clone(), VarUint::from(1u64)]
        );
        assert_eq!(nested.get_field(&wide), &[Value::Varint(VarUint::from(0x41u64))]);
        assert_eq!(nested.get(1), &[Value::Varint(VarUint::from(0x42u64))]);
        assert_eq!(nested.decode_string(), "AB");
    }
}
