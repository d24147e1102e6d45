//! Best-effort text rendering of decoded values.
//!
//! Ladder strings arrive in several shapes depending on how the schemaless
//! decoder read them: raw bytes, an embedded message whose fields hold the
//! characters, or a single integer. [`Coerce`] flattens all of them to text.

use super::message::{DecodedMessage, Value};
use super::varint::VarUint;

/// Highest Unicode scalar value; integers up to this are read as one character
pub const MAX_CODE_POINT: u64 = 0x10FFFF;

/// Render a decoded value as human-readable text
pub trait Coerce {
    /// Append the text form of `self` to `out`
    fn coerce_into(&self, out: &mut String);

    /// Text form of `self`
    fn decode_string(&self) -> String {
        let mut out = String::new();
        self.coerce_into(&mut out);
        out
    }
}

impl Coerce for DecodedMessage<'_> {
    fn coerce_into(&self, out: &mut String) {
        for (_, values) in self.iter() {
            values.coerce_into(out);
        }
    }
}

impl Coerce for [Value<'_>] {
    fn coerce_into(&self, out: &mut String) {
        for value in self {
            value.coerce_into(out);
        }
    }
}

impl Coerce for Value<'_> {
    fn coerce_into(&self, out: &mut String) {
        match self {
            Value::Message(message) => message.coerce_into(out),
            Value::Bytes(bytes) => out.push_str(&String::from_utf8_lossy(bytes)),
            Value::Varint(n) => n.coerce_into(out),
            Value::Fixed64(n) => VarUint::from(*n).coerce_into(out),
            Value::Fixed32(n) => VarUint::from(u64::from(*n)).coerce_into(out),
        }
    }
}

impl Coerce for str {
    fn coerce_into(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl Coerce for VarUint {
    /// Small values are a single code point. Anything larger is an ASCII run
    /// the decoder mistook for a varint, so its little-endian bytes are read
    /// back as UTF-8 with NUL padding removed.
    fn coerce_into(&self, out: &mut String) {
        if let Some(n) = self.to_u64().filter(|n| *n <= MAX_CODE_POINT) {
            // surrogates have no `char`
            out.push(char::from_u32(n as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
            return;
        }

        let bytes = self.to_le_bytes();
        out.push_str(String::from_utf8_lossy(&bytes).trim_matches('\0'));
    }
}
