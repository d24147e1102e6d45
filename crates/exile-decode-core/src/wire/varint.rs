//! Varint and tag decoding.
//!
//! Varints are decoded without an upper bound on their width. Without a
//! schema, a length-delimited string is sometimes misread as a run of varint
//! bytes, and the value coercer later turns that oversized integer back into
//! text, so no bits may be dropped here.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use std::fmt;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::UnsupportedWireType {
                offset: 0,
                wire_type: value,
            }),
        }
    }
}

/// Unsigned integer of unbounded width
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarUint(BigUint);

impl VarUint {
    /// Returns the value as `u64` if it fits
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    /// Returns the value as `usize`, saturating at `usize::MAX`
    pub fn to_usize_saturating(&self) -> usize {
        self.0.to_usize().unwrap_or(usize::MAX)
    }

    /// Number of significant bits (zero for the value zero)
    pub fn bit_length(&self) -> u64 {
        self.0.bits()
    }

    /// Returns true if the value is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Minimal little-endian encoding, at least one byte long
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_le()
    }

    /// The underlying big integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for VarUint {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for VarUint {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl fmt::Display for VarUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Decode a varint starting at `pos`.
///
/// Returns the decoded value and the position just past its last byte.
/// Running out of input before the terminating byte is an error.
pub fn decode_varint(data: &[u8], pos: usize) -> Result<(VarUint, usize)> {
    let mut value = BigUint::zero();
    let mut shift = 0usize;
    let mut cursor = pos;

    loop {
        let byte = *data.get(cursor).ok_or_else(|| Error::varint_decode(cursor))?;
        cursor += 1;
        value |= BigUint::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok((VarUint(value), cursor))
}

/// Split a field key into `(field_number, wire_type)`.
///
/// The field number keeps the full width of the key. The wire type is
/// returned raw; values 6 and 7 are rejected later by [`WireType::try_from`].
pub fn decode_tag(key: &VarUint) -> (VarUint, u8) {
    let wire_type = key.0.iter_u32_digits().next().unwrap_or(0) & 0x7;
    (VarUint(&key.0 >> 3u32), wire_type as u8)
}
