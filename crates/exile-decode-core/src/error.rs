//! Error types for the exile-decode-core library.
//!
//! Errors fall into two groups. Wire-format errors are produced while probing
//! schemaless protobuf data and are absorbed by the ladder pipeline, which
//! treats an unreadable payload as "no builds". Import-code and build-XML
//! errors are validation failures that callers surface to the user.

use crate::wire::VarUint;
use thiserror::Error;

/// Result type alias for exile-decode operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all exile-decode operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Buffer ended in the middle of a varint
    #[error("failed to decode varint at offset {offset}: buffer exhausted")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Wire type 6 or 7
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType {
        /// Byte offset of the field tag
        offset: usize,
        /// The raw wire type bits
        wire_type: u8,
    },

    /// End-group marker outside of (or not matching) the open group
    #[error("unexpected end-group marker for field {field} at offset {offset}")]
    UnexpectedEndGroup {
        /// Byte offset of the field tag
        offset: usize,
        /// Field number carried by the marker
        field: VarUint,
    },

    /// Buffer ended before the group was closed
    #[error("group for field {field} is missing its end-group marker")]
    UnterminatedGroup {
        /// Field number of the open group
        field: VarUint,
    },

    /// Nesting went deeper than the configured limit
    #[error("nesting depth exceeds limit of {limit}")]
    DepthExceeded {
        /// The configured maximum depth
        limit: usize,
    },

    /// Import code contained nothing but whitespace
    #[error("PoB import code is empty after removing whitespace")]
    EmptyImportCode,

    /// Import code contained characters outside both base64 alphabets
    #[error("PoB import code contains invalid characters for base64 encoding: {chars}")]
    InvalidCharacters {
        /// The offending characters, deduplicated and quoted
        chars: String,
    },

    /// Base64 decoding failed
    #[error("Invalid base64 in PoB import code: {0}")]
    InvalidBase64(String),

    /// Inflate failed and the code is far shorter than a real export
    #[error(
        "PoB import code is too short ({length} characters). Typical codes are 10,000+ characters. \
         Please make sure you copied the entire code from Path of Building."
    )]
    CodeTooShort {
        /// Length of the cleaned code
        length: usize,
    },

    /// Inflate failed and the code is shorter than a typical export
    #[error(
        "PoB import code may be incomplete ({length} characters). Typical codes are 10,000+ characters. \
         Please verify you copied the entire code."
    )]
    CodeIncomplete {
        /// Length of the cleaned code
        length: usize,
    },

    /// Inflate rejected the stream as invalid
    #[error(
        "PoB import code appears to be corrupted or incomplete ({length} characters). \
         Try copying the code again from Path of Building."
    )]
    CodeCorrupted {
        /// Length of the cleaned code
        length: usize,
    },

    /// Any other inflate failure
    #[error("Failed to decompress PoB code: {0}")]
    Decompress(String),

    /// Inflated bytes were not UTF-8
    #[error("PoB import code decompressed to invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Build XML could not be parsed
    #[error("Invalid PoB XML: {0}")]
    InvalidXml(String),

    /// Root element has no `<Build>` child
    #[error("PoB XML missing <Build> element")]
    MissingBuildElement,

    /// Required attribute on `<Build>` absent or empty
    #[error("PoB XML missing {0} attribute")]
    MissingAttribute(&'static str),

    /// `level` attribute is not an integer
    #[error("Invalid level value: {0}")]
    InvalidLevel(String),
}

impl Error {
    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new XML parse error
    pub fn invalid_xml(msg: impl Into<String>) -> Self {
        Self::InvalidXml(msg.into())
    }

    /// Returns true for low-level wire errors that the ladder pipeline absorbs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidWireFormat { .. }
                | Self::VarintDecode { .. }
                | Self::UnsupportedWireType { .. }
                | Self::UnexpectedEndGroup { .. }
                | Self::UnterminatedGroup { .. }
                | Self::DepthExceeded { .. }
        )
    }

    /// Returns true for user-actionable input errors (bad import code or build XML)
    pub fn is_validation(&self) -> bool {
        !self.is_recoverable()
    }
}
