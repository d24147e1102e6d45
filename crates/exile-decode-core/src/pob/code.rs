//! Path of Building import codes.
//!
//! An import code is the build XML, zlib-compressed and base64-encoded.
//! Path of Building emits the URL-safe alphabet, but codes pasted through
//! other tools often arrive in the standard alphabet or wrapped across lines,
//! so both are accepted and all whitespace is ignored.
//!
//! Every failure stage maps to its own [`Error`] variant so the caller can
//! tell the user what went wrong with the paste.

use crate::error::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use flate2::{Decompress, FlushDecompress, Status};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Codes shorter than this cannot hold a real build
const TOO_SHORT_LENGTH: usize = 1000;

/// Codes shorter than this were probably cut off while copying
const INCOMPLETE_LENGTH: usize = 5000;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Base64 variant detected in an import code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeAlphabet {
    /// `+` and `/`
    Standard,
    /// `-` and `_`
    UrlSafe,
}

impl CodeAlphabet {
    /// URL-safe if `-` or `_` appears anywhere, standard otherwise
    pub fn detect(code: &str) -> Self {
        if code.contains(['-', '_']) {
            CodeAlphabet::UrlSafe
        } else {
            CodeAlphabet::Standard
        }
    }
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
}

/// Whitespace as pasted text may contain it; includes the ASCII information
/// separators, which some clipboards leave behind.
fn is_code_whitespace(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\x1c'..='\x1f')
}

/// Remove every whitespace character, wherever it appears
pub fn clean_import_code(code: &str) -> String {
    code.chars().filter(|c| !is_code_whitespace(*c)).collect()
}

/// Decode an import code into the build XML text
pub fn decode_import_code(import_code: &str) -> Result<String> {
    let cleaned = clean_import_code(import_code);
    if cleaned.is_empty() {
        return Err(Error::EmptyImportCode);
    }

    let invalid: BTreeSet<char> = cleaned.chars().filter(|c| !is_code_char(*c)).collect();
    if !invalid.is_empty() {
        let chars = invalid
            .iter()
            .map(|c| format!("{c:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::InvalidCharacters {
            chars: format!("{{{chars}}}"),
        });
    }

    let compressed = decode_base64(&cleaned)?;
    debug!(
        compressed_size = compressed.len(),
        code_length = cleaned.len(),
        first_bytes = %hex_prefix(&compressed, 20),
        "Decoded base64"
    );

    let xml = inflate(&compressed).map_err(|e| classify_inflate_error(cleaned.len(), &e))?;
    Ok(String::from_utf8(xml)?)
}

fn decode_base64(cleaned: &str) -> Result<Vec<u8>> {
    let decoded = match CodeAlphabet::detect(cleaned) {
        // a code may mix both alphabets; fold it into the URL-safe one
        CodeAlphabet::UrlSafe => {
            let folded: String = cleaned
                .chars()
                .map(|c| match c {
                    '+' => '-',
                    '/' => '_',
                    other => other,
                })
                .collect();
            URL_SAFE_LENIENT.decode(folded)
        }
        CodeAlphabet::Standard => STANDARD_LENIENT.decode(cleaned),
    };
    decoded.map_err(|e| Error::InvalidBase64(e.to_string()))
}

/// Map an inflate failure to the message tier for a code of this length
fn classify_inflate_error(code_length: usize, error: &InflateError) -> Error {
    let detail = error.to_string().to_lowercase();
    if code_length < TOO_SHORT_LENGTH {
        Error::CodeTooShort {
            length: code_length,
        }
    } else if code_length < INCOMPLETE_LENGTH {
        Error::CodeIncomplete {
            length: code_length,
        }
    } else if detail.contains("invalid") || detail.contains("incorrect") {
        Error::CodeCorrupted {
            length: code_length,
        }
    } else {
        Error::Decompress(error.to_string())
    }
}

/// Why a zlib stream could not be inflated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InflateError {
    /// The two-byte zlib header failed its check
    IncorrectHeader,
    /// The header names a method other than deflate
    UnknownMethod,
    /// The deflate data or checksum is bad
    InvalidData(String),
    /// Input ended before the end of the stream
    Truncated,
}

impl fmt::Display for InflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InflateError::IncorrectHeader => f.write_str("incorrect header check"),
            InflateError::UnknownMethod => f.write_str("unknown compression method"),
            InflateError::InvalidData(msg) => write!(f, "invalid compressed data: {msg}"),
            InflateError::Truncated => f.write_str("incomplete or truncated stream"),
        }
    }
}

impl std::error::Error for InflateError {}

/// Inflate a complete zlib stream; bytes after the stream end are ignored
pub fn inflate(data: &[u8]) -> std::result::Result<Vec<u8>, InflateError> {
    let &[cmf, flg, ..] = data else {
        return Err(InflateError::Truncated);
    };
    if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
        return Err(InflateError::IncorrectHeader);
    }
    if cmf & 0x0F != 8 {
        return Err(InflateError::UnknownMethod);
    }

    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(1024));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();

        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| InflateError::InvalidData(e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed
                    && inflater.total_out() == produced;
                if stalled && out.len() < out.capacity() {
                    return Err(InflateError::Truncated);
                }
            }
        }
    }
}

fn hex_prefix(data: &[u8], limit: usize) -> String {
    data.iter().take(limit).map(|b| format!("{b:02x}")).collect()
}
