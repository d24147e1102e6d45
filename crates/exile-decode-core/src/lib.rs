//! # exile-decode-core
//!
//! Decoders for the two binary/text build formats a Path of Exile build
//! aggregator has to read.
//!
//! - poe.ninja ladder search responses: protobuf with no published schema,
//!   decoded field-by-field into `(account, character)` pairs.
//! - Path of Building import codes and XML exports, parsed into a [`Build`]
//!   with equipped items, passive tree and skills.
//!
//! ## Architecture
//!
//! - [`wire`]: schemaless protobuf decoding and value coercion
//! - [`ladder`]: column extraction from build-search payloads
//! - [`pob`]: import codes, build XML and item text
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use exile_decode_core::{parse_build_search_payload, parse_pob_code, Game};
//! use std::fs;
//!
//! let payload = fs::read("./search.bin")?;
//! for summary in &parse_build_search_payload(&payload) {
//!     println!("{} / {}", summary.account(), summary.character());
//! }
//!
//! let code = fs::read_to_string("./build.txt")?;
//! let build = parse_pob_code(&code, Game::Poe1)?;
//! println!("{} level {}", build.character_class, build.level);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! All decoders are pure functions over borrowed input and hold no shared
//! state, so they can be called from any number of threads at once.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod ladder;
pub mod pob;
pub mod wire;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use ladder::{parse_build_search_payload, BuildSearchResult, BuildSummary, LadderExtractor};
pub use pob::{
    decode_import_code, parse_item_text, parse_pob_code, parse_pob_xml, Build, Game, ItemRecord,
};
pub use wire::{DecodedMessage, DecoderConfig, Value, WireDecoder};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
