//! Ladder extraction from poe.ninja build-search payloads.
//!
//! The search response is column-oriented. The top-level message holds one
//! container (field 1) whose field 5 repeats once per column; each column
//! carries its name in field 1 and one value per ladder row in field 2.
//! Only the `account` and `name` columns are read.
//!
//! Anything that does not match this shape yields an empty result rather than
//! an error.

use crate::wire::{Coerce, DecodedMessage, DecoderConfig, Value, WireDecoder};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const CONTAINER_FIELD: u64 = 1;
const COLUMNS_FIELD: u64 = 5;
const COLUMN_NAME_FIELD: u64 = 1;
const COLUMN_VALUES_FIELD: u64 = 2;

const CHARACTER_COLUMN: &str = "name";
const ACCOUNT_COLUMN: &str = "account";

/// One ladder entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildSummary {
    account: String,
    character: String,
}

impl BuildSummary {
    /// Creates a summary, or `None` if either name is empty
    pub fn new(account: impl Into<String>, character: impl Into<String>) -> Option<Self> {
        let account = account.into();
        let character = character.into();
        if account.is_empty() || character.is_empty() {
            return None;
        }
        Some(Self { account, character })
    }

    /// Account name
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Character name
    pub fn character(&self) -> &str {
        &self.character
    }
}

/// Ladder entries in ladder order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildSearchResult {
    summaries: Vec<BuildSummary>,
}

impl BuildSearchResult {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Returns true if no entry was found
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Iterates entries in ladder order
    pub fn iter(&self) -> std::slice::Iter<'_, BuildSummary> {
        self.summaries.iter()
    }

    /// Entries as a slice
    pub fn as_slice(&self) -> &[BuildSummary] {
        &self.summaries
    }
}

impl From<Vec<BuildSummary>> for BuildSearchResult {
    fn from(summaries: Vec<BuildSummary>) -> Self {
        Self { summaries }
    }
}

impl IntoIterator for BuildSearchResult {
    type Item = BuildSummary;
    type IntoIter = std::vec::IntoIter<BuildSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.summaries.into_iter()
    }
}

impl<'r> IntoIterator for &'r BuildSearchResult {
    type Item = &'r BuildSummary;
    type IntoIter = std::slice::Iter<'r, BuildSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.summaries.iter()
    }
}

/// Turns build-search payloads into [`BuildSearchResult`]s
#[derive(Debug, Clone, Default)]
pub struct LadderExtractor {
    decoder: WireDecoder,
}

impl LadderExtractor {
    /// Creates an extractor with the default decoder configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an extractor with a custom decoder configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            decoder: WireDecoder::with_config(config),
        }
    }

    /// Decode a raw payload and extract its ladder entries
    pub fn parse(&self, payload: &[u8]) -> BuildSearchResult {
        debug!("Decoding build search payload of {} bytes", payload.len());
        let message = self.decoder.decode(payload);
        let result = self.extract(&message);
        debug!("Extracted {} build summaries", result.len());
        result
    }

    /// Extract ladder entries from an already decoded message
    pub fn extract(&self, message: &DecodedMessage<'_>) -> BuildSearchResult {
        let Some(container) = message
            .get(CONTAINER_FIELD)
            .first()
            .and_then(Value::as_message)
        else {
            debug!("Payload has no container message in field {}", CONTAINER_FIELD);
            return BuildSearchResult::default();
        };

        let columns = column_map(container.get(COLUMNS_FIELD));
        let characters = decode_column(&columns, CHARACTER_COLUMN);
        let accounts = decode_column(&columns, ACCOUNT_COLUMN);

        accounts
            .into_iter()
            .zip(characters)
            .filter_map(|(account, character)| BuildSummary::new(account, character))
            .collect::<Vec<_>>()
            .into()
    }
}

/// Column name to its raw row values; a later column with the same name wins
fn column_map<'m, 'a>(columns: &'m [Value<'a>]) -> HashMap<String, &'m [Value<'a>]> {
    let mut map = HashMap::new();
    for column in columns {
        let Some(column) = column.as_message() else {
            debug!("Skipping column that did not decode as a message");
            continue;
        };
        let name = column.get(COLUMN_NAME_FIELD).decode_string();
        if name.is_empty() {
            continue;
        }
        map.insert(name, column.get(COLUMN_VALUES_FIELD));
    }
    map
}

fn decode_column(columns: &HashMap<String, &[Value<'_>]>, name: &str) -> Vec<String> {
    columns
        .get(name)
        .map(|values| values.iter().map(Coerce::decode_string).collect())
        .unwrap_or_default()
}

/// Decode a build-search payload with the default configuration
pub fn parse_build_search_payload(payload: &[u8]) -> BuildSearchResult {
    LadderExtractor::new().parse(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use prost::encoding::{encode_key, encode_varint, WireType};

    fn len_field(field: u32, payload: &[u8], out: &mut Vec<u8>) {
        encode_key(field, WireType::LengthDelimited, out);
        encode_varint(payload.len() as u64, out);
        out.extend_from_slice(payload);
    }

    fn column(name: &str, rows: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        len_field(1, name.as_bytes(), &mut out);
        for row in rows {
            len_field(2, row.as_bytes(), &mut out);
        }
        out
    }

    fn payload(columns: &[Vec<u8>]) -> Vec<u8> {
        // a low-numbered field so the container passes the nested-message check
        let mut container = Vec::new();
        encode_key(1, WireType::Varint, &mut container);
        encode_varint(2, &mut container);
        for column in columns {
            len_field(5, column, &mut container);
        }
        let mut out = Vec::new();
        len_field(1, &container, &mut out);
        out
    }

    fn summary(account: &str, character: &str) -> BuildSummary {
        BuildSummary::new(account, character).unwrap()
    }

    #[test]
    fn test_two_column_payload() {
        let data = payload(&[
            column("account", &["Alice", "Bob"]),
            column("name", &["AliceRF", "BobTotems"]),
        ]);

        let result = parse_build_search_payload(&data);
        assert_eq!(
            result.as_slice(),
            &[summary("Alice", "AliceRF"), summary("Bob", "BobTotems")]
        );
    }

    #[test]
    fn test_extra_columns_ignored() {
        let data = payload(&[
            column("level", &["100", "99"]),
            column("name", &["Zed", "Yui"]),
            column("class", &["Witch", "Ranger"]),
            column("account", &["zz", "yy"]),
        ]);

        let result = parse_build_search_payload(&data);
        assert_eq!(result.as_slice(), &[summary("zz", "Zed"), summary("yy", "Yui")]);
    }

    #[test]
    fn test_shorter_column_truncates() {
        let data = payload(&[
            column("account", &["one", "two", "three"]),
            column("name", &["Uno"]),
        ]);

        let result = parse_build_search_payload(&data);
        assert_eq!(result.as_slice(), &[summary("one", "Uno")]);
    }

    #[test]
    fn test_empty_values_skipped() {
        let data = payload(&[
            column("account", &["a1", "", "a3"]),
            column("name", &["n1", "n2", "n3"]),
        ]);

        let result = parse_build_search_payload(&data);
        assert_eq!(result.as_slice(), &[summary("a1", "n1"), summary("a3", "n3")]);
    }

    #[test]
    fn test_missing_account_column() {
        let data = payload(&[column("name", &["Solo"])]);
        assert!(parse_build_search_payload(&data).is_empty());
    }

    #[test]
    fn test_unrecognized_payloads_are_empty() {
        assert!(parse_build_search_payload(&[]).is_empty());
        assert!(parse_build_search_payload(&[0x08, 0x80]).is_empty());
        assert!(parse_build_search_payload(b"not protobuf at all").is_empty());

        // field 1 present but holding a plain string
        let mut data = Vec::new();
        len_field(1, b"hello world", &mut data);
        assert!(parse_build_search_payload(&data).is_empty());
    }

    #[test]
    fn test_container_without_low_fields_is_opaque() {
        let mut container = Vec::new();
        len_field(5, &column("account", &["a"]), &mut container);
        len_field(5, &column("name", &["n"]), &mut container);
        let mut data = Vec::new();
        len_field(1, &container, &mut data);

        assert!(parse_build_search_payload(&data).is_empty());
    }

    #[test]
    fn test_summary_requires_both_names() {
        assert!(BuildSummary::new("", "x").is_none());
        assert!(BuildSummary::new("x", "").is_none());
        let s = summary("acc", "char");
        assert_eq!(s.account(), "acc");
        assert_eq!(s.character(), "char");
    }

    #[test]
    fn test_result_serializes_as_list() {
        let result = BuildSearchResult::from(vec![summary("a", "b")]);
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"[{"account":"a","character":"b"}]"#);
    }
}
