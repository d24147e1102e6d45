//! Path of Building exports.
//!
//! A build reaches us either as raw XML or as an import code (the same XML,
//! zlib-compressed and base64-encoded). [`parse_pob_code`] handles the code,
//! [`parse_pob_xml`] the XML, and both produce a [`Build`].

mod build;
mod code;
mod item;
mod xml;

pub use build::{
    extract_items, parse_pob_code, parse_pob_xml, Build, Game, Gem, PassiveTree, SkillGroup,
};
pub use code::{clean_import_code, decode_import_code, inflate, CodeAlphabet, InflateError};
pub use item::{parse_item_text, ItemRecord, KNOWN_PROPERTIES};
pub use xml::{parse_document, XmlElement, XmlNode, MAX_ELEMENT_DEPTH};
