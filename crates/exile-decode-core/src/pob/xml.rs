//! Minimal element tree for Path of Building exports.
//!
//! The tree is built from `quick-xml` events with an explicit stack, so deep
//! documents cost memory rather than native stack. Only the text before an
//! element's first child is kept, which is where PoB puts item text.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

/// Documents nested deeper than this are rejected
pub const MAX_ELEMENT_DEPTH: usize = 256;

/// A parsed XML element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Element name as written, including any prefix
    pub tag: String,
    /// Attributes in document order, entity-decoded
    pub attributes: IndexMap<String, String>,
    /// Text before the first child element
    pub text: Option<String>,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Attribute value, if present
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute value, treating an empty value as absent
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|v| !v.is_empty())
    }

    /// First direct child with the given tag
    pub fn child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All direct children with the given tag
    pub fn children_named<'s>(&'s self, tag: &'s str) -> impl Iterator<Item = &'s XmlElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// First descendant (excluding `self`) in document order matching `pred`
    pub fn find_descendant(&self, pred: impl Fn(&XmlElement) -> bool) -> Option<&XmlElement> {
        let mut pending: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(element) = pending.pop() {
            if pred(element) {
                return Some(element);
            }
            pending.extend(element.children.iter().rev());
        }
        None
    }

    /// Text before the first child, or empty
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Parse a complete document and return its root element
pub fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::invalid_xml(format!("{e} (at byte {})", reader.buffer_position()))
        })?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(Error::invalid_xml("junk after document element"));
                }
                if stack.len() >= MAX_ELEMENT_DEPTH {
                    return Err(Error::invalid_xml(format!(
                        "elements nested deeper than {MAX_ELEMENT_DEPTH} levels"
                    )));
                }
                stack.push(element_from(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::invalid_xml("closing tag without opening tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| Error::invalid_xml(e.to_string()))?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                append_text(&mut stack, &String::from_utf8_lossy(&data))?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::invalid_xml(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or_else(|| Error::invalid_xml("no element found"))
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement {
        tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..XmlElement::default()
    };

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::invalid_xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::invalid_xml(e.to_string()))?
            .into_owned();
        element.attributes.insert(key, value);
    }

    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::invalid_xml("junk after document element")),
    }
    Ok(())
}

fn append_text(stack: &mut [XmlElement], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(element) if element.children.is_empty() => {
            element.text.get_or_insert_with(String::new).push_str(text);
        }
        // tail text after a child element is not kept
        Some(_) => {}
        None if text.trim().is_empty() => {}
        None => return Err(Error::invalid_xml("text outside the document element")),
    }
    Ok(())
}

/// Structural mirror of an element, for storing the export verbatim.
///
/// Serializes as `{"_tag", "_attrib"?, "_text"?, "_children"?}`; empty parts
/// are omitted and text is whitespace-trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlNode {
    /// Element name
    #[serde(rename = "_tag")]
    pub tag: String,
    /// Attributes in document order
    #[serde(rename = "_attrib", skip_serializing_if = "IndexMap::is_empty")]
    pub attrib: IndexMap<String, String>,
    /// Trimmed leading text, if any remains
    #[serde(rename = "_text", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child nodes
    #[serde(rename = "_children", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XmlNode>,
}

impl From<&XmlElement> for XmlNode {
    fn from(element: &XmlElement) -> Self {
        Self {
            tag: element.tag.clone(),
            attrib: element.attributes.clone(),
            text: Some(element.text().trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            children: element.children.iter().map(XmlNode::from).collect(),
        }
    }
}
