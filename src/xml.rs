//! Thin typed accessors over XML metadata documents.
//!
//! Vendor decoders navigate small XML payloads embedded in slide files
//! (ImageDescription strings). This module wraps `roxmltree` with the
//! handful of lookups they need: default-namespace verification, element
//! navigation by local name, and required integer attributes.

use roxmltree::{Document, Node};

use crate::error::{Error, Result};

/// Parse an XML document.
pub fn parse(text: &str) -> std::result::Result<Document<'_>, roxmltree::Error> {
    Document::parse(text)
}

/// True when the root element lives in the given default namespace.
pub fn has_default_namespace(doc: &Document<'_>, ns: &str) -> bool {
    doc.root_element().tag_name().namespace() == Some(ns)
}

/// First child element with the given local name.
pub fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All child elements with the given local name.
pub fn children<'a, 'i>(
    node: Node<'a, 'i>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Text content of the first element along a path of local names.
pub fn text_at(node: Node<'_, '_>, path: &[&str]) -> Option<String> {
    let mut current = node;
    for name in path {
        current = child(current, name)?;
    }
    current.text().map(str::to_string)
}

/// Required integer attribute.
pub fn int_attr(node: Node<'_, '_>, name: &str) -> Result<i64> {
    let value = node
        .attribute(name)
        .ok_or_else(|| Error::BadData(format!("No attribute \"{name}\"")))?;
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::BadData(format!("Couldn't parse integer attribute \"{name}\"")))
}
