/*
 * tree.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The tagged input tree the builder consumes.
//!
//! Any tree of text, CDATA and named elements with string attributes can be
//! built into a script by implementing [`ScriptNode`]. The XML front end in
//! `sqlscript-xml` is the implementation used by [`SqlScript::parse`].
//!
//! [`SqlScript::parse`]: crate::SqlScript::parse

use sqlscript_xml::{Span, XmlNode};

/// Kind of an input node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    CData,
    Element,
}

/// A node of the tagged input tree.
pub trait ScriptNode: Sized {
    fn kind(&self) -> NodeKind;

    /// The tag name, for elements.
    fn tag_name(&self) -> Option<&str>;

    /// The character content, for text and CDATA nodes.
    fn text(&self) -> Option<&str>;

    /// An attribute value, for elements.
    fn attribute(&self, name: &str) -> Option<&str>;

    /// Child nodes, for elements.
    fn children(&self) -> &[Self];

    /// Source span, when the tree tracks locations.
    fn span(&self) -> Option<Span> {
        None
    }

    /// A boolean attribute, or `default` when absent.
    ///
    /// Accepts `true` and `false` (surrounding whitespace ignored); any other
    /// value is returned as the error.
    fn bool_attribute(&self, name: &str, default: bool) -> Result<bool, String> {
        match self.attribute(name).map(str::trim) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(other.to_string()),
        }
    }
}

impl ScriptNode for XmlNode {
    fn kind(&self) -> NodeKind {
        match self {
            XmlNode::Element(_) => NodeKind::Element,
            XmlNode::Text { .. } => NodeKind::Text,
            XmlNode::CData { .. } => NodeKind::CData,
        }
    }

    fn tag_name(&self) -> Option<&str> {
        self.as_element().map(|element| element.name.as_str())
    }

    fn text(&self) -> Option<&str> {
        match self {
            XmlNode::Text { content, .. } | XmlNode::CData { content, .. } => Some(content),
            XmlNode::Element(_) => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.as_element()?.attribute(name)
    }

    fn children(&self) -> &[Self] {
        match self {
            XmlNode::Element(element) => &element.children,
            _ => &[],
        }
    }

    fn span(&self) -> Option<Span> {
        Some(XmlNode::span(self))
    }
}
