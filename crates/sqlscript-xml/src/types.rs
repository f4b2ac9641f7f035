//! Core types for the source-tracked XML tree.

use crate::span::Span;

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    /// The root element of the document.
    pub root: XmlElement,

    /// Span of the entire document.
    pub span: Span,
}

/// An XML element with its attributes and mixed content.
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// The local name of the element (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any.
    pub prefix: Option<String>,

    /// Span of the element name inside the start tag.
    pub name_span: Span,

    /// Attributes in source order.
    pub attributes: Vec<XmlAttribute>,

    /// Child nodes in document order.
    pub children: Vec<XmlNode>,

    /// Span from the start tag's `<` to the end tag's `>`.
    pub span: Span,
}

/// An XML attribute.
#[derive(Debug, Clone)]
pub struct XmlAttribute {
    /// The local name of the attribute (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any.
    pub prefix: Option<String>,

    /// The attribute value after entity unescaping.
    pub value: String,

    /// Span of the attribute name.
    pub name_span: Span,

    /// Span of the attribute value, including its quotes.
    pub value_span: Span,
}

/// A single node of element content.
#[derive(Debug, Clone)]
pub enum XmlNode {
    /// A child element.
    Element(XmlElement),

    /// Character data after entity unescaping.
    Text { content: String, span: Span },

    /// A `<![CDATA[...]]>` section, content taken verbatim.
    CData { content: String, span: Span },
}

impl XmlElement {
    /// Get an attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attribute_full(name).map(|a| a.value.as_str())
    }

    /// Get an attribute by local name, including its spans.
    pub fn attribute_full(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Iterate over child elements, skipping text and CDATA.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content of the direct children.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text { content, .. } | XmlNode::CData { content, .. } => {
                    Some(content.as_str())
                }
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// True if the element has no content at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl XmlNode {
    /// The span covered by this node.
    pub fn span(&self) -> Span {
        match self {
            XmlNode::Element(e) => e.span,
            XmlNode::Text { span, .. } | XmlNode::CData { span, .. } => *span,
        }
    }

    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }
}
