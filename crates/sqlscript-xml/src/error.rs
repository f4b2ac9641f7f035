//! Error types for XML parsing.

use crate::span::Span;
use thiserror::Error;

/// Result type alias for sqlscript-xml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading a template document.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// XML syntax error reported by quick-xml.
    #[error("XML syntax error: {message}{}", position.map(|p| format!(" at byte {p}")).unwrap_or_default())]
    XmlSyntax {
        message: String,
        /// Byte offset where the error occurred.
        position: Option<u64>,
    },

    /// The input ended while an element was still open.
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, span: Option<Span> },

    /// An end tag did not match the innermost open element.
    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag {
        expected: String,
        found: String,
        span: Option<Span>,
    },

    /// An end tag appeared with no open element.
    #[error("Unexpected closing tag </{name}>")]
    UnexpectedEndTag { name: String },

    /// The document has no root element.
    #[error("Empty XML document: no root element found")]
    EmptyDocument,

    /// The document has more than one root element.
    #[error("Invalid XML: multiple root elements")]
    MultipleRoots { span: Option<Span> },
}

impl Error {
    /// The source span associated with this error, if known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::XmlSyntax { position, .. } => position.map(|p| Span::new(p as usize, p as usize)),
            Error::UnexpectedEof { span, .. }
            | Error::MismatchedEndTag { span, .. }
            | Error::MultipleRoots { span } => *span,
            Error::UnexpectedEndTag { .. } | Error::EmptyDocument => None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlSyntax {
            message: err.to_string(),
            position: None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlSyntax {
            message: format!("Attribute error: {}", err),
            position: None,
        }
    }
}
