/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for building and rendering SQL scripts.

use sqlscript_xml::{LineColumn, Span};
use thiserror::Error;

/// Errors raised while turning a tag tree into a script.
///
/// Building either succeeds completely or fails; no partial script is ever
/// returned.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The template document is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] sqlscript_xml::Error),

    /// A tag name with no handler.
    #[error("Unknown tag <{tag}>")]
    UnknownTag { tag: String, span: Option<Span> },

    /// `<else-if>` or `<else>` without an open `<if>`/`<else-if>` right before it.
    #[error("<{tag}> must directly follow an <if> or <else-if>")]
    DanglingElse { tag: String, span: Option<Span> },

    /// More than one `<otherwise>` in the same `<choose>`.
    #[error("Too many default (otherwise) elements in choose statement")]
    DuplicateOtherwise { span: Option<Span> },

    /// `<otherwise>` outside of a `<choose>`.
    #[error("<otherwise> is only allowed inside <choose>")]
    MisplacedOtherwise { span: Option<Span> },

    /// An element inside `<choose>` other than `<when>`, `<if>` or `<otherwise>`.
    #[error("Unexpected <{tag}> inside <choose>, expected <when>, <if> or <otherwise>")]
    InvalidChooseChild { tag: String, span: Option<Span> },

    /// A required attribute is absent.
    #[error("<{tag}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        tag: String,
        attribute: &'static str,
        span: Option<Span>,
    },

    /// A boolean attribute holds something other than `true`/`false`.
    #[error("Invalid boolean '{value}' for attribute '{attribute}' on <{tag}>")]
    InvalidBoolean {
        tag: String,
        attribute: &'static str,
        value: String,
        span: Option<Span>,
    },

    /// A `#{...}` placeholder whose content cannot be parsed.
    #[error("Invalid parameter placeholder #{{{content}}}: {message}")]
    InvalidParameter {
        content: String,
        message: String,
        span: Option<Span>,
    },

    /// The configured injection filter is not a valid regular expression.
    #[error("Invalid injection filter: {0}")]
    InvalidInjectionFilter(#[from] regex::Error),

    /// A static script failed while being resolved at build time.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl BuildError {
    /// The source span of the offending tag or text, when known.
    pub fn span(&self) -> Option<Span> {
        match self {
            BuildError::Xml(err) => err.span(),
            BuildError::UnknownTag { span, .. }
            | BuildError::DanglingElse { span, .. }
            | BuildError::DuplicateOtherwise { span }
            | BuildError::MisplacedOtherwise { span }
            | BuildError::InvalidChooseChild { span, .. }
            | BuildError::MissingAttribute { span, .. }
            | BuildError::InvalidBoolean { span, .. }
            | BuildError::InvalidParameter { span, .. } => *span,
            BuildError::InvalidInjectionFilter(_) | BuildError::Render(_) => None,
        }
    }

    /// Resolve the error span to a line/column in `source`.
    pub fn location(&self, source: &str) -> Option<LineColumn> {
        self.span().map(|span| span.start_location(source))
    }
}

/// Errors raised while rendering a script.
///
/// A failed render produces no text: whatever was appended before the
/// failure is discarded with the render context.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The expression evaluator rejected an expression.
    #[error("Error evaluating expression '{expression}' in <{tag}>: {source}")]
    Expression {
        tag: &'static str,
        expression: String,
        #[source]
        source: EvalError,
    },

    /// A `<foreach>` collection evaluated to null and the tag is not nullable.
    #[error("The expression '{expression}' in <foreach> evaluated to a null value")]
    NullCollection { expression: String },

    /// A `<foreach>` collection evaluated to something that cannot be iterated.
    #[error("The expression '{expression}' in <foreach> evaluated to a {type_name}, which is not iterable")]
    NotIterable {
        expression: String,
        type_name: &'static str,
    },

    /// An interpolated value failed the configured injection filter.
    #[error("Value of ${{{expression}}} does not match the injection filter '{pattern}'")]
    InjectionRejected { expression: String, pattern: String },
}

/// Errors raised by an expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The expression text is malformed.
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Property or index access on a null value.
    #[error("cannot read '{property}' of null")]
    NullAccess { property: String },

    /// Property access on a value that has no properties.
    #[error("cannot read '{property}' of {type_name}")]
    NoSuchProperty {
        property: String,
        type_name: &'static str,
    },

    /// List index outside the list.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    /// A method the evaluator does not know for this receiver.
    #[error("unknown method '{method}' on {type_name}")]
    UnknownMethod {
        method: String,
        type_name: &'static str,
    },

    /// Operands of incompatible types.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("division by zero")]
    DivisionByZero,

    /// An iterable was requested but the value is null.
    #[error("value is null")]
    NullIterable,

    /// An iterable was requested but the value is a scalar.
    #[error("{type_name} is not iterable")]
    NotIterable { type_name: &'static str },

    /// Free-form failure from a custom evaluator.
    #[error("{0}")]
    Other(String),
}

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for expression evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_location() {
        let source = "<script>\n  <bogus/>\n</script>";
        let start = source.find("<bogus").unwrap();
        let err = BuildError::UnknownTag {
            tag: "bogus".to_string(),
            span: Some(Span::new(start, start + 8)),
        };
        assert_eq!(err.to_string(), "Unknown tag <bogus>");
        let location = err.location(source).unwrap();
        assert_eq!((location.line, location.column), (2, 3));
    }

    #[test]
    fn test_render_error_names_tag_and_expression() {
        let err = RenderError::Expression {
            tag: "if",
            expression: "a.b".to_string(),
            source: EvalError::NullAccess {
                property: "b".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Error evaluating expression 'a.b' in <if>: cannot read 'b' of null"
        );
    }

    #[test]
    fn test_placeholder_braces_in_messages() {
        let err = RenderError::InjectionRejected {
            expression: "order".to_string(),
            pattern: "^\\w+$".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Value of ${order} does not match the injection filter '^\\w+$'"
        );
    }
}
