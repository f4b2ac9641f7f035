//! Source-tracked XML front end for sqlscript templates.
//!
//! SQL templates are usually written as XML fragments where literal SQL text
//! is interleaved with control tags:
//!
//! ```xml
//! <select>
//!   SELECT * FROM users
//!   <if test="name != null">WHERE name = #{name}</if>
//! </select>
//! ```
//!
//! This crate wraps [`quick-xml`] and produces a tree of [`XmlNode`]s in
//! document order. Unlike a data-oriented XML reader, mixed content is kept
//! exactly as written: text, CDATA sections and elements stay interleaved, so
//! the template builder can see which text precedes which tag.
//!
//! Every element, attribute and text run records its byte [`Span`] in the
//! template source so build errors can point at the offending tag.
//!
//! # Example
//!
//! ```rust
//! use sqlscript_xml::parse;
//!
//! let doc = parse(r#"<script>SELECT 1 <if test="x">AND x</if></script>"#).unwrap();
//! assert_eq!(doc.root.name, "script");
//! assert_eq!(doc.root.children.len(), 2);
//! assert_eq!(doc.root.child_elements().next().unwrap().attribute("test"), Some("x"));
//! ```

pub mod error;
pub mod parser;
pub mod span;
pub mod types;

pub use error::{Error, Result};
pub use parser::parse;
pub use span::{LineColumn, Span};
pub use types::{XmlAttribute, XmlDocument, XmlElement, XmlNode};
