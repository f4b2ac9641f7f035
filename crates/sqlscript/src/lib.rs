/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Dynamic SQL template interpreter.
//!
//! A template mixes literal SQL with control tags and two kinds of
//! placeholders:
//!
//! - Interpolation: `${expr}` is evaluated and written into the SQL text
//! - Parameters: `#{expr}` becomes a marker (`?` by default) and its value is
//!   collected into an ordered parameter list
//! - Conditionals: `<if test>`, `<else-if test>`, `<else>`
//! - Switches: `<choose>` with `<when test break>` cases and `<otherwise>`;
//!   a matching case falls through into later ones unless it sets `break`
//! - Loops: `<foreach collection item index open close separator nullable>`
//! - Bindings: `<bind name value>`
//!
//! # Architecture
//!
//! A template is built once into an immutable [`SqlNode`] tree. Each render
//! call gets its own [`RenderContext`] holding the variable scopes, output
//! fragments, collected parameters and the transient `<choose>` flags, so a
//! built [`SqlScript`] is `Send + Sync` and can be rendered concurrently.
//!
//! Expressions are evaluated through the [`ExpressionEvaluator`] trait.
//! [`SimpleEvaluator`] implements a small OGNL-like language and is used
//! unless another evaluator is supplied.
//!
//! # Example
//!
//! ```rust
//! use sqlscript::{SqlScript, Value};
//! use serde_json::json;
//!
//! let script = SqlScript::parse(r#"
//!     <select>
//!       select * from users where id in
//!       <foreach collection="ids" item="id" open="(" close=")" separator=",">#{id}</foreach>
//!     </select>"#).unwrap();
//!
//! let args = Value::arguments_from_json(json!({"ids": [1, 2]})).unwrap();
//! let bound = script.render(&args).unwrap();
//! assert_eq!(bound.sql, "select * from users where id in ( ? , ? )");
//! assert_eq!(bound.values(), vec![&Value::Int(1), &Value::Int(2)]);
//! ```

pub mod ast;
mod builder;
pub mod context;
pub mod error;
pub mod expr;
mod interpreter;
pub mod options;
pub mod parameter;
pub mod placeholder;
pub mod scope;
pub mod script;
pub mod tree;
pub mod value;

// Re-export main types at crate root
pub use ast::{
    BindNode, Body, CaseNode, ChooseNode, ElseBranch, ForeachNode, IfNode, SqlNode, TextPiece,
    TextTemplate,
};
pub use context::RenderContext;
pub use error::{BuildError, EvalError, RenderError};
pub use expr::{ExpressionEvaluator, IterEntry, SimpleEvaluator};
pub use options::ScriptOptions;
pub use parameter::{BoundParameter, ParameterMapping, ParameterSource};
pub use scope::{ScopeId, ScopeTree, ScopeView, Variables};
pub use script::{BoundSql, SqlScript};
pub use tree::{NodeKind, ScriptNode};
pub use value::{Arguments, Value};
