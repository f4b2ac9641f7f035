/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Script AST types.
//!
//! A built script is an immutable tree of [`SqlNode`]s. All state touched
//! while rendering lives in the render context, so one tree can be rendered
//! any number of times, from any number of threads.

use crate::parameter::ParameterMapping;
use sqlscript_xml::Span;

/// A node in the script AST.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    /// Literal text with no placeholders, appended as-is.
    Text(String),

    /// Text containing `${...}` and/or `#{...}` placeholders.
    Template(TextTemplate),

    /// `<bind name="..." value="..."/>`
    Bind(BindNode),

    /// `<if test="...">`, optionally followed by `<else-if>`/`<else>`.
    If(IfNode),

    /// `<choose>` with `<when>` cases and an optional `<otherwise>`.
    Choose(ChooseNode),

    /// `<foreach collection="...">`
    Foreach(ForeachNode),

    /// Children applied in order.
    Sequence(Vec<SqlNode>),
}

/// One piece of a [`TextTemplate`].
#[derive(Debug, Clone, PartialEq)]
pub enum TextPiece {
    Literal(String),
    /// `${expr}`
    Interpolation(String),
    /// `#{...}`, parsed at build time.
    Parameter(ParameterMapping),
}

/// A text run with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTemplate {
    pub pieces: Vec<TextPiece>,
    pub span: Option<Span>,
}

impl TextTemplate {
    /// Whether the text substitutes `${...}` values.
    pub fn is_interpolated(&self) -> bool {
        self.pieces
            .iter()
            .any(|piece| matches!(piece, TextPiece::Interpolation(_)))
    }

    /// Whether the text collects `#{...}` parameters.
    pub fn has_parameters(&self) -> bool {
        self.pieces
            .iter()
            .any(|piece| matches!(piece, TextPiece::Parameter(_)))
    }
}

/// `<bind>`: evaluates `value` and binds it to `name` in the current scope.
#[derive(Debug, Clone, PartialEq)]
pub struct BindNode {
    pub name: String,
    pub value: String,
    pub span: Option<Span>,
}

/// A branch body, plus whether entering it needs its own scope.
///
/// `scoped` is set when the body (transitively) contains a `<bind>`, so the
/// binding does not outlive the branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub node: Box<SqlNode>,
    pub scoped: bool,
}

/// `<if>` or `<else-if>`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// Tag this node was built from, for error messages.
    pub tag: &'static str,
    pub test: String,
    pub body: Body,
    /// Next link in the chain, tried when `test` is false.
    pub otherwise: Option<ElseBranch>,
    pub span: Option<Span>,
}

/// What follows an `<if>`/`<else-if>` whose test failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    ElseIf(Box<IfNode>),
    Else(Body),
}

/// `<when>` inside a `<choose>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub test: String,
    pub body: Body,
    /// Stop falling through into later cases once this case has run.
    pub breaks: bool,
    pub span: Option<Span>,
}

/// `<choose>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChooseNode {
    pub cases: Vec<CaseNode>,
    pub otherwise: Option<Body>,
    pub span: Option<Span>,
}

/// `<foreach>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachNode {
    pub collection: String,
    /// `None` when the attribute is absent; the script options decide.
    pub nullable: Option<bool>,
    pub item: Option<String>,
    pub index: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub separator: Option<String>,
    pub body: Box<SqlNode>,
    pub span: Option<Span>,
}

impl SqlNode {
    /// Whether this node or any descendant is a `<bind>`.
    pub fn contains_bind(&self) -> bool {
        match self {
            SqlNode::Bind(_) => true,
            SqlNode::Text(_) | SqlNode::Template(_) => false,
            SqlNode::Sequence(children) => children.iter().any(SqlNode::contains_bind),
            SqlNode::If(node) => node.contains_bind(),
            SqlNode::Choose(node) => {
                node.cases.iter().any(|case| case.body.node.contains_bind())
                    || node
                        .otherwise
                        .as_ref()
                        .is_some_and(|body| body.node.contains_bind())
            }
            SqlNode::Foreach(node) => node.body.contains_bind(),
        }
    }

    /// Whether this node or any descendant is a tag or an interpolated text.
    pub fn is_dynamic(&self) -> bool {
        match self {
            SqlNode::Text(_) => false,
            SqlNode::Template(template) => template.is_interpolated(),
            SqlNode::Sequence(children) => children.iter().any(SqlNode::is_dynamic),
            SqlNode::Bind(_) | SqlNode::If(_) | SqlNode::Choose(_) | SqlNode::Foreach(_) => true,
        }
    }

    /// Whether this node or any descendant collects `#{...}` parameters.
    pub fn has_parameters(&self) -> bool {
        match self {
            SqlNode::Text(_) | SqlNode::Bind(_) => false,
            SqlNode::Template(template) => template.has_parameters(),
            SqlNode::Sequence(children) => children.iter().any(SqlNode::has_parameters),
            SqlNode::If(node) => node.has_parameters(),
            SqlNode::Choose(node) => {
                node.cases.iter().any(|case| case.body.node.has_parameters())
                    || node
                        .otherwise
                        .as_ref()
                        .is_some_and(|body| body.node.has_parameters())
            }
            SqlNode::Foreach(node) => node.body.has_parameters(),
        }
    }

    /// Total number of nodes in this subtree.
    pub fn count(&self) -> usize {
        1 + match self {
            SqlNode::Text(_) | SqlNode::Template(_) | SqlNode::Bind(_) => 0,
            SqlNode::Sequence(children) => children.iter().map(SqlNode::count).sum(),
            SqlNode::If(node) => node.count_children(),
            SqlNode::Choose(node) => {
                node.cases
                    .iter()
                    .map(|case| case.body.node.count())
                    .sum::<usize>()
                    + node.otherwise.as_ref().map_or(0, |body| body.node.count())
            }
            SqlNode::Foreach(node) => node.body.count(),
        }
    }
}

impl IfNode {
    fn contains_bind(&self) -> bool {
        self.body.node.contains_bind()
            || match &self.otherwise {
                Some(ElseBranch::ElseIf(next)) => next.contains_bind(),
                Some(ElseBranch::Else(body)) => body.node.contains_bind(),
                None => false,
            }
    }

    fn has_parameters(&self) -> bool {
        self.body.node.has_parameters()
            || match &self.otherwise {
                Some(ElseBranch::ElseIf(next)) => next.has_parameters(),
                Some(ElseBranch::Else(body)) => body.node.has_parameters(),
                None => false,
            }
    }

    fn count_children(&self) -> usize {
        self.body.node.count()
            + match &self.otherwise {
                Some(ElseBranch::ElseIf(next)) => 1 + next.count_children(),
                Some(ElseBranch::Else(body)) => body.node.count(),
                None => 0,
            }
    }
}
