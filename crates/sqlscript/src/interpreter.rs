/*
 * interpreter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Applying script nodes to a render context.
//!
//! Every node reports whether it was "handled": text, sequences and loops
//! always are, a conditional only when one of its branches ran.

use crate::ast::{
    BindNode, Body, CaseNode, ChooseNode, ElseBranch, ForeachNode, IfNode, SqlNode, TextPiece,
    TextTemplate,
};
use crate::context::{RenderContext, unique_name};
use crate::error::{EvalError, RenderError, RenderResult};
use crate::expr::IterEntry;
use crate::value::Value;

/// Tag name used in errors raised by text placeholders.
const TEXT_TAG: &str = "text";

fn expression_error(tag: &'static str, expression: &str) -> impl FnOnce(EvalError) -> RenderError {
    let expression = expression.to_string();
    move |source| RenderError::Expression {
        tag,
        expression,
        source,
    }
}

fn evaluate_test(ctx: &RenderContext<'_>, tag: &'static str, test: &str) -> RenderResult<bool> {
    ctx.evaluator()
        .evaluate_boolean(test, &ctx.vars())
        .map_err(expression_error(tag, test))
}

/// Apply a branch body, inside its own scope when it binds variables.
fn apply_body(body: &Body, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
    if body.scoped {
        ctx.push_scope();
        let result = body.node.apply(ctx);
        ctx.pop_scope();
        result?;
    } else {
        body.node.apply(ctx)?;
    }
    Ok(())
}

impl SqlNode {
    /// Apply this node, returning whether it was handled.
    pub fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        match self {
            SqlNode::Text(text) => {
                ctx.append_text(text.as_str());
                Ok(true)
            }
            SqlNode::Template(template) => {
                template.apply(ctx)?;
                Ok(true)
            }
            SqlNode::Bind(bind) => {
                bind.apply(ctx)?;
                Ok(false)
            }
            SqlNode::If(node) => node.apply(ctx),
            SqlNode::Choose(node) => node.apply(ctx),
            SqlNode::Foreach(node) => node.apply(ctx),
            SqlNode::Sequence(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }
        }
    }
}

impl TextTemplate {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        let mut text = String::new();
        for piece in &self.pieces {
            match piece {
                TextPiece::Literal(literal) => text.push_str(literal),
                TextPiece::Interpolation(expression) => {
                    let rendered = ctx
                        .evaluator()
                        .evaluate_value(expression, &ctx.vars())
                        .map_err(expression_error(TEXT_TAG, expression))?
                        .render();
                    if let Some(filter) = ctx.injection_filter()
                        && !filter.accepts(&rendered)
                    {
                        return Err(RenderError::InjectionRejected {
                            expression: expression.clone(),
                            pattern: filter.pattern.clone(),
                        });
                    }
                    text.push_str(&rendered);
                }
                TextPiece::Parameter(mapping) => {
                    ctx.push_parameter(mapping)
                        .map_err(expression_error(TEXT_TAG, mapping.source.expression()))?;
                    text.push_str(&ctx.options().parameter_marker);
                }
            }
        }
        ctx.append_text(text);
        Ok(())
    }
}

impl BindNode {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        let value = ctx
            .evaluator()
            .evaluate_value(&self.value, &ctx.vars())
            .map_err(expression_error("bind", &self.value))?;
        ctx.put(self.name.as_str(), value);
        Ok(())
    }
}

impl IfNode {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        if evaluate_test(ctx, self.tag, &self.test)? {
            apply_body(&self.body, ctx)?;
            return Ok(true);
        }
        match &self.otherwise {
            Some(ElseBranch::ElseIf(next)) => next.apply(ctx),
            Some(ElseBranch::Else(body)) => {
                apply_body(body, ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ChooseNode {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        // Cases see the enclosing flags; only the exit restores them.
        let saved = (ctx.get_match(), ctx.get_break());
        let result = self.apply_cases(ctx);
        ctx.set_match(saved.0);
        ctx.set_break(saved.1);
        result
    }

    fn apply_cases(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        let mut handled = false;
        for case in &self.cases {
            handled |= case.apply(ctx)?;
            if ctx.get_break() && ctx.get_match() {
                break;
            }
        }
        if !ctx.get_match()
            && let Some(body) = &self.otherwise
        {
            apply_body(body, ctx)?;
            handled = true;
        }
        Ok(handled)
    }
}

impl CaseNode {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        // A previous case matched without breaking: fall through untested.
        if !ctx.get_break() && ctx.get_match() {
            apply_body(&self.body, ctx)?;
            return Ok(true);
        }
        if evaluate_test(ctx, "when", &self.test)? {
            apply_body(&self.body, ctx)?;
            ctx.set_match(true);
            ctx.set_break(self.breaks);
            return Ok(true);
        }
        Ok(false)
    }
}

impl ForeachNode {
    fn apply(&self, ctx: &mut RenderContext<'_>) -> RenderResult<bool> {
        let nullable = self.nullable.unwrap_or(ctx.options().foreach_nullable);
        let entries = ctx
            .evaluator()
            .evaluate_iterable(&self.collection, &ctx.vars(), nullable)
            .map_err(|err| match err {
                EvalError::NullIterable => RenderError::NullCollection {
                    expression: self.collection.clone(),
                },
                EvalError::NotIterable { type_name } => RenderError::NotIterable {
                    expression: self.collection.clone(),
                    type_name,
                },
                source => RenderError::Expression {
                    tag: "foreach",
                    expression: self.collection.clone(),
                    source,
                },
            })?;

        let entries = entries.unwrap_or_default();
        tracing::trace!(
            collection = %self.collection,
            iterations = entries.len(),
            "Applying foreach"
        );
        if entries.is_empty() {
            return Ok(true);
        }

        if let Some(open) = &self.open {
            ctx.append_text(open.as_str());
        }

        let mut first = true;
        for (position, entry) in entries.into_iter().enumerate() {
            let (key, value) = match entry {
                IterEntry::Item(value) => (Value::from(position), value),
                IterEntry::Entry(key, value) => (key, value),
            };
            let separator = if first { None } else { self.separator.as_deref() };

            ctx.push_scope();
            let unique = ctx.enter_iteration(self.item.as_deref(), self.index.as_deref(), separator);
            if let Some(index) = &self.index {
                ctx.put(unique_name(index, unique), key.clone());
                ctx.put(index.as_str(), key);
            }
            if let Some(item) = &self.item {
                ctx.put(unique_name(item, unique), value.clone());
                ctx.put(item.as_str(), value);
            }
            let result = self.body.apply(ctx);
            let applied = ctx.exit_iteration();
            ctx.pop_scope();
            result?;

            if first && applied {
                first = false;
            }
        }

        if let Some(close) = &self.close {
            ctx.append_text(close.as_str());
        }

        Ok(true)
    }
}
