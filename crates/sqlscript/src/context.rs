/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-render mutable state.

use crate::error::EvalError;
use crate::expr::ExpressionEvaluator;
use crate::options::{InjectionFilter, ScriptOptions};
use crate::parameter::ParameterMapping;
use crate::scope::{ScopeId, ScopeTree, ScopeView};
use crate::value::{Arguments, Value};

/// Prefix of the names given to loop variables inside parameter placeholders.
const UNIQUE_PREFIX: &str = "__frch_";

/// Per-iteration state of an enclosing `<foreach>`.
#[derive(Debug)]
struct LoopFrame {
    /// Separator owed before this iteration's first non-blank fragment.
    separator: Option<String>,
    /// Whether this iteration has emitted a non-blank fragment.
    applied: bool,
    item: Option<String>,
    index: Option<String>,
    /// Render-wide number identifying this iteration.
    unique: usize,
}

/// Everything a render call mutates.
///
/// A context is created per call and dropped at the end of it; nothing
/// appended to it survives a failed render.
pub struct RenderContext<'a> {
    scopes: ScopeTree,
    current: ScopeId,
    fragments: Vec<String>,
    mappings: Vec<ParameterMapping>,
    values: Vec<Value>,
    /// Whether parameter values are evaluated as they are appended.
    dynamic: bool,
    matched: bool,
    broke: bool,
    frames: Vec<LoopFrame>,
    unique_counter: usize,
    evaluator: &'a dyn ExpressionEvaluator,
    options: &'a ScriptOptions,
    injection_filter: Option<&'a InjectionFilter>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        arguments: &Arguments,
        dynamic: bool,
        evaluator: &'a dyn ExpressionEvaluator,
        options: &'a ScriptOptions,
        injection_filter: Option<&'a InjectionFilter>,
    ) -> Self {
        let scopes = ScopeTree::with_arguments(arguments);
        let current = scopes.root();
        Self {
            scopes,
            current,
            fragments: Vec::new(),
            mappings: Vec::new(),
            values: Vec::new(),
            dynamic,
            matched: false,
            broke: false,
            frames: Vec::new(),
            unique_counter: 0,
            evaluator,
            options,
            injection_filter,
        }
    }

    pub fn evaluator(&self) -> &'a dyn ExpressionEvaluator {
        self.evaluator
    }

    pub fn options(&self) -> &'a ScriptOptions {
        self.options
    }

    pub(crate) fn injection_filter(&self) -> Option<&'a InjectionFilter> {
        self.injection_filter
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// The variables visible from the current scope.
    pub fn vars(&self) -> ScopeView<'_> {
        self.scopes.view(self.current)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.get(self.current, name)
    }

    /// Bind `name` in the current scope.
    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.scopes.put(self.current, name, value);
    }

    /// Remove `name` from the nearest scope that owns it.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.scopes.remove(self.current, name)
    }

    /// Overwrite `name` where it is bound, or bind it in the current scope.
    pub fn rebind_existing(&mut self, name: &str, value: Value) -> Option<Value> {
        self.scopes.rebind_existing(self.current, name, value)
    }

    /// Enter a child of the current scope.
    pub fn push_scope(&mut self) {
        self.current = self.scopes.acquire(self.current);
    }

    /// Leave the current scope, returning it to the pool.
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes.release(self.current) {
            self.current = parent;
        }
    }

    /// Number of scopes waiting in the pool.
    pub fn pooled_scopes(&self) -> usize {
        self.scopes.pooled()
    }

    /// Append a fragment of output text.
    ///
    /// Before the first non-blank fragment of a loop iteration, the separator
    /// owed by that iteration is emitted, outermost loop first. Empty
    /// fragments are dropped.
    pub fn append_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.trim().is_empty() {
            for frame in self.frames.iter_mut().filter(|frame| !frame.applied) {
                frame.applied = true;
                if let Some(separator) = frame.separator.as_ref().filter(|s| !s.is_empty()) {
                    self.fragments.push(separator.clone());
                }
            }
        }
        if !text.is_empty() {
            self.fragments.push(text);
        }
    }

    /// Record a parameter placeholder.
    ///
    /// Inside loops, a property whose leading identifier is a loop's item or
    /// index name is renamed to that iteration's unique name, innermost loop
    /// first. For dynamic scripts the value is evaluated immediately in the
    /// current scope.
    pub(crate) fn push_parameter(&mut self, mapping: &ParameterMapping) -> Result<(), EvalError> {
        let mapping = self.uniquify(mapping);
        if self.dynamic {
            let value = self
                .evaluator
                .evaluate_value(mapping.source.expression(), &self.vars())?;
            self.values.push(value);
        }
        self.mappings.push(mapping);
        Ok(())
    }

    fn uniquify(&self, mapping: &ParameterMapping) -> ParameterMapping {
        let Some(mut property) = mapping.property().map(str::to_string) else {
            return mapping.clone();
        };
        let mut renamed = false;
        for frame in self.frames.iter().rev() {
            for name in [&frame.item, &frame.index].into_iter().flatten() {
                if let Some(rest) = strip_leading_name(&property, name) {
                    property = format!("{}{}", unique_name(name, frame.unique), rest);
                    renamed = true;
                    break;
                }
            }
        }
        if renamed {
            mapping.with_property(property)
        } else {
            mapping.clone()
        }
    }

    /// Start an iteration of a loop, returning its unique number.
    ///
    /// `separator` is `None` for iterations that owe no separator.
    pub(crate) fn enter_iteration(
        &mut self,
        item: Option<&str>,
        index: Option<&str>,
        separator: Option<&str>,
    ) -> usize {
        let unique = self.unique_counter;
        self.unique_counter += 1;
        self.frames.push(LoopFrame {
            separator: separator.map(str::to_string),
            applied: false,
            item: item.map(str::to_string),
            index: index.map(str::to_string),
            unique,
        });
        unique
    }

    /// Finish the current iteration, returning whether it emitted anything.
    pub(crate) fn exit_iteration(&mut self) -> bool {
        self.frames.pop().is_some_and(|frame| frame.applied)
    }

    pub fn set_match(&mut self, matched: bool) {
        self.matched = matched;
    }

    pub fn get_match(&self) -> bool {
        self.matched
    }

    pub fn set_break(&mut self, broke: bool) {
        self.broke = broke;
    }

    pub fn get_break(&self) -> bool {
        self.broke
    }

    /// The output fragments in order.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// The output text: fragments joined by single spaces.
    pub fn sql(&self) -> String {
        self.fragments.join(" ")
    }

    pub(crate) fn into_parts(self) -> (String, Vec<ParameterMapping>, Vec<Value>) {
        let sql = self.sql();
        (sql, self.mappings, self.values)
    }
}

/// The name a loop variable takes inside parameter placeholders.
pub fn unique_name(name: &str, unique: usize) -> String {
    format!("{}{}_{}", UNIQUE_PREFIX, name, unique)
}

/// Whether `expression` reads a loop variable through its unique name.
pub(crate) fn is_unique_name(expression: &str) -> bool {
    expression.trim_start().starts_with(UNIQUE_PREFIX)
}

/// If `property` starts with the identifier `name` (after optional
/// whitespace) followed by the end, `.`, `,`, `:` or whitespace, return the
/// remainder after the identifier.
fn strip_leading_name<'p>(property: &'p str, name: &str) -> Option<&'p str> {
    let rest = property.trim_start().strip_prefix(name)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c == '.' || c == ',' || c == ':' || c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}
