/*
 * script.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built scripts and the render entry point.

use crate::ast::SqlNode;
use crate::builder::Builder;
use crate::context::RenderContext;
use crate::error::{BuildResult, RenderError, RenderResult};
use crate::expr::{ExpressionEvaluator, SimpleEvaluator};
use crate::options::{InjectionFilter, ScriptOptions};
use crate::parameter::{BoundParameter, ParameterMapping};
use crate::tree::ScriptNode;
use crate::value::{Arguments, Value};
use serde::Serialize;
use sqlscript_xml::XmlNode;
use std::fmt;
use std::sync::Arc;

/// The result of rendering a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundSql {
    /// The SQL text, with each `#{...}` replaced by the parameter marker.
    pub sql: String,
    /// Parameters in placeholder order, or `None` if the script has no
    /// `#{...}` placeholders at all.
    pub parameters: Option<Vec<BoundParameter>>,
}

impl BoundSql {
    /// The parameter values alone, in order.
    pub fn values(&self) -> Vec<&Value> {
        self.parameters
            .iter()
            .flatten()
            .map(|parameter| &parameter.value)
            .collect()
    }
}

/// Text and mappings of a script with no tags and no `${...}`, computed once
/// at build time.
#[derive(Debug, Clone)]
struct StaticSql {
    sql: String,
    mappings: Vec<ParameterMapping>,
}

/// A compiled SQL template.
///
/// Built once, a script can be rendered any number of times and shared
/// between threads.
///
/// ```rust
/// use sqlscript::{SqlScript, Value};
/// use serde_json::json;
///
/// let script = SqlScript::parse(
///     r#"<select>select * from users <if test="name != null">where name = #{name}</if></select>"#,
/// ).unwrap();
/// let args = Value::arguments_from_json(json!({"name": "alice"})).unwrap();
/// let bound = script.render(&args).unwrap();
/// assert_eq!(bound.sql, "select * from users where name = ?");
/// assert_eq!(bound.values(), vec![&Value::from("alice")]);
/// ```
pub struct SqlScript {
    root: SqlNode,
    options: ScriptOptions,
    injection_filter: Option<InjectionFilter>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    dynamic: bool,
    prepared: bool,
    resolved: Option<StaticSql>,
}

impl fmt::Debug for SqlScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlScript")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("dynamic", &self.dynamic)
            .field("prepared", &self.prepared)
            .finish_non_exhaustive()
    }
}

impl SqlScript {
    /// Parse and build an XML template with default options.
    ///
    /// The root element's name is not interpreted; only its content is.
    pub fn parse(xml: &str) -> BuildResult<Self> {
        Self::parse_with_options(xml, ScriptOptions::default())
    }

    pub fn parse_with_options(xml: &str, options: ScriptOptions) -> BuildResult<Self> {
        let document = sqlscript_xml::parse(xml)?;
        Self::build(&XmlNode::Element(document.root), options)
    }

    /// Build the children of `root` into a script.
    pub fn build<N: ScriptNode>(root: &N, options: ScriptOptions) -> BuildResult<Self> {
        let injection_filter = options.compile_injection_filter()?;
        let nodes = Builder::new(&options).build_children(root.children())?;
        let root = SqlNode::Sequence(nodes);
        let dynamic = root.is_dynamic();
        let prepared = root.has_parameters();

        let mut script = Self {
            root,
            options,
            injection_filter,
            evaluator: Arc::new(SimpleEvaluator::new()),
            dynamic,
            prepared,
            resolved: None,
        };

        if !dynamic {
            let arguments = Arguments::new();
            let mut ctx = script.context(&arguments, script.evaluator.as_ref());
            script.root.apply(&mut ctx)?;
            let (sql, mappings, _) = ctx.into_parts();
            script.resolved = Some(StaticSql { sql, mappings });
        }

        tracing::debug!(
            dynamic,
            prepared,
            nodes = script.root.count(),
            "Built SQL script"
        );
        Ok(script)
    }

    /// Replace the expression evaluator used by [`render`](Self::render).
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Whether the script contains tags or `${...}` placeholders.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether the script contains `#{...}` placeholders.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn root(&self) -> &SqlNode {
        &self.root
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Render against `arguments` with the script's evaluator.
    pub fn render(&self, arguments: &Arguments) -> RenderResult<BoundSql> {
        self.render_with(arguments, self.evaluator.as_ref())
    }

    /// Render against `arguments` with a caller-supplied evaluator.
    ///
    /// Either the whole script renders or an error is returned; no partial
    /// text is ever produced.
    pub fn render_with(
        &self,
        arguments: &Arguments,
        evaluator: &dyn ExpressionEvaluator,
    ) -> RenderResult<BoundSql> {
        let (sql, mappings, values) = match &self.resolved {
            Some(resolved) => {
                let values = resolved
                    .mappings
                    .iter()
                    .map(|mapping| {
                        let expression = mapping.source.expression();
                        evaluator
                            .evaluate_value(expression, arguments)
                            .map_err(|source| RenderError::Expression {
                                tag: "text",
                                expression: expression.to_string(),
                                source,
                            })
                    })
                    .collect::<RenderResult<Vec<_>>>()?;
                (resolved.sql.clone(), resolved.mappings.clone(), values)
            }
            None => {
                let mut ctx = self.context(arguments, evaluator);
                self.root.apply(&mut ctx)?;
                ctx.into_parts()
            }
        };

        tracing::trace!(
            length = sql.len(),
            parameters = mappings.len(),
            "Rendered SQL script"
        );

        let parameters = self.prepared.then(|| {
            mappings
                .into_iter()
                .zip(values)
                .map(|(mapping, value)| BoundParameter { mapping, value })
                .collect()
        });
        Ok(BoundSql { sql, parameters })
    }

    fn context<'a>(
        &'a self,
        arguments: &Arguments,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> RenderContext<'a> {
        RenderContext::new(
            arguments,
            self.dynamic,
            evaluator,
            &self.options,
            self.injection_filter.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(json: serde_json::Value) -> Arguments {
        Value::arguments_from_json(json).unwrap()
    }

    #[test]
    fn test_static_script_resolved_at_build() {
        let script = SqlScript::parse("<select>select * from t where id = #{id}</select>").unwrap();
        assert!(!script.is_dynamic());
        assert!(script.is_prepared());

        let bound = script.render(&args(json!({"id": 3}))).unwrap();
        assert_eq!(bound.sql, "select * from t where id = ?");
        assert_eq!(bound.values(), vec![&Value::Int(3)]);
    }

    #[test]
    fn test_plain_script_has_no_parameter_list() {
        let script = SqlScript::parse("<select>select 1</select>").unwrap();
        let bound = script.render(&Arguments::new()).unwrap();
        assert_eq!(bound.sql, "select 1");
        assert_eq!(bound.parameters, None);
    }

    #[test]
    fn test_dynamic_script_without_parameters() {
        let script = SqlScript::parse("<select>select * from ${table}</select>").unwrap();
        assert!(script.is_dynamic());
        assert!(!script.is_prepared());
        let bound = script.render(&args(json!({"table": "users"}))).unwrap();
        assert_eq!(bound.sql, "select * from users");
        assert_eq!(bound.parameters, None);
    }

    #[test]
    fn test_build_options_apply() {
        let options = ScriptOptions::default().with_parameter_marker("$1");
        let script = SqlScript::parse_with_options("<s>id = #{id}</s>", options).unwrap();
        assert_eq!(script.render(&args(json!({"id": 1}))).unwrap().sql, "id = $1");

        let options = ScriptOptions::default().with_injection_filter("[");
        assert!(matches!(
            SqlScript::parse_with_options("<s>x</s>", options),
            Err(BuildError::InvalidInjectionFilter(_))
        ));
    }

    #[test]
    fn test_injection_filter_rejects_render() {
        let options = ScriptOptions::default().with_injection_filter(r"\w+");
        let script =
            SqlScript::parse_with_options("<s>order by ${column}</s>", options).unwrap();
        assert_eq!(
            script.render(&args(json!({"column": "name"}))).unwrap().sql,
            "order by name"
        );
        let err = script
            .render(&args(json!({"column": "name; drop table t"})))
            .unwrap_err();
        assert!(matches!(err, RenderError::InjectionRejected { .. }));
    }

    #[test]
    fn test_custom_evaluator() {
        struct Constant;
        impl ExpressionEvaluator for Constant {
            fn evaluate_value(
                &self,
                _expression: &str,
                _vars: &dyn crate::scope::Variables,
            ) -> crate::error::EvalResult<Value> {
                Ok(Value::from("k"))
            }
        }

        let script = SqlScript::parse("<s>${anything} #{other}</s>")
            .unwrap()
            .with_evaluator(Arc::new(Constant));
        let bound = script.render(&Arguments::new()).unwrap();
        assert_eq!(bound.sql, "k ?");
        assert_eq!(bound.values(), vec![&Value::from("k")]);
    }

    #[test]
    fn test_script_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqlScript>();
    }
}
