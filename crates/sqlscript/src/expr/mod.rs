/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression evaluation.
//!
//! The interpreter never looks inside expression strings itself. Every test,
//! bind value, collection and placeholder is handed to an
//! [`ExpressionEvaluator`] together with the current scope chain. Callers can
//! plug in their own evaluator; [`SimpleEvaluator`] is the built-in one.

mod eval;
mod parser;

pub use eval::SimpleEvaluator;
pub use parser::{BinaryOp, Expr, UnaryOp, parse_expression};

use crate::error::{EvalError, EvalResult};
use crate::scope::Variables;
use crate::value::Value;

/// One element produced by iterating a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum IterEntry {
    /// An element of a sequence; its index is its position.
    Item(Value),
    /// A key/value pair from a mapping.
    Entry(Value, Value),
}

/// Evaluates expression strings against a variable scope.
///
/// Only [`evaluate_value`](Self::evaluate_value) is required; the boolean
/// and iterable forms derive from it.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` to a value (possibly [`Value::Null`]).
    fn evaluate_value(&self, expression: &str, vars: &dyn Variables) -> EvalResult<Value>;

    /// Evaluate `expression` as a condition.
    ///
    /// Booleans are taken as-is, numbers are true when non-zero, null is
    /// false and any other value is true.
    fn evaluate_boolean(&self, expression: &str, vars: &dyn Variables) -> EvalResult<bool> {
        Ok(self.evaluate_value(expression, vars)?.is_truthy())
    }

    /// Evaluate `expression` as a collection.
    ///
    /// Lists yield their items, maps yield key/value entries in insertion
    /// order. A null result is `Ok(None)` when `nullable` is set and
    /// [`EvalError::NullIterable`] otherwise.
    fn evaluate_iterable(
        &self,
        expression: &str,
        vars: &dyn Variables,
        nullable: bool,
    ) -> EvalResult<Option<Vec<IterEntry>>> {
        match self.evaluate_value(expression, vars)? {
            Value::Null if nullable => Ok(None),
            Value::Null => Err(EvalError::NullIterable),
            Value::List(items) => Ok(Some(items.into_iter().map(IterEntry::Item).collect())),
            Value::Map(map) => Ok(Some(
                map.into_iter()
                    .map(|(key, value)| IterEntry::Entry(Value::String(key), value))
                    .collect(),
            )),
            other => Err(EvalError::NotIterable {
                type_name: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Arguments;

    /// Evaluator that treats every expression as a variable name.
    struct LookupEvaluator;

    impl ExpressionEvaluator for LookupEvaluator {
        fn evaluate_value(&self, expression: &str, vars: &dyn Variables) -> EvalResult<Value> {
            Ok(vars.get(expression).cloned().unwrap_or_default())
        }
    }

    fn vars() -> Arguments {
        let mut args = Arguments::new();
        args.insert("list".to_string(), Value::from(vec![1, 2]));
        args.insert("zero".to_string(), Value::Int(0));
        let mut map = indexmap::IndexMap::new();
        map.insert("k".to_string(), Value::from("v"));
        args.insert("map".to_string(), Value::Map(map));
        args
    }

    #[test]
    fn test_default_boolean_uses_truthiness() {
        let vars = vars();
        assert!(LookupEvaluator.evaluate_boolean("list", &vars).unwrap());
        assert!(!LookupEvaluator.evaluate_boolean("zero", &vars).unwrap());
        assert!(!LookupEvaluator.evaluate_boolean("missing", &vars).unwrap());
    }

    #[test]
    fn test_default_iterable_shapes() {
        let vars = vars();
        assert_eq!(
            LookupEvaluator.evaluate_iterable("list", &vars, false).unwrap(),
            Some(vec![IterEntry::Item(Value::Int(1)), IterEntry::Item(Value::Int(2))])
        );
        assert_eq!(
            LookupEvaluator.evaluate_iterable("map", &vars, false).unwrap(),
            Some(vec![IterEntry::Entry(Value::from("k"), Value::from("v"))])
        );
    }

    #[test]
    fn test_default_iterable_null_handling() {
        let vars = vars();
        assert_eq!(LookupEvaluator.evaluate_iterable("missing", &vars, true).unwrap(), None);
        assert_eq!(
            LookupEvaluator.evaluate_iterable("missing", &vars, false),
            Err(EvalError::NullIterable)
        );
        assert_eq!(
            LookupEvaluator.evaluate_iterable("zero", &vars, true),
            Err(EvalError::NotIterable { type_name: "integer" })
        );
    }
}
