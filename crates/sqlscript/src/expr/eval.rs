/*
 * eval.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The built-in expression evaluator.

use super::ExpressionEvaluator;
use super::parser::{BinaryOp, Expr, UnaryOp, parse_expression};
use crate::context::is_unique_name;
use crate::error::{EvalError, EvalResult};
use crate::scope::Variables;
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Evaluator for a small OGNL-like expression language.
///
/// Supports literals (`null`, `true`, `false`, numbers, quoted strings),
/// variable paths (`a.b`, `a[0]`, `a['key']`), arithmetic, comparison and
/// logical operators (symbolic or spelled `eq`, `neq`, `lt`, `lte`, `gt`,
/// `gte`, `and`, `or`, `not`), and a handful of methods on strings and
/// collections.
///
/// Parsed expressions are cached by source text, so a script rendered many
/// times parses each expression once.
#[derive(Debug, Default)]
pub struct SimpleEvaluator {
    cache: RwLock<HashMap<String, Arc<Expr>>>,
}

impl SimpleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `expression`, consulting the cache first.
    ///
    /// Expressions naming a loop variable by its per-iteration unique name
    /// are parsed every time and never cached, since each iteration has its
    /// own name.
    pub fn compile(&self, expression: &str) -> EvalResult<Arc<Expr>> {
        if is_unique_name(expression) {
            return Ok(Arc::new(parse_expression(expression)?));
        }
        if let Some(expr) = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(expression)
        {
            return Ok(Arc::clone(expr));
        }

        let expr = Arc::new(parse_expression(expression)?);
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(expression.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Number of cached expressions.
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl ExpressionEvaluator for SimpleEvaluator {
    fn evaluate_value(&self, expression: &str, vars: &dyn Variables) -> EvalResult<Value> {
        let expr = self.compile(expression)?;
        eval(&expr, vars)
    }
}

fn eval(expr: &Expr, vars: &dyn Variables) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(_) | Expr::Property(..) | Expr::Index(..) => {
            resolve(expr, vars).map(Cow::into_owned)
        }
        Expr::Call {
            receiver,
            method,
            args,
        } => {
            let receiver = resolve(receiver, vars)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, vars))
                .collect::<EvalResult<Vec<_>>>()?;
            call(&receiver, method, &args)
        }
        Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!eval(operand, vars)?.is_truthy())),
        Expr::Unary(UnaryOp::Neg, operand) => match eval(operand, vars)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| overflow("-", i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::TypeMismatch {
                message: format!("cannot negate {}", other.type_name()),
            }),
        },
        Expr::Binary(BinaryOp::And, left, right) => Ok(Value::Bool(
            eval(left, vars)?.is_truthy() && eval(right, vars)?.is_truthy(),
        )),
        Expr::Binary(BinaryOp::Or, left, right) => Ok(Value::Bool(
            eval(left, vars)?.is_truthy() || eval(right, vars)?.is_truthy(),
        )),
        Expr::Binary(op, left, right) => {
            let left = eval(left, vars)?;
            let right = eval(right, vars)?;
            binary(*op, left, right)
        }
    }
}

fn overflow(op: &str, value: i64) -> EvalError {
    EvalError::TypeMismatch {
        message: format!("integer overflow in '{}' with {}", op, value),
    }
}

/// Resolve a variable path, borrowing from the bindings where possible.
///
/// A missing variable or map key reads as null.
fn resolve<'v>(expr: &Expr, vars: &'v dyn Variables) -> EvalResult<Cow<'v, Value>> {
    match expr {
        Expr::Variable(name) => Ok(vars.get(name).map_or_else(null, Cow::Borrowed)),
        Expr::Property(target, name) => match resolve(target, vars)? {
            Cow::Borrowed(target) => Ok(property(target, name)?.map_or_else(null, Cow::Borrowed)),
            Cow::Owned(target) => Ok(Cow::Owned(
                property(&target, name)?.cloned().unwrap_or_default(),
            )),
        },
        Expr::Index(target, index) => {
            let target = resolve(target, vars)?;
            let index = eval(index, vars)?;
            match target {
                Cow::Borrowed(target) => {
                    Ok(index_into(target, &index)?.map_or_else(null, Cow::Borrowed))
                }
                Cow::Owned(target) => Ok(Cow::Owned(
                    index_into(&target, &index)?.cloned().unwrap_or_default(),
                )),
            }
        }
        other => eval(other, vars).map(Cow::Owned),
    }
}

fn null<'v>() -> Cow<'v, Value> {
    Cow::Owned(Value::Null)
}

fn property<'a>(target: &'a Value, name: &str) -> EvalResult<Option<&'a Value>> {
    match target {
        Value::Map(map) => Ok(map.get(name)),
        Value::Null => Err(EvalError::NullAccess {
            property: name.to_string(),
        }),
        other => Err(EvalError::NoSuchProperty {
            property: name.to_string(),
            type_name: other.type_name(),
        }),
    }
}

fn index_into<'a>(target: &'a Value, index: &Value) -> EvalResult<Option<&'a Value>> {
    match (target, index) {
        (Value::Null, index) => Err(EvalError::NullAccess {
            property: format!("[{}]", index),
        }),
        (Value::Map(map), Value::String(key)) => Ok(map.get(key.as_str())),
        (Value::List(items), Value::Int(i)) => {
            let len = items.len();
            match usize::try_from(*i) {
                Ok(idx) if idx < len => Ok(items.get(idx)),
                _ => Err(EvalError::IndexOutOfBounds { index: *i, len }),
            }
        }
        (target, index) => Err(EvalError::TypeMismatch {
            message: format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ),
        }),
    }
}

fn call(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    if receiver.is_null() {
        return Err(EvalError::NullAccess {
            property: format!("{}()", method),
        });
    }

    let arity = |expected: usize| -> EvalResult<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::TypeMismatch {
                message: format!(
                    "{}() takes {} argument(s), {} given",
                    method,
                    expected,
                    args.len()
                ),
            })
        }
    };

    let result = match (method, receiver) {
        ("size" | "length", Value::String(s)) => {
            arity(0)?;
            Value::Int(s.chars().count() as i64)
        }
        ("size" | "length", Value::List(items)) => {
            arity(0)?;
            Value::Int(items.len() as i64)
        }
        ("size" | "length", Value::Map(map)) => {
            arity(0)?;
            Value::Int(map.len() as i64)
        }
        ("isEmpty", Value::String(s)) => {
            arity(0)?;
            Value::Bool(s.is_empty())
        }
        ("isEmpty", Value::List(items)) => {
            arity(0)?;
            Value::Bool(items.is_empty())
        }
        ("isEmpty", Value::Map(map)) => {
            arity(0)?;
            Value::Bool(map.is_empty())
        }
        ("trim", Value::String(s)) => {
            arity(0)?;
            Value::String(s.trim().to_string())
        }
        ("toUpperCase", Value::String(s)) => {
            arity(0)?;
            Value::String(s.to_uppercase())
        }
        ("toLowerCase", Value::String(s)) => {
            arity(0)?;
            Value::String(s.to_lowercase())
        }
        ("contains", Value::String(s)) => {
            arity(1)?;
            Value::Bool(s.contains(args[0].render().as_str()))
        }
        ("contains", Value::List(items)) => {
            arity(1)?;
            Value::Bool(items.iter().any(|item| values_equal(item, &args[0])))
        }
        ("contains" | "containsKey", Value::Map(map)) => {
            arity(1)?;
            Value::Bool(args[0].as_str().is_some_and(|key| map.contains_key(key)))
        }
        ("startsWith", Value::String(s)) => {
            arity(1)?;
            Value::Bool(s.starts_with(args[0].render().as_str()))
        }
        ("endsWith", Value::String(s)) => {
            arity(1)?;
            Value::Bool(s.ends_with(args[0].render().as_str()))
        }
        _ => {
            return Err(EvalError::UnknownMethod {
                method: method.to_string(),
                type_name: receiver.type_name(),
            });
        }
    };
    Ok(result)
}

/// Equality with integer/float coercion.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> EvalResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| EvalError::TypeMismatch {
        message: format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ),
    })
}

fn binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt => return Ok(Value::Bool(compare(&left, &right)?.is_lt())),
        BinaryOp::Le => return Ok(Value::Bool(compare(&left, &right)?.is_le())),
        BinaryOp::Gt => return Ok(Value::Bool(compare(&left, &right)?.is_gt())),
        BinaryOp::Ge => return Ok(Value::Bool(compare(&left, &right)?.is_ge())),
        BinaryOp::Add
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) =>
        {
            return Ok(Value::String(format!("{}{}", left, right)));
        }
        _ => {}
    }

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Rem => a.checked_rem(b),
                _ => None,
            };
            result
                .map(Value::Int)
                .ok_or_else(|| overflow(op_symbol(op), a))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = as_float(&left);
            let b = as_float(&right);
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        _ => Err(EvalError::TypeMismatch {
            message: format!(
                "cannot apply '{}' to {} and {}",
                op_symbol(op),
                left.type_name(),
                right.type_name()
            ),
        }),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "or",
        BinaryOp::And => "and",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Arguments;
    use serde_json::json;

    fn args() -> Arguments {
        Value::arguments_from_json(json!({
            "name": "  Alice ",
            "age": 42,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "user": {"address": {"city": "Oslo"}, "nickname": null},
            "empty": ""
        }))
        .unwrap()
    }

    fn eval_str(expression: &str) -> EvalResult<Value> {
        SimpleEvaluator::new().evaluate_value(expression, &args())
    }

    #[test]
    fn test_paths() {
        assert_eq!(eval_str("user.address.city").unwrap(), Value::from("Oslo"));
        assert_eq!(eval_str("user['address']['city']").unwrap(), Value::from("Oslo"));
        assert_eq!(eval_str("tags[1]").unwrap(), Value::from("b"));
        assert_eq!(eval_str("user.missing").unwrap(), Value::Null);
        assert_eq!(eval_str("missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_paths_borrow_from_bindings() {
        let args = args();
        let city = parse_expression("user['address'].city").unwrap();
        match resolve(&city, &args).unwrap() {
            Cow::Borrowed(value) => {
                let Value::Map(user) = &args["user"] else {
                    panic!("expected user map");
                };
                let Value::Map(address) = &user["address"] else {
                    panic!("expected address map");
                };
                assert!(std::ptr::eq(value, &address["city"]));
            }
            Cow::Owned(value) => panic!("expected a borrowed path, got {:?}", value),
        }

        // Paths off a computed receiver still resolve, by value
        let computed = parse_expression("name.trim().length()").unwrap();
        assert_eq!(resolve(&computed, &args).unwrap().into_owned(), Value::Int(5));
        assert!(matches!(
            resolve(&parse_expression("user.missing").unwrap(), &args).unwrap(),
            Cow::Owned(Value::Null)
        ));
    }

    #[test]
    fn test_path_errors() {
        assert_eq!(
            eval_str("user.nickname.first"),
            Err(EvalError::NullAccess {
                property: "first".to_string()
            })
        );
        assert_eq!(
            eval_str("tags[5]"),
            Err(EvalError::IndexOutOfBounds { index: 5, len: 2 })
        );
        assert_eq!(
            eval_str("age.value"),
            Err(EvalError::NoSuchProperty {
                property: "value".to_string(),
                type_name: "integer"
            })
        );
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval_str("age > 40 and name != null").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("age lt 40 or ratio gte 0.5").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("age == 42.0").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("not (age eq 42)").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("missing == null").unwrap(), Value::Bool(true));
        assert!(matches!(eval_str("age < 'x'"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(
            eval_str("user.nickname != null and user.nickname.first == 'x'").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_str("true or missing.field").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("age + 1").unwrap(), Value::Int(43));
        assert_eq!(eval_str("age % 5 * -2").unwrap(), Value::Int(-4));
        assert_eq!(eval_str("age / 4").unwrap(), Value::Int(10));
        assert_eq!(eval_str("ratio * 4").unwrap(), Value::Float(2.0));
        assert_eq!(eval_str("'%' + name.trim() + '%'").unwrap(), Value::from("%Alice%"));
        assert_eq!(eval_str("'n' + 1").unwrap(), Value::from("n1"));
        assert_eq!(eval_str("age / 0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_methods() {
        assert_eq!(eval_str("tags.size()").unwrap(), Value::Int(2));
        assert_eq!(eval_str("empty.isEmpty()").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("name.trim().toUpperCase()").unwrap(), Value::from("ALICE"));
        assert_eq!(eval_str("tags.contains('b')").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("user.containsKey('address')").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("name.trim().startsWith('Al')").unwrap(), Value::Bool(true));
        assert_eq!(
            eval_str("age.trim()"),
            Err(EvalError::UnknownMethod {
                method: "trim".to_string(),
                type_name: "integer"
            })
        );
    }

    #[test]
    fn test_cache_reuses_parsed_expressions() {
        let evaluator = SimpleEvaluator::new();
        let args = args();
        evaluator.evaluate_value("age + 1", &args).unwrap();
        evaluator.evaluate_value("age + 1", &args).unwrap();
        evaluator.evaluate_boolean("age > 1", &args).unwrap();
        assert_eq!(evaluator.cached(), 2);
    }

    #[test]
    fn test_unique_loop_names_bypass_cache() {
        let evaluator = SimpleEvaluator::new();
        let mut vars = Arguments::new();
        vars.insert("__frch_id_0".to_string(), Value::Int(4));
        assert_eq!(
            evaluator.evaluate_value("__frch_id_0", &vars).unwrap(),
            Value::Int(4)
        );
        assert_eq!(evaluator.cached(), 0);
    }
}
