//! Runtime values of the expression language

use crate::error::{EvalError, EvalResult};
use quantab_ast::{BinaryOp, CompareOp, UnaryOp};
use std::cmp::Ordering;
use std::fmt;

/// A value produced while evaluating an expression
///
/// The language is dynamically typed over a small closed set of types.
/// Equality follows the source language: booleans compare equal to the
/// integers 0 and 1, and comparing values of unrelated types is `false`
/// rather than an error. Ordering between unrelated types is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absent value (`None`)
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// String
    Str(String),
    /// List
    List(Vec<Value>),
    /// Dict with insertion-ordered entries
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// The type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }

    /// Truthiness: `None`, `False`, `0`, `""` and empty collections are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.is_empty(),
        }
    }

    /// The numeric reading of the value (`True` counts as 1)
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Value equality with numeric boolean coercion
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka.loose_eq(kb) && va.loose_eq(vb))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "'{op}' between '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

/// Floor division with sign handling matching the source language
/// (`-7 // 2 == -4`, `7 // -2 == -4`)
fn floor_div(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn power(base: i64, exponent: i64) -> EvalResult<i64> {
    if exponent < 0 {
        return Err(EvalError::Type(
            "negative exponent yields a non-integer".into(),
        ));
    }
    let exponent = u32::try_from(exponent).map_err(|_| EvalError::Overflow)?;
    base.checked_pow(exponent).ok_or(EvalError::Overflow)
}

/// Apply a binary arithmetic operator
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b).ok_or(EvalError::Overflow)?,
            BinaryOp::Subtract => a.checked_sub(b).ok_or(EvalError::Overflow)?,
            BinaryOp::Multiply => a.checked_mul(b).ok_or(EvalError::Overflow)?,
            // `/` truncates like `//` on integers, a documented quirk
            BinaryOp::Divide | BinaryOp::FloorDivide => floor_div(a, b)?,
            BinaryOp::Power => power(a, b)?,
        };
        return Ok(Value::Int(result));
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut out = a.clone();
            out.push_str(b);
            Ok(Value::Str(out))
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        _ => Err(type_error(op.as_str(), left, right)),
    }
}

/// Apply a unary operator
pub(crate) fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    let n = operand.as_number().ok_or_else(|| {
        EvalError::Type(format!("'{}' on '{}'", op.as_str(), operand.type_name()))
    })?;
    match op {
        UnaryOp::Negate => n.checked_neg().ok_or(EvalError::Overflow).map(Value::Int),
        UnaryOp::Invert => Ok(Value::Int(-n - 1)),
    }
}

fn order(left: &Value, right: &Value) -> EvalResult<Ordering> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return Ok(a.cmp(&b));
    }
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    Err(EvalError::NotOrderable {
        left: left.type_name(),
        right: right.type_name(),
    })
}

/// Apply a comparison operator
pub(crate) fn compare(op: CompareOp, left: &Value, right: &Value) -> EvalResult<bool> {
    match op {
        CompareOp::Equal => Ok(left.loose_eq(right)),
        CompareOp::NotEqual => Ok(!left.loose_eq(right)),
        CompareOp::Less => Ok(order(left, right)? == Ordering::Less),
        CompareOp::LessOrEqual => Ok(order(left, right)? != Ordering::Greater),
        CompareOp::Greater => Ok(order(left, right)? == Ordering::Greater),
        CompareOp::GreaterOrEqual => Ok(order(left, right)? != Ordering::Less),
    }
}

/// Materialize an iterable value (lists iterate elements, dicts their keys)
pub(crate) fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        other => Err(EvalError::Type(format!(
            "'{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// The length of a collection value
pub(crate) fn length_of(value: &Value) -> EvalResult<i64> {
    match value {
        Value::Str(s) => Ok(s.chars().count() as i64),
        Value::List(items) => Ok(items.len() as i64),
        Value::Dict(entries) => Ok(entries.len() as i64),
        other => Err(EvalError::Type(format!(
            "'{}' has no length",
            other.type_name()
        ))),
    }
}

/// `sum` over a sequence of numbers; 0 for an empty sequence
pub(crate) fn sum(items: &[Value]) -> EvalResult<Value> {
    let mut total: i64 = 0;
    for item in items {
        let n = item
            .as_number()
            .ok_or_else(|| EvalError::Type(format!("sum() over '{}'", item.type_name())))?;
        total = total.checked_add(n).ok_or(EvalError::Overflow)?;
    }
    Ok(Value::Int(total))
}

/// `min`/`max` over a sequence, preferring the earliest extreme
pub(crate) fn extreme(
    name: &'static str,
    items: &[Value],
    want_greater: bool,
) -> EvalResult<Value> {
    let mut iter = items.iter();
    let mut best = iter.next().ok_or(EvalError::EmptyAggregate(name))?;
    for item in iter {
        let ordering = order(item, best)?;
        let better = if want_greater {
            ordering == Ordering::Greater
        } else {
            ordering == Ordering::Less
        };
        if better {
            best = item;
        }
    }
    Ok(best.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_division_truncates_toward_negative_infinity() {
        assert_eq!(
            binary(BinaryOp::Divide, &Value::Int(8), &Value::Int(9)),
            Ok(Value::Int(0))
        );
        assert_eq!(
            binary(BinaryOp::Divide, &Value::Int(11), &Value::Int(9)),
            Ok(Value::Int(1))
        );
        assert_eq!(
            binary(BinaryOp::FloorDivide, &Value::Int(-7), &Value::Int(2)),
            Ok(Value::Int(-4))
        );
        assert_eq!(
            binary(BinaryOp::FloorDivide, &Value::Int(7), &Value::Int(-2)),
            Ok(Value::Int(-4))
        );
        assert_eq!(
            binary(BinaryOp::Divide, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_power() {
        assert_eq!(
            binary(BinaryOp::Power, &Value::Int(2), &Value::Int(10)),
            Ok(Value::Int(1024))
        );
        assert_eq!(
            binary(BinaryOp::Power, &Value::Int(0), &Value::Int(0)),
            Ok(Value::Int(1))
        );
        assert!(binary(BinaryOp::Power, &Value::Int(2), &Value::Int(-1)).is_err());
    }

    #[test]
    fn test_bool_coerces_to_number() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Bool(true), &Value::Bool(true)),
            Ok(Value::Int(2))
        );
        assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
        assert!(!Value::Bool(false).loose_eq(&Value::Null));
    }

    #[test]
    fn test_invert() {
        assert_eq!(unary(UnaryOp::Invert, &Value::Int(5)), Ok(Value::Int(-6)));
        assert_eq!(unary(UnaryOp::Invert, &Value::Int(-1)), Ok(Value::Int(0)));
        assert!(unary(UnaryOp::Negate, &Value::Null).is_err());
    }

    #[test]
    fn test_ordering_null_is_an_error() {
        assert_eq!(
            compare(CompareOp::Less, &Value::Int(1), &Value::Null),
            Err(EvalError::NotOrderable {
                left: "int",
                right: "NoneType"
            })
        );
        // Equality between unrelated types is fine
        assert_eq!(
            compare(CompareOp::Equal, &Value::Int(1), &Value::Null),
            Ok(false)
        );
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(sum(&[]), Ok(Value::Int(0)));
        assert_eq!(
            sum(&[Value::Int(1), Value::Bool(true)]),
            Ok(Value::Int(2))
        );
        assert_eq!(
            extreme("min", &[Value::Int(3), Value::Int(1)], false),
            Ok(Value::Int(1))
        );
        assert_eq!(
            extreme("max", &[], true),
            Err(EvalError::EmptyAggregate("max"))
        );
    }
}
