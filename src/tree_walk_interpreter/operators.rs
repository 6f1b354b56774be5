//! Operator semantics. Dispatch is on the left operand's tag; the right
//! operand is only asked for a capability view.

use std::{cmp::Ordering, sync::Arc};

use crate::ast::{BinaryOperator, UnaryOperator, UpdateOperator};

use super::{ExecutionErrorKind, Value};

type OpResult = Result<Value, ExecutionErrorKind>;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Numeric view of a value. Strings qualify when they parse.
fn number(value: &Value) -> Option<Result<Number, ExecutionErrorKind>> {
    match value {
        Value::Float(f) => Some(Ok(Number::Float(*f))),
        Value::String(_) => value
            .as_int()
            .map(|i| i.map(Number::Int))
            .or_else(|| value.as_float().map(|f| f.map(Number::Float))),
        _ => value.as_int().map(|i| i.map(Number::Int)),
    }
}

fn unsupported(operator: impl ToString) -> ExecutionErrorKind {
    ExecutionErrorKind::UnsupportedOperand(operator.to_string())
}

fn operands(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<(Number, Number), ExecutionErrorKind> {
    let left = match left {
        Value::Null | Value::Int(_) | Value::Float(_) | Value::String(_) => number(left),
        _ => None,
    };
    match (left, number(right)) {
        (Some(left), Some(right)) => Ok((left?, right?)),
        _ => Err(unsupported(operator)),
    }
}

fn concat(left: &Value, right: &Value) -> Value {
    Value::String(format!("{left}{right}"))
}

/// Evaluates every binary operator except the short-circuiting ones.
pub fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> OpResult {
    match operator {
        BinaryOperator::Add => add(left, right),
        BinaryOperator::Sub => arithmetic(operator, left, right, i64::checked_sub, |a, b| a - b),
        BinaryOperator::Mul => arithmetic(operator, left, right, i64::checked_mul, |a, b| a * b),
        BinaryOperator::Pow => arithmetic(
            operator,
            left,
            right,
            |a, b| u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
            f64::powf,
        ),
        BinaryOperator::Div => {
            let (a, b) = operands(operator, left, right)?;
            if b.as_f64() == 0.0 {
                return Err(ExecutionErrorKind::DivisionByZero);
            }
            Ok(Value::Float(a.as_f64() / b.as_f64()))
        }
        BinaryOperator::Rem => match operands(operator, left, right)? {
            (_, b) if b.as_f64() == 0.0 => Err(ExecutionErrorKind::DivisionByZero),
            (Number::Int(a), Number::Int(b)) => Ok(Value::Int(a.checked_rem(b).unwrap_or(0))),
            (a, b) => Ok(Value::Float(a.as_f64() % b.as_f64())),
        },
        BinaryOperator::Concat => Ok(concat(left, right)),
        BinaryOperator::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOperator::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOperator::Identical => Ok(Value::Bool(left.identical(right))),
        BinaryOperator::NotIdentical => Ok(Value::Bool(!left.identical(right))),
        BinaryOperator::Lt => compare(operator, left, right).map(|o| Value::Bool(o.is_lt())),
        BinaryOperator::Le => compare(operator, left, right).map(|o| Value::Bool(o.is_le())),
        BinaryOperator::Gt => compare(operator, left, right).map(|o| Value::Bool(o.is_gt())),
        BinaryOperator::Ge => compare(operator, left, right).map(|o| Value::Bool(o.is_ge())),
        BinaryOperator::Spaceship => compare(operator, left, right).map(|o| Value::Int(o as i64)),
        BinaryOperator::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOperator::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOperator::Coalesce => Ok(if left.is_null() { right.clone() } else { left.clone() }),
    }
}

fn add(left: &Value, right: &Value) -> OpResult {
    match left {
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Instance(_) => {
            Ok(concat(left, right))
        }
        Value::Int(a) => match right {
            Value::Float(b) => Ok(Value::Float(*a as f64 + b)),
            _ => {
                if let Some(b) = right.as_int() {
                    let b = b?;
                    Ok(a.checked_add(b)
                        .map_or(Value::Float(*a as f64 + b as f64), Value::Int))
                } else if let Some(b) = right.as_float() {
                    Ok(Value::Float(*a as f64 + b?))
                } else if right.as_string().is_some() {
                    Ok(concat(left, right))
                } else {
                    Err(unsupported(BinaryOperator::Add))
                }
            }
        },
        Value::Float(a) => match right.as_float() {
            Some(b) => Ok(Value::Float(a + b?)),
            None if right.as_string().is_some() => Ok(concat(left, right)),
            None => Err(unsupported(BinaryOperator::Add)),
        },
        Value::Null => match number(right) {
            Some(_) => add(&Value::Int(0), right),
            None if right.as_string().is_some() => Ok(concat(left, right)),
            None => Err(unsupported(BinaryOperator::Add)),
        },
        _ => Err(unsupported(BinaryOperator::Add)),
    }
}

fn arithmetic(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
    int: impl Fn(i64, i64) -> Option<i64>,
    float: impl Fn(f64, f64) -> f64,
) -> OpResult {
    match operands(operator, left, right)? {
        (Number::Int(a), Number::Int(b)) => Ok(match int(a, b) {
            Some(result) => Value::Int(result),
            None => Value::Float(float(a as f64, b as f64)),
        }),
        (a, b) => Ok(Value::Float(float(a.as_f64(), b.as_f64()))),
    }
}

fn compare(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Ordering, ExecutionErrorKind> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        if number(left).is_none() || number(right).is_none() {
            return Ok(a.cmp(b));
        }
    }
    match operands(operator, left, right)? {
        (Number::Int(a), Number::Int(b)) => Ok(a.cmp(&b)),
        (a, b) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .ok_or_else(|| unsupported(operator)),
    }
}

/// `==`: numeric when both sides have a numeric view and one of them is not
/// a string, truthiness when a bool or null is involved.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(_) | Value::Null, _) | (_, Value::Bool(_) | Value::Null) => {
            left.is_truthy() == right.is_truthy()
        }
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            Arc::ptr_eq(a, b) || {
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| loose_eq(a, b))
            }
        }
        (Value::Object(a), Value::Object(b)) => {
            Arc::ptr_eq(a, b) || {
                let (a, b) = (a.read(), b.read());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| loose_eq(value, other)))
            }
        }
        (Value::Int(_) | Value::Float(_) | Value::String(_), Value::Int(_) | Value::Float(_) | Value::String(_)) => {
            match (number(left), number(right)) {
                (Some(Ok(a)), Some(Ok(b))) => a.as_f64() == b.as_f64(),
                _ => false,
            }
        }
        _ => left.identical(right),
    }
}

/// `switch`/`match` arm equality: both sides must expose a string view.
pub fn arm_matches(subject: &Value, candidate: &Value) -> bool {
    match (subject.as_string(), candidate.as_string()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub fn unary(operator: UnaryOperator, operand: &Value) -> OpResult {
    match operator {
        UnaryOperator::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOperator::Negate => match operand {
            Value::Null | Value::Int(_) | Value::Float(_) | Value::String(_) => match number(operand) {
                Some(Ok(Number::Int(i))) => Ok(i
                    .checked_neg()
                    .map_or(Value::Float(-(i as f64)), Value::Int)),
                Some(Ok(Number::Float(f))) => Ok(Value::Float(-f)),
                Some(Err(e)) => Err(e),
                None => Err(unsupported(operator)),
            },
            _ => Err(unsupported(operator)),
        },
    }
}

/// `++`/`--` on the current value of a target.
pub fn update(operator: UpdateOperator, value: &Value) -> OpResult {
    let (delta, symbol) = match operator {
        UpdateOperator::Increment => (1, "++"),
        UpdateOperator::Decrement => (-1, "--"),
    };
    match value {
        Value::Null => Ok(Value::Int(delta)),
        Value::Int(i) => Ok(i
            .checked_add(delta)
            .map_or(Value::Float(*i as f64 + delta as f64), Value::Int)),
        Value::Float(f) => Ok(Value::Float(f + delta as f64)),
        _ => Err(unsupported(symbol)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eval(operator: BinaryOperator, left: impl Into<Value>, right: impl Into<Value>) -> String {
        match binary(operator, &left.into(), &right.into()) {
            Ok(value) => format!("{}:{value}", value.type_name()),
            Err(e) => format!("error:{e}"),
        }
    }

    #[test]
    fn add_coerces_by_capability() {
        assert_eq!(eval(BinaryOperator::Add, 1i64, "2"), "int:3");
        assert_eq!(eval(BinaryOperator::Add, 1i64, 0.5), "float:1.5");
        assert_eq!(eval(BinaryOperator::Add, 1i64, "2.5"), "float:3.5");
        assert_eq!(eval(BinaryOperator::Add, 1i64, "x"), "string:1x");
        assert_eq!(eval(BinaryOperator::Add, "a", 1i64), "string:a1");
        assert_eq!(eval(BinaryOperator::Add, 1.5, 1i64), "float:2.5");
        assert_eq!(eval(BinaryOperator::Add, Value::Null, 4i64), "int:4");
        assert_eq!(eval(BinaryOperator::Add, i64::MAX, 1i64), format!("float:{}", i64::MAX as f64 + 1.0));
        assert_eq!(eval(BinaryOperator::Add, true, 1i64), "error:unsupported type for operator +");
    }

    #[test]
    fn division() {
        assert_eq!(eval(BinaryOperator::Div, 10i64, 4i64), "float:2.5");
        assert_eq!(eval(BinaryOperator::Div, 10i64, 0i64), "error:division by zero");
        assert_eq!(eval(BinaryOperator::Rem, 10i64, 0i64), "error:division by zero");
        assert_eq!(eval(BinaryOperator::Rem, 10i64, 3i64), "int:1");
        assert_eq!(eval(BinaryOperator::Rem, 7.5, 2i64), "float:1.5");
        assert_eq!(eval(BinaryOperator::Rem, 7.5, 0.0), "error:division by zero");
    }

    #[test]
    fn arithmetic_promotes() {
        assert_eq!(eval(BinaryOperator::Sub, Value::Null, 3i64), "int:-3");
        assert_eq!(eval(BinaryOperator::Mul, 2i64, 1.5), "float:3");
        assert_eq!(eval(BinaryOperator::Pow, 2i64, 10i64), "int:1024");
        assert_eq!(eval(BinaryOperator::Pow, 2i64, -1i64), "float:0.5");
        assert_eq!(eval(BinaryOperator::Sub, Value::array(vec![]), 1i64), "error:unsupported type for operator -");
    }

    #[test]
    fn concatenation_is_unconditional() {
        assert_eq!(eval(BinaryOperator::Concat, true, false), "string:1");
        assert_eq!(eval(BinaryOperator::Concat, Value::Null, 2.5), "string:2.5");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval(BinaryOperator::Lt, 1i64, 2.5), "bool:1");
        assert_eq!(eval(BinaryOperator::Lt, "apple", "banana"), "bool:1");
        assert_eq!(eval(BinaryOperator::Gt, "10", "9"), "bool:1");
        assert_eq!(eval(BinaryOperator::Spaceship, 3i64, 1i64), "int:1");
        assert_eq!(eval(BinaryOperator::Spaceship, 1i64, 1i64), "int:0");
        assert_eq!(eval(BinaryOperator::Lt, Value::array(vec![]), 1i64), "error:unsupported type for operator <");
    }

    #[test]
    fn equality() {
        assert!(loose_eq(&Value::Int(1), &Value::from("1")));
        assert!(loose_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(!loose_eq(&Value::from("1"), &Value::from("01")));
        assert!(loose_eq(&Value::Null, &Value::Bool(false)));
        assert!(!Value::Int(1).identical(&Value::Float(1.0)));
        assert!(arm_matches(&Value::Int(2), &Value::from("2")));
        assert!(!arm_matches(&Value::Int(2), &Value::Float(2.5)));
    }

    #[test]
    fn unary_and_update() {
        assert_eq!(unary(UnaryOperator::Negate, &Value::from("4")).unwrap().to_string(), "-4");
        assert!(unary(UnaryOperator::Negate, &Value::array(vec![])).is_err());
        assert_eq!(update(UpdateOperator::Increment, &Value::Null).unwrap().to_string(), "1");
        assert_eq!(update(UpdateOperator::Decrement, &Value::Float(1.5)).unwrap().to_string(), "0.5");
    }
}
