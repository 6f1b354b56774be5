//! Builtin methods on arrays, strings and plain objects.

use super::Value;
use crate::tree_walk_interpreter::{
    operators::loose_eq, Callable, Context, Eval, ExecutionErrorKind,
};

static NULL: Value = Value::Null;

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&NULL)
}

fn int_arg(args: &[Value], i: usize, default: i64) -> Result<i64, ExecutionErrorKind> {
    match args.get(i) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_int()
            .unwrap_or_else(|| Err(ExecutionErrorKind::InvalidIndex(value.type_name()))),
    }
}

fn string_arg(args: &[Value], i: usize) -> String {
    arg(args, i).to_string()
}

/// Clamp a possibly negative `start`/`len` pair onto `0..total`.
fn window(total: usize, start: i64, len: Option<i64>) -> (usize, usize) {
    let total = total as i64;
    let start = if start < 0 { (total + start).max(0) } else { start.min(total) };
    let end = match len {
        None => total,
        Some(len) if len < 0 => (total + len).max(start),
        Some(len) => (start + len).min(total),
    };
    (start as usize, end as usize)
}

/// Drops trailing callback arguments the callee does not declare.
fn fit_arity(callback: &Callable, mut args: Vec<Value>) -> Vec<Value> {
    if let Some(function) = callback.declaration() {
        if !function.params.iter().any(|param| param.variadic) {
            args.truncate(function.params.len());
        }
    }
    args
}

/// `None` when `receiver` has no builtin method called `name`.
pub(crate) fn call_builtin(ctx: &Context, receiver: &Value, name: &str, args: Vec<Value>) -> Option<Eval> {
    match receiver {
        Value::Array(_) => array_method(ctx, receiver, name, args),
        Value::String(s) => string_method(s, name, &args).map(|result| result.map_err(Into::into)),
        Value::Object(map) => {
            let map = map.read();
            let result = match name {
                "count" | "length" => Value::Int(map.len() as i64),
                "keys" => Value::array(map.keys().map(Value::from).collect()),
                "values" => Value::array(map.iter().map(|(_, value)| value.clone()).collect()),
                "has" => Value::Bool(map.contains_key(&string_arg(&args, 0))),
                _ => return None,
            };
            Some(Ok(result))
        }
        _ => None,
    }
}

fn array_method(ctx: &Context, receiver: &Value, name: &str, args: Vec<Value>) -> Option<Eval> {
    let Value::Array(values) = receiver else {
        return None;
    };
    let result = match name {
        "count" | "length" => Value::Int(values.read().len() as i64),
        "push" => {
            let mut values = values.write();
            values.extend(args);
            Value::Int(values.len() as i64)
        }
        "pop" => values.write().pop().unwrap_or_default(),
        "shift" => {
            let mut values = values.write();
            if values.is_empty() {
                Value::Null
            } else {
                values.remove(0)
            }
        }
        "join" => {
            let separator = string_arg(&args, 0);
            let parts: Vec<String> = values.read().iter().map(Value::to_string).collect();
            Value::String(parts.join(&separator))
        }
        "contains" => {
            let needle = arg(&args, 0);
            Value::Bool(values.read().iter().any(|value| loose_eq(value, needle)))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let position = values.read().iter().position(|value| loose_eq(value, needle));
            Value::Int(position.map_or(-1, |i| i as i64))
        }
        "reverse" => Value::array(values.read().iter().rev().cloned().collect()),
        "keys" => Value::array((0..values.read().len() as i64).map(Value::Int).collect()),
        "slice" => {
            let start = match int_arg(&args, 0, 0) {
                Ok(start) => start,
                Err(e) => return Some(Err(e.into())),
            };
            let len = match args.get(1) {
                None | Some(Value::Null) => None,
                Some(_) => match int_arg(&args, 1, 0) {
                    Ok(len) => Some(len),
                    Err(e) => return Some(Err(e.into())),
                },
            };
            let values = values.read();
            let (start, end) = window(values.len(), start, len);
            Value::array(values[start..end].to_vec())
        }
        "map" | "filter" | "each" => {
            let Value::Function(callback) = arg(&args, 0).clone() else {
                return Some(Err(ExecutionErrorKind::NotAFunction(arg(&args, 0).to_string()).into()));
            };
            // Snapshot so the callback may mutate the array.
            let snapshot = values.read().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, value) in snapshot.into_iter().enumerate() {
                let call_args = fit_arity(&callback, vec![value.clone(), Value::Int(i as i64)]);
                let result = match callback.call_values(ctx, call_args) {
                    Ok(result) => result,
                    Err(control) => return Some(Err(control)),
                };
                match name {
                    "map" => out.push(result),
                    "filter" if result.is_truthy() => out.push(value),
                    _ => {}
                }
            }
            if name == "each" {
                Value::Null
            } else {
                Value::array(out)
            }
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, ExecutionErrorKind>> {
    let result = match name {
        "length" => Value::Int(s.chars().count() as i64),
        "upper" => Value::String(s.to_uppercase()),
        "lower" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "contains" => Value::Bool(s.contains(string_arg(args, 0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(string_arg(args, 0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(string_arg(args, 0).as_str())),
        "indexOf" => {
            let needle = string_arg(args, 0);
            Value::Int(match s.find(&needle) {
                Some(offset) => s[..offset].chars().count() as i64,
                None => -1,
            })
        }
        "replace" => Value::String(s.replace(&string_arg(args, 0), &string_arg(args, 1))),
        "split" => {
            let separator = string_arg(args, 0);
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::from).collect()
            };
            Value::array(parts)
        }
        "substring" => {
            let start = match int_arg(args, 0, 0) {
                Ok(start) => start,
                Err(e) => return Some(Err(e)),
            };
            let len = match args.get(1) {
                None | Some(Value::Null) => None,
                Some(_) => match int_arg(args, 1, 0) {
                    Ok(len) => Some(len),
                    Err(e) => return Some(Err(e)),
                },
            };
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = window(chars.len(), start, len);
            Value::String(chars[start..end].iter().collect())
        }
        _ => return None,
    };
    Some(Ok(result))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn windows_clamp() {
        assert_eq!(window(5, 1, Some(2)), (1, 3));
        assert_eq!(window(5, -2, None), (3, 5));
        assert_eq!(window(5, 4, Some(10)), (4, 5));
        assert_eq!(window(5, 1, Some(-1)), (1, 4));
        assert_eq!(window(5, 9, None), (5, 5));
    }

    #[test]
    fn string_methods() {
        let call = |name: &str, args: &[Value]| {
            string_method("héllo world", name, args)
                .and_then(Result::ok)
                .map(|value| value.to_string())
        };
        assert_eq!(call("length", &[]), Some("11".to_string()));
        assert_eq!(call("upper", &[]), Some("HÉLLO WORLD".to_string()));
        assert_eq!(call("substring", &[Value::Int(1), Value::Int(4)]), Some("éllo".to_string()));
        assert_eq!(call("indexOf", &[Value::from("world")]), Some("6".to_string()));
        assert_eq!(call("split", &[Value::from(" ")]), Some(r#"["héllo", "world"]"#.to_string()));
        assert_eq!(call("missing", &[]), None);
    }
}
