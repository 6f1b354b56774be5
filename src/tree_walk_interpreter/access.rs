use std::sync::Arc;

use super::{
    callable::{self, Callable, EvaluatedArgs},
    class::{check_access, find_method, find_property},
    value::call_builtin,
    Context, Eval, ExecutionErrorKind, Value,
};

/// `$object->name`. A method name without a property of the same name
/// yields the method bound to the instance.
pub(crate) fn get_property(ctx: &Context, object: &Value, name: &str) -> Eval {
    let vm = ctx.vm();
    match object {
        Value::Instance(instance) => {
            if let Some((property, owner)) = find_property(vm, &instance.class, name) {
                check_access(ctx, &owner, &property.modifiers, || format!("{}::${name}", owner.name))?;
            }
            if let Some(value) = instance.get(name) {
                return Ok(value);
            }
            if let Some((method, owner)) = find_method(vm, &instance.class, name) {
                check_access(ctx, &owner, &method.modifiers, || format!("{}::{name}", owner.name))?;
                let receiver = (!method.modifiers.is_static).then(|| instance.clone());
                return Ok(Value::Function(Arc::new(Callable::Method {
                    method,
                    receiver,
                    class: owner,
                })));
            }
            Err(ExecutionErrorKind::UndefinedProperty(format!(
                "{}::${name}",
                instance.class.display_name()
            ))
            .into())
        }
        Value::Object(map) => Ok(map.read().get(name).cloned().unwrap_or_default()),
        Value::Array(values) if name == "length" => Ok(Value::Int(values.read().len() as i64)),
        Value::String(s) if name == "length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::Error(error) => match name {
            "message" => Ok(Value::String(error.message())),
            "line" => Ok(line_of(error.span())),
            _ => Err(ExecutionErrorKind::UndefinedProperty(format!("Error::${name}")).into()),
        },
        Value::Any(host) => host.get_property(name).ok_or_else(|| {
            ExecutionErrorKind::UndefinedProperty(format!("{}::${name}", host.type_name())).into()
        }),
        other => Err(ExecutionErrorKind::NotAnObject(other.type_name()).into()),
    }
}

/// `$container[index]`. Missing object keys read as null, array indices
/// must be in range.
pub(crate) fn get_index(ctx: &Context, container: &Value, index: &Value) -> Eval {
    match (container, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(values), Value::Int(i)) => {
            let values = values.read();
            let item = usize::try_from(*i)
                .ok()
                .and_then(|position| values.get(position).cloned());
            let len = values.len();
            item.ok_or_else(|| ExecutionErrorKind::IndexOutOfRange { index: *i, len }.into())
        }
        (Value::Array(_), other) => Err(ExecutionErrorKind::InvalidIndex(other.type_name()).into()),
        (Value::Object(map), Value::String(key)) => {
            Ok(map.read().get(key).cloned().unwrap_or_default())
        }
        (Value::Object(_), other) => {
            Err(ExecutionErrorKind::ObjectKeyNotString(other.type_name()).into())
        }
        (Value::String(s), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|position| s.chars().nth(position))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| {
                ExecutionErrorKind::IndexOutOfRange {
                    index: *i,
                    len: s.chars().count(),
                }
                .into()
            }),
        (Value::Instance(_) | Value::Any(_), Value::String(name)) => get_property(ctx, container, name),
        (other, _) => Err(ExecutionErrorKind::NotIndexable(other.type_name()).into()),
    }
}

/// `$receiver->name(args)`, dispatching on the receiver's runtime type.
pub(crate) fn call_method(ctx: &Context, receiver: &Value, name: &str, args: EvaluatedArgs) -> Eval {
    let vm = ctx.vm();
    match receiver {
        Value::Instance(instance) => {
            if let Some((method, owner)) = find_method(vm, &instance.class, name) {
                check_access(ctx, &owner, &method.modifiers, || format!("{}::{name}", owner.name))?;
                let this = (!method.modifiers.is_static).then(|| instance.clone());
                return callable::call_method(ctx, &method, this, owner, args);
            }
            match instance.get(name) {
                Some(Value::Function(function)) => function.call(ctx, args),
                _ => Err(ExecutionErrorKind::UndefinedMethod(format!(
                    "{}::{name}",
                    instance.class.display_name()
                ))
                .into()),
            }
        }
        Value::Error(error) => match name {
            "getMessage" => Ok(Value::String(error.message())),
            "getLine" => Ok(line_of(error.span())),
            _ => Err(ExecutionErrorKind::UndefinedMethod(format!("Error::{name}")).into()),
        },
        Value::Function(function) if name == "call" => function.call(ctx, args),
        Value::Any(host) => match host.get_property(name) {
            Some(Value::Function(function)) => function.call(ctx, args),
            _ => Err(ExecutionErrorKind::UndefinedMethod(format!("{}::{name}", host.type_name())).into()),
        },
        Value::Null => Err(ExecutionErrorKind::NotAnObject("null".to_string()).into()),
        other => {
            if let Value::Object(map) = other {
                let property = map.read().get(name).cloned();
                if let Some(Value::Function(function)) = property {
                    return function.call(ctx, args);
                }
            }
            match call_builtin(ctx, other, name, args.into_values()) {
                Some(result) => result,
                None => Err(ExecutionErrorKind::UndefinedMethod(format!("{}::{name}", other.type_name())).into()),
            }
        }
    }
}

fn line_of(span: Option<&crate::span::Span>) -> Value {
    span.map_or(Value::Null, |span| Value::Int(span.start_line as i64 + 1))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree_walk_interpreter::{Control, PropertyMap, Vm};

    fn error(result: Eval) -> String {
        match result {
            Err(Control::Throw(Value::Error(error), _)) => error.message(),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn index_reads() {
        let ctx = Context::root(Vm::new(), 0);
        let list = Value::array(vec![Value::Int(10), Value::Int(20)]);
        assert!(matches!(get_index(&ctx, &list, &Value::Int(1)), Ok(Value::Int(20))));
        assert_eq!(
            error(get_index(&ctx, &list, &Value::Int(2))),
            "index 2 out of range for length 2"
        );
        assert_eq!(error(get_index(&ctx, &Value::Int(3), &Value::Int(0))), "cannot index into int");
        assert!(get_index(&ctx, &Value::Null, &Value::Int(0)).unwrap().is_null());
        assert_eq!(get_index(&ctx, &"zy".into(), &Value::Int(1)).unwrap().to_string(), "y");
    }

    #[test]
    fn missing_object_keys_are_null() {
        let ctx = Context::root(Vm::new(), 0);
        let mut map = PropertyMap::new();
        map.insert("a", Value::Int(1));
        let object = Value::object(map);
        assert!(get_property(&ctx, &object, "b").unwrap().is_null());
        assert!(get_index(&ctx, &object, &"b".into()).unwrap().is_null());
        assert_eq!(
            error(get_index(&ctx, &object, &Value::Int(0))),
            "object key must be a string, got int"
        );
    }

    #[test]
    fn builtins_dispatch_by_type() {
        let ctx = Context::root(Vm::new(), 0);
        let list = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let count = call_method(&ctx, &list, "count", EvaluatedArgs::default()).unwrap();
        assert!(matches!(count, Value::Int(2)));
        assert_eq!(
            error(call_method(&ctx, &list, "fly", EvaluatedArgs::default())),
            "call to undefined method array::fly()"
        );
        assert_eq!(
            error(call_method(&ctx, &Value::Null, "fly", EvaluatedArgs::default())),
            "null is not an object"
        );
    }
}
