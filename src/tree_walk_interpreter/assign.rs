use std::sync::Arc;

use crate::ast::{BinaryOperator, ClassStmt, Expression, UpdateOperator, Variable};

use super::{
    access,
    class::{self, check_access, find_property, type_matches},
    operators, Context, Control, Eval, ExecutionErrorKind, PropertyMap, Value,
};

/// A resolved assignment target. Receivers, containers and keys are
/// evaluated once, so a read-modify-write touches them a single time.
enum Place<'a> {
    Variable(&'a Variable),
    Property(Value, &'a str),
    Index(Value, Option<Value>),
    Static(Arc<ClassStmt>, &'a str),
}

impl<'a> Place<'a> {
    fn resolve(ctx: &Context, target: &'a Expression) -> Result<Self, Control> {
        match target {
            Expression::Variable(variable) => Ok(Place::Variable(variable)),
            Expression::Property(object, name) => Ok(Place::Property(object.evaluate(ctx)?, name)),
            Expression::Index(container, index) => {
                let current = container.evaluate(ctx)?;
                let index = match index {
                    Some(index) => Some(index.evaluate(ctx)?),
                    None => None,
                };
                let container = match current {
                    Value::Null if is_assignable(container) => {
                        let fresh = match index {
                            Some(Value::String(_)) => Value::object(PropertyMap::new()),
                            _ => Value::array(Vec::new()),
                        };
                        assign(ctx, container, fresh.clone())?;
                        fresh
                    }
                    current => current,
                };
                Ok(Place::Index(container, index))
            }
            Expression::StaticProperty(class_ref, name) => {
                Ok(Place::Static(class::resolve(ctx, class_ref)?, name))
            }
            other => Err(ExecutionErrorKind::InvalidAssignmentTarget(other.to_string()).into()),
        }
    }

    fn read(&self, ctx: &Context) -> Eval {
        match self {
            Place::Variable(variable) => Ok(ctx.get(variable.index)),
            Place::Property(object, name) => access::get_property(ctx, object, name),
            Place::Index(container, Some(index)) => access::get_index(ctx, container, index),
            Place::Index(_, None) => Err(ExecutionErrorKind::AppendRead.into()),
            Place::Static(class, name) => class::get_static(ctx, class, name),
        }
    }

    fn write(self, ctx: &Context, value: Value) -> Eval {
        match self {
            Place::Variable(variable) => {
                if let Some(ty) = &variable.ty {
                    if !type_matches(ctx, ty, &value) {
                        return Err(ExecutionErrorKind::TypeMismatch {
                            expected: ty.to_string(),
                            found: value.type_name(),
                        }
                        .into());
                    }
                }
                ctx.set(variable.index, value.clone());
                Ok(value)
            }
            Place::Property(object, name) => set_property(ctx, &object, name, value),
            Place::Index(container, index) => set_index(ctx, &container, index, value),
            Place::Static(class, name) => class::set_static(ctx, &class, name, value),
        }
    }
}

/// Stores `value` into `target` and yields it.
pub(crate) fn assign(ctx: &Context, target: &Expression, value: Value) -> Eval {
    match target {
        Expression::List(targets) => destructure(ctx, targets.iter().map(Option::as_ref), value),
        Expression::Array(targets) => destructure(ctx, targets.iter().map(Some), value),
        target => Place::resolve(ctx, target)?.write(ctx, value),
    }
}

/// `target op= value`. `??=` leaves a non-null target untouched and does
/// not evaluate `value`.
pub(crate) fn compound(
    ctx: &Context,
    target: &Expression,
    operator: BinaryOperator,
    value: &Expression,
) -> Eval {
    let place = Place::resolve(ctx, target)?;
    if operator == BinaryOperator::Coalesce {
        let current = match place.read(ctx) {
            Err(Control::Throw(Value::Error(error), _)) if error.kind.is_missing_value() => Value::Null,
            current => current?,
        };
        if !current.is_null() {
            return Ok(current);
        }
        let value = value.evaluate(ctx)?;
        return place.write(ctx, value);
    }

    let current = place.read(ctx)?;
    let value = value.evaluate(ctx)?;
    let combined = operators::binary(operator, &current, &value)?;
    place.write(ctx, combined)
}

/// `++`/`--` on any assignable target. Prefix forms yield the new value.
pub(crate) fn update(ctx: &Context, target: &Expression, operator: UpdateOperator, prefix: bool) -> Eval {
    let place = Place::resolve(ctx, target)?;
    let current = place.read(ctx)?;
    let updated = operators::update(operator, &current)?;
    place.write(ctx, updated.clone())?;
    Ok(if prefix { updated } else { current })
}

fn is_assignable(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Variable(_)
            | Expression::Property(..)
            | Expression::Index(..)
            | Expression::StaticProperty(..)
    )
}

fn destructure<'a>(
    ctx: &Context,
    targets: impl Iterator<Item = Option<&'a Expression>>,
    value: Value,
) -> Eval {
    let Value::Array(values) = &value else {
        return Err(ExecutionErrorKind::NotIndexable(value.type_name()).into());
    };
    let items = values.read().clone();
    for (i, target) in targets.enumerate() {
        if let Some(target) = target {
            assign(ctx, target, items.get(i).cloned().unwrap_or_default())?;
        }
    }
    Ok(value)
}

pub(crate) fn set_property(ctx: &Context, object: &Value, name: &str, value: Value) -> Eval {
    match object {
        Value::Instance(instance) => {
            if let Some((property, owner)) = find_property(ctx.vm(), &instance.class, name) {
                check_access(ctx, &owner, &property.modifiers, || {
                    format!("{}::${name}", owner.name)
                })?;
                if let Some(ty) = &property.ty {
                    if !type_matches(ctx, ty, &value) {
                        return Err(ExecutionErrorKind::TypeMismatch {
                            expected: ty.to_string(),
                            found: value.type_name(),
                        }
                        .into());
                    }
                }
            }
            instance.set(name, value.clone());
            Ok(value)
        }
        Value::Object(map) => {
            map.write().insert(name, value.clone());
            Ok(value)
        }
        Value::Any(host) => {
            host.set_property(name, value.clone())?;
            Ok(value)
        }
        other => Err(ExecutionErrorKind::NotAnObject(other.type_name()).into()),
    }
}

fn set_index(ctx: &Context, container: &Value, index: Option<Value>, value: Value) -> Eval {
    match (container, index) {
        (Value::Array(values), None) => {
            values.write().push(value.clone());
            Ok(value)
        }
        (Value::Array(values), Some(Value::Int(i))) => {
            let i = usize::try_from(i).map_err(|_| ExecutionErrorKind::NegativeIndex(i))?;
            let mut values = values.write();
            if i >= values.len() {
                values.resize(i + 1, Value::Null);
            }
            values[i] = value.clone();
            Ok(value)
        }
        (Value::Array(_), Some(other)) => {
            Err(ExecutionErrorKind::InvalidIndex(other.type_name()).into())
        }
        (Value::Object(map), Some(Value::String(key))) => {
            map.write().insert(key, value.clone());
            Ok(value)
        }
        (Value::Object(_), other) => Err(ExecutionErrorKind::ObjectKeyNotString(
            other.map_or_else(|| "append".to_string(), |key| key.type_name()),
        )
        .into()),
        (Value::Instance(_), Some(Value::String(name))) => set_property(ctx, container, &name, value),
        (other, _) => Err(ExecutionErrorKind::NotIndexable(other.type_name()).into()),
    }
}
