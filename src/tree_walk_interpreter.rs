mod access;
mod annotation;
mod assign;
mod callable;
mod class;
mod context;
mod control_flow;
mod error;
mod operators;
mod prelude;
mod value;
mod vm;

use std::sync::Arc;

use crate::ast::{BinaryOperator, Expression, Literal, Statement, StatementKind};

pub use self::{
    annotation::NodeRef,
    callable::{Callable, EvaluatedArgs, NativeFn},
    class::{instance_of, is_like, value_instance_of, CONSTRUCTOR},
    context::{Binding, Context},
    error::{Control, Eval, ExecutionError, ExecutionErrorKind, Fault, ScriptError},
    prelude::{EXCEPTION, FEATURE, ITERATOR, MACRO, THROWABLE},
    value::{HostObject, Instance, PropertyMap, Value},
    vm::{EngineConfig, FaultSink, OutputBuffer, Vm},
};

/// Keep at least this much native stack before evaluating a node.
const RED_ZONE: usize = 128 * 1024;

/// Size of each stack segment added when the red zone is reached.
const STACK_SEGMENT: usize = 1024 * 1024;

/// Recursion depth is bounded by `EngineConfig::max_call_depth`, not by the
/// stack of whichever thread runs the program.
#[inline]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

impl Statement {
    #[cfg_attr(feature = "trace", tracing::instrument(level = "trace", skip_all, fields(at = %self.span)))]
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        ensure_sufficient_stack(|| self.execute(ctx)).map_err(|control| control.at(&self.span))
    }

    fn execute(&self, ctx: &Context) -> Eval {
        match &self.kind {
            StatementKind::Expression(expression) => expression.evaluate(ctx),
            StatementKind::Echo(expressions) => {
                for expression in expressions {
                    let value = expression.evaluate(ctx)?;
                    ctx.vm().write(&value.to_string())?;
                }
                Ok(Value::Null)
            }
            StatementKind::Block(statements) => {
                control_flow::run_block(statements, ctx)?;
                Ok(Value::Null)
            }
            StatementKind::If(statement) => statement.evaluate(ctx),
            StatementKind::While(statement) => statement.evaluate(ctx),
            StatementKind::DoWhile(statement) => statement.evaluate_do(ctx),
            StatementKind::For(statement) => statement.evaluate(ctx),
            StatementKind::Foreach(statement) => statement.evaluate(ctx),
            StatementKind::Switch(statement) => statement.evaluate(ctx),
            StatementKind::Break(label) => Err(Control::Break(label.clone())),
            StatementKind::Continue(label) => Err(Control::Continue(label.clone())),
            StatementKind::Return(expression) => {
                let value = match expression {
                    Some(expression) => expression.evaluate(ctx)?,
                    None => Value::Null,
                };
                Err(Control::Return(value))
            }
            StatementKind::Throw(expression) => Err(Control::Throw(expression.evaluate(ctx)?, None)),
            StatementKind::Try(statement) => statement.evaluate(ctx, &self.span),
            StatementKind::Function(_) | StatementKind::Class(_) | StatementKind::Interface(_) => {
                ctx.vm().declare(ctx, &self.kind)?;
                Ok(Value::Null)
            }
            StatementKind::Spawn(statement) => {
                ctx.vm().spawn(ctx, statement.clone())?;
                Ok(Value::Null)
            }
        }
    }
}

impl Expression {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        ensure_sufficient_stack(|| self.execute(ctx))
    }

    fn execute(&self, ctx: &Context) -> Eval {
        match self {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expression::Constant(value) => Ok(value.clone()),
            Expression::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| item.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(values))
            }
            Expression::Object(entries) => {
                let mut map = PropertyMap::new();
                for (key, value) in entries {
                    let key = key.evaluate(ctx)?;
                    let key = match &key {
                        Value::String(_) | Value::Int(_) => key.to_string(),
                        other => {
                            return Err(ExecutionErrorKind::ObjectKeyNotString(other.type_name()).into())
                        }
                    };
                    map.insert(key, value.evaluate(ctx)?);
                }
                Ok(Value::object(map))
            }
            Expression::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&part.evaluate(ctx)?.to_string());
                }
                Ok(Value::String(text))
            }
            Expression::Variable(variable) => Ok(ctx.get(variable.index)),
            Expression::This => ctx
                .this()
                .map(|instance| Value::Instance(instance.clone()))
                .ok_or_else(|| ExecutionErrorKind::ThisOutsideMethod.into()),
            Expression::Binary(left, operator, right) => match operator {
                BinaryOperator::And => {
                    if !left.evaluate(ctx)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(right.evaluate(ctx)?.is_truthy()))
                }
                BinaryOperator::Or => {
                    if left.evaluate(ctx)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(right.evaluate(ctx)?.is_truthy()))
                }
                BinaryOperator::Coalesce => {
                    let left = match left.evaluate(ctx) {
                        Ok(value) => value,
                        Err(Control::Throw(Value::Error(error), _)) if error.kind.is_missing_value() => {
                            Value::Null
                        }
                        Err(control) => return Err(control),
                    };
                    if left.is_null() {
                        right.evaluate(ctx)
                    } else {
                        Ok(left)
                    }
                }
                operator => {
                    let left = left.evaluate(ctx)?;
                    let right = right.evaluate(ctx)?;
                    Ok(operators::binary(*operator, &left, &right)?)
                }
            },
            Expression::Unary(operator, operand) => {
                Ok(operators::unary(*operator, &operand.evaluate(ctx)?)?)
            }
            Expression::Update {
                target,
                operator,
                prefix,
            } => assign::update(ctx, target, *operator, *prefix),
            Expression::Assign(target, value) => {
                let value = value.evaluate(ctx)?;
                assign::assign(ctx, target, value)
            }
            Expression::CompoundAssign {
                target,
                operator,
                value,
            } => assign::compound(ctx, target, *operator, value),
            Expression::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let condition = condition.evaluate(ctx)?;
                match then {
                    _ if !condition.is_truthy() => otherwise.evaluate(ctx),
                    Some(then) => then.evaluate(ctx),
                    None => Ok(condition),
                }
            }
            Expression::Index(target, index) => {
                let container = target.evaluate(ctx)?;
                let index = index
                    .as_ref()
                    .ok_or(ExecutionErrorKind::AppendRead)?
                    .evaluate(ctx)?;
                access::get_index(ctx, &container, &index)
            }
            Expression::Property(object, name) => {
                let object = object.evaluate(ctx)?;
                access::get_property(ctx, &object, name)
            }
            Expression::Call(name, args) => {
                let function = ctx
                    .vm()
                    .function(name)
                    .ok_or_else(|| ExecutionErrorKind::UndefinedFunction(name.clone()))?;
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                function.call(ctx, args)
            }
            Expression::CallValue(callee, args) => {
                let callee = callee.evaluate(ctx)?;
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                match callee {
                    Value::Function(function) => function.call(ctx, args),
                    Value::String(name) => ctx
                        .vm()
                        .function(&name)
                        .ok_or(ExecutionErrorKind::UndefinedFunction(name))?
                        .call(ctx, args),
                    other => Err(ExecutionErrorKind::NotAFunction(other.type_name()).into()),
                }
            }
            Expression::MethodCall(object, name, args) => {
                let object = object.evaluate(ctx)?;
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                access::call_method(ctx, &object, name, args)
            }
            Expression::StaticProperty(class_ref, name) => {
                let class = class::resolve(ctx, class_ref)?;
                class::get_static(ctx, &class, name)
            }
            Expression::StaticCall(class_ref, name, args) => {
                let class = class::resolve(ctx, class_ref)?;
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                class::static_call(ctx, &class, name, args)
            }
            Expression::ParentCall(name, args) => {
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                class::parent_call(ctx, name, args)
            }
            Expression::New(class_ref, args) => {
                let class = class::resolve(ctx, class_ref)?;
                let args = EvaluatedArgs::evaluate(ctx, args)?;
                class::instantiate(ctx, &class, args)
            }
            Expression::InstanceOf(object, name) => {
                let value = object.evaluate(ctx)?;
                let target = class::resolve_type_name(ctx, name);
                Ok(Value::Bool(value_instance_of(ctx.vm(), &value, &target)))
            }
            Expression::Like(object, name) => {
                let value = object.evaluate(ctx)?;
                let target = class::resolve_type_name(ctx, name);
                Ok(Value::Bool(is_like(ctx.vm(), &value, &target)))
            }
            Expression::Closure(closure) => Ok(Value::Function(Arc::new(Callable::Closure {
                closure: closure.clone(),
                scope: ctx.clone(),
            }))),
            Expression::Match(expression) => expression.evaluate(ctx),
            Expression::List(_) => Err(ExecutionErrorKind::ListOutsideAssignment.into()),
        }
    }
}
