use std::{fmt::Display, sync::Arc};

use crate::ast::{self, Argument, ClassStmt, FunctionDecl, Method, TypeHint};

use super::{
    class::type_matches,
    context::{Binding, Context},
    Control, Eval, ExecutionErrorKind, Instance, Value,
};

pub type NativeFn = Arc<dyn Fn(&Context, Vec<Value>) -> Eval + Send + Sync>;

/// Argument values of one call, before they are bound to parameters.
#[derive(Debug, Default)]
pub struct EvaluatedArgs {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl EvaluatedArgs {
    pub fn evaluate(ctx: &Context, args: &[Argument]) -> Result<Self, Control> {
        let mut evaluated = Self::default();
        for arg in args {
            match arg {
                Argument::Positional(expression) => {
                    evaluated.positional.push(expression.evaluate(ctx)?)
                }
                Argument::Named(name, expression) => {
                    evaluated.named.push((name.clone(), expression.evaluate(ctx)?))
                }
                Argument::Spread(expression) => match expression.evaluate(ctx)? {
                    Value::Array(values) => evaluated.positional.extend(values.read().iter().cloned()),
                    Value::Object(map) => evaluated.named.extend(
                        map.read()
                            .iter()
                            .map(|(key, value)| (key.to_string(), value.clone())),
                    ),
                    Value::Null => {}
                    other => evaluated.positional.push(other),
                },
            }
        }
        Ok(evaluated)
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.push((name.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Passes `value` for the parameter `name` declared at `position`:
    /// positionally when the positional arguments reach it, by name otherwise.
    pub(crate) fn with_argument_at(mut self, position: usize, name: &str, value: Value) -> Self {
        if position <= self.positional.len() {
            self.positional.insert(position, value);
        } else {
            self.named.push((name.to_string(), value));
        }
        self
    }

    /// Flattened for host functions: positional values, then named ones.
    pub(crate) fn into_values(self) -> Vec<Value> {
        let mut values = self.positional;
        values.extend(self.named.into_iter().map(|(_, value)| value));
        values
    }

    fn take_named(&mut self, name: &str) -> Option<Value> {
        let i = self.named.iter().position(|(n, _)| n == name)?;
        Some(self.named.remove(i).1)
    }

    /// Writes every parameter slot of `function` into `frame`.
    fn bind(mut self, function: &FunctionDecl, frame: &Context) -> Result<(), Control> {
        let mut positional = std::mem::take(&mut self.positional).into_iter();
        let given = positional.len();

        for param in &function.params {
            if param.variadic {
                frame.set(param.index, Value::array(positional.by_ref().collect()));
                continue;
            }

            let supplied = match positional.next() {
                Some(value) => Some(value),
                None => self.take_named(&param.name),
            };
            let value = match supplied {
                Some(value) if !value.is_null() => value,
                supplied => match param.default.get() {
                    Some(default) => default.evaluate(frame)?,
                    None if supplied.is_some() => Value::Null,
                    None if matches!(param.ty, Some(TypeHint::Nullable(_) | TypeHint::Mixed)) => {
                        Value::Null
                    }
                    None => {
                        return Err(ExecutionErrorKind::MissingArgument {
                            function: function.name.clone(),
                            parameter: param.name.clone(),
                        }
                        .into())
                    }
                },
            };

            if let Some(ty) = &param.ty {
                if !type_matches(frame, ty, &value) {
                    return Err(ExecutionErrorKind::ArgumentTypeMismatch {
                        function: function.name.clone(),
                        parameter: param.name.clone(),
                        expected: ty.to_string(),
                        found: value.type_name(),
                    }
                    .into());
                }
            }
            frame.set(param.index, value);
        }

        if !positional.as_slice().is_empty() {
            return Err(ExecutionErrorKind::TooManyArguments {
                function: function.name.clone(),
                expected: function.params.len(),
                given,
            }
            .into());
        }
        if let Some((name, _)) = self.named.first() {
            return Err(ExecutionErrorKind::UnknownNamedArgument {
                function: function.name.clone(),
                parameter: name.clone(),
            }
            .into());
        }
        Ok(())
    }
}

pub enum Callable {
    Function(Arc<FunctionDecl>),
    /// A closure value together with the context that created it.
    Closure {
        closure: Arc<ast::Closure>,
        scope: Context,
    },
    /// A method bound to its receiver (none for static methods).
    Method {
        method: Arc<Method>,
        receiver: Option<Arc<Instance>>,
        class: Arc<ClassStmt>,
    },
    Native {
        name: String,
        f: NativeFn,
    },
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Function(function) => &function.name,
            Callable::Closure { closure, .. } => &closure.function.name,
            Callable::Method { method, .. } => method.name(),
            Callable::Native { name, .. } => name,
        }
    }

    /// The declaration behind this callable; host functions have none.
    pub fn declaration(&self) -> Option<&FunctionDecl> {
        match self {
            Callable::Function(function) => Some(function),
            Callable::Closure { closure, .. } => Some(&closure.function),
            Callable::Method { method, .. } => Some(&method.function),
            Callable::Native { .. } => None,
        }
    }

    #[cfg_attr(feature = "trace", tracing::instrument(level = "trace", skip_all, fields(name = self.name())))]
    pub fn call(&self, ctx: &Context, args: EvaluatedArgs) -> Eval {
        match self {
            Callable::Function(function) => {
                let frame = ctx.enter(function.var_count, Binding::None)?;
                invoke(function, args, &frame)
            }
            Callable::Closure { closure, scope } => {
                let frame = ctx.enter(
                    closure.function.var_count,
                    Binding::Enclosed(scope.clone()),
                )?;
                for &(from, to) in &closure.captures {
                    frame.set(to, scope.get(from));
                }
                invoke(&closure.function, args, &frame)
            }
            Callable::Method {
                method,
                receiver,
                class,
            } => call_method(ctx, method, receiver.clone(), class.clone(), args),
            Callable::Native { f, .. } => f(ctx, args.into_values()),
        }
    }

    pub fn call_values(&self, ctx: &Context, values: Vec<Value>) -> Eval {
        self.call(ctx, EvaluatedArgs::positional(values))
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => write!(f, "<function {}>", function.name),
            Callable::Closure { .. } => write!(f, "<closure>"),
            Callable::Method { method, class, .. } => {
                write!(f, "<method {}::{}>", class.display_name(), method.name())
            }
            Callable::Native { name, .. } => write!(f, "<builtin function {name}>"),
        }
    }
}

/// Calls `method` with `$this` bound to `receiver` and the current class
/// bound to `class`, the class that declares the method.
pub(crate) fn call_method(
    ctx: &Context,
    method: &Method,
    receiver: Option<Arc<Instance>>,
    class: Arc<ClassStmt>,
    args: EvaluatedArgs,
) -> Eval {
    let frame = ctx.enter(method.function.var_count, Binding::Method { receiver, class })?;
    invoke(&method.function, args, &frame)
}

fn invoke(function: &FunctionDecl, args: EvaluatedArgs, frame: &Context) -> Eval {
    args.bind(function, frame)?;

    let mut result = Value::Null;
    for statement in &function.body {
        match statement.evaluate(frame) {
            Ok(_) => {}
            Err(Control::Return(value)) => {
                result = value;
                break;
            }
            Err(Control::Break(_)) => {
                return Err(ExecutionErrorKind::LoopControlOutsideLoop("break").into())
            }
            Err(Control::Continue(_)) => {
                return Err(ExecutionErrorKind::LoopControlOutsideLoop("continue").into())
            }
            Err(throw) => return Err(throw),
        }
    }

    if let Some(expected) = &function.return_type {
        if !type_matches(frame, expected, &result) {
            return Err(ExecutionErrorKind::ReturnTypeMismatch {
                function: function.name.clone(),
                expected: expected.to_string(),
                found: result.type_name(),
            }
            .into());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ast::{Expression, Parameter, StatementKind},
        tree_walk_interpreter::Vm,
    };

    fn sum() -> Callable {
        // function sum($a, $b = 10, ...$rest) { return $a + $b + count($rest) }
        Callable::Function(Arc::new(FunctionDecl::new(
            "sum",
            vec![
                Parameter::new("a", 0).typed(TypeHint::Int),
                Parameter::new("b", 1).with_default(Expression::int(10)),
                Parameter::new("rest", 2).variadic(),
            ],
            vec![StatementKind::ret(Expression::binary(
                Expression::binary(Expression::var("a", 0), ast::BinaryOperator::Add, Expression::var("b", 1)),
                ast::BinaryOperator::Add,
                Expression::method_call(Expression::var("rest", 2), "count", vec![]),
            ))],
            3,
        )))
    }

    fn int(result: Eval) -> i64 {
        match result {
            Ok(Value::Int(i)) => i,
            other => panic!("expected an int, got {other:?}"),
        }
    }

    fn error(result: Eval) -> String {
        match result {
            Err(Control::Throw(Value::Error(error), _)) => error.message(),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn binds_defaults_and_variadics() {
        let ctx = Context::root(Vm::new(), 0);
        let f = sum();
        assert_eq!(int(f.call_values(&ctx, vec![Value::Int(1)])), 11);
        assert_eq!(int(f.call_values(&ctx, vec![Value::Int(1), Value::Null])), 11);
        assert_eq!(
            int(f.call_values(&ctx, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])),
            5
        );
        let named = EvaluatedArgs::positional(vec![]).with_named("a", Value::Int(5)).with_named("b", Value::Int(1));
        assert_eq!(int(f.call(&ctx, named)), 6);
    }

    #[test]
    fn rejects_bad_arguments() {
        let ctx = Context::root(Vm::new(), 0);
        let f = sum();
        assert_eq!(error(f.call_values(&ctx, vec![])), "missing argument $a for sum()");
        assert_eq!(
            error(f.call_values(&ctx, vec!["x".into()])),
            "argument $a of sum() expects int, got string"
        );
        let unknown = EvaluatedArgs::positional(vec![Value::Int(1)]).with_named("c", Value::Int(1));
        assert_eq!(error(f.call(&ctx, unknown)), "unknown named argument $c for sum()");
    }
}
