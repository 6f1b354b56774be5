use std::sync::{Arc, OnceLock};

use crate::span::Span;

use super::Value;

/// Outcome of evaluating any node.
pub type Eval = Result<Value, Control>;

/// A propagating effect. Every node forwards what it does not own.
#[derive(Debug, Clone)]
pub enum Control {
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    /// The thrown value and the innermost statement it escaped from.
    Throw(Value, Option<Span>),
}

impl Control {
    /// Attach `span` to a throw that has no position yet.
    pub fn at(self, span: &Span) -> Self {
        match self {
            Control::Throw(value, None) if !span.is_empty() => {
                if let Value::Error(error) = &value {
                    let _ = error.span.set(span.clone());
                }
                Control::Throw(value, Some(span.clone()))
            }
            control => control,
        }
    }

    pub fn throw(kind: ExecutionErrorKind) -> Self {
        Control::Throw(Value::Error(Arc::new(ScriptError::new(kind))), None)
    }
}

impl From<ExecutionErrorKind> for Control {
    fn from(kind: ExecutionErrorKind) -> Self {
        Control::throw(kind)
    }
}

/// A runtime error raised by the engine itself, thrown as `Value::Error`.
#[derive(Debug)]
pub struct ScriptError {
    pub kind: ExecutionErrorKind,
    span: OnceLock<Span>,
}

impl ScriptError {
    pub fn new(kind: ExecutionErrorKind) -> Self {
        Self {
            kind,
            span: OnceLock::new(),
        }
    }

    pub fn span(&self) -> Option<&Span> {
        self.span.get()
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unsupported type for operator {0}")]
    UnsupportedOperand(String),
    #[error("variable type and assigned type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("argument ${parameter} of {function}() expects {expected}, got {found}")]
    ArgumentTypeMismatch {
        function: String,
        parameter: String,
        expected: String,
        found: String,
    },
    #[error("{function}() must return {expected}, got {found}")]
    ReturnTypeMismatch {
        function: String,
        expected: String,
        found: String,
    },
    #[error("cannot assign to {0}")]
    InvalidAssignmentTarget(String),
    #[error("cannot use [] for reading")]
    AppendRead,
    #[error("list destructuring used outside of an assignment")]
    ListOutsideAssignment,
    #[error("array index must be an int, got {0}")]
    InvalidIndex(String),
    #[error("negative array index {0}")]
    NegativeIndex(i64),
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("object key must be a string, got {0}")]
    ObjectKeyNotString(String),
    #[error("cannot index into {0}")]
    NotIndexable(String),
    #[error("undefined property: {0}")]
    UndefinedProperty(String),
    #[error("call to undefined method {0}()")]
    UndefinedMethod(String),
    #[error("class {0} not found")]
    UndefinedClass(String),
    #[error("call to undefined function {0}()")]
    UndefinedFunction(String),
    #[error("not a function: {0}")]
    NotAFunction(String),
    #[error("{0} is not an object")]
    NotAnObject(String),
    #[error("missing argument ${parameter} for {function}()")]
    MissingArgument { function: String, parameter: String },
    #[error("unknown named argument ${parameter} for {function}()")]
    UnknownNamedArgument { function: String, parameter: String },
    #[error("{function}() takes {expected} arguments, {given} given")]
    TooManyArguments {
        function: String,
        expected: usize,
        given: usize,
    },
    #[error("maximum call depth exceeded")]
    CallDepthExceeded,
    #[error("foreach can only iterate arrays, objects or iterators, got {0}")]
    NotIterable(String),
    #[error("{0} used outside of a loop")]
    LoopControlOutsideLoop(&'static str),
    #[error("cannot use $this outside of a method")]
    ThisOutsideMethod,
    #[error("cannot use {0} outside of a class")]
    OutsideClass(&'static str),
    #[error("cannot use parent:: outside of a method")]
    ParentOutsideMethod,
    #[error("class {0} has no parent")]
    NoParentClass(String),
    #[error("parent class {class} has no method {method}()")]
    ParentMethodMissing { class: String, method: String },
    #[error("cannot access private member {0}")]
    PrivateMember(String),
    #[error("cannot access protected member {0}")]
    ProtectedMember(String),
    #[error("cannot instantiate abstract class {0}")]
    AbstractInstantiation(String),
    #[error("cannot instantiate interface {0}")]
    InterfaceInstantiation(String),
    #[error("class {0} cannot extend final class {1}")]
    ExtendsFinalClass(String, String),
    #[error("class {0} already declared")]
    ClassRedeclaration(String),
    #[error("function {0} already declared")]
    FunctionRedeclaration(String),
    #[error("class {class} expects {expected} type arguments, {given} given")]
    GenericArity {
        class: String,
        expected: usize,
        given: usize,
    },
    #[error("type parameter {0} is not bound")]
    UnboundTypeParameter(String),
    #[error("class {0} is not an annotation")]
    NotAnAnnotation(String),
    #[error("macro annotation {0} has no `target` constructor parameter")]
    MissingTarget(String),
    #[error("property {property} of {type_name} is read-only")]
    ReadOnlyProperty { type_name: String, property: String },
    #[error("cannot start task pool: {0}")]
    TaskPool(#[from] rayon::ThreadPoolBuildError),
    #[error("host fault: {0}")]
    HostFault(String),
    #[error("{0}")]
    Message(String),
}

impl ExecutionErrorKind {
    /// Lookups that `??` treats as a null left operand.
    pub fn is_missing_value(&self) -> bool {
        matches!(
            self,
            ExecutionErrorKind::IndexOutOfRange { .. }
                | ExecutionErrorKind::UndefinedProperty(_)
                | ExecutionErrorKind::NotIndexable(_)
        )
    }
}

/// Top-level failure of [`super::Vm::load`] or [`super::Vm::run`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("uncaught {message}{}", located(.span))]
    Uncaught { message: String, span: Option<Span> },
}

fn located(span: &Option<Span>) -> String {
    span.as_ref().map(|span| format!(" at {span}")).unwrap_or_default()
}

/// An uncaught exception, from the main program or a spawned task.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Fault {
    pub message: String,
    pub span: Option<Span>,
}

impl Fault {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl From<Fault> for ExecutionError {
    fn from(fault: Fault) -> Self {
        ExecutionError::Uncaught {
            message: fault.message,
            span: fault.span,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::span::Position;

    #[test]
    fn first_span_wins() {
        let control = Control::from(ExecutionErrorKind::DivisionByZero);
        let inner = Span::new(
            Position { offset: 4, line: 2, column: 1 },
            Position { offset: 6, line: 2, column: 3 },
        );
        let outer = Span::new(
            Position { offset: 0, line: 0, column: 0 },
            Position { offset: 9, line: 3, column: 0 },
        );
        let control = control.at(&inner).at(&outer);
        let Control::Throw(Value::Error(error), span) = control else {
            panic!("expected a thrown error");
        };
        assert_eq!(error.span(), Some(&inner));
        assert_eq!(span, Some(inner));
        assert_eq!(error.message(), "division by zero");
    }

    #[test]
    fn thrown_values_keep_their_origin() {
        let origin = Span::new(
            Position { offset: 10, line: 4, column: 2 },
            Position { offset: 30, line: 4, column: 22 },
        );
        let control = Control::Throw(Value::from("bad"), None)
            .at(&Span::default())
            .at(&origin)
            .at(&Span::new(Position::default(), Position { offset: 99, line: 9, column: 0 }));
        assert!(matches!(control, Control::Throw(_, Some(span)) if span == origin));
        assert!(matches!(Control::Break(None).at(&origin), Control::Break(None)));
    }

    #[test]
    fn uncaught_message() {
        let error = ExecutionError::from(Fault::new("boom", None));
        assert_eq!(error.to_string(), "uncaught boom");
    }
}
