mod class;

use std::{fmt::Display, sync::Arc};

use parking_lot::RwLock;

pub use self::class::{
    Annotation, ClassStmt, InterfaceMethod, InterfaceStmt, Method, Modifiers, Property, Visibility,
};
use crate::{span::Span, tree_walk_interpreter::Value};

/// A loaded unit of code. `var_count` is the number of top-level slots.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub var_count: usize,
}

impl Program {
    pub fn new(statements: Vec<Statement>, var_count: usize) -> Self {
        Self {
            statements,
            var_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl From<StatementKind> for Statement {
    fn from(kind: StatementKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }
}

impl From<Expression> for Statement {
    fn from(expression: Expression) -> Self {
        StatementKind::Expression(expression).into()
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Expression(Expression),
    Echo(Vec<Expression>),
    Block(Vec<Statement>),
    If(Box<IfStatement>),
    While(Box<WhileStatement>),
    DoWhile(Box<WhileStatement>),
    For(Box<ForStatement>),
    Foreach(Box<ForeachStatement>),
    Switch(Box<SwitchStatement>),
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<Expression>),
    Throw(Expression),
    Try(Box<TryStatement>),
    Function(Arc<FunctionDecl>),
    Class(Arc<ClassStmt>),
    Interface(Arc<InterfaceStmt>),
    /// Fire-and-forget execution of a call, `for` or `foreach`.
    Spawn(Arc<Statement>),
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub condition: Expression,
    pub then: Vec<Statement>,
    pub else_ifs: Vec<(Expression, Vec<Statement>)>,
    pub otherwise: Option<Vec<Statement>>,
}

#[derive(Debug, Clone)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForStatement {
    pub init: Vec<Expression>,
    pub condition: Option<Expression>,
    pub step: Vec<Expression>,
    pub body: Vec<Statement>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForeachStatement {
    pub iterable: Expression,
    pub key: Option<usize>,
    pub value: usize,
    pub body: Vec<Statement>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SwitchStatement {
    pub subject: Expression,
    pub cases: Vec<(Expression, Vec<Statement>)>,
    pub default: Option<Vec<Statement>>,
}

#[derive(Debug, Clone)]
pub struct TryStatement {
    pub body: Vec<Statement>,
    pub catches: Vec<CatchClause>,
    pub finally: Option<Vec<Statement>>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Empty catches everything.
    pub types: Vec<String>,
    pub variable: Option<usize>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    /// A value baked into the tree, written by macro annotations.
    Constant(Value),
    Array(Vec<Expression>),
    Object(Vec<(Expression, Expression)>),
    /// String parts joined with string coercion.
    Interpolated(Vec<Expression>),
    Variable(Variable),
    This,
    Binary(Box<Expression>, BinaryOperator, Box<Expression>),
    Unary(UnaryOperator, Box<Expression>),
    Update {
        target: Box<Expression>,
        operator: UpdateOperator,
        prefix: bool,
    },
    Assign(Box<Expression>, Box<Expression>),
    /// `target op= value`. The target is resolved once.
    CompoundAssign {
        target: Box<Expression>,
        operator: BinaryOperator,
        value: Box<Expression>,
    },
    Ternary {
        condition: Box<Expression>,
        /// `None` for the short form `a ?: b`.
        then: Option<Box<Expression>>,
        otherwise: Box<Expression>,
    },
    /// `None` index is the append form `$a[]`.
    Index(Box<Expression>, Option<Box<Expression>>),
    Property(Box<Expression>, String),
    Call(String, Vec<Argument>),
    CallValue(Box<Expression>, Vec<Argument>),
    MethodCall(Box<Expression>, String, Vec<Argument>),
    StaticProperty(ClassRef, String),
    StaticCall(ClassRef, String, Vec<Argument>),
    ParentCall(String, Vec<Argument>),
    New(ClassRef, Vec<Argument>),
    InstanceOf(Box<Expression>, String),
    Like(Box<Expression>, String),
    Closure(Arc<Closure>),
    Match(Box<MatchExpression>),
    /// Destructuring target, `[$a, , $c] = ...`.
    List(Vec<Option<Expression>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A variable pre-resolved to its slot in the current activation.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub index: usize,
    pub ty: Option<TypeHint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Concat,
    Eq,
    Ne,
    Identical,
    NotIdentical,
    Lt,
    Le,
    Gt,
    Ge,
    Spaceship,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub enum Argument {
    Positional(Expression),
    Named(String, Expression),
    /// `...$args`
    Spread(Expression),
}

/// How an expression names a class.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Named(String),
    /// `Name<A, B>`
    Generic(String, Vec<String>),
    /// A type parameter of the enclosing generic class, as in `new T()`.
    TypeParameter(String),
    SelfClass,
    StaticClass,
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeHint {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Callable,
    Mixed,
    Nullable(Box<TypeHint>),
    Class(String),
    Generic(String),
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Vec<Statement>,
    pub var_count: usize,
    pub return_type: Option<TypeHint>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

impl FunctionDecl {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Parameter>,
        body: Vec<Statement>,
        var_count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            var_count,
            return_type: None,
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn returns(mut self, ty: TypeHint) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|param| param.name == name)
    }
}

#[derive(Debug)]
pub struct Parameter {
    pub name: String,
    pub index: usize,
    pub ty: Option<TypeHint>,
    pub default: DefaultValue,
    pub variadic: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            ty: None,
            default: DefaultValue::default(),
            variadic: false,
        }
    }

    pub fn typed(mut self, ty: TypeHint) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_default(self, default: Expression) -> Self {
        self.default.set(default);
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// A default value expression that annotations may fill in after parsing.
#[derive(Debug, Default)]
pub struct DefaultValue(RwLock<Option<Arc<Expression>>>);

impl DefaultValue {
    pub fn get(&self) -> Option<Arc<Expression>> {
        self.0.read().clone()
    }

    pub fn set(&self, expression: Expression) {
        *self.0.write() = Some(Arc::new(expression));
    }
}

#[derive(Debug)]
pub struct Closure {
    pub function: Arc<FunctionDecl>,
    /// `(enclosing slot, closure slot)` pairs.
    pub captures: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct MatchExpression {
    pub subject: Expression,
    pub arms: Vec<(Vec<Expression>, Expression)>,
    pub default: Option<Expression>,
}

impl Expression {
    pub fn null() -> Self {
        Expression::Literal(Literal::Null)
    }

    pub fn bool(b: bool) -> Self {
        Expression::Literal(Literal::Bool(b))
    }

    pub fn int(i: i64) -> Self {
        Expression::Literal(Literal::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Expression::Literal(Literal::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn var(name: impl Into<String>, index: usize) -> Self {
        Expression::Variable(Variable {
            name: name.into(),
            index,
            ty: None,
        })
    }

    pub fn typed_var(name: impl Into<String>, index: usize, ty: TypeHint) -> Self {
        Expression::Variable(Variable {
            name: name.into(),
            index,
            ty: Some(ty),
        })
    }

    pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Self {
        Expression::Binary(Box::new(left), operator, Box::new(right))
    }

    pub fn unary(operator: UnaryOperator, operand: Expression) -> Self {
        Expression::Unary(operator, Box::new(operand))
    }

    pub fn assign(target: Expression, value: Expression) -> Self {
        Expression::Assign(Box::new(target), Box::new(value))
    }

    pub fn compound_assign(target: Expression, operator: BinaryOperator, value: Expression) -> Self {
        Expression::CompoundAssign {
            target: Box::new(target),
            operator,
            value: Box::new(value),
        }
    }

    pub fn increment(target: Expression, prefix: bool) -> Self {
        Expression::Update {
            target: Box::new(target),
            operator: UpdateOperator::Increment,
            prefix,
        }
    }

    pub fn decrement(target: Expression, prefix: bool) -> Self {
        Expression::Update {
            target: Box::new(target),
            operator: UpdateOperator::Decrement,
            prefix,
        }
    }

    pub fn ternary(condition: Expression, then: Option<Expression>, otherwise: Expression) -> Self {
        Expression::Ternary {
            condition: Box::new(condition),
            then: then.map(Box::new),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn index(target: Expression, index: Expression) -> Self {
        Expression::Index(Box::new(target), Some(Box::new(index)))
    }

    pub fn append(target: Expression) -> Self {
        Expression::Index(Box::new(target), None)
    }

    pub fn property(object: Expression, name: impl Into<String>) -> Self {
        Expression::Property(Box::new(object), name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call(name.into(), positional(args))
    }

    pub fn call_value(callee: Expression, args: Vec<Expression>) -> Self {
        Expression::CallValue(Box::new(callee), positional(args))
    }

    pub fn method_call(object: Expression, method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::MethodCall(Box::new(object), method.into(), positional(args))
    }

    pub fn static_call(class: ClassRef, method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::StaticCall(class, method.into(), positional(args))
    }

    pub fn parent_call(method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::ParentCall(method.into(), positional(args))
    }

    pub fn new_object(class: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::New(ClassRef::Named(class.into()), positional(args))
    }

    pub fn instance_of(object: Expression, class: impl Into<String>) -> Self {
        Expression::InstanceOf(Box::new(object), class.into())
    }

    pub fn like(object: Expression, class: impl Into<String>) -> Self {
        Expression::Like(Box::new(object), class.into())
    }

    pub fn closure(function: FunctionDecl, captures: Vec<(usize, usize)>) -> Self {
        Expression::Closure(Arc::new(Closure {
            function: Arc::new(function),
            captures,
        }))
    }
}

fn positional(args: Vec<Expression>) -> Vec<Argument> {
    args.into_iter().map(Argument::Positional).collect()
}

impl StatementKind {
    pub fn echo(expression: Expression) -> Statement {
        StatementKind::Echo(vec![expression]).into()
    }

    pub fn ret(expression: Expression) -> Statement {
        StatementKind::Return(Some(expression)).into()
    }

    pub fn if_else(condition: Expression, then: Vec<Statement>, otherwise: Option<Vec<Statement>>) -> Statement {
        StatementKind::If(Box::new(IfStatement {
            condition,
            then,
            else_ifs: Vec::new(),
            otherwise,
        }))
        .into()
    }

    pub fn while_loop(condition: Expression, body: Vec<Statement>) -> Statement {
        StatementKind::While(Box::new(WhileStatement {
            condition,
            body,
            label: None,
        }))
        .into()
    }

    pub fn for_loop(
        init: Vec<Expression>,
        condition: Option<Expression>,
        step: Vec<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        StatementKind::For(Box::new(ForStatement {
            init,
            condition,
            step,
            body,
            label: None,
        }))
        .into()
    }

    pub fn foreach(iterable: Expression, key: Option<usize>, value: usize, body: Vec<Statement>) -> Statement {
        StatementKind::Foreach(Box::new(ForeachStatement {
            iterable,
            key,
            value,
            body,
            label: None,
        }))
        .into()
    }

    pub fn function(function: FunctionDecl) -> Statement {
        StatementKind::Function(Arc::new(function)).into()
    }

    pub fn class(class: ClassStmt) -> Statement {
        StatementKind::Class(Arc::new(class)).into()
    }

    pub fn interface(interface: InterfaceStmt) -> Statement {
        StatementKind::Interface(Arc::new(interface)).into()
    }

    pub fn spawn(statement: impl Into<Statement>) -> Statement {
        StatementKind::Spawn(Arc::new(statement.into())).into()
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::Concat => ".",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Identical => "===",
            BinaryOperator::NotIdentical => "!==",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Spaceship => "<=>",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Coalesce => "??",
        };
        write!(f, "{symbol}")
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

impl Display for TypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeHint::Int => write!(f, "int"),
            TypeHint::Float => write!(f, "float"),
            TypeHint::String => write!(f, "string"),
            TypeHint::Bool => write!(f, "bool"),
            TypeHint::Array => write!(f, "array"),
            TypeHint::Object => write!(f, "object"),
            TypeHint::Callable => write!(f, "callable"),
            TypeHint::Mixed => write!(f, "mixed"),
            TypeHint::Nullable(inner) => write!(f, "?{inner}"),
            TypeHint::Class(name) | TypeHint::Generic(name) => write!(f, "{name}"),
        }
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassRef::Named(name) | ClassRef::TypeParameter(name) => write!(f, "{name}"),
            ClassRef::Generic(name, args) => write!(f, "{name}<{}>", args.join(", ")),
            ClassRef::SelfClass => write!(f, "self"),
            ClassRef::StaticClass => write!(f, "static"),
            ClassRef::Parent => write!(f, "parent"),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{literal}"),
            Expression::Constant(value) => write!(f, "{value}"),
            Expression::Variable(variable) => write!(f, "${}", variable.name),
            Expression::This => write!(f, "$this"),
            Expression::Binary(left, op, right) => write!(f, "({left} {op} {right})"),
            Expression::Unary(op, operand) => write!(f, "{op}{operand}"),
            Expression::Index(target, Some(index)) => write!(f, "{target}[{index}]"),
            Expression::Index(target, None) => write!(f, "{target}[]"),
            Expression::Property(object, name) => write!(f, "{object}->{name}"),
            Expression::CompoundAssign {
                target,
                operator,
                value,
            } => write!(f, "{target} {operator}= {value}"),
            Expression::Call(name, _) => write!(f, "{name}(...)"),
            Expression::CallValue(callee, _) => write!(f, "{callee}(...)"),
            Expression::MethodCall(object, name, _) => write!(f, "{object}->{name}(...)"),
            Expression::StaticProperty(class, name) => write!(f, "{class}::${name}"),
            Expression::StaticCall(class, name, _) => write!(f, "{class}::{name}(...)"),
            Expression::ParentCall(name, _) => write!(f, "parent::{name}(...)"),
            Expression::New(class, _) => write!(f, "new {class}(...)"),
            Expression::Closure(closure) => write!(f, "function {}(...)", closure.function.name),
            _ => write!(f, "<expression>"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compound_assign_keeps_one_target() {
        let expr = Expression::compound_assign(
            Expression::index(Expression::var("totals", 0), Expression::call("key", vec![])),
            BinaryOperator::Add,
            Expression::int(2),
        );
        assert_eq!(expr.to_string(), "$totals[key(...)] += 2");
    }

    #[test]
    fn defaults_are_writable() {
        let param = Parameter::new("limit", 0);
        assert!(param.default.get().is_none());
        param.default.set(Expression::int(10));
        assert_eq!(param.default.get().map(|e| e.to_string()), Some("10".to_string()));
    }

    #[test]
    fn display_class_refs() {
        assert_eq!(ClassRef::Generic("DB".into(), vec!["Users".into()]).to_string(), "DB<Users>");
        assert_eq!(TypeHint::Nullable(Box::new(TypeHint::Int)).to_string(), "?int");
    }
}
