//! Declarations every program starts with.

use crate::ast::{
    ClassStmt, Expression, FunctionDecl, InterfaceStmt, Method, Parameter, Property, StatementKind,
    Visibility,
};

use super::{class::CONSTRUCTOR, Vm};

pub const THROWABLE: &str = "Throwable";
pub const EXCEPTION: &str = "Exception";
pub const FEATURE: &str = "Feature";
pub const MACRO: &str = "Macro";
pub const ITERATOR: &str = "Iterator";

pub(crate) fn install(vm: &Vm) {
    vm.install_interface(InterfaceStmt::new(THROWABLE).method("getMessage", 0));
    vm.install_interface(InterfaceStmt::new(FEATURE));
    vm.install_interface(InterfaceStmt::new(MACRO));
    vm.install_interface(
        InterfaceStmt::new(ITERATOR)
            .method("rewind", 0)
            .method("valid", 0)
            .method("current", 0)
            .method("key", 0)
            .method("next", 0),
    );
    vm.install_class(exception());
}

fn getter(name: &str, property: &str) -> Method {
    Method::new(FunctionDecl::new(
        name,
        vec![],
        vec![StatementKind::ret(Expression::property(Expression::This, property))],
        0,
    ))
}

/// class Exception implements Throwable {
///     protected $message = ""; protected $code = 0;
///     function __construct($message = "", $code = 0) { ... }
///     function getMessage() { return $this->message; }
///     function getCode() { return $this->code; }
/// }
fn exception() -> ClassStmt {
    let constructor = FunctionDecl::new(
        CONSTRUCTOR,
        vec![
            Parameter::new("message", 0).with_default(Expression::string("")),
            Parameter::new("code", 1).with_default(Expression::int(0)),
        ],
        vec![
            Expression::assign(
                Expression::property(Expression::This, "message"),
                Expression::var("message", 0),
            )
            .into(),
            Expression::assign(
                Expression::property(Expression::This, "code"),
                Expression::var("code", 1),
            )
            .into(),
        ],
        2,
    );

    ClassStmt::new(EXCEPTION)
        .implements(THROWABLE)
        .property(
            Property::new("message")
                .with_default(Expression::string(""))
                .visibility(Visibility::Protected),
        )
        .property(
            Property::new("code")
                .with_default(Expression::int(0))
                .visibility(Visibility::Protected),
        )
        .method(Method::new(constructor))
        .method(getter("getMessage", "message"))
        .method(getter("getCode", "code"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree_walk_interpreter::{instance_of, is_like, Instance, Value};

    #[test]
    fn exceptions_are_throwable() {
        let vm = Vm::new();
        let exception = vm.class(EXCEPTION).unwrap();
        assert!(instance_of(&vm, &exception, THROWABLE));
        assert!(vm.interface(ITERATOR).is_some());
        let instance = Value::Instance(std::sync::Arc::new(Instance::new(exception)));
        assert!(is_like(&vm, &instance, THROWABLE));
    }
}
