//! Annotation processing.
//!
//! An annotation names a class implementing `Feature` or `Macro`. Features
//! are instantiated with the annotation's arguments only. Macros also get a
//! `target` handle onto the annotated declaration and may rewrite defaults
//! through it before any of the program runs.

use std::sync::Arc;

use crate::ast::{Annotation, ClassStmt, Expression, FunctionDecl, Literal, Method, Property};

use super::{
    callable::{call_method, EvaluatedArgs},
    class::{find_method, instance_of, instantiate, CONSTRUCTOR},
    prelude::{FEATURE, MACRO},
    Context, Control, ExecutionErrorKind, HostObject, Value, Vm,
};

/// Handle onto an annotated declaration, passed to macros as `$target`.
#[derive(Debug)]
pub enum NodeRef {
    Class(Arc<ClassStmt>),
    Method {
        class: Arc<ClassStmt>,
        method: Arc<Method>,
    },
    Property {
        class: Arc<ClassStmt>,
        property: Arc<Property>,
        vm: Vm,
    },
    Function(Arc<FunctionDecl>),
    Parameter {
        function: Arc<FunctionDecl>,
        position: usize,
    },
}

impl NodeRef {
    fn kind(&self) -> &'static str {
        match self {
            NodeRef::Class(_) => "class",
            NodeRef::Method { .. } => "method",
            NodeRef::Property { .. } => "property",
            NodeRef::Function(_) => "function",
            NodeRef::Parameter { .. } => "parameter",
        }
    }

    fn name(&self) -> &str {
        match self {
            NodeRef::Class(class) => &class.name,
            NodeRef::Method { method, .. } => method.name(),
            NodeRef::Property { property, .. } => &property.name,
            NodeRef::Function(function) => &function.name,
            NodeRef::Parameter { function, position } => &function.params[*position].name,
        }
    }

    fn function(&self) -> Option<&Arc<FunctionDecl>> {
        match self {
            NodeRef::Method { method, .. } => Some(&method.function),
            NodeRef::Function(function) => Some(function),
            _ => None,
        }
    }
}

/// The value of a default that needs no evaluation, null otherwise.
fn plain_default(default: Option<Arc<Expression>>) -> Value {
    match default.as_deref() {
        Some(Expression::Constant(value)) => value.clone(),
        Some(Expression::Literal(literal)) => match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        },
        _ => Value::Null,
    }
}

impl HostObject for NodeRef {
    fn type_name(&self) -> &str {
        "Node"
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        match (self, name) {
            (_, "kind") => Some(self.kind().into()),
            (_, "name") => Some(self.name().into()),
            (NodeRef::Class(class), "parent") => Some(class.extends.clone().map(Value::from).unwrap_or_default()),
            (NodeRef::Method { class, .. } | NodeRef::Property { class, .. }, "class") => {
                Some(class.name.clone().into())
            }
            (NodeRef::Method { method, .. }, "static") => Some(method.modifiers.is_static.into()),
            (NodeRef::Property { property, .. }, "static") => Some(property.modifiers.is_static.into()),
            (NodeRef::Property { property, .. }, "default") => Some(plain_default(property.default.get())),
            (NodeRef::Parameter { function, position }, "default") => {
                Some(plain_default(function.params[*position].default.get()))
            }
            (_, "paramCount") => self
                .function()
                .map(|function| Value::Int(function.params.len() as i64)),
            (_, "params") => self.function().map(|function| {
                Value::array(
                    (0..function.params.len())
                        .map(|position| {
                            Value::Any(Arc::new(NodeRef::Parameter {
                                function: function.clone(),
                                position,
                            }))
                        })
                        .collect(),
                )
            }),
            _ => None,
        }
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), ExecutionErrorKind> {
        match (self, name) {
            (NodeRef::Property { class, property, vm }, "default") => {
                property.default.set(Expression::Constant(value.clone()));
                // Static defaults were evaluated when the class loaded.
                if property.modifiers.is_static {
                    if let Some(statics) = vm.statics(&class.name) {
                        let unset = statics.get(&property.name).map_or(true, |current| current.is_null());
                        if unset {
                            statics.insert(property.name.clone(), value);
                        }
                    }
                }
                Ok(())
            }
            (NodeRef::Parameter { function, position }, "default") => {
                function.params[*position]
                    .default
                    .set(Expression::Constant(value));
                Ok(())
            }
            _ => Err(ExecutionErrorKind::ReadOnlyProperty {
                type_name: self.kind().to_string(),
                property: name.to_string(),
            }),
        }
    }
}

pub(crate) fn process_class(ctx: &Context, class: &Arc<ClassStmt>) -> Result<(), Control> {
    for annotation in &class.annotations {
        apply(ctx, annotation, class.name.clone(), NodeRef::Class(class.clone()))?;
    }

    for property in &class.properties {
        for annotation in &property.annotations {
            let target = NodeRef::Property {
                class: class.clone(),
                property: property.clone(),
                vm: ctx.vm().clone(),
            };
            apply(ctx, annotation, format!("{}::${}", class.name, property.name), target)?;
        }
    }

    let mut methods: Vec<_> = class.methods.values().collect();
    methods.sort_by(|a, b| a.name().cmp(b.name()));
    for method in methods {
        for annotation in &method.function.annotations {
            let target = NodeRef::Method {
                class: class.clone(),
                method: method.clone(),
            };
            apply(ctx, annotation, format!("{}::{}", class.name, method.name()), target)?;
        }
    }
    Ok(())
}

pub(crate) fn process_function(ctx: &Context, function: &Arc<FunctionDecl>) -> Result<(), Control> {
    for annotation in &function.annotations {
        apply(ctx, annotation, function.name.clone(), NodeRef::Function(function.clone()))?;
    }
    Ok(())
}

fn apply(ctx: &Context, annotation: &Annotation, path: String, target: NodeRef) -> Result<(), Control> {
    instantiate_annotation(ctx, annotation, path, target).map_err(|control| control.at(&annotation.span))
}

fn instantiate_annotation(
    ctx: &Context,
    annotation: &Annotation,
    path: String,
    target: NodeRef,
) -> Result<(), Control> {
    let vm = ctx.vm();
    let class = vm
        .class(&annotation.name)
        .ok_or_else(|| ExecutionErrorKind::UndefinedClass(annotation.name.clone()))?;
    let is_macro = instance_of(vm, &class, MACRO);
    if !is_macro && !instance_of(vm, &class, FEATURE) {
        return Err(ExecutionErrorKind::NotAnAnnotation(annotation.name.clone()).into());
    }

    let mut args = EvaluatedArgs::evaluate(ctx, &annotation.arguments)?;
    if is_macro {
        let position = find_method(vm, &class, CONSTRUCTOR).and_then(|(constructor, _)| {
            constructor
                .function
                .params
                .iter()
                .position(|param| param.name == "target")
        });
        let position =
            position.ok_or_else(|| ExecutionErrorKind::MissingTarget(annotation.name.clone()))?;
        args = args.with_argument_at(position, "target", Value::Any(Arc::new(target)));
    }

    let instance = instantiate(ctx, &class, args)?;
    if let Value::Instance(receiver) = &instance {
        if let Some((process, owner)) = find_method(vm, &receiver.class, "process") {
            call_method(ctx, &process, Some(receiver.clone()), owner, EvaluatedArgs::default())?;
        }
    }

    tracing::debug!(annotation = %annotation.name, %path, is_macro, "applied annotation");
    vm.record_annotation(path, instance);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn property_nodes_expose_defaults() {
        let vm = Vm::new();
        let property = Arc::new(Property::new("limit").with_default(Expression::int(10)));
        let node = NodeRef::Property {
            class: Arc::new(ClassStmt::new("Query")),
            property: property.clone(),
            vm,
        };
        assert_eq!(node.get_property("kind").unwrap().to_string(), "property");
        assert_eq!(node.get_property("default").unwrap().to_string(), "10");
        node.set_property("default", Value::Int(25)).unwrap();
        assert_eq!(node.get_property("default").unwrap().to_string(), "25");
        assert!(matches!(
            node.set_property("name", "other".into()),
            Err(ExecutionErrorKind::ReadOnlyProperty { .. })
        ));
    }

    #[test]
    fn function_nodes_list_parameters() {
        let function = Arc::new(FunctionDecl::new(
            "greet",
            vec![crate::ast::Parameter::new("name", 0), crate::ast::Parameter::new("greeting", 1)],
            vec![],
            2,
        ));
        let node = NodeRef::Function(function);
        assert_eq!(node.get_property("paramCount").unwrap().to_string(), "2");
        let Some(Value::Array(params)) = node.get_property("params") else {
            panic!("expected parameter nodes");
        };
        let second = params.read()[1].clone();
        let Value::Any(second) = second else {
            panic!("expected a node");
        };
        assert_eq!(second.get_property("name").unwrap().to_string(), "greeting");
        second.set_property("default", "hello".into()).unwrap();
        assert_eq!(second.get_property("default").unwrap().to_string(), "hello");
    }
}
