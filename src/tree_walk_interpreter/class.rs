use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{ClassRef, ClassStmt, Method, Modifiers, Property, TypeHint, Visibility};

use super::{
    callable::{call_method, EvaluatedArgs},
    context::Context,
    Control, Eval, ExecutionErrorKind, Instance, Value, Vm,
};

/// Methods a class must provide for `foreach` to drive it.
const ITERATOR_METHODS: [&str; 5] = ["rewind", "valid", "current", "key", "next"];

pub const CONSTRUCTOR: &str = "__construct";

pub(crate) fn superclass(vm: &Vm, class: &ClassStmt) -> Option<Arc<ClassStmt>> {
    class.extends.as_deref().and_then(|name| vm.class(name))
}

/// `class` followed by its parents, nearest first. Stops at an unknown
/// parent or a cycle.
pub(crate) fn ancestors(vm: &Vm, class: &Arc<ClassStmt>) -> Vec<Arc<ClassStmt>> {
    let mut seen = FxHashSet::default();
    let mut chain = Vec::new();
    let mut current = Some(class.clone());
    while let Some(class) = current {
        if !seen.insert(class.name.clone()) {
            break;
        }
        current = superclass(vm, &class);
        chain.push(class);
    }
    chain
}

/// The method and the class declaring it.
pub(crate) fn find_method(
    vm: &Vm,
    class: &Arc<ClassStmt>,
    name: &str,
) -> Option<(Arc<Method>, Arc<ClassStmt>)> {
    ancestors(vm, class)
        .into_iter()
        .find_map(|class| class.methods.get(name).cloned().map(|method| (method, class)))
}

pub(crate) fn find_property(
    vm: &Vm,
    class: &Arc<ClassStmt>,
    name: &str,
) -> Option<(Arc<Property>, Arc<ClassStmt>)> {
    ancestors(vm, class)
        .into_iter()
        .find_map(|class| class.find_property(name).cloned().map(|property| (property, class)))
}

/// Name-to-parameter-count table of every method `class` can be called with.
fn method_arities(vm: &Vm, class: &Arc<ClassStmt>) -> FxHashMap<String, usize> {
    let mut arities = FxHashMap::default();
    for class in ancestors(vm, class) {
        for (name, method) in &class.methods {
            arities
                .entry(name.clone())
                .or_insert(method.function.params.len());
        }
    }
    arities
}

fn interface_arities(vm: &Vm, name: &str, arities: &mut FxHashMap<String, usize>, seen: &mut FxHashSet<String>) {
    if !seen.insert(name.to_string()) {
        return;
    }
    let Some(interface) = vm.interface(name) else {
        return;
    };
    for method in &interface.methods {
        arities.entry(method.name.clone()).or_insert(method.param_count);
    }
    for parent in &interface.extends {
        interface_arities(vm, parent, arities, seen);
    }
}

fn interface_extends(vm: &Vm, name: &str, target: &str, seen: &mut FxHashSet<String>) -> bool {
    if name == target {
        return true;
    }
    if !seen.insert(name.to_string()) {
        return false;
    }
    vm.interface(name).is_some_and(|interface| {
        interface
            .extends
            .iter()
            .any(|parent| interface_extends(vm, parent, target, seen))
    })
}

/// Nominal check: the extends chain and, at every level, the implemented
/// interfaces and the interfaces they extend.
pub fn instance_of(vm: &Vm, class: &Arc<ClassStmt>, target: &str) -> bool {
    let mut seen = FxHashSet::default();
    ancestors(vm, class).iter().any(|class| {
        class.name == target
            || class
                .implements
                .iter()
                .any(|interface| interface_extends(vm, interface, target, &mut seen))
    })
}

pub fn value_instance_of(vm: &Vm, value: &Value, target: &str) -> bool {
    match value {
        Value::Instance(instance) => instance_of(vm, &instance.class, target),
        Value::Error(_) => matches!(target, "Error" | "Throwable"),
        _ => false,
    }
}

/// Structural check: `value`'s class offers every method of `target` with
/// the same parameter count. Constructors are not compared.
pub fn is_like(vm: &Vm, value: &Value, target: &str) -> bool {
    let Value::Instance(instance) = value else {
        return false;
    };

    let required = match vm.class(target) {
        Some(class) => method_arities(vm, &class),
        None if vm.interface(target).is_some() => {
            let mut arities = FxHashMap::default();
            interface_arities(vm, target, &mut arities, &mut FxHashSet::default());
            arities
        }
        None => return false,
    };

    let available = method_arities(vm, &instance.class);
    required
        .iter()
        .filter(|(name, _)| name.as_str() != CONSTRUCTOR)
        .all(|(name, count)| available.get(name) == Some(count))
}

pub(crate) fn is_iterator(vm: &Vm, class: &Arc<ClassStmt>) -> bool {
    ITERATOR_METHODS
        .iter()
        .all(|name| find_method(vm, class, name).is_some())
}

/// Replaces a type parameter of the current class by its bound class.
pub(crate) fn resolve_type_name(ctx: &Context, name: &str) -> String {
    ctx.class()
        .and_then(|class| class.binding(name))
        .unwrap_or(name)
        .to_string()
}

fn lookup(vm: &Vm, name: &str) -> Result<Arc<ClassStmt>, Control> {
    if let Some(class) = vm.class(name) {
        return Ok(class);
    }
    if vm.interface(name).is_some() {
        return Err(ExecutionErrorKind::InterfaceInstantiation(name.to_string()).into());
    }
    Err(ExecutionErrorKind::UndefinedClass(name.to_string()).into())
}

pub(crate) fn resolve(ctx: &Context, class_ref: &ClassRef) -> Result<Arc<ClassStmt>, Control> {
    let vm = ctx.vm();
    match class_ref {
        ClassRef::Named(name) => lookup(vm, &resolve_type_name(ctx, name)),
        ClassRef::TypeParameter(name) => {
            let concrete = ctx
                .class()
                .and_then(|class| class.binding(name))
                .ok_or_else(|| ExecutionErrorKind::UnboundTypeParameter(name.clone()))?;
            lookup(vm, concrete)
        }
        ClassRef::Generic(name, args) => {
            let template = lookup(vm, name)?;
            let args = args.iter().map(|arg| resolve_type_name(ctx, arg)).collect();
            Ok(vm.specialize(&template, args)?)
        }
        ClassRef::SelfClass => ctx
            .class()
            .cloned()
            .ok_or_else(|| ExecutionErrorKind::OutsideClass("self").into()),
        ClassRef::StaticClass => ctx
            .this()
            .map(|instance| instance.class.clone())
            .or_else(|| ctx.class().cloned())
            .ok_or_else(|| ExecutionErrorKind::OutsideClass("static").into()),
        ClassRef::Parent => {
            let class = ctx
                .class()
                .ok_or(ExecutionErrorKind::OutsideClass("parent"))?;
            superclass(vm, class)
                .ok_or_else(|| ExecutionErrorKind::NoParentClass(class.name.clone()).into())
        }
    }
}

pub(crate) fn type_matches(ctx: &Context, ty: &TypeHint, value: &Value) -> bool {
    match ty {
        TypeHint::Mixed => true,
        TypeHint::Int => matches!(value, Value::Int(_)),
        TypeHint::Float => matches!(value, Value::Float(_) | Value::Int(_)),
        TypeHint::String => matches!(value, Value::String(_)),
        TypeHint::Bool => matches!(value, Value::Bool(_)),
        TypeHint::Array => matches!(value, Value::Array(_)),
        TypeHint::Object => matches!(value, Value::Object(_) | Value::Instance(_) | Value::Any(_)),
        TypeHint::Callable => matches!(value, Value::Function(_)),
        TypeHint::Nullable(inner) => value.is_null() || type_matches(ctx, inner, value),
        TypeHint::Class(name) => value_instance_of(ctx.vm(), value, &resolve_type_name(ctx, name)),
        TypeHint::Generic(name) => match ctx.class().and_then(|class| class.binding(name)) {
            Some(concrete) => value_instance_of(ctx.vm(), value, concrete),
            None => true,
        },
    }
}

/// Whether code running in `ctx` may touch a member of `owner`.
pub(crate) fn check_access(
    ctx: &Context,
    owner: &Arc<ClassStmt>,
    modifiers: &Modifiers,
    member: impl FnOnce() -> String,
) -> Result<(), Control> {
    let current = ctx.class();
    match modifiers.visibility {
        Visibility::Public => Ok(()),
        Visibility::Private if current.is_some_and(|class| class.name == owner.name) => Ok(()),
        Visibility::Private => Err(ExecutionErrorKind::PrivateMember(member()).into()),
        Visibility::Protected
            if current.is_some_and(|class| {
                instance_of(ctx.vm(), class, &owner.name) || instance_of(ctx.vm(), owner, &class.name)
            }) =>
        {
            Ok(())
        }
        Visibility::Protected => Err(ExecutionErrorKind::ProtectedMember(member()).into()),
    }
}

/// `new Class(args)`.
pub(crate) fn instantiate(ctx: &Context, class: &Arc<ClassStmt>, args: EvaluatedArgs) -> Eval {
    if class.is_abstract {
        return Err(ExecutionErrorKind::AbstractInstantiation(class.name.clone()).into());
    }
    if class.is_generic() && class.bindings.is_empty() {
        return Err(ExecutionErrorKind::GenericArity {
            class: class.name.clone(),
            expected: class.generics.len(),
            given: 0,
        }
        .into());
    }

    let instance = Arc::new(Instance::new(class.clone()));
    for class in ancestors(ctx.vm(), class) {
        materialize(ctx, &class, &instance)?;
    }

    match find_method(ctx.vm(), class, CONSTRUCTOR) {
        Some((constructor, owner)) => {
            check_access(ctx, &owner, &constructor.modifiers, || {
                format!("{}::{CONSTRUCTOR}", owner.name)
            })?;
            call_method(ctx, &constructor, Some(instance.clone()), owner, args)?;
        }
        None if !args.is_empty() => {
            return Err(ExecutionErrorKind::TooManyArguments {
                function: format!("{}::{CONSTRUCTOR}", class.name),
                expected: 0,
                given: args.len(),
            }
            .into())
        }
        None => {}
    }

    Ok(Value::Instance(instance))
}

/// Applies the property defaults declared by `class` that are not set on
/// `instance` yet. Defaults see `$this`.
fn materialize(ctx: &Context, class: &Arc<ClassStmt>, instance: &Arc<Instance>) -> Result<(), Control> {
    let bound = Context::for_class(ctx.vm().clone(), Some(instance.clone()), class.clone());
    for property in class.properties.iter().filter(|p| !p.modifiers.is_static) {
        if instance.has(&property.name) {
            continue;
        }
        let value = match property.default.get() {
            Some(default) => default.evaluate(&bound)?,
            None => Value::Null,
        };
        instance.set(&property.name, value);
    }
    Ok(())
}

/// `parent::name(args)`: runs the parent's member against the current
/// receiver with the current class rebound to the declaring class.
pub(crate) fn parent_call(ctx: &Context, name: &str, args: EvaluatedArgs) -> Eval {
    let class = ctx.class().ok_or(ExecutionErrorKind::ParentOutsideMethod)?;
    let parent = superclass(ctx.vm(), class)
        .ok_or_else(|| ExecutionErrorKind::NoParentClass(class.name.clone()))?;
    let (method, owner) = find_method(ctx.vm(), &parent, name).ok_or_else(|| {
        ExecutionErrorKind::ParentMethodMissing {
            class: parent.name.clone(),
            method: name.to_string(),
        }
    })?;
    if method.modifiers.visibility == Visibility::Private {
        return Err(ExecutionErrorKind::PrivateMember(format!("{}::{name}", owner.name)).into());
    }
    call_method(ctx, &method, ctx.this().cloned(), owner, args)
}

/// `Class::name(args)`. A non-static method keeps the current receiver when
/// it belongs to the same hierarchy.
pub(crate) fn static_call(ctx: &Context, class: &Arc<ClassStmt>, name: &str, args: EvaluatedArgs) -> Eval {
    let (method, owner) = find_method(ctx.vm(), class, name)
        .ok_or_else(|| ExecutionErrorKind::UndefinedMethod(format!("{}::{name}", class.name)))?;
    check_access(ctx, &owner, &method.modifiers, || format!("{}::{name}", owner.name))?;

    let receiver = if method.modifiers.is_static {
        None
    } else {
        ctx.this()
            .filter(|this| instance_of(ctx.vm(), &this.class, &owner.name))
            .cloned()
    };
    call_method(ctx, &method, receiver, owner, args)
}

/// Finds the class in the chain whose static store holds `name`.
fn static_owner(vm: &Vm, class: &Arc<ClassStmt>, name: &str) -> Option<Arc<ClassStmt>> {
    ancestors(vm, class).into_iter().find(|class| {
        vm.statics(&class.name)
            .is_some_and(|statics| statics.contains_key(name))
    })
}

pub(crate) fn get_static(ctx: &Context, class: &Arc<ClassStmt>, name: &str) -> Eval {
    let vm = ctx.vm();
    let owner = static_owner(vm, class, name)
        .ok_or_else(|| ExecutionErrorKind::UndefinedProperty(format!("{}::${name}", class.name)))?;
    if let Some(property) = owner.find_property(name) {
        check_access(ctx, &owner, &property.modifiers, || format!("{}::${name}", owner.name))?;
    }
    Ok(vm
        .statics(&owner.name)
        .and_then(|statics| statics.get(name).map(|value| value.value().clone()))
        .unwrap_or_default())
}

/// Last writer wins.
pub(crate) fn set_static(ctx: &Context, class: &Arc<ClassStmt>, name: &str, value: Value) -> Eval {
    let vm = ctx.vm();
    let owner = static_owner(vm, class, name).unwrap_or_else(|| class.clone());
    if let Some(property) = owner.find_property(name) {
        check_access(ctx, &owner, &property.modifiers, || format!("{}::${name}", owner.name))?;
    }
    let statics = vm
        .statics(&owner.name)
        .ok_or_else(|| ExecutionErrorKind::UndefinedClass(owner.name.clone()))?;
    statics.insert(name.to_string(), value.clone());
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{FunctionDecl, InterfaceStmt, Parameter};

    fn method(name: &str, params: usize) -> Method {
        let params = (0..params).map(|i| Parameter::new(format!("p{i}"), i)).collect();
        Method::new(FunctionDecl::new(name, params, vec![], 0))
    }

    fn vm() -> Vm {
        let vm = Vm::new();
        vm.install_interface(InterfaceStmt::new("Named").method("name", 0));
        vm.install_interface(InterfaceStmt::new("Entity").extends("Named").method("id", 0));
        vm.install_class(
            ClassStmt::new("Model")
                .implements("Entity")
                .method(method("id", 0))
                .method(method("name", 0)),
        );
        vm.install_class(ClassStmt::new("User").extends("Model").method(method("save", 1)));
        vm.install_class(
            ClassStmt::new("Robot")
                .method(method("id", 0))
                .method(method("name", 0))
                .method(method("save", 1)),
        );
        vm
    }

    fn instance(vm: &Vm, name: &str) -> Value {
        Value::Instance(Arc::new(Instance::new(vm.class(name).unwrap())))
    }

    #[test]
    fn nominal_checks_walk_the_hierarchy() {
        let vm = vm();
        let user = vm.class("User").unwrap();
        assert!(instance_of(&vm, &user, "User"));
        assert!(instance_of(&vm, &user, "Model"));
        assert!(instance_of(&vm, &user, "Entity"));
        assert!(instance_of(&vm, &user, "Named"));
        assert!(!instance_of(&vm, &user, "Robot"));
        assert!(!instance_of(&vm, &user, "Missing"));
    }

    #[test]
    fn structural_checks_ignore_declarations() {
        let vm = vm();
        let robot = instance(&vm, "Robot");
        assert!(!value_instance_of(&vm, &robot, "User"));
        assert!(is_like(&vm, &robot, "User"));
        assert!(is_like(&vm, &robot, "Entity"));
        assert!(!is_like(&vm, &instance(&vm, "Model"), "User"));
        assert!(!is_like(&vm, &Value::Int(1), "User"));
    }

    #[test]
    fn methods_are_found_on_parents() {
        let vm = vm();
        let user = vm.class("User").unwrap();
        let (_, owner) = find_method(&vm, &user, "id").unwrap();
        assert_eq!(owner.name, "Model");
        assert!(find_method(&vm, &user, "missing").is_none());
        assert!(!is_iterator(&vm, &user));
    }

    #[test]
    fn inheritance_cycles_terminate() {
        let vm = Vm::new();
        vm.install_class(ClassStmt::new("A").extends("B"));
        vm.install_class(ClassStmt::new("B").extends("A"));
        let a = vm.class("A").unwrap();
        assert_eq!(ancestors(&vm, &a).len(), 2);
        assert!(!instance_of(&vm, &a, "C"));
    }
}
