use std::sync::Arc;

use parking_lot::RwLock;

use super::{Control, ExecutionErrorKind, Instance, Value, Vm};
use crate::ast::ClassStmt;

/// How a new activation relates to the one creating it.
pub enum Binding {
    /// A plain function call.
    None,
    /// A method call. Static methods have no receiver.
    Method {
        receiver: Option<Arc<Instance>>,
        class: Arc<ClassStmt>,
    },
    /// A closure invocation; receiver and class come from `scope`.
    Enclosed(Context),
}

struct Frame {
    vm: Vm,
    slots: RwLock<Vec<Value>>,
    parent: Option<Context>,
    receiver: Option<Arc<Instance>>,
    class: Option<Arc<ClassStmt>>,
    depth: usize,
}

/// One activation: indexed variable slots plus the `$this`/class binding.
/// Cloning shares the same slots.
#[derive(Clone)]
pub struct Context(Arc<Frame>);

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("slots", &self.0.slots.read().len())
            .field("class", &self.0.class.as_ref().map(|class| class.display_name()))
            .field("depth", &self.0.depth)
            .finish()
    }
}

impl Context {
    pub fn root(vm: Vm, var_count: usize) -> Self {
        Self(Arc::new(Frame {
            vm,
            slots: RwLock::new(vec![Value::Null; var_count]),
            parent: None,
            receiver: None,
            class: None,
            depth: 0,
        }))
    }

    /// A top-level context bound to `class`, used for static defaults.
    pub(crate) fn for_class(vm: Vm, receiver: Option<Arc<Instance>>, class: Arc<ClassStmt>) -> Self {
        Self(Arc::new(Frame {
            vm,
            slots: RwLock::new(Vec::new()),
            parent: None,
            receiver,
            class: Some(class),
            depth: 0,
        }))
    }

    /// A child activation with `var_count` fresh slots.
    pub fn enter(&self, var_count: usize, binding: Binding) -> Result<Context, Control> {
        let depth = self.0.depth + 1;
        if depth > self.0.vm.config().max_call_depth {
            return Err(ExecutionErrorKind::CallDepthExceeded.into());
        }

        let (parent, receiver, class) = match binding {
            Binding::None => (self.clone(), None, None),
            Binding::Method { receiver, class } => (self.clone(), receiver, Some(class)),
            Binding::Enclosed(scope) => {
                let receiver = scope.0.receiver.clone();
                let class = scope.0.class.clone();
                (scope, receiver, class)
            }
        };

        Ok(Self(Arc::new(Frame {
            vm: self.0.vm.clone(),
            slots: RwLock::new(vec![Value::Null; var_count]),
            parent: Some(parent),
            receiver,
            class,
            depth,
        })))
    }

    pub fn vm(&self) -> &Vm {
        &self.0.vm
    }

    pub fn parent(&self) -> Option<&Context> {
        self.0.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Missing slots read as null.
    pub fn get(&self, index: usize) -> Value {
        self.0.slots.read().get(index).cloned().unwrap_or_default()
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut slots = self.0.slots.write();
        if index >= slots.len() {
            slots.resize(index + 1, Value::Null);
        }
        slots[index] = value;
    }

    pub fn this(&self) -> Option<&Arc<Instance>> {
        self.0.receiver.as_ref()
    }

    pub fn class(&self) -> Option<&Arc<ClassStmt>> {
        self.0.class.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree_walk_interpreter::EngineConfig;

    #[test]
    fn slots_grow_on_write() {
        let ctx = Context::root(Vm::new(), 1);
        assert!(ctx.get(3).is_null());
        ctx.set(3, Value::Int(7));
        assert!(matches!(ctx.get(3), Value::Int(7)));
        assert!(ctx.get(1).is_null());
    }

    #[test]
    fn closures_inherit_binding() {
        let class = Arc::new(ClassStmt::new("Counter"));
        let receiver = Arc::new(Instance::new(class.clone()));
        let ctx = Context::root(Vm::new(), 0);
        let method = ctx
            .enter(
                2,
                Binding::Method {
                    receiver: Some(receiver.clone()),
                    class,
                },
            )
            .unwrap();
        let closure = ctx.enter(1, Binding::Enclosed(method.clone())).unwrap();
        assert!(Arc::ptr_eq(closure.this().unwrap(), &receiver));
        assert_eq!(closure.class().unwrap().name, "Counter");
        assert!(ctx.enter(0, Binding::None).unwrap().this().is_none());
    }

    #[test]
    fn depth_is_bounded() {
        let vm = Vm::with_config(EngineConfig {
            max_call_depth: 3,
            ..EngineConfig::default()
        });
        let mut ctx = Context::root(vm, 0);
        for _ in 0..3 {
            ctx = ctx.enter(0, Binding::None).unwrap();
        }
        assert_eq!(ctx.depth(), 3);
        assert!(ctx.enter(0, Binding::None).is_err());
    }
}
