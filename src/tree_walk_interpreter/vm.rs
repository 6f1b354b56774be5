use std::{
    any::Any,
    io::Write,
    num::NonZeroUsize,
    panic::AssertUnwindSafe,
    sync::{Arc, OnceLock},
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{
    annotation,
    callable::{Callable, NativeFn},
    class, Context, Control, Eval, ExecutionError, ExecutionErrorKind, Fault, Value,
};
use crate::ast::{ClassStmt, FunctionDecl, InterfaceStmt, Program, Statement, StatementKind};

/// Engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Nested calls allowed before "maximum call depth exceeded" is thrown.
    pub max_call_depth: usize,
    /// Worker threads shared by every `spawn` of one engine.
    pub spawn_threads: usize,
    /// Initial stack size of the `spawn` workers.
    pub spawn_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            spawn_threads: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            spawn_stack_size: 8 * 1024 * 1024,
        }
    }
}

pub type FaultSink = Arc<dyn Fn(&Fault) + Send + Sync>;

/// A class together with its static property store. Specializations of a
/// generic class share the store of their template.
struct ClassEntry {
    class: Arc<ClassStmt>,
    statics: Arc<DashMap<String, Value>>,
}

struct VmInner {
    config: EngineConfig,
    classes: DashMap<String, ClassEntry>,
    interfaces: DashMap<String, Arc<InterfaceStmt>>,
    functions: DashMap<String, Arc<Callable>>,
    /// Keyed by `Name<Arg, ...>`.
    specializations: DashMap<String, Arc<ClassStmt>>,
    annotations: DashMap<String, Vec<Value>>,
    /// Started by the first `spawn`.
    tasks: OnceLock<rayon::ThreadPool>,
    fault_sink: RwLock<FaultSink>,
    output: Mutex<Box<dyn Write + Send>>,
}

/// Registries and entry points shared by every context of one program.
#[derive(Clone)]
pub struct Vm(Arc<VmInner>);

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.0.config)
            .field("classes", &self.0.classes.len())
            .field("functions", &self.0.functions.len())
            .finish()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let vm = Self(Arc::new(VmInner {
            config,
            classes: DashMap::new(),
            interfaces: DashMap::new(),
            functions: DashMap::new(),
            specializations: DashMap::new(),
            annotations: DashMap::new(),
            tasks: OnceLock::new(),
            fault_sink: RwLock::new(Arc::new(|fault: &Fault| {
                tracing::error!(error = %fault.message, span = ?fault.span, "uncaught exception");
            })),
            output: Mutex::new(Box::new(std::io::stdout())),
        }));
        super::prelude::install(&vm);
        vm
    }

    pub fn config(&self) -> &EngineConfig {
        &self.0.config
    }

    /// Redirect `echo` output.
    pub fn set_output(&self, writer: impl Write + Send + 'static) {
        *self.0.output.lock() = Box::new(writer);
    }

    pub fn set_fault_sink(&self, sink: impl Fn(&Fault) + Send + Sync + 'static) {
        *self.0.fault_sink.write() = Arc::new(sink);
    }

    /// Expose a host function to scripts under `name`.
    pub fn register_function(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Context, Vec<Value>) -> Eval + Send + Sync + 'static,
    ) {
        let name = name.into();
        let f: NativeFn = Arc::new(f);
        self.0
            .functions
            .insert(name.clone(), Arc::new(Callable::Native { name, f }));
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassStmt>> {
        self.0.classes.get(name).map(|entry| entry.class.clone())
    }

    pub fn interface(&self, name: &str) -> Option<Arc<InterfaceStmt>> {
        self.0.interfaces.get(name).map(|entry| entry.value().clone())
    }

    pub fn function(&self, name: &str) -> Option<Arc<Callable>> {
        self.0.functions.get(name).map(|entry| entry.value().clone())
    }

    /// Annotation instances recorded for a declaration path such as
    /// `User`, `User::save`, `User::$name` or `helper`.
    pub fn annotations(&self, path: &str) -> Vec<Value> {
        self.0
            .annotations
            .get(path)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn record_annotation(&self, path: String, instance: Value) {
        self.0.annotations.entry(path).or_default().push(instance);
    }

    pub(crate) fn statics(&self, class: &str) -> Option<Arc<DashMap<String, Value>>> {
        self.0.classes.get(class).map(|entry| entry.statics.clone())
    }

    /// The specialization of `template` for `args`, built on first use.
    pub(crate) fn specialize(
        &self,
        template: &Arc<ClassStmt>,
        args: Vec<String>,
    ) -> Result<Arc<ClassStmt>, ExecutionErrorKind> {
        if template.generics.len() != args.len() {
            return Err(ExecutionErrorKind::GenericArity {
                class: template.name.clone(),
                expected: template.generics.len(),
                given: args.len(),
            });
        }

        let key = format!("{}<{}>", template.name, args.join(", "));
        if let Some(specialized) = self.0.specializations.get(&key) {
            return Ok(specialized.value().clone());
        }

        let bindings = template.generics.iter().cloned().zip(args).collect();
        let specialized = Arc::new(template.specialize(bindings));
        tracing::debug!(class = %key, "specialized generic class");
        Ok(self
            .0
            .specializations
            .entry(key)
            .or_insert(specialized)
            .value()
            .clone())
    }

    pub(crate) fn write(&self, text: &str) -> Result<(), ExecutionErrorKind> {
        let mut output = self.0.output.lock();
        output.write_all(text.as_bytes())?;
        output.flush()?;
        Ok(())
    }

    pub fn report(&self, fault: &Fault) {
        let sink = self.0.fault_sink.read().clone();
        sink(fault);
    }

    /// Registers every top-level declaration of `program`: interfaces
    /// first, then classes and functions, then static defaults and
    /// annotations.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn load(&self, program: &Program) -> Result<(), ExecutionError> {
        let ctx = Context::root(self.clone(), program.var_count);
        self.load_in(&ctx, program).map_err(|control| self.uncaught(control))
    }

    /// Loads and executes `program`. A top-level `return` ends it early with
    /// its value.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&self, program: &Program) -> Result<Value, ExecutionError> {
        let ctx = Context::root(self.clone(), program.var_count);
        let result = self.load_in(&ctx, program).and_then(|()| {
            for statement in &program.statements {
                statement.evaluate(&ctx)?;
            }
            Ok(Value::Null)
        });

        match result {
            Ok(value) | Err(Control::Return(value)) => Ok(value),
            Err(control) => Err(self.uncaught(control)),
        }
    }

    fn uncaught(&self, control: Control) -> ExecutionError {
        let fault = fault_of(control);
        self.report(&fault);
        fault.into()
    }

    fn load_in(&self, ctx: &Context, program: &Program) -> Result<(), Control> {
        let declarations = || program.statements.iter().map(|statement| (&statement.kind, statement));

        for (kind, statement) in declarations() {
            if let StatementKind::Interface(interface) = kind {
                self.register_interface(interface).map_err(|e| Control::from(e).at(&statement.span))?;
            }
        }

        let mut classes = Vec::new();
        for (kind, statement) in declarations() {
            if let StatementKind::Class(class) = kind {
                if self.register_class(class).map_err(|e| Control::from(e).at(&statement.span))? {
                    classes.push(class.clone());
                }
            }
        }

        let mut functions = Vec::new();
        for (kind, statement) in declarations() {
            if let StatementKind::Function(function) = kind {
                if self
                    .register_function_decl(function)
                    .map_err(|e| Control::from(e).at(&statement.span))?
                {
                    functions.push(function.clone());
                }
            }
        }

        for class in &classes {
            self.initialize_class(class)?;
        }
        for class in &classes {
            annotation::process_class(ctx, class)?;
        }
        for function in &functions {
            annotation::process_function(ctx, function)?;
        }

        tracing::debug!(
            classes = classes.len(),
            functions = functions.len(),
            "loaded declarations"
        );
        Ok(())
    }

    /// Runtime counterpart of [`Vm::load`] for a single declaration. Already
    /// registered declarations are left alone.
    pub(crate) fn declare(&self, ctx: &Context, kind: &StatementKind) -> Result<(), Control> {
        match kind {
            StatementKind::Interface(interface) => {
                self.register_interface(interface)?;
            }
            StatementKind::Class(class) => {
                if self.register_class(class)? {
                    self.initialize_class(class)?;
                    annotation::process_class(ctx, class)?;
                }
            }
            StatementKind::Function(function) => {
                if self.register_function_decl(function)? {
                    annotation::process_function(ctx, function)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn register_interface(&self, interface: &Arc<InterfaceStmt>) -> Result<bool, ExecutionErrorKind> {
        if let Some(existing) = self.0.interfaces.get(&interface.name) {
            return if Arc::ptr_eq(existing.value(), interface) {
                Ok(false)
            } else {
                Err(ExecutionErrorKind::ClassRedeclaration(interface.name.clone()))
            };
        }
        if self.0.classes.contains_key(&interface.name) {
            return Err(ExecutionErrorKind::ClassRedeclaration(interface.name.clone()));
        }
        tracing::debug!(interface = %interface.name, "declared interface");
        self.0
            .interfaces
            .insert(interface.name.clone(), interface.clone());
        Ok(true)
    }

    fn register_class(&self, class: &Arc<ClassStmt>) -> Result<bool, ExecutionErrorKind> {
        if let Some(existing) = self.0.classes.get(&class.name) {
            return if Arc::ptr_eq(&existing.class, class) {
                Ok(false)
            } else {
                Err(ExecutionErrorKind::ClassRedeclaration(class.name.clone()))
            };
        }
        if self.0.interfaces.contains_key(&class.name) {
            return Err(ExecutionErrorKind::ClassRedeclaration(class.name.clone()));
        }
        tracing::debug!(class = %class.name, generics = class.generics.len(), "declared class");
        self.0.classes.insert(
            class.name.clone(),
            ClassEntry {
                class: class.clone(),
                statics: Arc::new(DashMap::new()),
            },
        );
        Ok(true)
    }

    pub(crate) fn install_class(&self, class: ClassStmt) {
        self.0.classes.insert(
            class.name.clone(),
            ClassEntry {
                class: Arc::new(class),
                statics: Arc::new(DashMap::new()),
            },
        );
    }

    pub(crate) fn install_interface(&self, interface: InterfaceStmt) {
        self.0
            .interfaces
            .insert(interface.name.clone(), Arc::new(interface));
    }

    fn register_function_decl(&self, function: &Arc<FunctionDecl>) -> Result<bool, ExecutionErrorKind> {
        if let Some(existing) = self.0.functions.get(&function.name) {
            return match existing.value().as_ref() {
                Callable::Function(decl) if Arc::ptr_eq(decl, function) => Ok(false),
                _ => Err(ExecutionErrorKind::FunctionRedeclaration(function.name.clone())),
            };
        }
        tracing::debug!(function = %function.name, "declared function");
        self.0.functions.insert(
            function.name.clone(),
            Arc::new(Callable::Function(function.clone())),
        );
        Ok(true)
    }

    /// Rejects extending a final class and evaluates static defaults.
    fn initialize_class(&self, class: &Arc<ClassStmt>) -> Result<(), Control> {
        if let Some(parent) = class::superclass(self, class) {
            if parent.is_final {
                let error = ExecutionErrorKind::ExtendsFinalClass(
                    class.name.clone(),
                    parent.name.clone(),
                );
                return Err(Control::from(error).at(&class.span));
            }
        }

        let Some(statics) = self.statics(&class.name) else {
            return Ok(());
        };
        let class_ctx = Context::for_class(self.clone(), None, class.clone());
        for property in class.properties.iter().filter(|p| p.modifiers.is_static) {
            let value = match property.default.get() {
                Some(default) => default.evaluate(&class_ctx).map_err(|c| c.at(&class.span))?,
                None => Value::Null,
            };
            statics.insert(property.name.clone(), value);
        }
        Ok(())
    }

    fn task_pool(&self) -> Result<&rayon::ThreadPool, ExecutionErrorKind> {
        if let Some(pool) = self.0.tasks.get() {
            return Ok(pool);
        }
        let config = self.config();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.spawn_threads)
            .stack_size(config.spawn_stack_size)
            .thread_name(|i| format!("zy-spawn-{i}"))
            .build()?;
        tracing::debug!(threads = pool.current_num_threads(), "started task pool");
        // A concurrent first spawn may have won; its pool is used instead.
        Ok(self.0.tasks.get_or_init(|| pool))
    }

    /// Queues `statement` on the engine's task pool. Whatever control
    /// escapes it goes to the fault sink.
    pub(crate) fn spawn(&self, ctx: &Context, statement: Arc<Statement>) -> Result<(), Control> {
        let pool = self.task_pool()?;
        let vm = self.clone();
        let ctx = ctx.clone();
        tracing::trace!(at = %statement.span, "spawning task");

        pool.spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| statement.evaluate(&ctx)));
            let fault = match outcome {
                Ok(Ok(_)) => return,
                Ok(Err(control)) => fault_of(control),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(panic = %message, "spawned task panicked");
                    Fault::new(
                        ExecutionErrorKind::HostFault(message).to_string(),
                        Some(statement.span.clone()),
                    )
                }
            };
            vm.report(&fault);
        });
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Describes a control signal that nothing consumed.
fn fault_of(control: Control) -> Fault {
    match control {
        Control::Throw(Value::Error(error), origin) => {
            Fault::new(error.message(), error.span().cloned().or(origin))
        }
        Control::Throw(Value::Instance(instance), origin) => {
            let name = instance.class.display_name();
            match instance.get("message") {
                Some(message) if !message.is_null() => Fault::new(format!("{name}: {message}"), origin),
                _ => Fault::new(name, origin),
            }
        }
        Control::Throw(value, origin) => Fault::new(value.to_string(), origin),
        Control::Break(_) => Fault::new(
            ExecutionErrorKind::LoopControlOutsideLoop("break").to_string(),
            None,
        ),
        Control::Continue(_) => Fault::new(
            ExecutionErrorKind::LoopControlOutsideLoop("continue").to_string(),
            None,
        ),
        Control::Return(_) => Fault::new("return outside of a function", None),
    }
}

/// A cloneable in-memory writer for [`Vm::set_output`].
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specializations_are_cached() {
        let vm = Vm::new();
        let template = Arc::new(ClassStmt::new("DB").generic("T"));
        let users = vm.specialize(&template, vec!["Users".into()]).unwrap();
        let again = vm.specialize(&template, vec!["Users".into()]).unwrap();
        let orders = vm.specialize(&template, vec!["Orders".into()]).unwrap();
        assert!(Arc::ptr_eq(&users, &again));
        assert!(!Arc::ptr_eq(&users, &orders));
        assert!(matches!(
            vm.specialize(&template, vec![]),
            Err(ExecutionErrorKind::GenericArity { expected: 1, given: 0, .. })
        ));
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }

    #[test]
    fn redeclaration_is_rejected() {
        let vm = Vm::new();
        let first = Arc::new(ClassStmt::new("User"));
        assert!(vm.register_class(&first).unwrap());
        assert!(!vm.register_class(&first).unwrap());
        assert!(matches!(
            vm.register_class(&Arc::new(ClassStmt::new("User"))),
            Err(ExecutionErrorKind::ClassRedeclaration(_))
        ));
    }

    #[test]
    fn spawned_tasks_share_a_bounded_pool() {
        let vm = Vm::with_config(EngineConfig {
            spawn_threads: 2,
            ..EngineConfig::default()
        });
        let (sender, receiver) = std::sync::mpsc::channel();
        let sender = Mutex::new(sender);
        vm.register_function("where", move |_, _| {
            let name = std::thread::current().name().map(str::to_string);
            sender.lock().send(name).unwrap();
            Ok(Value::Null)
        });
        let ctx = Context::root(vm.clone(), 0);
        let task = Arc::new(Statement::from(StatementKind::Expression(
            crate::ast::Expression::call("where", vec![]),
        )));
        for _ in 0..20 {
            vm.spawn(&ctx, task.clone()).unwrap();
        }

        let names: std::collections::BTreeSet<_> = (0..20)
            .map(|_| {
                receiver
                    .recv_timeout(std::time::Duration::from_secs(5))
                    .unwrap()
                    .unwrap_or_default()
            })
            .collect();
        assert!(names.len() <= 2, "{names:?}");
        assert!(names.iter().all(|name| name.starts_with("zy-spawn-")), "{names:?}");
    }
}
