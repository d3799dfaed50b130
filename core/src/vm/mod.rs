//! file: core/src/vm/mod.rs
//! description: the virtual machine front door.
//!
//! A `VM` owns the symbol registry while a program is being assembled
//! (bootstrap classes, core natives, host natives, compiled units). The
//! first `run` freezes the registry and shares it with every execution
//! context, including the ones launched tasks create.

mod arith;
pub mod array;
pub mod bootstrap;
mod compare;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod exception;
mod exec;
pub mod frame;
pub mod generator;
pub mod globals;
mod handlers;
pub mod native;
pub mod object;
mod operands;
pub mod output;
pub mod registry;
pub mod stack;
pub mod stdlib;
pub mod string;
pub mod value;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::ir::function::{CompiledFunction, CompiledUnit};

pub use self::array::{ArrayKey, PhpArray};
pub use self::concurrency::{TaskHandle, WaitGroupHandle};
pub use self::config::RuntimeOptions;
pub use self::context::ExecutionContext;
pub use self::error::{EngineFatal, RegistryError, VmError};
pub use self::exec::is_implemented;
pub use self::frame::CallFrame;
pub use self::native::{CallContext, NativeFn, NativeFunction, NativeMetadata};
pub use self::object::ObjectRef;
pub use self::output::{BufferSink, OutputSink, StdoutSink};
pub use self::registry::Registry;
pub use self::string::PhpString;
pub use self::value::Value;

use self::exec::Exit;

/// Exit status of a script that died on an uncaught exception or a fatal
/// error.
pub const FATAL_EXIT_CODE: i64 = 255;

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Uncaught { class: String, message: String },
    Fatal(String),
}

/// What a finished run leaves behind.
#[derive(Debug)]
pub struct RunSummary {
    pub exit_code: i64,
    /// Defined global variables at the end of the run, in first-use order.
    pub globals: IndexMap<String, Value>,
    pub failure: Option<Failure>,
    pub steps: u64,
}

pub struct VM {
    registry: Arc<Registry>,
    options: Arc<RuntimeOptions>,
    output: Arc<dyn OutputSink>,
    scripts: Vec<Arc<CompiledFunction>>,
}

impl std::fmt::Debug for VM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM").field("registry", &self.registry).field("scripts", &self.scripts.len()).finish()
    }
}

impl VM {
    /// A VM with default options printing to stdout.
    pub fn new() -> Result<Self, RegistryError> {
        VM::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Result<Self, RegistryError> {
        let mut registry = Registry::new();
        bootstrap::install(&mut registry)?;
        stdlib::install(&mut registry)?;
        Ok(VM {
            registry: Arc::new(registry),
            options: Arc::new(options),
            output: Arc::new(StdoutSink),
            scripts: Vec::new(),
        })
    }

    /// Redirect program output.
    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self, what: &str) -> Result<&mut Registry, RegistryError> {
        Arc::get_mut(&mut self.registry).ok_or_else(|| RegistryError::Frozen(what.to_string()))
    }

    /// Make a host function callable from guest code.
    pub fn register_native(&mut self, native: Arc<dyn NativeFunction>) -> Result<(), RegistryError> {
        let what = format!("function {}()", native.name());
        self.registry_mut(&what)?.register_native(native)
    }

    pub fn define_constant(&mut self, name: &str, value: Value) -> Result<(), RegistryError> {
        self.registry_mut(&format!("constant {}", name))?.define_constant(name, value)
    }

    /// Declare a compiled unit's functions and classes and queue its
    /// top-level code for the next `run`.
    pub fn load(&mut self, unit: &CompiledUnit) -> Result<(), RegistryError> {
        self.registry_mut(&format!("unit {}", unit.file))?.declare_unit(unit)?;
        log::debug!("loaded {} ({} functions, {} classes)", unit.file, unit.functions.len(), unit.classes.len());
        self.scripts.push(Arc::clone(&unit.main));
        Ok(())
    }

    fn freeze(&mut self) -> Arc<Registry> {
        if let Some(reg) = Arc::get_mut(&mut self.registry) {
            reg.freeze();
        }
        Arc::clone(&self.registry)
    }

    /// Run every loaded script in order, in one shared global scope.
    /// Uncaught exceptions and fatal errors are reported through the output
    /// sink and end the run.
    pub fn run(&mut self) -> RunSummary {
        let registry = self.freeze();
        let mut ctx = ExecutionContext::new(registry, Arc::clone(&self.options), Arc::clone(&self.output));
        let mut exit_code = 0;
        let mut failure = None;
        for main in std::mem::take(&mut self.scripts) {
            let Err(e) = run_main(&mut ctx, main) else { continue };
            match report(&mut ctx, e) {
                (code, None) => exit_code = code,
                (code, Some(f)) => {
                    exit_code = code;
                    failure = Some(f);
                }
            }
            break;
        }
        self.output.flush();
        let summary = RunSummary { exit_code, globals: ctx.globals.snapshot(), failure, steps: ctx.steps };
        ctx.reset();
        summary
    }
}

fn run_main(ctx: &mut ExecutionContext, main: Arc<CompiledFunction>) -> Result<(), VmError> {
    log::debug!("running {}", main.file);
    let frame = CallFrame::main(main, &mut ctx.globals);
    let base = ctx.stack.len();
    ctx.stack.push(frame)?;
    match ctx.run_frames(base)? {
        Exit::Returned(_) => Ok(()),
        Exit::Suspended(..) => Err(EngineFatal::StackCorruption("top-level code suspended".into()).into()),
    }
}

/// Print the end-of-run diagnostic for `e` and pick the exit status.
fn report(ctx: &mut ExecutionContext, e: VmError) -> (i64, Option<Failure>) {
    let exc = match e {
        VmError::Exit(code) => return (code, None),
        VmError::Thrown(exc) => exc,
        VmError::Raise { class, message } => match ctx.create_exception(&class, &message) {
            Ok(exc) => exc,
            Err(e) => return fatal(ctx, &e.to_string()),
        },
        VmError::Fatal(f) => return fatal(ctx, &f.to_string()),
    };
    let class = exc.class().name.clone();
    let message = match exc.get_prop("message").flatten() {
        Some(Value::String(s)) => s.to_string_lossy().into_owned(),
        _ => String::new(),
    };
    log::error!("uncaught {}: {}", class, message);
    ctx.echo_bytes(exception::uncaught_report(&exc).as_bytes());
    (FATAL_EXIT_CODE, Some(Failure::Uncaught { class, message }))
}

fn fatal(ctx: &mut ExecutionContext, diagnostic: &str) -> (i64, Option<Failure>) {
    log::error!("fatal: {}", diagnostic);
    ctx.echo_bytes(format!("PHP Fatal error:  {}\n", diagnostic).as_bytes());
    (FATAL_EXIT_CODE, Some(Failure::Fatal(diagnostic.to_string())))
}

/// Compile-and-run convenience for a single unit.
pub fn run_unit(unit: &CompiledUnit, options: RuntimeOptions, output: Arc<dyn OutputSink>) -> Result<RunSummary, RegistryError> {
    let mut vm = VM::with_options(options)?.with_output(output);
    vm.load(unit)?;
    Ok(vm.run())
}
