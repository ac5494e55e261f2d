//! Finding and running a module's entry function.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use keel_bytecode::{Module, Signature, ENTRY_FUNCTION};
use tracing::debug;

use crate::console::Console;
use crate::error::{Failure, RuntimeError};
use crate::interpreter::Interpreter;
use crate::loader::{LoadedModule, ModuleBody};
use crate::native::{NativeCall, NativeFunction};

/// Failure kind for a panic escaping the invoked logic.
pub const PANIC_KIND: &str = "Panic";

/// A callable entry: the capability to run one function of a loaded module.
pub trait EntryPoint {
    fn module(&self) -> &LoadedModule;

    fn signature(&self) -> &Signature;

    /// Run with `args`; on failure, return the failure the logic raised.
    fn run(&self, args: &[String]) -> Result<(), Failure>;
}

struct BytecodeEntry {
    module: LoadedModule,
    unit: Arc<Module>,
    index: usize,
    console: Console,
    depth: usize,
}

impl EntryPoint for BytecodeEntry {
    fn module(&self) -> &LoadedModule {
        &self.module
    }

    fn signature(&self) -> &Signature {
        &self.unit.functions[self.index].signature
    }

    fn run(&self, args: &[String]) -> Result<(), Failure> {
        let function = &self.unit.functions[self.index];
        let interpreter = Interpreter::new(&self.console, self.depth);
        catch_panic(|| {
            interpreter
                .execute(&self.module, &self.unit, function, args)
                .map_err(Failure::from)
        })
    }
}

struct NativeEntry {
    module: LoadedModule,
    function: NativeFunction,
    console: Console,
    depth: usize,
}

impl EntryPoint for NativeEntry {
    fn module(&self) -> &LoadedModule {
        &self.module
    }

    fn signature(&self) -> &Signature {
        &self.function.signature
    }

    fn run(&self, args: &[String]) -> Result<(), Failure> {
        let mut call = NativeCall::new(&self.console, self.module.context(), self.depth);
        catch_panic(|| self.function.call(&mut call, args))
    }
}

/// Turn a panic in `body` into a `Panic` failure.
fn catch_panic<F>(body: F) -> Result<(), Failure>
where
    F: FnOnce() -> Result<(), Failure>,
{
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Err(Failure::new(PANIC_KIND, message))
    })
}

/// Look up `function` on `module` as an entry: public, `(StrArray) -> Void`.
pub(crate) fn lookup(
    module: &LoadedModule,
    function: &str,
    console: &Console,
    depth: usize,
) -> Result<Box<dyn EntryPoint>, RuntimeError> {
    let missing = || RuntimeError::entry_not_found(module.name(), format!("no function '{function}'"));
    let check = |public: bool, signature: &Signature| {
        if !public {
            return Err(RuntimeError::entry_not_found(
                module.name(),
                format!("function '{function}' is not public"),
            ));
        }
        if !signature.is_entry() {
            return Err(RuntimeError::entry_not_found(
                module.name(),
                format!(
                    "function '{function}' has signature {signature}, expected {}",
                    Signature::entry()
                ),
            ));
        }
        Ok(())
    };

    match module.body() {
        ModuleBody::Bytecode(unit) => {
            let index = unit
                .functions
                .iter()
                .position(|f| f.name == function)
                .ok_or_else(missing)?;
            let found = &unit.functions[index];
            check(found.is_public(), &found.signature)?;
            Ok(Box::new(BytecodeEntry {
                module: module.clone(),
                unit: Arc::clone(unit),
                index,
                console: console.clone(),
                depth,
            }))
        }
        ModuleBody::Native(native) => {
            let found = native.function(function).ok_or_else(missing)?;
            check(found.public, &found.signature)?;
            Ok(Box::new(NativeEntry {
                module: module.clone(),
                function: found.clone(),
                console: console.clone(),
                depth,
            }))
        }
    }
}

/// Runs the entry function of loaded modules.
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    console: Console,
}

impl Invoker {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// The module's `main` entry, without running it.
    pub fn entry_point(&self, module: &LoadedModule) -> Result<Box<dyn EntryPoint>, RuntimeError> {
        lookup(module, ENTRY_FUNCTION, &self.console, 0)
    }

    /// Run the module's `main` with `args`.
    ///
    /// A failure raised by the logic comes back as `Invocation` carrying that
    /// failure unchanged.
    pub fn invoke(&self, module: &LoadedModule, args: &[String]) -> Result<(), RuntimeError> {
        let entry = self.entry_point(module)?;
        debug!(module = %module.name(), origin = module.origin(), args = args.len(), "Invoking entry");
        entry.run(args).map_err(RuntimeError::Invocation)
    }
}
