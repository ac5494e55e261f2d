//! Modules implemented in Rust.
//!
//! A context consults its native registry before any root, so a native
//! module shadows a unit of the same name on that context's roots.

use std::fmt;
use std::sync::Arc;

use keel_bytecode::{Signature, ENTRY_FUNCTION};
use rustc_hash::FxHashMap;

use crate::bootstrap::active_context;
use crate::console::Console;
use crate::error::Failure;
use crate::interpreter::check_depth;
use crate::invoker;
use crate::loader::LoaderContext;
use crate::locator::Locator;
use crate::resolver::EntryResolver;

/// Body of a native function.
pub type NativeFn = dyn Fn(&mut NativeCall<'_>, &[String]) -> Result<(), Failure> + Send + Sync;

/// What a native function can reach while it runs.
pub struct NativeCall<'a> {
    console: &'a Console,
    context: &'a Arc<LoaderContext>,
    depth: usize,
}

impl<'a> NativeCall<'a> {
    pub(crate) fn new(console: &'a Console, context: &'a Arc<LoaderContext>, depth: usize) -> Self {
        Self {
            console,
            context,
            depth,
        }
    }

    pub fn console(&self) -> &Console {
        self.console
    }

    /// The context that defined the module being run.
    pub fn context(&self) -> &Arc<LoaderContext> {
        self.context
    }

    /// Call nesting of this function; 0 when it is the entry of a run.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Print a line, turning an I/O error into a failure.
    pub fn println(&self, line: &str) -> Result<(), Failure> {
        self.console
            .println(line)
            .map_err(|e| Failure::new("IoError", e.to_string()))
    }
}

/// A named function exported by a native module.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub signature: Signature,
    pub public: bool,
    body: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, signature: Signature, public: bool, body: F) -> Self
    where
        F: Fn(&mut NativeCall<'_>, &[String]) -> Result<(), Failure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            public,
            body: Arc::new(body),
        }
    }

    pub(crate) fn call(&self, call: &mut NativeCall<'_>, args: &[String]) -> Result<(), Failure> {
        (self.body)(call, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct NativeModule {
    name: String,
    functions: Vec<NativeFunction>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a public function with the entry signature.
    pub fn register_function<F>(&mut self, name: impl Into<String>, body: F)
    where
        F: Fn(&mut NativeCall<'_>, &[String]) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.register(NativeFunction::new(name, Signature::entry(), true, body));
    }

    /// Register a function, replacing any earlier one with the same name.
    pub fn register(&mut self, function: NativeFunction) {
        self.functions.retain(|existing| existing.name != function.name);
        self.functions.push(function);
    }

    pub fn function(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[NativeFunction] {
        &self.functions
    }
}

/// Native modules by symbolic name.
#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    modules: FxHashMap<String, Arc<NativeModule>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: NativeModule) {
        self.modules.insert(module.name.clone(), Arc::new(module));
    }

    pub fn get(&self, name: &str) -> Option<Arc<NativeModule>> {
        self.modules.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Modules every system host provides.
///
/// - `keel.lang.Echo` prints its arguments joined by single spaces.
/// - `keel.lang.Launch` resolves its first argument through the active
///   context and runs it with the remaining arguments.
pub fn builtins() -> NativeRegistry {
    let mut echo = NativeModule::new("keel.lang.Echo");
    echo.register_function(ENTRY_FUNCTION, |call, args| call.println(&args.join(" ")));

    let mut launch = NativeModule::new("keel.lang.Launch");
    launch.register_function(ENTRY_FUNCTION, |call, args| {
        let Some((target, rest)) = args.split_first() else {
            return Err(Failure::new("UsageError", "expected a module name"));
        };
        let depth = call.depth() + 1;
        check_depth(depth)?;
        let context = active_context().unwrap_or_else(|| Arc::clone(call.context()));
        let module = EntryResolver::new(Locator::new(context.scan_policy())).resolve(target, &context)?;
        invoker::lookup(&module, ENTRY_FUNCTION, call.console(), depth)?.run(rest)
    });

    let mut registry = NativeRegistry::new();
    registry.insert(echo);
    registry.insert(launch);
    registry
}
