//! Running a named module in a fresh isolated context.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::console::Console;
use crate::error::RuntimeError;
use crate::invoker::Invoker;
use crate::loader::{Delegation, LoaderContext};
use crate::locator::{Locator, ScanPolicy};
use crate::resolver::{EntryResolver, NameReconstruction};
use crate::root::ResourceRoot;

thread_local! {
    static ACTIVE_CONTEXT: RefCell<Option<Arc<LoaderContext>>> = const { RefCell::new(None) };
}

/// The context installed for the module currently running on this thread.
pub fn active_context() -> Option<Arc<LoaderContext>> {
    ACTIVE_CONTEXT.with(|slot| slot.borrow().clone())
}

/// Installs a context in the active slot and puts the previous one back on drop.
struct ActiveContextScope {
    previous: Option<Arc<LoaderContext>>,
}

impl ActiveContextScope {
    fn install(context: Arc<LoaderContext>) -> Self {
        let previous = ACTIVE_CONTEXT.with(|slot| slot.replace(Some(context)));
        Self { previous }
    }
}

impl Drop for ActiveContextScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_CONTEXT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Knobs for a [`Bootstrap`].
#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions {
    pub scan_policy: ScanPolicy,
    /// Verify units before definition.
    pub verify: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            scan_policy: ScanPolicy::FailFast,
            verify: true,
        }
    }
}

/// Builds an isolated context per run, resolves the entry name, and invokes it.
#[derive(Debug)]
pub struct Bootstrap {
    host: Arc<LoaderContext>,
    resolver: EntryResolver,
    invoker: Invoker,
    options: BootstrapOptions,
}

impl Bootstrap {
    pub fn new(host: Arc<LoaderContext>) -> Self {
        Self::with_options(host, BootstrapOptions::default())
    }

    pub fn with_options(host: Arc<LoaderContext>, options: BootstrapOptions) -> Self {
        Self {
            host,
            resolver: EntryResolver::new(Locator::new(options.scan_policy)),
            invoker: Invoker::default(),
            options,
        }
    }

    /// A bootstrap whose host is [`LoaderContext::system`].
    pub fn system(options: BootstrapOptions) -> Self {
        Self::with_options(LoaderContext::system(), options)
    }

    pub fn console(mut self, console: Console) -> Self {
        self.invoker = Invoker::new(console);
        self
    }

    pub fn reconstruction(mut self, reconstruction: impl NameReconstruction + 'static) -> Self {
        self.resolver =
            EntryResolver::with_reconstruction(Locator::new(self.options.scan_policy), reconstruction);
        self
    }

    pub fn host(&self) -> &Arc<LoaderContext> {
        &self.host
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Run `name` from `roots` with `args`.
    ///
    /// The new context delegates to the host. It is installed as the active
    /// context for the duration of the run, and the previous value is restored
    /// on every exit path.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub fn run(
        &self,
        roots: Vec<ResourceRoot>,
        name: &str,
        args: &[String],
    ) -> Result<(), RuntimeError> {
        for root in &roots {
            debug!("root: {}", root);
        }
        let context = LoaderContext::builder(roots)
            .parent(Arc::clone(&self.host))
            .delegation(Delegation::DelegateToParent)
            .scan_policy(self.options.scan_policy)
            .verify(self.options.verify)
            .build();

        let _scope = ActiveContextScope::install(Arc::clone(&context));
        let module = self.resolver.resolve(name, &context)?;
        self.invoker.invoke(&module, args)
    }
}
