//! Keel runtime: locating, loading and running modules.
//!
//! A run goes through four stages:
//!
//! 1. [`Locator`] finds units by simple name across directory and archive roots
//! 2. [`LoaderContext`] turns names into [`LoadedModule`]s from its own roots,
//!    optionally delegating to a parent
//! 3. [`EntryResolver`] accepts unqualified names and reconstructs the
//!    qualified one from where the unit was found
//! 4. [`Invoker`] runs the module's `main` and reports the failure the logic
//!    raised, unchanged
//!
//! [`Bootstrap`] ties them together behind a per-run isolated context.

mod archive;
pub mod bootstrap;
pub mod console;
pub mod error;
mod interpreter;
pub mod invoker;
pub mod loader;
pub mod locator;
pub mod name;
pub mod native;
pub mod resolver;
pub mod root;

pub use archive::open_archive_handles;
pub use bootstrap::{active_context, Bootstrap, BootstrapOptions};
pub use console::{Captured, Console};
pub use error::{Failure, RuntimeError};
pub use interpreter::{VmFault, INDEX_OUT_OF_BOUNDS, MAX_CALL_DEPTH};
pub use invoker::{EntryPoint, Invoker, PANIC_KIND};
pub use loader::{
    ContextId, Delegation, LoadedModule, LoaderContext, LoaderContextBuilder, ModuleBody, PATH_ENV,
};
pub use locator::{Locator, ResolvedResource, ScanPolicy};
pub use name::SymbolicName;
pub use native::{NativeCall, NativeFunction, NativeModule, NativeRegistry};
pub use resolver::{EntryResolver, NameReconstruction, ProgressiveStripping};
pub use root::{parse_path_list, ResourceRoot};
