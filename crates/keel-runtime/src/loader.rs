//! Loader contexts: scoped sets of roots that turn names into modules.

use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keel_bytecode::{verify_module, Module, UNIT_SUFFIX};
use tracing::{debug, trace, warn};

use crate::archive::ArchiveHandle;
use crate::error::RuntimeError;
use crate::locator::ScanPolicy;
use crate::name::SymbolicName;
use crate::native::{self, NativeModule, NativeRegistry};
use crate::root::{parse_path_list, ResourceRoot};

/// Environment variable holding the system host's search list.
pub const PATH_ENV: &str = "KEEL_PATH";

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a loader context within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Where a context looks after its own roots come up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delegation {
    /// Only the context's own natives and roots.
    #[default]
    Isolated,
    /// Fall back to the parent context.
    DelegateToParent,
}

/// The loaded form of a module.
#[derive(Debug, Clone)]
pub enum ModuleBody {
    Bytecode(Arc<Module>),
    Native(Arc<NativeModule>),
}

/// A module bound to the context that defined it.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    name: SymbolicName,
    origin: String,
    body: ModuleBody,
    context: Arc<LoaderContext>,
}

impl LoadedModule {
    pub fn name(&self) -> &SymbolicName {
        &self.name
    }

    /// Unit location, or `native:<name>` for native modules.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn body(&self) -> &ModuleBody {
        &self.body
    }

    /// The defining context; names the module refers to resolve through it.
    pub fn context(&self) -> &Arc<LoaderContext> {
        &self.context
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, ModuleBody::Native(_))
    }
}

/// A scoped set of roots plus natives, optionally backed by a parent.
///
/// Modules found through a context's own natives or roots are defined by that
/// context; a module reached through delegation is defined by the parent.
#[derive(Debug)]
pub struct LoaderContext {
    id: ContextId,
    roots: Vec<ResourceRoot>,
    natives: NativeRegistry,
    parent: Option<Arc<LoaderContext>>,
    delegation: Delegation,
    scan_policy: ScanPolicy,
    verify: bool,
}

/// Builder for [`LoaderContext`].
#[derive(Debug)]
pub struct LoaderContextBuilder {
    roots: Vec<ResourceRoot>,
    natives: NativeRegistry,
    parent: Option<Arc<LoaderContext>>,
    delegation: Delegation,
    scan_policy: ScanPolicy,
    verify: bool,
}

impl LoaderContextBuilder {
    pub fn natives(mut self, natives: NativeRegistry) -> Self {
        self.natives = natives;
        self
    }

    pub fn parent(mut self, parent: Arc<LoaderContext>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn delegation(mut self, delegation: Delegation) -> Self {
        self.delegation = delegation;
        self
    }

    /// How unreadable roots are treated during own lookup (default: fail fast).
    pub fn scan_policy(mut self, policy: ScanPolicy) -> Self {
        self.scan_policy = policy;
        self
    }

    /// Whether decoded units are verified before definition (default: true).
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn build(self) -> Arc<LoaderContext> {
        let context = LoaderContext {
            id: ContextId::next(),
            roots: self.roots,
            natives: self.natives,
            parent: self.parent,
            delegation: self.delegation,
            scan_policy: self.scan_policy,
            verify: self.verify,
        };
        debug!(
            id = %context.id,
            roots = context.roots.len(),
            natives = context.natives.len(),
            delegation = ?context.delegation,
            "Created loader context"
        );
        Arc::new(context)
    }
}

impl LoaderContext {
    pub fn builder(roots: Vec<ResourceRoot>) -> LoaderContextBuilder {
        LoaderContextBuilder {
            roots,
            natives: NativeRegistry::default(),
            parent: None,
            delegation: Delegation::Isolated,
            scan_policy: ScanPolicy::FailFast,
            verify: true,
        }
    }

    /// A parentless host context.
    pub fn host(natives: NativeRegistry, roots: Vec<ResourceRoot>) -> Arc<Self> {
        Self::builder(roots).natives(natives).build()
    }

    /// The process host: built-in natives plus the roots listed in `KEEL_PATH`.
    pub fn system() -> Arc<Self> {
        let roots = env::var_os(PATH_ENV)
            .map(|list| parse_path_list(&list))
            .unwrap_or_default();
        Self::host(native::builtins(), roots)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn roots(&self) -> &[ResourceRoot] {
        &self.roots
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn parent(&self) -> Option<&Arc<LoaderContext>> {
        self.parent.as_ref()
    }

    pub fn delegation(&self) -> Delegation {
        self.delegation
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        self.scan_policy
    }

    /// Load `name`, consulting the parent only when the own lookup fails.
    ///
    /// `RootUnavailable` is never turned into delegation; under
    /// [`ScanPolicy::SkipUnavailable`] the unreadable root is skipped instead.
    /// When both the own lookup and the parent fail to resolve, a defect found
    /// locally (bad unit, wrong declared name) is reported in preference to
    /// the parent's error.
    pub fn resolve_module(
        self: &Arc<Self>,
        name: &SymbolicName,
    ) -> Result<LoadedModule, RuntimeError> {
        let own_failure = match self.find_own(name) {
            Ok(Some(module)) => return Ok(module),
            Ok(None) => None,
            Err(err @ RuntimeError::Resolution { .. }) => Some(err),
            Err(err) => return Err(err),
        };

        match (self.delegation, &self.parent) {
            (Delegation::DelegateToParent, Some(parent)) => {
                trace!(id = %self.id, parent = %parent.id, name = %name, "Delegating to parent");
                match (parent.resolve_module(name), own_failure) {
                    (Err(RuntimeError::Resolution { .. }), Some(own)) => Err(own),
                    (result, _) => result,
                }
            }
            _ => Err(own_failure.unwrap_or_else(|| {
                RuntimeError::resolution(
                    name,
                    format!("not found in {} root(s) of {}", self.roots.len(), self.id),
                )
            })),
        }
    }

    fn find_own(
        self: &Arc<Self>,
        name: &SymbolicName,
    ) -> Result<Option<LoadedModule>, RuntimeError> {
        if let Some(native) = self.natives.get(name.as_str()) {
            trace!(id = %self.id, name = %name, "Found native module");
            return Ok(Some(LoadedModule {
                name: name.clone(),
                origin: format!("native:{name}"),
                body: ModuleBody::Native(native),
                context: Arc::clone(self),
            }));
        }

        let path = name.resource_path(UNIT_SUFFIX);
        for root in &self.roots {
            match read_unit(root, &path) {
                Ok(Some((bytes, origin))) => return self.define(name, &bytes, origin).map(Some),
                Ok(None) => {}
                Err(RuntimeError::RootUnavailable { root, reason })
                    if self.scan_policy == ScanPolicy::SkipUnavailable =>
                {
                    warn!(id = %self.id, %root, %reason, "Skipping unreadable root while loading {}", name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn define(
        self: &Arc<Self>,
        name: &SymbolicName,
        bytes: &[u8],
        origin: String,
    ) -> Result<LoadedModule, RuntimeError> {
        let module = Module::decode(bytes)
            .map_err(|e| RuntimeError::resolution(name, format!("{origin}: {e}")))?;
        if self.verify {
            verify_module(&module)
                .map_err(|e| RuntimeError::resolution(name, format!("{origin}: {e}")))?;
        }
        if module.name() != name.as_str() {
            return Err(RuntimeError::resolution(
                name,
                format!("{origin} declares module '{}' (wrong name)", module.name()),
            ));
        }

        debug!(id = %self.id, name = %name, origin = %origin, "Defined module");
        Ok(LoadedModule {
            name: name.clone(),
            origin,
            body: ModuleBody::Bytecode(Arc::new(module)),
            context: Arc::clone(self),
        })
    }
}

/// Read the unit at `path` under `root`, with its location string.
fn read_unit(root: &ResourceRoot, path: &str) -> Result<Option<(Vec<u8>, String)>, RuntimeError> {
    match root {
        ResourceRoot::Directory { path: base } => {
            let file: PathBuf = path.split('/').fold(base.clone(), |acc, part| acc.join(part));
            if !file.is_file() {
                return Ok(None);
            }
            let bytes = fs::read(&file).map_err(|e| {
                RuntimeError::root_unavailable(root, format!("{}: {}", file.display(), e))
            })?;
            Ok(Some((bytes, root.url_for(path))))
        }
        ResourceRoot::Archive { container, offset } => {
            let mut archive = ArchiveHandle::open(root, container)?;
            let bytes = archive.read(&format!("{offset}{path}"))?;
            Ok(bytes.map(|bytes| (bytes, root.url_for(path))))
        }
    }
}
