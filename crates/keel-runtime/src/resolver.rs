//! Turning a possibly-unqualified name into a loaded module.

use std::fmt;
use std::sync::Arc;

use keel_bytecode::UNIT_SUFFIX;
use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::loader::{LoadedModule, LoaderContext};
use crate::locator::{Locator, ResolvedResource};
use crate::name::SymbolicName;

/// Produces the names to try for a located unit, most preferred first.
pub trait NameReconstruction: Send + Sync {
    fn candidates(&self, resource: &ResolvedResource) -> Vec<SymbolicName>;
}

/// Guess a module's name from where its unit was found.
///
/// In an archive the path below the offset is the namespace, so there is a
/// single candidate. In a directory the root may sit above the real namespace
/// root, so leading segments are dropped one at a time:
/// `a/b/c/Foo.kbc` yields `a.b.c.Foo`, `b.c.Foo`, `c.Foo`, `Foo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressiveStripping;

impl NameReconstruction for ProgressiveStripping {
    fn candidates(&self, resource: &ResolvedResource) -> Vec<SymbolicName> {
        let Some(full) = SymbolicName::from_resource_path(&resource.relative_path, UNIT_SUFFIX)
        else {
            return Vec::new();
        };
        if resource.from_archive() {
            return vec![full];
        }
        std::iter::successors(Some(full), SymbolicName::strip_leading).collect()
    }
}

/// Resolves an entry name against a loader context.
pub struct EntryResolver {
    locator: Locator,
    reconstruction: Box<dyn NameReconstruction>,
}

impl EntryResolver {
    pub fn new(locator: Locator) -> Self {
        Self::with_reconstruction(locator, ProgressiveStripping)
    }

    pub fn with_reconstruction(
        locator: Locator,
        reconstruction: impl NameReconstruction + 'static,
    ) -> Self {
        Self {
            locator,
            reconstruction: Box::new(reconstruction),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Resolve `name` through `context`.
    ///
    /// The name is first tried as given. If that does not resolve, units named
    /// after its last segment are searched for on the context's own roots and
    /// the first match is used to reconstruct candidate names.
    /// `RootUnavailable` aborts resolution at any point.
    pub fn resolve(
        &self,
        name: &str,
        context: &Arc<LoaderContext>,
    ) -> Result<LoadedModule, RuntimeError> {
        let name = SymbolicName::parse(name)?;
        match context.resolve_module(&name) {
            Ok(module) => {
                debug!(name = %name, origin = module.origin(), "Resolved name as given");
                return Ok(module);
            }
            Err(RuntimeError::Resolution { reason, .. }) => {
                trace!(name = %name, %reason, "Direct resolution failed, searching roots");
            }
            Err(err) => return Err(err),
        }

        let located = self
            .locator
            .locate(context.roots(), name.simple_name(), UNIT_SUFFIX)?;
        let Some(first) = located.first() else {
            return Err(RuntimeError::resolution(
                &name,
                format!("no '{}{}' on any root", name.simple_name(), UNIT_SUFFIX),
            ));
        };
        if located.len() > 1 {
            debug!(
                name = %name,
                count = located.len(),
                chosen = %first.url,
                "Several units match, using the first"
            );
        }

        let mut last_failure = None;
        for candidate in self.reconstruction.candidates(first) {
            match context.resolve_module(&candidate) {
                Ok(module) => {
                    debug!(name = %name, resolved = %candidate, origin = module.origin(), "Resolved by reconstruction");
                    return Ok(module);
                }
                Err(err @ RuntimeError::Resolution { .. }) => {
                    trace!(candidate = %candidate, error = %err, "Candidate rejected");
                    last_failure = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let detail = last_failure
            .map(|err| format!(" ({err})"))
            .unwrap_or_default();
        Err(RuntimeError::resolution(
            &name,
            format!("unable to load a module from {}{}", first.url, detail),
        ))
    }
}

impl Default for EntryResolver {
    fn default() -> Self {
        Self::new(Locator::default())
    }
}

impl fmt::Debug for EntryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryResolver")
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}
