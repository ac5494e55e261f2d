//! Finding units by simple name across a list of roots.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::archive::ArchiveHandle;
use crate::error::RuntimeError;
use crate::root::ResourceRoot;

/// A unit found under a particular root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub root: ResourceRoot,
    /// Path relative to the root (or to the archive offset), `/`-separated.
    pub relative_path: String,
    pub url: String,
}

impl ResolvedResource {
    fn new(root: &ResourceRoot, relative_path: String) -> Self {
        let url = root.url_for(&relative_path);
        Self {
            root: root.clone(),
            relative_path,
            url,
        }
    }

    pub fn from_archive(&self) -> bool {
        self.root.is_archive()
    }
}

/// What to do when a root cannot be read during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPolicy {
    /// Abort the scan with `RootUnavailable`.
    #[default]
    FailFast,
    /// Skip the root and report all skipped roots once at the end.
    SkipUnavailable,
}

/// Scans roots for units whose file name is `<simple name><suffix>`.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    policy: ScanPolicy,
}

impl Locator {
    pub fn new(policy: ScanPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ScanPolicy {
        self.policy
    }

    /// Find every unit named `<simple_name><suffix>` in any subdirectory of any root.
    ///
    /// Matches are grouped by root in root order; within a root they come in
    /// a stable, name-sorted order. A match must sit on a path-segment
    /// boundary, so `Tool` never matches `MyTool.kbc`. A directory root that
    /// does not exist contributes nothing. Symlinked directories are
    /// followed, each real directory at most once. Archive entries whose path
    /// would leave the offset (`..`, `.`, empty segments) are ignored.
    pub fn locate(
        &self,
        roots: &[ResourceRoot],
        simple_name: &str,
        suffix: &str,
    ) -> Result<Vec<ResolvedResource>, RuntimeError> {
        let target = format!("{simple_name}{suffix}");
        let mut matches = Vec::new();
        let mut skipped = Vec::new();

        for root in roots {
            let found = match root {
                ResourceRoot::Directory { path } => locate_in_directory(root, path, &target),
                ResourceRoot::Archive { container, offset } => {
                    locate_in_archive(root, container, offset, &target)
                }
            };
            match found {
                Ok(mut found) => {
                    trace!(root = %root, count = found.len(), "Scanned root");
                    matches.append(&mut found);
                }
                Err(RuntimeError::RootUnavailable { root, reason })
                    if self.policy == ScanPolicy::SkipUnavailable =>
                {
                    debug!(%root, %reason, "Skipping unreadable root");
                    skipped.push(root);
                }
                Err(e) => return Err(e),
            }
        }

        if !skipped.is_empty() {
            warn!(
                "Skipped {} unreadable root(s) while looking for {}: {}",
                skipped.len(),
                target,
                skipped.join(", ")
            );
        }
        debug!(target = %target, count = matches.len(), "Located units");
        Ok(matches)
    }
}

/// `relative` stays below its root: no leading `/`, no empty, `.` or `..` segment.
pub(crate) fn is_contained(relative: &str) -> bool {
    relative
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// `relative` names the target file and the match starts a path segment.
pub(crate) fn matches_simple_name(relative: &str, target: &str) -> bool {
    relative
        .strip_suffix(target)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('/'))
}

fn locate_in_directory(
    root: &ResourceRoot,
    base: &Path,
    target: &str,
) -> Result<Vec<ResolvedResource>, RuntimeError> {
    if !base.exists() {
        trace!(root = %root, "Directory root does not exist");
        return Ok(Vec::new());
    }
    let mut walk = DirectoryWalk {
        root,
        target,
        visited: FxHashSet::default(),
        found: Vec::new(),
    };
    walk.enter(base)?;
    walk.visit(base, "")?;
    Ok(walk.found)
}

/// State of one recursive directory scan.
struct DirectoryWalk<'a> {
    root: &'a ResourceRoot,
    target: &'a str,
    /// Canonical paths of directories already scanned.
    visited: FxHashSet<PathBuf>,
    found: Vec<ResolvedResource>,
}

impl DirectoryWalk<'_> {
    fn unavailable(&self, path: &Path, e: io::Error) -> RuntimeError {
        RuntimeError::root_unavailable(self.root, format!("{}: {}", path.display(), e))
    }

    /// Record `dir` as scanned; false when it was reached before.
    fn enter(&mut self, dir: &Path) -> Result<bool, RuntimeError> {
        let canonical = fs::canonicalize(dir).map_err(|e| self.unavailable(dir, e))?;
        Ok(self.visited.insert(canonical))
    }

    fn visit(&mut self, dir: &Path, prefix: &str) -> Result<(), RuntimeError> {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| self.unavailable(dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.unavailable(dir, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                trace!(root = %self.root, path = %path.display(), "Skipping non-UTF-8 file name");
                continue;
            };
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            // follows symlinks
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(root = %self.root, path = %path.display(), "Skipping dangling link");
                    continue;
                }
                Err(e) => return Err(self.unavailable(&path, e)),
            };
            if metadata.is_dir() {
                if self.enter(&path)? {
                    self.visit(&path, &relative)?;
                } else {
                    trace!(root = %self.root, path = %path.display(), "Directory already scanned");
                }
            } else if metadata.is_file() && matches_simple_name(&relative, self.target) {
                self.found.push(ResolvedResource::new(self.root, relative));
            }
        }
        Ok(())
    }
}

fn locate_in_archive(
    root: &ResourceRoot,
    container: &Path,
    offset: &str,
    target: &str,
) -> Result<Vec<ResolvedResource>, RuntimeError> {
    let archive = ArchiveHandle::open(root, container)?;
    let mut relative: Vec<&str> = archive
        .entry_names()
        .filter(|entry| !entry.ends_with('/'))
        .filter_map(|entry| entry.strip_prefix(offset))
        .filter(|relative| matches_simple_name(relative, target))
        .filter(|relative| {
            let contained = is_contained(relative);
            if !contained {
                trace!(root = %root, entry = *relative, "Ignoring entry outside the offset");
            }
            contained
        })
        .collect();
    relative.sort_unstable();
    Ok(relative
        .into_iter()
        .map(|relative| ResolvedResource::new(root, relative.to_string()))
        .collect())
}
