//! Scoped access to archive containers.

use std::cell::Cell;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::RuntimeError;
use crate::root::ResourceRoot;

/// Largest up-front buffer for an entry; bigger entries grow while reading.
const MAX_READ_HINT: usize = 1 << 20;

thread_local! {
    static OPEN_HANDLES: Cell<usize> = const { Cell::new(0) };
}

/// Number of archive handles currently open on this thread.
pub fn open_archive_handles() -> usize {
    OPEN_HANDLES.with(Cell::get)
}

/// An open archive, closed when dropped.
pub(crate) struct ArchiveHandle {
    archive: ZipArchive<File>,
    root: String,
}

impl ArchiveHandle {
    pub(crate) fn open(root: &ResourceRoot, container: &Path) -> Result<Self, RuntimeError> {
        let file = File::open(container).map_err(|e| RuntimeError::root_unavailable(root, e))?;
        let archive = ZipArchive::new(file).map_err(|e| RuntimeError::root_unavailable(root, e))?;
        OPEN_HANDLES.with(|count| count.set(count.get() + 1));
        Ok(Self {
            archive,
            root: root.to_string(),
        })
    }

    pub(crate) fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    /// Read one entry; `Ok(None)` when the archive has no such entry.
    pub(crate) fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, RuntimeError> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(RuntimeError::root_unavailable(&self.root, e)),
        };
        if entry.is_dir() {
            return Ok(None);
        }
        let mut bytes = Vec::with_capacity(capacity_hint(entry.size()));
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| RuntimeError::root_unavailable(&self.root, format!("{name}: {e}")))?;
        Ok(Some(bytes))
    }
}

/// Buffer size for an entry whose header declares `declared` bytes.
fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared).map_or(MAX_READ_HINT, |size| size.min(MAX_READ_HINT))
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        OPEN_HANDLES.with(|count| count.set(count.get().saturating_sub(1)));
    }
}
