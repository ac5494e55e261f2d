//! Resource roots: the directories and archives a context searches.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// File extensions recognised as archive containers.
pub const ARCHIVE_EXTENSIONS: [&str; 3] = ["zip", "kar", "jar"];

/// Marker separating an archive path from its internal offset.
const OFFSET_MARKER: &str = "!/";

/// One entry of a search list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRoot {
    /// A directory tree; unit paths are relative to `path`.
    Directory { path: PathBuf },
    /// A zip container; unit paths are relative to `offset` inside it.
    ///
    /// `offset` is either empty or ends with `/`.
    Archive { container: PathBuf, offset: String },
}

impl ResourceRoot {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory { path: path.into() }
    }

    /// An archive root; the offset is normalised (`/lib` and `lib/` are the same).
    pub fn archive(container: impl Into<PathBuf>, offset: &str) -> Self {
        Self::Archive {
            container: container.into(),
            offset: normalize_offset(offset),
        }
    }

    /// Parse the textual form used on the command line and in `KEEL_PATH`.
    ///
    /// - `tools.zip!/lib` is an archive with offset `lib/`
    /// - `tools.zip` (or `.kar`, `.jar`) is an archive with an empty offset
    /// - anything else is a directory
    pub fn parse(spec: &str) -> Self {
        if let Some((container, offset)) = spec.split_once(OFFSET_MARKER) {
            return Self::archive(container, offset);
        }
        if let Some(container) = spec.strip_suffix('!') {
            return Self::archive(container, "");
        }
        if has_archive_extension(Path::new(spec)) {
            return Self::archive(spec, "");
        }
        Self::directory(spec)
    }

    /// Like [`ResourceRoot::parse`], but keeps a path that is not valid UTF-8
    /// intact; such a path cannot carry an offset marker.
    pub fn from_path(path: PathBuf) -> Self {
        match path.to_str() {
            Some(spec) => Self::parse(spec),
            None if has_archive_extension(&path) => Self::archive(path, ""),
            None => Self::directory(path),
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }

    /// Location string for a unit at `relative_path` under this root.
    pub fn url_for(&self, relative_path: &str) -> String {
        match self {
            Self::Directory { path } => format!("file:{}/{}", path.display(), relative_path),
            Self::Archive { container, offset } => {
                format!("archive:{}!/{}{}", container.display(), offset, relative_path)
            }
        }
    }
}

impl fmt::Display for ResourceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory { path } => write!(f, "{}", path.display()),
            Self::Archive { container, offset } if offset.is_empty() => {
                write!(f, "{}", container.display())
            }
            Self::Archive { container, offset } => {
                write!(f, "{}!/{}", container.display(), offset)
            }
        }
    }
}

/// Split a platform path list (`a.zip:classes` on Unix) into roots.
pub fn parse_path_list(list: &OsStr) -> Vec<ResourceRoot> {
    std::env::split_paths(list)
        .filter(|path| !path.as_os_str().is_empty())
        .map(ResourceRoot::from_path)
        .collect()
}

fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn normalize_offset(offset: &str) -> String {
    let mut normalized = offset.replace('\\', "/").trim_start_matches('/').to_string();
    if !normalized.is_empty() && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
