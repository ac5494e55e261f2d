//! Symbolic module names.

use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

/// Namespace separator inside a symbolic name.
pub const NAMESPACE_SEPARATOR: char = '.';

/// A validated, dot-separated module name such as `com.acme.Tool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolicName(String);

impl SymbolicName {
    /// Validate and wrap a name.
    ///
    /// Every segment must be non-empty and must not contain a path separator.
    pub fn parse(name: &str) -> Result<Self, RuntimeError> {
        if name.is_empty() {
            return Err(RuntimeError::resolution(name, "empty name"));
        }
        for segment in name.split(NAMESPACE_SEPARATOR) {
            if segment.is_empty() {
                return Err(RuntimeError::resolution(name, "empty name segment"));
            }
            if segment.contains(['/', '\\']) {
                return Err(RuntimeError::resolution(
                    name,
                    "name segments must not contain path separators",
                ));
            }
        }
        Ok(Self(name.to_string()))
    }

    /// Rebuild a name from a root-relative resource path.
    ///
    /// `com/acme/Tool.kbc` with suffix `.kbc` becomes `com.acme.Tool`.
    /// Returns `None` when the path lacks the suffix or yields an invalid name.
    pub fn from_resource_path(relative_path: &str, suffix: &str) -> Option<Self> {
        let stem = relative_path.strip_suffix(suffix)?;
        Self::parse(&stem.replace('/', ".")).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the name.
    pub fn simple_name(&self) -> &str {
        self.0
            .rsplit(NAMESPACE_SEPARATOR)
            .next()
            .unwrap_or(&self.0)
    }

    /// The name without its leading segment, or `None` for a simple name.
    pub fn strip_leading(&self) -> Option<Self> {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(_, rest)| Self(rest.to_string()))
    }

    /// Root-relative path of the unit holding this module.
    pub fn resource_path(&self, suffix: &str) -> String {
        let mut path = self.0.replace(NAMESPACE_SEPARATOR, "/");
        path.push_str(suffix);
        path
    }
}

impl fmt::Display for SymbolicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SymbolicName {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
