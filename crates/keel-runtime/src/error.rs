//! Runtime error types.

use std::fmt;

/// A failure raised by running module logic.
///
/// Carries the kind and message exactly as the raising code produced them,
/// plus an optional cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: String,
    message: String,
    cause: Option<Box<Failure>>,
}

impl Failure {
    /// Create a failure with no cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause.
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Failure> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Errors that can occur while locating, resolving or invoking a module.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A root could not be opened or read; the search that hit it is aborted.
    #[error("Root unavailable: {root}: {reason}")]
    RootUnavailable { root: String, reason: String },

    /// The name is absent, or every reconstruction candidate failed.
    #[error("Unable to resolve '{name}': {reason}")]
    Resolution { name: String, reason: String },

    /// The module was found but exposes no usable entry function.
    #[error("No entry function in module '{module}': {reason}")]
    EntryNotFound { module: String, reason: String },

    /// The invoked logic itself failed.
    #[error("{0}")]
    Invocation(Failure),
}

impl RuntimeError {
    pub(crate) fn root_unavailable(root: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::RootUnavailable {
            root: root.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn resolution(name: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Resolution {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn entry_not_found(module: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::EntryNotFound {
            module: module.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RootUnavailable { .. } => "RootUnavailableError",
            Self::Resolution { .. } => "ResolutionError",
            Self::EntryNotFound { .. } => "EntryNotFoundError",
            Self::Invocation(_) => "InvocationError",
        }
    }

    /// The failure raised by invoked logic, if that is what this error is.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Invocation(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Errors surfacing inside running logic become failures of that logic.
///
/// An invocation failure is passed through untouched; anything else keeps
/// its error kind as the failure kind.
impl From<RuntimeError> for Failure {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Invocation(failure) => failure,
            other => Failure::new(other.kind(), other.to_string()),
        }
    }
}
