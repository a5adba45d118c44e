//! # Reconciliation Errors
//!
//! Three layers of failure meet in the engine:
//!
//! - [`RemoteError`]: what the Remote Accessor reports. `NotFound` is kept distinct so the
//!   engine can turn it into "gone" on Read and "success" on Delete.
//! - [`MappingError`]: desired state that cannot be expanded into a wire model.
//! - [`ReconcileError`]: what callers see. Every variant that can name the object does,
//!   together with the [`Phase`] that failed.

use crate::id::IdError;
use std::fmt;
use std::time::Duration;

/// The engine operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Create => "creating",
            Phase::Read => "reading",
            Phase::Update => "updating",
            Phase::Delete => "deleting",
            Phase::Import => "importing",
        };
        f.write_str(name)
    }
}

/// Errors reported by a remote accessor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The addressed object does not exist.
    #[error("resource was not found")]
    NotFound,

    /// The API answered with a non-success status.
    #[error("unexpected status {status}{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A long-running operation reached a terminal failure state.
    #[error("long-running operation failed: {0}")]
    OperationFailed(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decoding response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound)
    }

    pub fn status(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Status {
            status,
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Desired state that cannot be turned into a wire model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MappingError(pub String);

impl MappingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A proposed change the engine refuses to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransitionError {
    /// Entries responsible for the rejection.
    pub names: Vec<String>,
    pub message: String,
}

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Create found an object already at the target identifier.
    #[error("a {resource_type} with ID {id:?} already exists - to be managed via this provider it needs to be imported into the local state")]
    AlreadyExists {
        resource_type: &'static str,
        id: String,
    },

    /// The diff guard rejected the proposed change. No remote call was made.
    #[error("{resource_type} {id:?}: {source}")]
    UnsafeTransition {
        resource_type: &'static str,
        id: String,
        #[source]
        source: TransitionError,
    },

    /// A remote call failed for a reason other than a recoverable not-found.
    #[error("{phase} {resource_type} {id:?}: {source}")]
    RemoteOperationFailed {
        resource_type: &'static str,
        id: String,
        phase: Phase,
        #[source]
        source: RemoteError,
    },

    /// The phase deadline expired. The remote outcome is unknown until the next Read.
    #[error("timed out after {after:?} {phase} {resource_type} {id:?}; the remote outcome is unknown, refresh to determine the current state")]
    Timeout {
        resource_type: &'static str,
        id: String,
        phase: Phase,
        after: Duration,
    },

    #[error(transparent)]
    InvalidId(#[from] IdError),

    /// Desired state failed validation or expansion.
    #[error("{phase} {resource_type} {id:?}: {source}")]
    Invalid {
        resource_type: &'static str,
        id: String,
        phase: Phase,
        #[source]
        source: MappingError,
    },
}

impl ReconcileError {
    pub fn remote(
        resource_type: &'static str,
        id: impl fmt::Display,
        phase: Phase,
        source: RemoteError,
    ) -> Self {
        ReconcileError::RemoteOperationFailed {
            resource_type,
            id: id.to_string(),
            phase,
            source,
        }
    }

    pub fn invalid(
        resource_type: &'static str,
        id: impl fmt::Display,
        phase: Phase,
        source: MappingError,
    ) -> Self {
        ReconcileError::Invalid {
            resource_type,
            id: id.to_string(),
            phase,
            source,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ReconcileError::AlreadyExists { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReconcileError::Timeout { .. })
    }

    pub fn is_unsafe_transition(&self) -> bool {
        matches!(self, ReconcileError::UnsafeTransition { .. })
    }

    /// The underlying remote failure, if this error wraps one.
    pub fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            ReconcileError::RemoteOperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
