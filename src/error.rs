//! Error types shared by every storage backend.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Coarse classification of a [`StorageError`].
///
/// Upper layers branch on the kind rather than on backend specific details,
/// so every backend maps its failures onto these six kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unavailable,
    Malformed,
    Config,
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key is absent and the operation was not asked to ignore that.
    #[error("key not found: {path}")]
    NotFound {
        /// Full blob path of the missing key.
        path: String,
    },

    /// A write-once key already has an object at its path.
    #[error("key already exists: {path}")]
    AlreadyExists {
        /// Full blob path of the conflicting key.
        path: String,
    },

    /// The operation exceeds the granted open mode, or the backend refused
    /// the credentials.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transient transport failure, including request timeouts.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A listed path could not be decoded into a key.
    #[error("malformed key path '{path}': {reason}")]
    Malformed {
        /// The offending path.
        path: String,
        /// What the decoder rejected.
        reason: String,
    },

    /// Invalid or incomplete configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An I/O error from a local transport or from runtime setup.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Unavailable(_) | Self::Io(_) => ErrorKind::Unavailable,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether a caller may reasonably retry the failed request.
    ///
    /// This layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}
