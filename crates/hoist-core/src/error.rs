use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("remote unavailable during {operation}: {details}")]
    RemoteUnavailable {
        operation: &'static str,
        details: String,
    },
    #[error("remote has no published release")]
    NotFound,
    #[error("{context}: {source}")]
    FilesystemFatal {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("caller is not allowed to {action}")]
    PermissionDenied { action: &'static str },
    #[error("{context}: {details}")]
    Store {
        context: &'static str,
        details: String,
    },
}

impl UpdateError {
    pub fn remote(operation: &'static str, details: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            operation,
            details: details.into(),
        }
    }

    pub fn remote_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::remote(operation, error.to_string())
    }

    pub(crate) fn filesystem(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::FilesystemFatal {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }

    pub(crate) fn store(context: &'static str, details: impl std::fmt::Display) -> Self {
        Self::Store {
            context,
            details: details.to_string(),
        }
    }

    /// Whether the host installer must treat this error as a failed install.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FilesystemFatal { .. })
    }
}
