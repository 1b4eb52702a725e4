use std::path::{Path, PathBuf};

use hoist_core::UpdateError;
use hoist_core::archive::PackageError;
use hoist_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No update source configured: set `owner` and `repo` in the settings file")]
    NotConfigured,
    #[error("Failed to {action} settings at {}: {details}", path.display())]
    Settings {
        action: &'static str,
        path: PathBuf,
        details: String,
    },
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("Install {phase} failed: {source}")]
    Install {
        phase: &'static str,
        #[source]
        source: PackageError,
    },
    #[error("Another install is already running")]
    AlreadyRunning,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn settings(action: &'static str, path: &Path, details: impl std::fmt::Display) -> Self {
        Self::Settings {
            action,
            path: path.to_path_buf(),
            details: details.to_string(),
        }
    }

    pub fn install(phase: &'static str, source: PackageError) -> Self {
        Self::Install { phase, source }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
