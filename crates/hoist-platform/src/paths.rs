use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// Overrides every directory with subdirectories of one root.
pub const HOME_ENV: &str = "HOIST_HOME";

const APP_DIR: &str = "hoist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform, honoring
    /// [`HOME_ENV`] when set.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/cache/data directory) cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|root| !root.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support").join(APP_DIR),
                cache_dir: home.join("Library/Caches").join(APP_DIR),
                data_dir: home.join("Library/Application Support").join(APP_DIR),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: platform_dir(dirs::config_dir(), AppPathsError::ConfigDirUnavailable)?,
                cache_dir: platform_dir(dirs::cache_dir(), AppPathsError::CacheDirUnavailable)?,
                data_dir: platform_dir(dirs::data_dir(), AppPathsError::DataDirUnavailable)?,
            })
        }
    }

    /// Everything under `root`: `config/`, `cache/` and `data/`.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Transient cache entries: release lookups, remote manifest versions,
    /// and the host's own update availability.
    #[must_use]
    pub fn transients_file(&self) -> PathBuf {
        self.cache_dir.join("transients.json")
    }

    /// Durable options, such as the installed branch build.
    #[must_use]
    pub fn options_file(&self) -> PathBuf {
        self.data_dir.join("options.json")
    }

    /// Default install root when settings do not name one.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.data_dir.join("plugins")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config_dir, &self.cache_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)?;
        }
        debug!("Application directories ready under {}", self.data_dir.display());
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
fn platform_dir(base: Option<PathBuf>, missing: AppPathsError) -> Result<PathBuf, AppPathsError> {
    base.map(|base| base.join(APP_DIR)).ok_or(missing)
}
