use std::path::{Path, PathBuf};
use std::time::Duration;

use hoist_core::{
    DEFAULT_BRANCH, DEFAULT_USER_AGENT, Endpoints, HostRequirements, PackageManifest, UpdateSource,
};
use hoist_platform::AppPaths;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub branch_only: bool,

    /// Directory name of the installed package. Defaults to `repo`.
    #[serde(default)]
    pub slug: Option<String>,

    /// Manifest file inside the package directory. Defaults to `<slug>.php`.
    #[serde(default)]
    pub manifest_file: Option<String>,

    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,

    #[serde(default = "default_base_version")]
    pub base_version: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub raw_url: Option<String>,

    #[serde(default)]
    pub web_url: Option<String>,

    #[serde(default = "default_requires_host_version")]
    pub requires_host_version: String,

    #[serde(default = "default_requires_runtime_version")]
    pub requires_runtime_version: String,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_base_version() -> String {
    "1.0.0".to_string()
}

fn default_http_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_requires_host_version() -> String {
    HostRequirements::default().host_version
}

fn default_requires_runtime_version() -> String {
    HostRequirements::default().runtime_version
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            branch_only: false,
            slug: None,
            manifest_file: None,
            plugins_dir: None,
            base_version: default_base_version(),
            http_timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
            api_url: None,
            raw_url: None,
            web_url: None,
            requires_host_version: default_requires_host_version(),
            requires_runtime_version: default_requires_runtime_version(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults; a file that
    /// does not parse is an error so a typo never silently retargets updates.
    pub fn load_from(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|error| CliError::settings("read", path, error))?;
        serde_json::from_str(&content).map_err(|error| CliError::settings("parse", path, error))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| CliError::settings("create directory for", path, error))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|error| CliError::settings("encode", path, error))?;
        std::fs::write(path, content).map_err(|error| CliError::settings("write", path, error))
    }

    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or_else(|| self.repo.clone())
    }

    pub fn manifest_file(&self) -> String {
        self.manifest_file
            .clone()
            .filter(|file| !file.trim().is_empty())
            .unwrap_or_else(|| format!("{}.php", self.slug()))
    }

    pub fn plugins_dir(&self, paths: &AppPaths) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| paths.plugins_dir())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// The configured update source. `owner` and `repo` are required.
    pub fn source(&self) -> Result<UpdateSource, CliError> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(CliError::NotConfigured);
        }
        Ok(UpdateSource::new(
            self.owner.trim(),
            self.repo.trim(),
            PackageManifest::new(self.slug(), self.manifest_file()),
        )
        .with_branch(self.branch.trim())
        .branch_only(self.branch_only))
    }

    pub fn endpoints(&self) -> Endpoints {
        let defaults = Endpoints::default();
        Endpoints {
            api: self.api_url.clone().unwrap_or(defaults.api),
            raw: self.raw_url.clone().unwrap_or(defaults.raw),
            web: self.web_url.clone().unwrap_or(defaults.web),
        }
    }

    pub fn requirements(&self) -> HostRequirements {
        HostRequirements {
            host_version: self.requires_host_version.clone(),
            runtime_version: self.requires_runtime_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Settings;

    #[test]
    fn defaults_match_expected_values() {
        let settings = Settings::default();

        assert_eq!(settings.branch, "main");
        assert!(!settings.branch_only);
        assert_eq!(settings.http_timeout_secs, 15);
        assert_eq!(settings.requires_host_version, "5.0");
        assert_eq!(settings.requires_runtime_version, "7.4");
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert!(settings.user_agent.starts_with("hoist/"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "owner": "acme",
            "repo": "widgets",
            "branch_only": true
        }))
        .expect("settings JSON should deserialize");

        let source = settings.source().expect("source should be configured");
        assert_eq!(source.owner, "acme");
        assert_eq!(source.branch, "main");
        assert!(source.branch_only);
        assert_eq!(source.package.slug, "widgets");
        assert_eq!(source.package.file_name, "widgets.php");
    }

    #[test]
    fn missing_repository_is_rejected() {
        assert!(Settings::default().source().is_err());
    }

    #[test]
    fn endpoint_overrides_replace_only_given_urls() {
        let settings = Settings {
            api_url: Some("https://ghe.example.test/api/v3".to_string()),
            ..Settings::default()
        };

        let endpoints = settings.endpoints();
        assert_eq!(endpoints.api, "https://ghe.example.test/api/v3");
        assert_eq!(endpoints.web, "https://github.com");
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("nested/settings.json");
        let settings = Settings {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            slug: Some("acme-widgets".to_string()),
            ..Settings::default()
        };

        settings.save_to(&path).expect("settings should save");
        let loaded = Settings::load_from(&path).expect("settings should load");

        assert_eq!(loaded.slug(), "acme-widgets");
        assert_eq!(loaded.manifest_file(), "acme-widgets.php");
    }

    #[test]
    fn unreadable_settings_are_an_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").expect("settings file should be written");

        assert!(Settings::load_from(&path).is_err());
        assert!(Settings::load_from(&temp_dir.path().join("absent.json")).is_ok());
    }
}
