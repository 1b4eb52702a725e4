use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::cache::UpdateCache;
use crate::github::GitHubClient;
use crate::source::UpdateSource;
use crate::version::clean;

static VERSION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t/*#@]*Version:[ \t]*(.+)$").expect("version header pattern is valid")
});

/// Value of the first `Version:` header line, trimmed. The header may sit in a
/// comment block (` * Version: 1.2.0`), but must start its line.
#[must_use]
pub fn extract_version(contents: &str) -> Option<String> {
    VERSION_HEADER
        .captures(contents)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Declared version of the installed manifest on disk, cleaned.
#[must_use]
pub fn read_local_version(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    extract_version(&contents).map(|version| clean(&version))
}

/// Reads the manifest from the tracked branch to learn the remote base
/// version. Only used in branch-tracking mode, where the local manifest says
/// nothing about what the branch currently declares.
pub struct RemoteManifest<'a> {
    client: &'a GitHubClient,
    source: &'a UpdateSource,
    cache: &'a UpdateCache,
}

impl<'a> RemoteManifest<'a> {
    #[must_use]
    pub fn new(
        client: &'a GitHubClient,
        source: &'a UpdateSource,
        cache: &'a UpdateCache,
    ) -> Self {
        Self {
            client,
            source,
            cache,
        }
    }

    /// Remote base version, or `local_base` if no candidate file yields one.
    pub async fn fetch_remote_base_version(&self, local_base: &str) -> String {
        if let Some(cached) = self.cache.remote_version() {
            debug!("Remote manifest version cache hit: {cached}");
            return cached;
        }

        let package = &self.source.package;
        for path in [package.relative_path(), package.file_name.clone()] {
            if let Some(version) = self.fetch_candidate(&path).await {
                debug!("Remote manifest {path} declares version {version}");
                self.cache.store_remote_version(&version);
                return version;
            }
        }

        debug!("No remote manifest version found, using local {local_base}");
        local_base.to_string()
    }

    async fn fetch_candidate(&self, path: &str) -> Option<String> {
        let url = self.client.endpoints().raw_file(self.source, path);
        let response = match self.client.get_raw(&url).await {
            Ok(response) => response,
            Err(error) => {
                debug!("Remote manifest request for {url} failed: {error}");
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            debug!("Remote manifest {url} returned HTTP {}", response.status());
            return None;
        }

        let body = response.text().await.ok()?;
        if body.trim().is_empty() {
            return None;
        }
        extract_version(&body)
            .map(|version| clean(&version))
            .filter(|version| !version.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_version, read_local_version};

    const HEADER: &str = "<?php\n/**\n * Plugin Name: Widgets\n * Version: 1.4.2\n */\n";

    #[test]
    fn extracts_first_version_line() {
        assert_eq!(extract_version(HEADER).as_deref(), Some("1.4.2"));
        assert_eq!(
            extract_version("Version: 1.0\nVersion: 2.0\n").as_deref(),
            Some("1.0")
        );
    }

    #[test]
    fn match_is_case_insensitive_and_line_anchored() {
        assert_eq!(extract_version("  version:   v3.1 \n").as_deref(), Some("v3.1"));
        assert_eq!(extract_version("Requires Version: 5.0\n"), None);
        assert_eq!(extract_version("no header here"), None);
    }

    #[test]
    fn reads_and_cleans_local_manifest() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("widgets.php");
        std::fs::write(&path, " * Version: v2.0.1\n").expect("manifest should be written");

        assert_eq!(read_local_version(&path).as_deref(), Some("2.0.1"));
        assert_eq!(read_local_version(&temp_dir.path().join("missing.php")), None);
    }
}
