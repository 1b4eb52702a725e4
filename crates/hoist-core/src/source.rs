use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_BRANCH: &str = "main";

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";
const GITHUB_WEB_URL: &str = "https://github.com";

/// The installed package as the host sees it: its directory slug and the
/// manifest file inside that directory carrying the `Version:` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub slug: String,
    pub file_name: String,
}

impl PackageManifest {
    pub fn new(slug: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            file_name: file_name.into(),
        }
    }

    /// Manifest path relative to the plugins directory, e.g. `widgets/widgets.php`.
    #[must_use]
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.slug, self.file_name)
    }
}

/// Where updates come from. One per installation, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSource {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub branch_only: bool,
    pub package: PackageManifest,
}

impl UpdateSource {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        package: PackageManifest,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            branch_only: false,
            package,
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        if !branch.trim().is_empty() {
            self.branch = branch;
        }
        self
    }

    #[must_use]
    pub fn branch_only(mut self, enabled: bool) -> Self {
        self.branch_only = enabled;
        self
    }

    /// Key for the release cache; stable across restarts for one installation.
    #[must_use]
    pub fn release_cache_key(&self) -> String {
        format!(
            "hoist_update_check_{}",
            digest(&[&self.owner, &self.repo, &self.package.slug])
        )
    }

    /// Key for the remote manifest version cache, scoped to the tracked branch.
    #[must_use]
    pub fn remote_version_cache_key(&self) -> String {
        format!(
            "hoist_remote_version_{}",
            digest(&[&self.owner, &self.repo, &self.package.slug, &self.branch])
        )
    }

    #[must_use]
    pub fn build_option_key(&self) -> String {
        format!("hoist_branch_build_{}", self.package.slug)
    }

    #[must_use]
    pub fn sha_option_key(&self) -> String {
        format!("hoist_branch_sha_{}", self.package.slug)
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..32].to_string()
}

/// Base URLs of the remote repository host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub api: String,
    pub raw: String,
    pub web: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: GITHUB_API_URL.to_string(),
            raw: GITHUB_RAW_URL.to_string(),
            web: GITHUB_WEB_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one base URL (a mock server in tests).
    #[must_use]
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            api: base.clone(),
            raw: format!("{base}/raw"),
            web: base,
        }
    }

    #[must_use]
    pub fn latest_release(&self, source: &UpdateSource) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            trim(&self.api),
            source.owner,
            source.repo
        )
    }

    #[must_use]
    pub fn branch_head(&self, source: &UpdateSource) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            trim(&self.api),
            source.owner,
            source.repo,
            source.branch
        )
    }

    #[must_use]
    pub fn raw_file(&self, source: &UpdateSource, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            trim(&self.raw),
            source.owner,
            source.repo,
            source.branch,
            path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn repository_page(&self, source: &UpdateSource) -> String {
        format!("{}/{}/{}", trim(&self.web), source.owner, source.repo)
    }

    #[must_use]
    pub fn tag_archive(&self, source: &UpdateSource, tag: &str) -> String {
        format!(
            "{}/{}/{}/archive/refs/tags/{tag}.zip",
            trim(&self.web),
            source.owner,
            source.repo
        )
    }

    /// Archive of one exact commit, so the installed tree matches what was advertised.
    #[must_use]
    pub fn commit_archive(&self, source: &UpdateSource, sha: &str) -> String {
        format!(
            "{}/{}/{}/archive/{sha}.zip",
            trim(&self.web),
            source.owner,
            source.repo
        )
    }
}

fn trim(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::{Endpoints, PackageManifest, UpdateSource};

    fn source() -> UpdateSource {
        UpdateSource::new(
            "acme",
            "widgets",
            PackageManifest::new("widgets", "widgets.php"),
        )
    }

    #[test]
    fn defaults_track_main_with_releases() {
        let source = source();
        assert_eq!(source.branch, "main");
        assert!(!source.branch_only);
        assert_eq!(source.package.relative_path(), "widgets/widgets.php");
    }

    #[test]
    fn blank_branch_keeps_default() {
        assert_eq!(source().with_branch("  ").branch, "main");
        assert_eq!(source().with_branch("develop").branch, "develop");
    }

    #[test]
    fn cache_keys_are_stable_and_scoped() {
        let main = source();
        let develop = source().with_branch("develop");

        assert_eq!(main.release_cache_key(), source().release_cache_key());
        assert_eq!(main.release_cache_key(), develop.release_cache_key());
        assert_ne!(
            main.remote_version_cache_key(),
            develop.remote_version_cache_key()
        );
        assert_eq!(main.build_option_key(), "hoist_branch_build_widgets");
        assert_eq!(main.sha_option_key(), "hoist_branch_sha_widgets");
    }

    #[test]
    fn github_urls_match_api_layout() {
        let endpoints = Endpoints::default();
        let source = source();

        assert_eq!(
            endpoints.latest_release(&source),
            "https://api.github.com/repos/acme/widgets/releases/latest"
        );
        assert_eq!(
            endpoints.branch_head(&source),
            "https://api.github.com/repos/acme/widgets/commits/main"
        );
        assert_eq!(
            endpoints.raw_file(&source, "/widgets/widgets.php"),
            "https://raw.githubusercontent.com/acme/widgets/main/widgets/widgets.php"
        );
        assert_eq!(
            endpoints.commit_archive(&source, "abc1234"),
            "https://github.com/acme/widgets/archive/abc1234.zip"
        );
    }
}
