use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::{CachedRelease, UpdateCache};
use crate::error::UpdateError;
use crate::github::GitHubClient;
use crate::install::{self, InstallResult};
use crate::manifest::read_local_version;
use crate::resolver::{ReleaseInfo, ReleaseResolver};
use crate::source::UpdateSource;
use crate::state::VersionState;
use crate::store::KeyValueStore;
use crate::version::VersionIdentity;

const FALLBACK_CHANGELOG: &str = "See the repository for details about this update.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Clear caches, force checks.
    ManageOptions,
    /// See update notices and trigger installs.
    UpdatePackages,
}

/// Whoever invoked an updater action, as vouched for by the host.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    capabilities: Vec<Capability>,
}

impl Caller {
    #[must_use]
    pub fn operator() -> Self {
        Self {
            capabilities: vec![Capability::ManageOptions, Capability::UpdatePackages],
        }
    }

    #[must_use]
    pub fn viewer() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn require(&self, capability: Capability, action: &'static str) -> Result<(), UpdateError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(UpdateError::PermissionDenied { action })
        }
    }
}

/// Callbacks into the host's own update bookkeeping.
pub trait HostHooks: Send + Sync {
    /// Forget whatever "update available" state the host keeps for its
    /// packages so the next poll starts fresh.
    fn clear_update_availability(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HostHooks for NoopHooks {
    fn clear_update_availability(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRequirements {
    pub host_version: String,
    pub runtime_version: String,
}

impl Default for HostRequirements {
    fn default() -> Self {
        Self {
            host_version: "5.0".to_string(),
            runtime_version: "7.4".to_string(),
        }
    }
}

/// What the host's installer needs to fetch and label an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    pub slug: String,
    pub version: VersionIdentity,
    pub download_url: String,
    pub display_url: String,
    pub release_notes: Option<String>,
    pub requires_host_version: String,
    pub requires_runtime_version: String,
    #[serde(default)]
    pub commit_build: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
}

/// Details page for the package, as shown by the host before installing.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInformation {
    pub slug: String,
    pub version: VersionIdentity,
    pub homepage: String,
    pub download_url: String,
    pub changelog: String,
    pub requires_host_version: String,
    pub requires_runtime_version: String,
    pub checked_at: DateTime<Utc>,
}

/// Persistent "update available" notice for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNotice {
    pub slug: String,
    pub version: VersionIdentity,
    pub display_url: String,
}

impl std::fmt::Display for UpdateNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "A new version of {} is available: {} ({})",
            self.slug, self.version, self.display_url
        )
    }
}

/// Self-update client for one installed package.
pub struct Updater {
    source: UpdateSource,
    client: GitHubClient,
    cache: UpdateCache,
    state: VersionState,
    hooks: Arc<dyn HostHooks>,
    install_root: PathBuf,
    fallback_base: String,
    requirements: HostRequirements,
}

impl Updater {
    /// `transient` backs the caches, `durable` backs installed-build state.
    /// `install_root` is the directory holding the package's slug directory;
    /// `fallback_base` is used when the local manifest declares no version.
    pub fn new(
        source: UpdateSource,
        client: GitHubClient,
        transient: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
        install_root: impl Into<PathBuf>,
        fallback_base: &str,
    ) -> Self {
        let cache = UpdateCache::new(transient, &source);
        let state = VersionState::new(durable, &source);
        Self {
            source,
            client,
            cache,
            state,
            hooks: Arc::new(NoopHooks),
            install_root: install_root.into(),
            fallback_base: crate::version::clean(fallback_base),
            requirements: HostRequirements::default(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn HostHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_requirements(mut self, requirements: HostRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    #[must_use]
    pub fn source(&self) -> &UpdateSource {
        &self.source
    }

    #[must_use]
    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    #[must_use]
    pub fn installed_state(&self) -> &VersionState {
        &self.state
    }

    /// Where the package must live once installed.
    #[must_use]
    pub fn installed_dir(&self) -> PathBuf {
        self.install_root.join(&self.source.package.slug)
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.installed_dir().join(&self.source.package.file_name)
    }

    /// Declared base version, re-read from disk on every call.
    #[must_use]
    pub fn base_version(&self) -> String {
        read_local_version(&self.manifest_path())
            .filter(|version| !version.is_empty())
            .unwrap_or_else(|| self.fallback_base.clone())
    }

    #[must_use]
    pub fn current_version(&self) -> VersionIdentity {
        self.state
            .current_version(&self.base_version(), self.source.branch_only)
    }

    /// One live resolution, bypassing the cache.
    ///
    /// # Errors
    /// Returns [`UpdateError::RemoteUnavailable`] when no tier answered.
    pub async fn resolve(&self) -> Result<ReleaseInfo, UpdateError> {
        let base = self.base_version();
        ReleaseResolver::new(&self.client, &self.source, &self.cache, &base)
            .resolve()
            .await
    }

    #[must_use]
    pub fn descriptor(&self, release: &ReleaseInfo) -> UpdateDescriptor {
        UpdateDescriptor {
            slug: self.source.package.slug.clone(),
            version: release.version.clone(),
            download_url: release.download_url.clone(),
            display_url: release.display_url.clone(),
            release_notes: release.release_notes.clone(),
            requires_host_version: self.requirements.host_version.clone(),
            requires_runtime_version: self.requirements.runtime_version.clone(),
            commit_build: release.commit_build.clone(),
            commit_sha: release.commit_sha.clone(),
        }
    }

    /// Periodic poll: answer from the release cache when possible, otherwise
    /// resolve and cache the outcome. Remote failures read as "no update".
    pub async fn check_for_update(&self) -> Option<UpdateDescriptor> {
        let current = self.current_version();

        if let Some(cached) = self.cache.release() {
            debug!("Release cache hit for {}", self.source.package.slug);
            return cached
                .release()
                .filter(|release| current.is_older_than(release.version.as_str()))
                .map(|release| self.descriptor(release));
        }

        match self.resolve().await {
            Ok(release) if current.is_older_than(release.version.as_str()) => {
                info!("Update available: {current} -> {}", release.version);
                let descriptor = self.descriptor(&release);
                self.cache.store_release(&CachedRelease::available(release));
                Some(descriptor)
            }
            Ok(release) => {
                debug!("Up to date: {current} (remote {})", release.version);
                self.cache.store_release(&CachedRelease::no_update());
                None
            }
            Err(error) => {
                debug!("Update check failed: {error}");
                self.cache.store_release(&CachedRelease::no_update());
                None
            }
        }
    }

    /// Live details for the host's package information view.
    pub async fn package_information(&self) -> Option<PackageInformation> {
        let release = match self.resolve().await {
            Ok(release) => release,
            Err(error) => {
                debug!("Package information lookup failed: {error}");
                return None;
            }
        };

        Some(PackageInformation {
            slug: self.source.package.slug.clone(),
            version: release.version,
            homepage: self.client.endpoints().repository_page(&self.source),
            download_url: release.download_url,
            changelog: release
                .release_notes
                .unwrap_or_else(|| FALLBACK_CHANGELOG.to_string()),
            requires_host_version: self.requirements.host_version.clone(),
            requires_runtime_version: self.requirements.runtime_version.clone(),
            checked_at: Utc::now(),
        })
    }

    /// Notice for operators allowed to update. A cached positive answer is
    /// used as is; otherwise the release is resolved live and not cached.
    pub async fn update_notice(&self, caller: &Caller) -> Option<UpdateNotice> {
        if !caller.can(Capability::UpdatePackages) {
            return None;
        }
        let current = self.current_version();

        let cached = self
            .cache
            .release()
            .and_then(|cached| cached.release().cloned());
        let release = match cached {
            Some(release) => release,
            None => self.resolve().await.ok()?,
        };

        current
            .is_older_than(release.version.as_str())
            .then(|| UpdateNotice {
                slug: self.source.package.slug.clone(),
                version: release.version,
                display_url: release.display_url,
            })
    }

    /// Admin action: drop both caches and the host's availability state.
    /// Installed-build state is kept.
    ///
    /// # Errors
    /// Returns [`UpdateError::PermissionDenied`] for callers without
    /// [`Capability::ManageOptions`]; nothing is cleared in that case.
    pub fn clear_caches(&self, caller: &Caller) -> Result<(), UpdateError> {
        caller.require(Capability::ManageOptions, "clear update caches")?;
        info!("Clearing update caches for {}", self.source.package.slug);
        self.cache.clear_all();
        self.hooks.clear_update_availability();
        Ok(())
    }

    /// Admin action: "check now", ignoring any cached release answer.
    ///
    /// # Errors
    /// Returns [`UpdateError::PermissionDenied`] for callers without
    /// [`Capability::ManageOptions`].
    pub async fn force_check(
        &self,
        caller: &Caller,
    ) -> Result<Option<UpdateDescriptor>, UpdateError> {
        caller.require(Capability::ManageOptions, "force an update check")?;
        self.cache.clear_release();
        Ok(self.check_for_update().await)
    }

    /// Installer callback: locate the real package root inside an extracted
    /// archive.
    #[must_use]
    pub fn fix_extracted_path(&self, extracted: &Path) -> PathBuf {
        install::fix_extracted_path(extracted, &self.source.package.file_name)
    }

    /// Installer callback run after the package was copied into place.
    ///
    /// Moves the package under its slug, records the installed build in
    /// branch-tracking mode and clears caches.
    ///
    /// # Errors
    /// Returns [`UpdateError::FilesystemFatal`] when the package cannot be
    /// moved into place; the host must then fail the install.
    pub fn after_install(
        &self,
        installed: &UpdateDescriptor,
        mut result: InstallResult,
    ) -> Result<InstallResult, UpdateError> {
        self.cache.clear_all();

        let expected = self.installed_dir();
        if result.destination != expected {
            result.destination = install::relocate(&result.destination, &expected)?;
        }

        if self.source.branch_only {
            if let Some(build) = installed.commit_build.as_deref()
                && let Err(error) = self.state.set_build(build)
            {
                warn!("Failed to record installed build: {error}");
            }
            if let Some(sha) = installed.commit_sha.as_deref()
                && let Err(error) = self.state.set_commit_sha(sha)
            {
                warn!("Failed to record installed commit: {error}");
            }
        }

        info!(
            "Installed {} at {}, current version {}",
            installed.version,
            result.destination.display(),
            self.current_version()
        );

        self.hooks.clear_update_availability();
        Ok(result)
    }
}
