//! The CLI's side of the host contract: where state lives, what "update
//! available" means to the host, and the installer that downloads, unpacks,
//! and copies a package before handing back to the updater.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hoist_core::archive::{InstallProgress, download_package, extract_zip};
use hoist_core::store::{load, save};
use hoist_core::{
    FileStore, GitHubClient, HostHooks, InstallResult, KeyValueStore, RELEASE_TTL,
    UpdateDescriptor, UpdateError, Updater, relocate,
};
use hoist_platform::AppPaths;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::error::CliError;
use crate::install_lock::InstallLock;
use crate::settings::Settings;

/// Transient key under which the host remembers a pending update.
pub const UPDATE_AVAILABILITY_KEY: &str = "update_plugins";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Drops the host's pending-update record when the updater asks.
pub struct TransientHooks {
    store: Arc<dyn KeyValueStore>,
}

impl TransientHooks {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl HostHooks for TransientHooks {
    fn clear_update_availability(&self) {
        if let Err(error) = self.store.delete(UPDATE_AVAILABILITY_KEY) {
            warn!("Failed to clear pending update record: {error}");
        }
    }
}

pub struct Host {
    paths: AppPaths,
    plugins_dir: PathBuf,
    transient: Arc<dyn KeyValueStore>,
    downloader: reqwest::Client,
    updater: Updater,
}

impl Host {
    pub fn new(paths: AppPaths, settings: &Settings) -> Result<Self, CliError> {
        let source = settings.source()?;
        let client = GitHubClient::new(
            settings.endpoints(),
            settings.http_timeout(),
            &settings.user_agent,
        )?;
        let downloader = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| UpdateError::remote_from("download client setup", error))?;

        let transient: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(paths.transients_file()));
        let durable: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(paths.options_file()));
        let plugins_dir = settings.plugins_dir(&paths);

        let updater = Updater::new(
            source,
            client,
            transient.clone(),
            durable,
            &plugins_dir,
            &settings.base_version,
        )
        .with_hooks(Arc::new(TransientHooks::new(transient.clone())))
        .with_requirements(settings.requirements());

        Ok(Self {
            paths,
            plugins_dir,
            transient,
            downloader,
            updater,
        })
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// Remember (or forget) what the last check found, for `status`.
    pub fn record_availability(&self, update: Option<&UpdateDescriptor>) {
        let result = match update {
            Some(update) => save(
                self.transient.as_ref(),
                UPDATE_AVAILABILITY_KEY,
                update,
                Some(RELEASE_TTL),
            ),
            None => self.transient.delete(UPDATE_AVAILABILITY_KEY),
        };
        if let Err(error) = result {
            warn!("Failed to record update availability: {error}");
        }
    }

    pub fn recorded_availability(&self) -> Option<UpdateDescriptor> {
        load(self.transient.as_ref(), UPDATE_AVAILABILITY_KEY)
    }

    pub fn status(&self) -> StatusReport {
        let source = self.updater.source();
        let state = self.updater.installed_state();
        StatusReport {
            slug: source.package.slug.clone(),
            repository: format!("{}/{}", source.owner, source.repo),
            branch: source.branch.clone(),
            branch_only: source.branch_only,
            installed_at: self.updater.installed_dir(),
            current_version: self.updater.current_version().to_string(),
            installed_commit: state.commit_sha(),
            pending: self.recorded_availability(),
        }
    }

    /// Download, unpack, and install `update`, then run the updater's
    /// post-install step. Holds the install lock throughout.
    pub async fn install(
        &self,
        update: &UpdateDescriptor,
        progress: Option<&mpsc::Sender<InstallProgress>>,
    ) -> Result<InstallResult, CliError> {
        let result = self.run_install(update, progress).await;
        if let Some(progress) = progress {
            let event = match &result {
                Ok(result) => InstallProgress::Complete(result.destination.clone()),
                Err(error) => InstallProgress::Failed(error.to_string()),
            };
            let _ = progress.send(event).await;
        }
        result
    }

    async fn run_install(
        &self,
        update: &UpdateDescriptor,
        progress: Option<&mpsc::Sender<InstallProgress>>,
    ) -> Result<InstallResult, CliError> {
        let _lock = InstallLock::acquire(&self.paths.data_dir.join("install.lock"))?;
        info!("Installing {} {}", update.slug, update.version);

        let work_dir = tempfile::tempdir()
            .map_err(|error| CliError::io("failed to create working directory", error))?;
        let package = download_package(
            &self.downloader,
            &update.download_url,
            work_dir.path(),
            progress,
        )
        .await
        .map_err(|error| CliError::install("download", error))?;

        notify(progress, InstallProgress::Extracting).await;
        let extract_dir = work_dir.path().join("extract");
        let files = extract_zip(&package.path, &extract_dir)
            .map_err(|error| CliError::install("extract", error))?;
        debug!("Package {} unpacked to {files} files", package.sha256);

        notify(progress, InstallProgress::Installing).await;
        let source = self.updater.fix_extracted_path(&extract_dir);
        let copied = self.copy_into_plugins(&source)?;

        Ok(self.updater.after_install(update, InstallResult::new(copied))?)
    }

    /// Place the package root under the plugins directory with its own
    /// directory name, replacing anything already there.
    fn copy_into_plugins(&self, source: &Path) -> Result<PathBuf, CliError> {
        std::fs::create_dir_all(&self.plugins_dir)
            .map_err(|error| CliError::io("failed to create plugins directory", error))?;
        let name = source
            .file_name()
            .map_or_else(|| PathBuf::from("package"), PathBuf::from);
        Ok(relocate(source, &self.plugins_dir.join(name))?)
    }
}

async fn notify(progress: Option<&mpsc::Sender<InstallProgress>>, event: InstallProgress) {
    if let Some(progress) = progress {
        let _ = progress.send(event).await;
    }
}

#[derive(Debug)]
pub struct StatusReport {
    pub slug: String,
    pub repository: String,
    pub branch: String,
    pub branch_only: bool,
    pub installed_at: PathBuf,
    pub current_version: String,
    pub installed_commit: Option<String>,
    pub pending: Option<UpdateDescriptor>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package:     {}", self.slug)?;
        writeln!(f, "Location:    {}", self.installed_at.display())?;
        let mode = if self.branch_only {
            "branch only"
        } else {
            "releases, then branch"
        };
        writeln!(f, "Source:      {}@{} ({mode})", self.repository, self.branch)?;
        writeln!(f, "Version:     {}", self.current_version)?;
        if let Some(commit) = &self.installed_commit {
            writeln!(f, "Commit:      {commit}")?;
        }
        match &self.pending {
            Some(update) => write!(f, "Update:      {} ({})", update.version, update.display_url),
            None => write!(f, "Update:      none recorded"),
        }
    }
}
