//! Self-update engine for packages distributed through a GitHub repository.
//!
//! This crate holds everything that does not depend on a particular host:
//! - Version cleaning, comparison, and branch build identities.
//! - Release resolution (latest tagged release, then branch head).
//! - Transient caches and durable installed-build state behind a key/value
//!   store the host supplies.
//! - Post-install fixes that put an extracted package under its slug.
//! - An [`Updater`] facade wiring the above into host-facing operations.

pub mod archive;
mod cache;
mod error;
mod github;
mod install;
mod manifest;
mod resolver;
mod source;
mod state;
pub mod store;
mod updater;
pub mod version;

/// Cache entry model and TTLs for release and remote-manifest lookups.
pub use cache::{CachedRelease, RELEASE_TTL, REMOTE_VERSION_TTL, UpdateCache};
/// Error type shared by every updater operation.
pub use error::UpdateError;
/// HTTP client and response models for the GitHub REST API.
pub use github::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, GitHubClient, GitHubCommit, GitHubRelease};
/// Post-install helpers.
pub use install::{InstallResult, fix_extracted_path, relocate};
/// Manifest `Version:` header parsing and remote manifest lookup.
pub use manifest::{RemoteManifest, extract_version, read_local_version};
/// Release resolution.
pub use resolver::{ReleaseInfo, ReleaseResolver};
/// Update source configuration and endpoint layout.
pub use source::{DEFAULT_BRANCH, Endpoints, PackageManifest, UpdateSource};
/// Durable installed-build state.
pub use state::VersionState;
/// Key/value stores.
pub use store::{Clock, FileStore, KeyValueStore, ManualClock, MemoryStore, SystemClock};
/// Host-facing facade and its models.
pub use updater::{
    Caller, Capability, HostHooks, HostRequirements, NoopHooks, PackageInformation,
    UpdateDescriptor, UpdateNotice, Updater,
};
/// Version identity and comparison.
pub use version::VersionIdentity;
