use std::sync::Arc;

use crate::error::UpdateError;
use crate::source::UpdateSource;
use crate::store::{KeyValueStore, load, save};
use crate::version::VersionIdentity;

/// Durable record of which branch build is installed.
///
/// Written only right after a successful branch-tracking install. Nothing in
/// the updater deletes it; clearing caches leaves it in place.
pub struct VersionState {
    store: Arc<dyn KeyValueStore>,
    build_key: String,
    sha_key: String,
}

impl VersionState {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, source: &UpdateSource) -> Self {
        Self {
            store,
            build_key: source.build_option_key(),
            sha_key: source.sha_option_key(),
        }
    }

    /// Installed build token, empty if never set.
    #[must_use]
    pub fn build(&self) -> String {
        load::<String>(self.store.as_ref(), &self.build_key).unwrap_or_default()
    }

    #[must_use]
    pub fn commit_sha(&self) -> Option<String> {
        load::<String>(self.store.as_ref(), &self.sha_key).filter(|sha| !sha.is_empty())
    }

    /// # Errors
    /// Returns an error when the durable store rejects the write.
    pub fn set_build(&self, build: &str) -> Result<(), UpdateError> {
        save(self.store.as_ref(), &self.build_key, &build, None)
    }

    /// # Errors
    /// Returns an error when the durable store rejects the write.
    pub fn set_commit_sha(&self, sha: &str) -> Result<(), UpdateError> {
        save(self.store.as_ref(), &self.sha_key, &sha, None)
    }

    /// The version to compare remote candidates against.
    #[must_use]
    pub fn current_version(&self, base: &str, branch_only: bool) -> VersionIdentity {
        if branch_only {
            VersionIdentity::with_build(base, &self.build())
        } else {
            VersionIdentity::new(base)
        }
    }
}
