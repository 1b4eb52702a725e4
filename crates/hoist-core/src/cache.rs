use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::resolver::ReleaseInfo;
use crate::source::UpdateSource;
use crate::store::{KeyValueStore, load, save};
use crate::version::VersionIdentity;

pub const RELEASE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const REMOTE_VERSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Release-cache entry: `{"new_version": false}` or the full release.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedRelease {
    Available {
        new_version: VersionIdentity,
        #[serde(flatten)]
        release: ReleaseInfo,
    },
    NoUpdate {
        new_version: bool,
    },
}

impl CachedRelease {
    #[must_use]
    pub fn no_update() -> Self {
        Self::NoUpdate { new_version: false }
    }

    #[must_use]
    pub fn available(release: ReleaseInfo) -> Self {
        Self::Available {
            new_version: release.version.clone(),
            release,
        }
    }

    #[must_use]
    pub fn release(&self) -> Option<&ReleaseInfo> {
        match self {
            Self::Available { release, .. } => Some(release),
            Self::NoUpdate { .. } => None,
        }
    }
}

/// The two transient caches of one installation. Writes are best-effort: a
/// store failure only costs an extra remote call next time.
#[derive(Clone)]
pub struct UpdateCache {
    store: Arc<dyn KeyValueStore>,
    release_key: String,
    remote_version_key: String,
}

impl UpdateCache {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, source: &UpdateSource) -> Self {
        Self {
            store,
            release_key: source.release_cache_key(),
            remote_version_key: source.remote_version_cache_key(),
        }
    }

    #[must_use]
    pub fn release(&self) -> Option<CachedRelease> {
        load(self.store.as_ref(), &self.release_key)
    }

    pub fn store_release(&self, entry: &CachedRelease) {
        if let Err(error) = save(
            self.store.as_ref(),
            &self.release_key,
            entry,
            Some(RELEASE_TTL),
        ) {
            warn!("Failed to cache release lookup: {error}");
        }
    }

    pub fn clear_release(&self) {
        debug!("Clearing release cache {}", self.release_key);
        if let Err(error) = self.store.delete(&self.release_key) {
            warn!("Failed to clear release cache: {error}");
        }
    }

    #[must_use]
    pub fn remote_version(&self) -> Option<String> {
        load::<String>(self.store.as_ref(), &self.remote_version_key)
            .filter(|version| !version.is_empty())
    }

    pub fn store_remote_version(&self, version: &str) {
        if let Err(error) = save(
            self.store.as_ref(),
            &self.remote_version_key,
            &version,
            Some(REMOTE_VERSION_TTL),
        ) {
            warn!("Failed to cache remote manifest version: {error}");
        }
    }

    pub fn clear_all(&self) {
        self.clear_release();
        if let Err(error) = self.store.delete(&self.remote_version_key) {
            warn!("Failed to clear remote version cache: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{CachedRelease, REMOTE_VERSION_TTL, UpdateCache};
    use crate::resolver::ReleaseInfo;
    use crate::source::{PackageManifest, UpdateSource};
    use crate::store::{KeyValueStore, ManualClock, MemoryStore};
    use crate::version::VersionIdentity;

    fn source() -> UpdateSource {
        UpdateSource::new(
            "acme",
            "widgets",
            PackageManifest::new("widgets", "widgets.php"),
        )
    }

    fn release() -> ReleaseInfo {
        ReleaseInfo {
            version: VersionIdentity::new("1.2.0"),
            download_url: "https://example.test/widgets.zip".to_string(),
            display_url: "https://example.test/widgets".to_string(),
            release_notes: Some("Fixes".to_string()),
            commit_build: None,
            commit_sha: None,
        }
    }

    #[test]
    fn negative_entry_serializes_as_false_flag() {
        let value = serde_json::to_value(CachedRelease::no_update()).expect("serialize");
        assert_eq!(value, json!({ "new_version": false }));

        let parsed: CachedRelease = serde_json::from_value(value).expect("deserialize");
        assert!(parsed.release().is_none());
    }

    #[test]
    fn positive_entry_keeps_every_release_field() {
        let value = serde_json::to_value(CachedRelease::available(release())).expect("serialize");
        assert_eq!(value["new_version"], json!("1.2.0"));
        assert_eq!(value["download_url"], json!("https://example.test/widgets.zip"));

        let parsed: CachedRelease = serde_json::from_value(value).expect("deserialize");
        let parsed = parsed.release().expect("positive entry should carry release");
        assert_eq!(parsed.version.as_str(), "1.2.0");
        assert_eq!(parsed.release_notes.as_deref(), Some("Fixes"));
    }

    #[test]
    fn remote_version_expires_after_five_minutes() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid start time"),
        ));
        let cache = UpdateCache::new(Arc::new(MemoryStore::with_clock(clock.clone())), &source());

        cache.store_remote_version("2.0.0");
        assert_eq!(cache.remote_version().as_deref(), Some("2.0.0"));

        clock.advance(REMOTE_VERSION_TTL + Duration::from_secs(1));
        assert_eq!(cache.remote_version(), None);
    }

    #[test]
    fn clear_all_removes_both_domains_only() {
        let store = Arc::new(MemoryStore::new());
        let cache = UpdateCache::new(store.clone(), &source());
        store
            .set("unrelated", json!(1), None)
            .expect("set should succeed");

        cache.store_release(&CachedRelease::no_update());
        cache.store_remote_version("2.0.0");
        cache.clear_all();

        assert!(cache.release().is_none());
        assert!(cache.remote_version().is_none());
        assert!(store.contains("unrelated"));
    }
}
