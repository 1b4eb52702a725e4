use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::UpdateCache;
use crate::error::UpdateError;
use crate::github::{GitHubClient, GitHubCommit, GitHubRelease, response_snippet};
use crate::manifest::RemoteManifest;
use crate::source::UpdateSource;
use crate::version::{VersionIdentity, build_token, clean};

const SHA_LEN: usize = 40;
const SHORT_SHA_LEN: usize = 7;

/// Outcome of one successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: VersionIdentity,
    pub download_url: String,
    pub display_url: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

impl ReleaseInfo {
    #[must_use]
    pub fn short_sha(&self) -> Option<&str> {
        self.commit_sha
            .as_deref()
            .map(|sha| sha.get(..SHORT_SHA_LEN).unwrap_or(sha))
    }
}

enum ReleaseLookup {
    Found(ReleaseInfo),
    NoRelease,
    Unreachable(reqwest::Error),
}

/// Finds the newest artifact: the latest tagged release, or the head of the
/// tracked branch when there is no release or the installation is pinned to
/// branch tracking.
pub struct ReleaseResolver<'a> {
    client: &'a GitHubClient,
    source: &'a UpdateSource,
    cache: &'a UpdateCache,
    local_base: &'a str,
}

impl<'a> ReleaseResolver<'a> {
    #[must_use]
    pub fn new(
        client: &'a GitHubClient,
        source: &'a UpdateSource,
        cache: &'a UpdateCache,
        local_base: &'a str,
    ) -> Self {
        Self {
            client,
            source,
            cache,
            local_base,
        }
    }

    /// Resolve the newest available artifact.
    ///
    /// # Errors
    /// Returns [`UpdateError::RemoteUnavailable`] when neither tier produced a
    /// usable answer. Callers treat that as "no update this cycle".
    pub async fn resolve(&self) -> Result<ReleaseInfo, UpdateError> {
        if self.source.branch_only {
            return self.latest_from_branch().await;
        }

        match self.latest_release().await? {
            ReleaseLookup::Found(release) => Ok(release),
            ReleaseLookup::NoRelease => {
                debug!("{}", UpdateError::NotFound);
                self.latest_from_branch().await
            }
            ReleaseLookup::Unreachable(error) => {
                warn!("Release lookup failed, falling back to branch: {error}");
                self.latest_from_branch().await
            }
        }
    }

    async fn latest_release(&self) -> Result<ReleaseLookup, UpdateError> {
        let url = self.client.endpoints().latest_release(self.source);
        debug!("Fetching latest release from {url}");

        let response = match self.client.get_json_api(&url).await {
            Ok(response) => response,
            Err(error) => return Ok(ReleaseLookup::Unreachable(error)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(ReleaseLookup::NoRelease);
        }
        if status != reqwest::StatusCode::OK {
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(UpdateError::remote(
                "release lookup",
                format!("HTTP {status}{body_snippet}"),
            ));
        }

        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|error| UpdateError::remote_from("release lookup", error))?;

        if let Some(message) = release.message.as_deref() {
            return Err(UpdateError::remote(
                "release lookup",
                format!("API error: {message}"),
            ));
        }

        let Some(tag) = release.tag_name.as_deref().filter(|tag| !tag.trim().is_empty()) else {
            return Err(UpdateError::remote(
                "release lookup",
                "response has no tag name",
            ));
        };

        let version = VersionIdentity::new(tag);
        info!("Latest release is {version} ({tag})");
        let endpoints = self.client.endpoints();

        Ok(ReleaseLookup::Found(ReleaseInfo {
            version,
            download_url: release
                .zipball_url
                .clone()
                .unwrap_or_else(|| endpoints.tag_archive(self.source, tag)),
            display_url: release
                .html_url
                .clone()
                .unwrap_or_else(|| endpoints.repository_page(self.source)),
            release_notes: release.body.filter(|body| !body.trim().is_empty()),
            commit_build: None,
            commit_sha: None,
        }))
    }

    async fn latest_from_branch(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = self.client.endpoints().branch_head(self.source);
        debug!("Fetching branch head from {url}");

        let response = self
            .client
            .get_json_api(&url)
            .await
            .map_err(|error| UpdateError::remote_from("branch lookup", error))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdateError::remote(
                "branch lookup",
                format!("HTTP {status}"),
            ));
        }

        let commit: GitHubCommit = response
            .json()
            .await
            .map_err(|error| UpdateError::remote_from("branch lookup", error))?;

        let Some(sha) = commit
            .sha
            .as_deref()
            .map(str::trim)
            .filter(|sha| !sha.is_empty())
        else {
            return Err(UpdateError::remote("branch lookup", "commit has no sha"));
        };
        let sha: String = sha.chars().take(SHA_LEN).collect();

        let committed_at = commit
            .date()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
            .map_or_else(Utc::now, |date| date.with_timezone(&Utc));
        let commit_build = build_token(committed_at);

        let base = if self.source.branch_only {
            RemoteManifest::new(self.client, self.source, self.cache)
                .fetch_remote_base_version(self.local_base)
                .await
        } else {
            clean(self.local_base)
        };

        let version = VersionIdentity::with_build(&base, &commit_build);
        let endpoints = self.client.endpoints();
        info!(
            "Branch {} head is {} ({version})",
            self.source.branch,
            sha.get(..SHORT_SHA_LEN).unwrap_or(&sha)
        );

        Ok(ReleaseInfo {
            version,
            download_url: endpoints.commit_archive(self.source, &sha),
            display_url: endpoints.repository_page(self.source),
            release_notes: None,
            commit_build: Some(commit_build),
            commit_sha: Some(sha),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ReleaseInfo;
    use crate::version::VersionIdentity;

    #[test]
    fn short_sha_truncates_to_seven_characters() {
        let release = ReleaseInfo {
            version: VersionIdentity::new("1.0.0.20240305101530"),
            download_url: String::new(),
            display_url: String::new(),
            release_notes: None,
            commit_build: Some("20240305101530".to_string()),
            commit_sha: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        };
        assert_eq!(release.short_sha(), Some("0123456"));

        let tagged = ReleaseInfo {
            commit_sha: None,
            ..release
        };
        assert_eq!(tagged.short_sha(), None);
    }
}
