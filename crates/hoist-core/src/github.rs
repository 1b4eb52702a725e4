use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;

use crate::error::UpdateError;
use crate::source::Endpoints;

pub const DEFAULT_USER_AGENT: &str = concat!("hoist/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const GITHUB_JSON: &str = "application/vnd.github.v3+json";

/// `GET /repos/{owner}/{repo}/releases/latest`. Every field is optional so a
/// rate-limit body (`{"message": ...}`) still deserializes.
#[derive(Debug, Default, Deserialize)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub zipball_url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /repos/{owner}/{repo}/commits/{branch}`.
#[derive(Debug, Default, Deserialize)]
pub struct GitHubCommit {
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub commit: Option<CommitDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub committer: Option<Signature>,
    #[serde(default)]
    pub author: Option<Signature>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub date: Option<String>,
}

impl GitHubCommit {
    /// Commit timestamp as reported by the API; committer date first.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        let detail = self.commit.as_ref()?;
        detail
            .committer
            .as_ref()
            .and_then(|s| s.date.as_deref())
            .or_else(|| detail.author.as_ref().and_then(|s| s.date.as_deref()))
    }
}

/// Thin HTTP wrapper: one shared client, fixed headers, no retries.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl GitHubClient {
    /// Build a client with a per-request timeout and identifying user agent.
    ///
    /// # Errors
    /// Returns an error when the TLS backend cannot be initialized.
    pub fn new(
        endpoints: Endpoints,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|error| UpdateError::remote_from("http client setup", error))?;
        Ok(Self { http, endpoints })
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn get_json_api(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        self.http.get(url).header(ACCEPT, GITHUB_JSON).send().await
    }

    pub(crate) async fn get_raw(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        self.http.get(url).send().await
    }
}

pub(crate) fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use super::{GitHubCommit, GitHubRelease, response_snippet};

    #[test]
    fn rate_limit_body_deserializes_as_release() {
        let release: GitHubRelease = serde_json::from_str(
            r#"{"message":"API rate limit exceeded","documentation_url":"https://docs.github.com"}"#,
        )
        .expect("rate limit body should deserialize");

        assert!(release.tag_name.is_none());
        assert_eq!(release.message.as_deref(), Some("API rate limit exceeded"));
    }

    #[test]
    fn commit_date_prefers_committer_over_author() {
        let commit: GitHubCommit = serde_json::from_str(
            r#"{"sha":"abc","commit":{"author":{"date":"2024-01-01T00:00:00Z"},"committer":{"date":"2024-03-05T10:15:30Z"}}}"#,
        )
        .expect("commit body should deserialize");
        assert_eq!(commit.date(), Some("2024-03-05T10:15:30Z"));

        let author_only: GitHubCommit = serde_json::from_str(
            r#"{"sha":"abc","commit":{"author":{"date":"2024-01-01T00:00:00Z"}}}"#,
        )
        .expect("commit body should deserialize");
        assert_eq!(author_only.date(), Some("2024-01-01T00:00:00Z"));

        assert_eq!(GitHubCommit::default().date(), None);
    }

    #[test]
    fn snippet_is_truncated_and_prefixed() {
        assert_eq!(response_snippet("", 10), "");
        assert_eq!(response_snippet("abcdef", 3), ": abc");
    }
}
