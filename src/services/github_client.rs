//! GitHub API client.
//!
//! Provides an HTTP client for the GitHub REST API with token authentication,
//! page-number pagination and proactive rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::remote_source::RemoteSource;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub allows 5000 requests/hour; 10/sec leaves room for bursts.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

const PER_PAGE: u32 = 100;

/// GitHub API client configuration.
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    /// Base URL of the API (e.g., `https://api.github.com`).
    pub base_url: String,

    /// Personal access token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Upper bound on outgoing requests per second.
    pub requests_per_second: u32,
}

impl Default for GitHubClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: String::new(),
            timeout_secs: 30,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
    rate_limiter: Arc<GovernorRateLimiter>,
}

/// GitHub user reference from API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/// GitHub repository from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub full_name: String,
}

/// GitHub pull request from API.
///
/// The list endpoint omits `merged`, `merged_by` and the line stats; those are
/// only present on the single-PR endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubPullRequest {
    pub number: i64,
    pub url: String,
    pub state: String,
    pub user: Option<GitHubUser>,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merged_by: Option<GitHubUser>,
    #[serde(default)]
    pub additions: Option<i64>,
    #[serde(default)]
    pub deletions: Option<i64>,
    pub updated_at: Option<String>,
    pub merged_at: Option<String>,
    pub closed_at: Option<String>,
}

/// Git identity embedded in a commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubGitActor {
    pub name: Option<String>,
    pub date: Option<String>,
}

/// The git-level part of a commit payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    #[serde(default)]
    pub message: String,
    pub author: Option<GitHubGitActor>,
    pub committer: Option<GitHubGitActor>,
}

/// Line stats, present on the single-commit endpoint only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GitHubCommitStats {
    pub additions: i64,
    pub deletions: i64,
}

/// GitHub commit from API.
///
/// `author`/`committer` are the linked GitHub accounts and are null when the
/// commit email is not associated with one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
    pub author: Option<GitHubUser>,
    pub committer: Option<GitHubUser>,
    #[serde(default)]
    pub stats: Option<GitHubCommitStats>,
}

/// GitHub pull request review from API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubReview {
    pub id: i64,
    pub user: Option<GitHubUser>,
    pub state: String,
    pub submitted_at: Option<String>,
    pub commit_id: Option<String>,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(config: GitHubClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("token {}", config.token))
            .map_err(|_| AppError::authentication("Invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("github-tracker/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::github_api(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication(
                "GitHub token rejected. Check GITHUB_TOKEN.",
            ))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // GitHub returns errors as {"message": "...", "documentation_url": "..."}
            let body_message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

            let message = match (status, &body_message) {
                (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
                (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
                (_, Some(msg)) => msg.clone(),
                _ => format!("Request failed ({}): {}", status_code, body),
            };

            Err(AppError::github_api_full(message, status_code, endpoint))
        }
    }

    /// Make a single rate-limited GET request.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.rate_limiter.until_ready().await;

        let url = self.api_url(endpoint);
        let response = self.client.get(&url).query(query).send().await?;
        self.handle_response(response, endpoint).await
    }

    /// Fetch all pages of a paginated endpoint. An empty page ends the walk.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AppError> {
        let mut all_data = Vec::new();
        let mut page = 1u32;

        loop {
            let mut params = query.to_vec();
            params.push(("page", page.to_string()));
            params.push(("per_page", PER_PAGE.to_string()));

            let data: Vec<T> = self.get(endpoint, &params).await?;
            if data.is_empty() {
                break;
            }

            log::trace!("{} page {}: {} items", endpoint, page, data.len());
            all_data.extend(data);
            page += 1;
        }

        Ok(all_data)
    }
}

fn repo_path(organization: &str, repository: &str) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(organization),
        urlencoding::encode(repository)
    )
}

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn list_org_repositories(
        &self,
        organization: &str,
    ) -> Result<Vec<GitHubRepository>, AppError> {
        let endpoint = format!("/orgs/{}/repos", urlencoding::encode(organization));
        self.get_all_pages(&endpoint, &[]).await
    }

    async fn list_pull_requests(
        &self,
        organization: &str,
        repository: &str,
    ) -> Result<Vec<GitHubPullRequest>, AppError> {
        let endpoint = format!("{}/pulls", repo_path(organization, repository));
        let query = [
            ("state", "all".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ];
        self.get_all_pages(&endpoint, &query).await
    }

    async fn get_pull_request(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError> {
        let endpoint = format!("{}/pulls/{}", repo_path(organization, repository), number);
        self.get(&endpoint, &[]).await
    }

    async fn list_pull_request_commits(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<Vec<GitHubCommit>, AppError> {
        let endpoint = format!(
            "{}/pulls/{}/commits",
            repo_path(organization, repository),
            number
        );
        self.get_all_pages(&endpoint, &[]).await
    }

    async fn list_pull_request_reviews(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<Vec<GitHubReview>, AppError> {
        let endpoint = format!(
            "{}/pulls/{}/reviews",
            repo_path(organization, repository),
            number
        );
        self.get_all_pages(&endpoint, &[]).await
    }

    async fn get_commit(
        &self,
        organization: &str,
        repository: &str,
        sha: &str,
    ) -> Result<GitHubCommit, AppError> {
        let endpoint = format!(
            "{}/commits/{}",
            repo_path(organization, repository),
            urlencoding::encode(sha)
        );
        self.get(&endpoint, &[]).await
    }

    async fn get_timeline(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<String, AppError> {
        let endpoint = format!(
            "{}/issues/{}/timeline",
            repo_path(organization, repository),
            number
        );
        let events: Vec<serde_json::Value> = self.get_all_pages(&endpoint, &[]).await?;
        Ok(serde_json::to_string(&events)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_construction() {
        let client = GitHubClient::new(GitHubClientConfig {
            base_url: "https://github.example.com/api/v3/".to_string(),
            token: "test-token".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            client.api_url("/orgs/decred/repos"),
            "https://github.example.com/api/v3/orgs/decred/repos"
        );
    }

    #[test]
    fn test_repo_path_encodes_segments() {
        assert_eq!(repo_path("decred", "dcrd"), "/repos/decred/dcrd");
        assert_eq!(repo_path("my org", "a b"), "/repos/my%20org/a%20b");
    }

    #[test]
    fn test_zero_rps_is_clamped() {
        let client = GitHubClient::new(GitHubClientConfig {
            requests_per_second: 0,
            ..Default::default()
        });
        assert!(client.is_ok());
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let result = GitHubClient::new(GitHubClientConfig {
            token: "bad\ntoken".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Authentication { .. })));
    }

    #[test]
    fn test_list_pull_request_payload_without_detail_fields() {
        let json = r#"{
            "number": 42,
            "url": "https://api.github.com/repos/decred/dcrd/pulls/42",
            "state": "open",
            "user": {"login": "alice"},
            "updated_at": "2019-03-02T10:00:00Z",
            "merged_at": null,
            "closed_at": null
        }"#;
        let pr: GitHubPullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.user.unwrap().login, "alice");
        assert!(pr.merged.is_none());
        assert!(pr.additions.is_none());
    }

    #[test]
    fn test_commit_payload_with_unlinked_author() {
        let json = r#"{
            "sha": "abc123",
            "commit": {
                "message": "fix",
                "author": {"name": "A", "date": "2019-03-01T00:00:00Z"},
                "committer": {"name": "A", "date": "2019-03-01T01:00:00Z"}
            },
            "author": null,
            "committer": {"login": "web-flow"},
            "stats": {"additions": 3, "deletions": 1, "total": 4}
        }"#;
        let commit: GitHubCommit = serde_json::from_str(json).unwrap();
        assert!(commit.author.is_none());
        assert_eq!(commit.stats.unwrap().additions, 3);
        assert_eq!(
            commit.commit.committer.unwrap().date.as_deref(),
            Some("2019-03-01T01:00:00Z")
        );
    }
}
