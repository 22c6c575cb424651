//! Pull request model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::commit::Commit;
use super::repository::RepositoryKey;
use super::review::Review;

/// State of a pull request as GitHub reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

impl From<&str> for PullRequestState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Typed address of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRequestKey {
    pub repository: RepositoryKey,
    pub number: i64,
}

impl PullRequestKey {
    pub fn new(repository: RepositoryKey, number: i64) -> Self {
        Self { repository, number }
    }
}

impl std::fmt::Display for PullRequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repository.full_name, self.number)
    }
}

/// Persisted pull request. Exactly one row per `(repository, number)`; it is
/// replaced whenever the PR is re-synced.
///
/// Timestamps are Unix seconds. `None` means GitHub sent nothing, or sent
/// something that did not parse.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PullRequest {
    pub organization: String,

    /// Repository `owner/name`.
    pub repository: String,

    pub number: i64,

    /// API URL of the pull request.
    pub url: String,

    /// Login of the PR author.
    pub author: String,

    /// `open` or `closed`.
    pub state: String,

    pub merged: bool,

    /// Login of whoever merged the PR.
    pub merged_by: Option<String>,

    pub additions: i64,
    pub deletions: i64,

    pub updated_at: Option<i64>,
    pub merged_at: Option<i64>,
    pub closed_at: Option<i64>,
}

impl PullRequest {
    pub fn key(&self) -> PullRequestKey {
        PullRequestKey::new(
            RepositoryKey::new(&self.organization, &self.repository),
            self.number,
        )
    }

    /// Parse the state string into an enum.
    pub fn state_enum(&self) -> PullRequestState {
        PullRequestState::from(self.state.as_str())
    }

    pub fn is_closed(&self) -> bool {
        self.state_enum() == PullRequestState::Closed
    }

    /// Whether the PR was merged by its own author.
    pub fn is_self_merge(&self) -> bool {
        self.merged_by.as_deref() == Some(self.author.as_str())
    }
}

/// Everything the sync engine writes for one PR in a single transaction.
#[derive(Debug, Clone)]
pub struct PullRequestSnapshot {
    pub pull_request: PullRequest,
    pub commits: Vec<Commit>,
    pub reviews: Vec<Review>,

    /// Raw timeline JSON as returned by GitHub.
    pub timeline: String,
}
