//! Remote source abstraction.
//!
//! The sync engine only talks to GitHub through this trait, so tests can
//! substitute an in-memory source.

use async_trait::async_trait;

use crate::error::AppError;
use crate::services::github_client::{
    GitHubCommit, GitHubPullRequest, GitHubRepository, GitHubReview,
};

/// Read-only view of an organization's pull request activity.
///
/// Every listing returns the complete result set (all pages) or an error.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_org_repositories(
        &self,
        organization: &str,
    ) -> Result<Vec<GitHubRepository>, AppError>;

    /// All pull requests of a repository, in every state, most recently
    /// updated first.
    async fn list_pull_requests(
        &self,
        organization: &str,
        repository: &str,
    ) -> Result<Vec<GitHubPullRequest>, AppError>;

    async fn get_pull_request(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError>;

    async fn list_pull_request_commits(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<Vec<GitHubCommit>, AppError>;

    async fn list_pull_request_reviews(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<Vec<GitHubReview>, AppError>;

    /// Full commit detail, including line stats.
    async fn get_commit(
        &self,
        organization: &str,
        repository: &str,
        sha: &str,
    ) -> Result<GitHubCommit, AppError>;

    /// Raw timeline JSON array with every page merged.
    async fn get_timeline(
        &self,
        organization: &str,
        repository: &str,
        number: i64,
    ) -> Result<String, AppError>;
}
