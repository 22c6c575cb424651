//! Incremental sync engine for GitHub pull request data.
//!
//! For one organization this walks every repository and pull request,
//! re-fetches only the PRs whose remote `updated_at` moved past the stored
//! copy, and writes each refreshed PR (record, commits, reviews, timeline) in
//! a single transaction.
//!
//! Commits that disappeared from a PR after a force-push are kept as
//! `discarded` when a review still points at their SHA, so review credit can
//! still be matched against their committer date.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::db::RecordStore;
use crate::error::AppError;
use crate::models::{PullRequest, PullRequestKey, PullRequestSnapshot, RepositoryKey};
use crate::services::convert::{self, parse_iso_timestamp};
use crate::services::github_client::{GitHubCommit, GitHubPullRequest, GitHubReview};
use crate::services::remote_source::RemoteSource;

/// Result of a sync operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub organization: String,

    /// Repositories whose pull requests were walked.
    pub repositories_visited: u64,

    pub pull_requests_seen: u64,

    /// PRs re-fetched and rewritten.
    pub pull_requests_refreshed: u64,

    /// PRs whose stored copy was already current.
    pub pull_requests_skipped: u64,

    /// Commit rows written, discarded ones included.
    pub commits_written: u64,

    pub discarded_commits_written: u64,

    pub reviews_written: u64,

    /// Duration of the sync in milliseconds.
    pub duration_ms: u64,
}

/// Decision for one listed pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Stored copy is at least as new as the listing.
    Skip,
    /// Not stored yet, or the listing is newer.
    Refresh,
    /// Stored copy has no usable `updated_at`; refresh from the full detail.
    ForceRefresh,
}

/// Compare the stored PR against the listed one.
///
/// An unparseable listed `updated_at` counts as epoch 0, so it never looks
/// newer than a stored copy.
pub fn refresh_decision(existing: Option<&PullRequest>, listed_updated_at: Option<i64>) -> RefreshDecision {
    let Some(existing) = existing else {
        return RefreshDecision::Refresh;
    };
    match existing.updated_at {
        None => RefreshDecision::ForceRefresh,
        Some(stored) if stored < listed_updated_at.unwrap_or(0) => RefreshDecision::Refresh,
        Some(_) => RefreshDecision::Skip,
    }
}

/// SHAs to persist for a PR, each flagged `discarded` when it is referenced
/// only by a review and no longer in the current commit list.
///
/// Order: current commits as listed, then discarded SHAs in review order.
pub fn reconcile_commit_shas(commits: &[GitHubCommit], reviews: &[GitHubReview]) -> Vec<(String, bool)> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut shas = Vec::with_capacity(commits.len());

    for commit in commits {
        if seen.insert(commit.sha.as_str()) {
            shas.push((commit.sha.clone(), false));
        }
    }

    for review in reviews {
        let Some(sha) = review.commit_id.as_deref() else {
            continue;
        };
        if sha.is_empty() {
            continue;
        }
        if seen.insert(sha) {
            shas.push((sha.to_string(), true));
        }
    }

    shas
}

/// Sync engine bound to a record store and a remote source.
pub struct SyncEngine {
    store: RecordStore,
    remote: Arc<dyn RemoteSource>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(store: RecordStore, remote: Arc<dyn RemoteSource>) -> Self {
        Self { store, remote }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Bring the stored records of `organization` up to date.
    ///
    /// `repository_filter` matches either the short name or `owner/name`.
    /// The cancellation token is checked at repository boundaries only, so a
    /// cancelled run finishes the in-flight repository and then returns
    /// `Cancelled`, never leaving a PR half written. The first remote or store
    /// error aborts the run; PRs written before it stay valid and are skipped
    /// on retry.
    pub async fn synchronize(
        &self,
        organization: &str,
        repository_filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, AppError> {
        let start = Instant::now();
        let mut report = SyncReport {
            organization: organization.to_string(),
            ..Default::default()
        };

        let listed = self.remote.list_org_repositories(organization).await?;
        let repositories: Vec<_> = listed
            .iter()
            .filter(|r| match repository_filter {
                Some(filter) => r.name == filter || r.full_name == filter,
                None => true,
            })
            .map(|r| convert::repository_from_github(organization, r))
            .collect();

        if let Some(filter) = repository_filter {
            if repositories.is_empty() {
                return Err(AppError::not_found_with_id("Repository", filter));
            }
        }

        self.store.ensure_repositories(&repositories).await?;
        log::info!(
            "Syncing {} repositories for {}",
            repositories.len(),
            organization
        );

        for repository in &repositories {
            if cancel.is_cancelled() {
                log::warn!(
                    "Sync of {} cancelled before {}",
                    organization,
                    repository.full_name
                );
                return Err(AppError::Cancelled);
            }

            self.sync_repository(&repository.key(), &repository.name, &mut report)
                .await?;
            report.repositories_visited += 1;

            if cancel.is_cancelled() {
                log::warn!(
                    "Sync of {} cancelled after {}",
                    organization,
                    repository.full_name
                );
                return Err(AppError::Cancelled);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Sync of {} complete: {} PRs seen, {} refreshed, {} skipped, {} commits ({} discarded), {} reviews in {}ms",
            organization,
            report.pull_requests_seen,
            report.pull_requests_refreshed,
            report.pull_requests_skipped,
            report.commits_written,
            report.discarded_commits_written,
            report.reviews_written,
            report.duration_ms
        );

        Ok(report)
    }

    async fn sync_repository(
        &self,
        repository: &RepositoryKey,
        name: &str,
        report: &mut SyncReport,
    ) -> Result<(), AppError> {
        let organization = repository.organization.as_str();
        log::info!("--- Updating pull requests for {} ---", repository);

        let pull_requests = self.remote.list_pull_requests(organization, name).await?;

        for listed in &pull_requests {
            report.pull_requests_seen += 1;

            let key = PullRequestKey::new(repository.clone(), listed.number);
            let existing = self.store.get_pull_request(&key).await?;
            let listed_updated_at = listed.updated_at.as_deref().and_then(parse_iso_timestamp);

            let detail = match refresh_decision(existing.as_ref(), listed_updated_at) {
                RefreshDecision::Skip => {
                    log::debug!("{} no update", key);
                    report.pull_requests_skipped += 1;
                    continue;
                }
                RefreshDecision::Refresh => None,
                RefreshDecision::ForceRefresh => {
                    log::debug!("{} has no stored update time, forcing refresh", key);
                    Some(
                        self.remote
                            .get_pull_request(organization, name, listed.number)
                            .await?,
                    )
                }
            };

            self.refresh_pull_request(&key, name, detail, report).await?;
            report.pull_requests_refreshed += 1;
        }

        Ok(())
    }

    /// Fetch everything for one PR and write it in one transaction.
    async fn refresh_pull_request(
        &self,
        key: &PullRequestKey,
        name: &str,
        detail: Option<GitHubPullRequest>,
        report: &mut SyncReport,
    ) -> Result<(), AppError> {
        let organization = key.repository.organization.as_str();
        let number = key.number;
        log::debug!("Refreshing {}", key);

        let listed_commits = self
            .remote
            .list_pull_request_commits(organization, name, number)
            .await?;
        let listed_reviews = self
            .remote
            .list_pull_request_reviews(organization, name, number)
            .await?;

        let shas = reconcile_commit_shas(&listed_commits, &listed_reviews);
        let mut commits = Vec::with_capacity(shas.len());
        let mut discarded_count = 0u64;
        for (sha, discarded) in &shas {
            if *discarded {
                log::info!("{} keeping discarded commit {} referenced by a review", key, sha);
                discarded_count += 1;
            }
            let full = self.remote.get_commit(organization, name, sha).await?;
            commits.push(convert::commit_from_github(&full, *discarded));
        }

        let reviews: Vec<_> = listed_reviews
            .iter()
            .map(convert::review_from_github)
            .collect();

        let timeline = self.remote.get_timeline(organization, name, number).await?;

        let detail = match detail {
            Some(d) => d,
            None => {
                self.remote
                    .get_pull_request(organization, name, number)
                    .await?
            }
        };
        if detail.number != number {
            return Err(AppError::sync(format!(
                "requested {} but GitHub returned #{}",
                key, detail.number
            )));
        }
        let pull_request =
            convert::pull_request_from_github(organization, &key.repository.full_name, &detail);

        let snapshot = PullRequestSnapshot {
            pull_request,
            commits,
            reviews,
            timeline,
        };
        self.store.write_pull_request_snapshot(&snapshot).await?;

        report.commits_written += snapshot.commits.len() as u64;
        report.discarded_commits_written += discarded_count;
        report.reviews_written += snapshot.reviews.len() as u64;

        Ok(())
    }
}
