//! Conversion between GitHub payloads, persisted records and report DTOs.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    Commit, LineStats, PullRequest, Repository, Review, TimelineEvent, TimelineEventKind,
};
use crate::services::github_client::{
    GitHubCommit, GitHubPullRequest, GitHubRepository, GitHubReview, GitHubUser,
};

/// Parse an RFC 3339 timestamp into Unix seconds. Empty or malformed input
/// yields `None`; callers treat that as "unknown" rather than failing.
pub fn parse_iso_timestamp(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .ok()
}

fn parse_optional_timestamp(s: Option<&str>) -> Option<i64> {
    s.and_then(parse_iso_timestamp)
}

/// Format Unix seconds as RFC 1123 (`Mon, 02 Jan 2006 15:04:05 UTC`).
pub fn format_rfc1123(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}

fn login(user: &Option<GitHubUser>) -> String {
    user.as_ref().map(|u| u.login.clone()).unwrap_or_default()
}

pub fn repository_from_github(organization: &str, repo: &GitHubRepository) -> Repository {
    Repository {
        organization: organization.to_string(),
        full_name: repo.full_name.clone(),
        name: repo.name.clone(),
    }
}

pub fn pull_request_from_github(
    organization: &str,
    full_name: &str,
    pr: &GitHubPullRequest,
) -> PullRequest {
    PullRequest {
        organization: organization.to_string(),
        repository: full_name.to_string(),
        number: pr.number,
        url: pr.url.clone(),
        author: login(&pr.user),
        state: pr.state.clone(),
        merged: pr.merged.unwrap_or(false),
        merged_by: pr
            .merged_by
            .as_ref()
            .map(|u| u.login.clone())
            .filter(|l| !l.is_empty()),
        additions: pr.additions.unwrap_or(0),
        deletions: pr.deletions.unwrap_or(0),
        updated_at: parse_optional_timestamp(pr.updated_at.as_deref()),
        merged_at: parse_optional_timestamp(pr.merged_at.as_deref()),
        closed_at: parse_optional_timestamp(pr.closed_at.as_deref()),
    }
}

pub fn commit_from_github(commit: &GitHubCommit, discarded: bool) -> Commit {
    let stats = commit.stats.unwrap_or_default();
    Commit {
        sha: commit.sha.clone(),
        author: login(&commit.author),
        committer: login(&commit.committer),
        committer_date: parse_optional_timestamp(
            commit
                .commit
                .committer
                .as_ref()
                .and_then(|c| c.date.as_deref()),
        ),
        additions: stats.additions,
        deletions: stats.deletions,
        message: commit.commit.message.clone(),
        discarded,
    }
}

pub fn review_from_github(review: &GitHubReview) -> Review {
    Review {
        id: review.id,
        reviewer: login(&review.user),
        state: review.state.clone(),
        submitted_at: parse_optional_timestamp(review.submitted_at.as_deref()),
        commit_id: review.commit_id.clone().unwrap_or_default(),
    }
}

#[derive(Debug, Deserialize)]
struct RawTimelineEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    user: Option<GitHubUser>,
    #[serde(default)]
    actor: Option<GitHubUser>,
}

/// Interpret a raw timeline blob. The acting login comes from `user`
/// (set on `reviewed` events) or else `actor`.
pub fn parse_timeline(raw: &str) -> Result<Vec<TimelineEvent>, AppError> {
    let events: Vec<RawTimelineEvent> = serde_json::from_str(raw)?;
    Ok(events
        .into_iter()
        .map(|e| TimelineEvent {
            kind: e
                .event
                .as_deref()
                .map(TimelineEventKind::from)
                .unwrap_or(TimelineEventKind::Other),
            actor: e
                .user
                .or(e.actor)
                .map(|u| u.login)
                .filter(|l| !l.is_empty()),
        })
        .collect())
}

/// A pull request as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInformation {
    #[serde(rename = "repo")]
    pub repository: String,
    pub url: String,
    pub number: i64,
    pub additions: i64,
    pub deletions: i64,
    /// Merge date, RFC 1123.
    pub date: String,
    pub state: String,
}

/// A review as reported to callers, sized by the reviewed PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInformation {
    #[serde(rename = "repo")]
    pub repository: String,
    pub url: String,
    pub number: i64,
    pub additions: i64,
    pub deletions: i64,
    /// Submission date, RFC 1123.
    pub date: String,
    pub state: String,
}

/// One user's attribution in one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInformation {
    pub prs: Vec<String>,
    #[serde(rename = "repo")]
    pub repository: String,
    #[serde(rename = "commitadditions")]
    pub commit_additions: i64,
    #[serde(rename = "commitdeletions")]
    pub commit_deletions: i64,
    #[serde(rename = "mergeadditions")]
    pub merge_additions: i64,
    #[serde(rename = "mergedeletions")]
    pub merge_deletions: i64,
    #[serde(rename = "reviewadditions")]
    pub review_additions: i64,
    #[serde(rename = "reviewdeletions")]
    pub review_deletions: i64,
}

pub fn pull_request_information(pr: &PullRequest) -> PullRequestInformation {
    PullRequestInformation {
        repository: pr.repository.clone(),
        url: pr.url.clone(),
        number: pr.number,
        additions: pr.additions,
        deletions: pr.deletions,
        date: pr.merged_at.map(format_rfc1123).unwrap_or_default(),
        state: pr.state.clone(),
    }
}

pub fn review_information(pr: &PullRequest, review: &Review) -> ReviewInformation {
    ReviewInformation {
        repository: pr.repository.clone(),
        url: pr.url.clone(),
        number: pr.number,
        additions: pr.additions,
        deletions: pr.deletions,
        date: review.submitted_at.map(format_rfc1123).unwrap_or_default(),
        state: review.state.clone(),
    }
}

impl RepositoryInformation {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    pub fn add_commits(&mut self, stats: LineStats) {
        self.commit_additions += stats.additions;
        self.commit_deletions += stats.deletions;
    }

    pub fn add_merges(&mut self, stats: LineStats) {
        self.merge_additions += stats.additions;
        self.merge_deletions += stats.deletions;
    }

    pub fn add_reviews(&mut self, stats: LineStats) {
        self.review_additions += stats.additions;
        self.review_deletions += stats.deletions;
    }
}
