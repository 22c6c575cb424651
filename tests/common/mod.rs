//! Shared fixtures: an in-memory remote source and a temp-dir record store.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

use github_tracker::db::{self, RecordStore};
use github_tracker::error::AppError;
use github_tracker::services::github_client::{
    GitHubCommit, GitHubCommitDetail, GitHubCommitStats, GitHubGitActor, GitHubPullRequest,
    GitHubRepository, GitHubReview, GitHubUser,
};
use github_tracker::services::remote_source::RemoteSource;
use github_tracker::services::sync_engine::SyncEngine;

pub const ORG: &str = "decred";
pub const FULL_NAME: &str = "decred/dcrd";
pub const WALLET: &str = "decred/dcrwallet";

/// RFC 3339 timestamp on `day` of March 2019.
pub fn march(day: u32, hour: u32) -> String {
    format!("2019-03-{:02}T{:02}:00:00Z", day, hour)
}

pub fn user(login: &str) -> Option<GitHubUser> {
    Some(GitHubUser {
        login: login.to_string(),
    })
}

pub fn pull_request(number: i64, author: &str, updated_at: &str) -> GitHubPullRequest {
    GitHubPullRequest {
        number,
        url: format!("https://api.github.com/repos/{}/pulls/{}", FULL_NAME, number),
        state: "open".to_string(),
        user: user(author),
        merged: Some(false),
        merged_by: None,
        additions: Some(100),
        deletions: Some(10),
        updated_at: Some(updated_at.to_string()),
        merged_at: None,
        closed_at: None,
    }
}

pub fn merged_by(mut pr: GitHubPullRequest, merger: &str, at: &str) -> GitHubPullRequest {
    pr.state = "closed".to_string();
    pr.merged = Some(true);
    pr.merged_by = user(merger);
    pr.merged_at = Some(at.to_string());
    pr.closed_at = Some(at.to_string());
    pr
}

pub fn closed_unmerged(mut pr: GitHubPullRequest, at: &str) -> GitHubPullRequest {
    pr.state = "closed".to_string();
    pr.closed_at = Some(at.to_string());
    pr
}

pub fn commit(sha: &str, author: &str, date: &str, additions: i64, deletions: i64) -> GitHubCommit {
    GitHubCommit {
        sha: sha.to_string(),
        commit: GitHubCommitDetail {
            message: format!("commit {}", sha),
            author: Some(GitHubGitActor {
                name: Some(author.to_string()),
                date: Some(date.to_string()),
            }),
            committer: Some(GitHubGitActor {
                name: Some(author.to_string()),
                date: Some(date.to_string()),
            }),
        },
        author: user(author),
        committer: user(author),
        stats: Some(GitHubCommitStats {
            additions,
            deletions,
        }),
    }
}

pub fn review(id: i64, reviewer: &str, submitted_at: &str, sha: &str) -> GitHubReview {
    GitHubReview {
        id,
        user: user(reviewer),
        state: "APPROVED".to_string(),
        submitted_at: Some(submitted_at.to_string()),
        commit_id: Some(sha.to_string()),
    }
}

pub fn reviewed_event(login: &str) -> serde_json::Value {
    json!({"event": "reviewed", "user": {"login": login}, "state": "approved"})
}

pub fn merged_event(login: &str) -> serde_json::Value {
    json!({"event": "merged", "actor": {"login": login}})
}

#[derive(Default)]
struct FakePullRequest {
    detail: GitHubPullRequest,
    commit_shas: Vec<String>,
    reviews: Vec<GitHubReview>,
    timeline: Vec<serde_json::Value>,
}

#[derive(Default)]
struct FakeState {
    /// Repositories by full name, each with its PRs by number.
    repos: BTreeMap<String, BTreeMap<i64, FakePullRequest>>,
    commits: HashMap<String, GitHubCommit>,
    calls: HashMap<&'static str, usize>,
    failing: Option<&'static str>,
    failing_pull: Option<(&'static str, i64)>,
    cancel_after_listing: Option<(String, CancellationToken)>,
}

/// In-memory GitHub, counting every call. Starts with one empty repository,
/// `decred/dcrd`; more can be added with [`FakeRemote::add_repository`].
#[derive(Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
        };
        remote.add_repository(FULL_NAME);
        remote
    }

    /// List `full_name` under its owner, with no PRs yet.
    pub fn add_repository(&self, full_name: &str) {
        self.state
            .lock()
            .unwrap()
            .repos
            .entry(full_name.to_string())
            .or_default();
    }

    /// Add or replace a PR in `decred/dcrd`.
    pub fn put_pull_request(
        &self,
        detail: GitHubPullRequest,
        commits: Vec<GitHubCommit>,
        reviews: Vec<GitHubReview>,
        timeline: Vec<serde_json::Value>,
    ) {
        self.put_pull_request_in(FULL_NAME, detail, commits, reviews, timeline);
    }

    /// Add or replace a PR in `full_name`, creating the repository if needed.
    /// The PR url is pointed at that repository. Commits are registered for
    /// `get_commit` and stay fetchable after they leave the PR.
    pub fn put_pull_request_in(
        &self,
        full_name: &str,
        mut detail: GitHubPullRequest,
        commits: Vec<GitHubCommit>,
        reviews: Vec<GitHubReview>,
        timeline: Vec<serde_json::Value>,
    ) {
        detail.url = format!(
            "https://api.github.com/repos/{}/pulls/{}",
            full_name, detail.number
        );
        let mut state = self.state.lock().unwrap();
        let commit_shas = commits.iter().map(|c| c.sha.clone()).collect();
        for c in commits {
            state.commits.insert(c.sha.clone(), c);
        }
        state.repos.entry(full_name.to_string()).or_default().insert(
            detail.number,
            FakePullRequest {
                detail,
                commit_shas,
                reviews,
                timeline,
            },
        );
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make every call to `method` fail with a 502.
    pub fn fail_on(&self, method: &'static str) {
        self.state.lock().unwrap().failing = Some(method);
    }

    /// Make calls to `method` fail with a 502 for PR `number` only.
    pub fn fail_on_pull(&self, method: &'static str, number: i64) {
        self.state.lock().unwrap().failing_pull = Some((method, number));
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing = None;
        state.failing_pull = None;
    }

    /// Cancel `token` as soon as the PRs of `full_name` have been listed,
    /// i.e. while that repository is in flight.
    pub fn cancel_after_listing(&self, full_name: &str, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after_listing = Some((full_name.to_string(), token));
    }

    fn record(&self, method: &'static str, number: Option<i64>) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_default() += 1;
        let failing_pull = match (state.failing_pull, number) {
            (Some((m, n)), Some(number)) => m == method && n == number,
            _ => false,
        };
        if state.failing == Some(method) || failing_pull {
            return Err(AppError::github_api_full("Bad gateway", 502, method));
        }
        Ok(())
    }

    fn with_pull<T>(
        &self,
        org: &str,
        repo: &str,
        number: i64,
        f: impl FnOnce(&FakeState, &FakePullRequest) -> T,
    ) -> Result<T, AppError> {
        let state = self.state.lock().unwrap();
        let pull = state
            .repos
            .get(&format!("{}/{}", org, repo))
            .and_then(|pulls| pulls.get(&number))
            .ok_or_else(|| AppError::github_api_full("Resource not found", 404, "pulls"))?;
        Ok(f(&state, pull))
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn list_org_repositories(&self, org: &str) -> Result<Vec<GitHubRepository>, AppError> {
        self.record("list_org_repositories", None)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .repos
            .keys()
            .filter_map(|full_name| {
                let (owner, name) = full_name.split_once('/')?;
                (owner == org).then(|| GitHubRepository {
                    name: name.to_string(),
                    full_name: full_name.clone(),
                })
            })
            .collect())
    }

    async fn list_pull_requests(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Vec<GitHubPullRequest>, AppError> {
        self.record("list_pull_requests", None)?;
        let full_name = format!("{}/{}", org, repo);
        let state = self.state.lock().unwrap();
        let mut listed: Vec<GitHubPullRequest> = state
            .repos
            .get(&full_name)
            .into_iter()
            .flat_map(|pulls| pulls.values())
            .map(|p| GitHubPullRequest {
                merged: None,
                merged_by: None,
                additions: None,
                deletions: None,
                ..p.detail.clone()
            })
            .collect();
        listed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some((target, token)) = &state.cancel_after_listing {
            if *target == full_name {
                token.cancel();
            }
        }
        Ok(listed)
    }

    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: i64,
    ) -> Result<GitHubPullRequest, AppError> {
        self.record("get_pull_request", Some(number))?;
        self.with_pull(org, repo, number, |_, p| p.detail.clone())
    }

    async fn list_pull_request_commits(
        &self,
        org: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GitHubCommit>, AppError> {
        self.record("list_pull_request_commits", Some(number))?;
        self.with_pull(org, repo, number, |state, p| {
            p.commit_shas
                .iter()
                .filter_map(|sha| state.commits.get(sha))
                .map(|c| GitHubCommit {
                    stats: None,
                    ..c.clone()
                })
                .collect()
        })
    }

    async fn list_pull_request_reviews(
        &self,
        org: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GitHubReview>, AppError> {
        self.record("list_pull_request_reviews", Some(number))?;
        self.with_pull(org, repo, number, |_, p| p.reviews.clone())
    }

    async fn get_commit(&self, _org: &str, _repo: &str, sha: &str) -> Result<GitHubCommit, AppError> {
        self.record("get_commit", None)?;
        self.state
            .lock()
            .unwrap()
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| AppError::github_api_full("No commit found", 422, "commits"))
    }

    async fn get_timeline(&self, org: &str, repo: &str, number: i64) -> Result<String, AppError> {
        self.record("get_timeline", Some(number))?;
        let events = self.with_pull(org, repo, number, |_, p| p.timeline.clone())?;
        Ok(serde_json::to_string(&events)?)
    }
}

/// Temp-dir store plus an engine wired to `remote`. Keep the `TempDir` alive
/// for the duration of the test.
pub async fn setup(remote: &FakeRemote) -> (TempDir, RecordStore, SyncEngine) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("tracker.db")).await.unwrap();
    let store = RecordStore::new(pool);
    let engine = SyncEngine::new(store.clone(), Arc::new(remote.clone()));
    (dir, store, engine)
}
