//! Monthly attribution over synced pull requests.
//!
//! The aggregator only reads the record store. For each PR touched at or
//! after the start of the target month it credits logins in three line
//! categories (commit, merge, review) and counts closed-but-unmerged PRs.
//!
//! Review credit is computed per PR: commit-level acceptances first, then a
//! full-PR override for timeline approvers once the PR is merged in the month.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::RecordStore;
use crate::error::AppError;
use crate::models::{
    AttributionRecord, CountTally, LineStats, LoginTally, MonthPeriod, PullRequestSnapshot,
    Repository, ReviewTally, TimelineEventKind,
};
use crate::services::convert;

/// Selection for one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionFilter {
    pub organizations: Vec<String>,

    /// Short name or `owner/name`.
    pub repository: Option<String>,

    /// Restrict credit to this login.
    pub user: Option<String>,

    /// Restrict to one PR number.
    pub pull_request: Option<i64>,

    pub period: MonthPeriod,
}

impl AttributionFilter {
    pub fn new(organizations: Vec<String>, period: MonthPeriod) -> Self {
        Self {
            organizations,
            repository: None,
            user: None,
            pull_request: None,
            period,
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_pull_request(mut self, number: i64) -> Self {
        self.pull_request = Some(number);
        self
    }

    fn includes_repository(&self, repository: &Repository) -> bool {
        match &self.repository {
            Some(r) => *r == repository.full_name || *r == repository.name,
            None => true,
        }
    }

    fn includes_pull_request(&self, number: i64) -> bool {
        self.pull_request.map_or(true, |n| n == number)
    }

    /// Whether credit for `login` should be recorded. Empty logins (commits
    /// from emails not linked to an account) are never credited.
    pub fn includes_login(&self, login: &str) -> bool {
        if login.is_empty() {
            return false;
        }
        match &self.user {
            Some(u) => u == login,
            None => true,
        }
    }
}

/// Credit produced by a single PR.
#[derive(Debug, Default)]
pub struct PullRequestAttribution {
    pub commits: LoginTally,
    pub merges: LoginTally,
    pub reviews: BTreeMap<String, LineStats>,

    /// Author of a PR closed unmerged in the month.
    pub closed_unmerged: Option<String>,
}

/// Apply the attribution rules to one PR for one month.
pub fn attribute_pull_request(
    snapshot: &PullRequestSnapshot,
    period: &MonthPeriod,
    filter: &AttributionFilter,
) -> Result<PullRequestAttribution, AppError> {
    let pr = &snapshot.pull_request;
    let pr_stats = LineStats::new(pr.additions, pr.deletions);
    let in_month = |ts: Option<i64>| ts.is_some_and(|t| period.contains(t));
    let mut out = PullRequestAttribution::default();

    for commit in &snapshot.commits {
        if !commit.discarded
            && in_month(commit.committer_date)
            && filter.includes_login(&commit.author)
        {
            out.commits
                .add(&commit.author, LineStats::new(commit.additions, commit.deletions));
        }
    }

    // Provisional review credit: a review covers a commit it was submitted
    // after, unless the reviewer wrote the PR or the commit.
    let mut review_tally = ReviewTally::default();
    for commit in &snapshot.commits {
        let committed = commit.committer_date.unwrap_or(0);
        let stats = LineStats::new(commit.additions, commit.deletions);
        for review in &snapshot.reviews {
            let Some(submitted) = review.submitted_at else {
                continue;
            };
            if review.reviewer == pr.author
                || review.reviewer == commit.author
                || !period.contains(submitted)
                || submitted <= committed
                || !filter.includes_login(&review.reviewer)
            {
                continue;
            }
            review_tally.accept(&review.reviewer, &commit.sha, stats);
        }
    }

    let events = convert::parse_timeline(&snapshot.timeline)?;
    let approvers: BTreeSet<&str> = events
        .iter()
        .filter(|e| e.kind == TimelineEventKind::Reviewed)
        .filter_map(|e| e.actor.as_deref())
        .filter(|actor| *actor != pr.author)
        .collect();
    let merge_actor = events
        .iter()
        .rev()
        .find(|e| e.kind == TimelineEventKind::Merged)
        .and_then(|e| e.actor.as_deref());

    if pr.is_closed() && in_month(pr.closed_at) {
        if !pr.merged {
            if filter.includes_login(&pr.author) {
                out.closed_unmerged = Some(pr.author.clone());
            }
        } else if pr.is_self_merge() {
            if !approvers.is_empty() && filter.includes_login(&pr.author) {
                out.merges.add(&pr.author, pr_stats);
            }
        } else {
            if let Some(merger) = pr.merged_by.as_deref() {
                if filter.includes_login(merger) {
                    out.merges.add(merger, pr_stats);
                }
            }
            if filter.includes_login(&pr.author) {
                out.merges.add(&pr.author, pr_stats);
            }
        }
    }

    if pr.merged && in_month(pr.merged_at) {
        if !approvers.is_empty() {
            for approver in &approvers {
                if filter.includes_login(approver) {
                    review_tally.override_full(approver, pr_stats);
                }
            }
        } else if let Some(actor) = merge_actor {
            if filter.includes_login(actor) {
                review_tally.override_full(actor, pr_stats);
            }
        }
    }

    out.reviews = review_tally.contributions();
    Ok(out)
}

/// Read-only attribution engine over the record store.
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: RecordStore,
}

impl Aggregator {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Attribution records for the filter's month, one per login per
    /// repository, sorted by (organization, repository, login).
    ///
    /// Returns `NotFound` for an organization that has never been synced.
    pub async fn aggregate(
        &self,
        filter: &AttributionFilter,
    ) -> Result<Vec<AttributionRecord>, AppError> {
        let period = filter.period;
        let mut records = Vec::new();

        for organization in &filter.organizations {
            if !self.store.organization_exists(organization).await? {
                return Err(AppError::not_found_with_id("Organization", organization));
            }

            let repositories = self.store.list_repositories(organization).await?;
            for repository in repositories.iter().filter(|r| filter.includes_repository(r)) {
                let snapshots = self
                    .store
                    .load_repository_snapshots(&repository.key(), Some(period.start()))
                    .await?;
                log::debug!(
                    "Aggregating {} PRs of {} for {}",
                    snapshots.len(),
                    repository.full_name,
                    period
                );

                records.extend(aggregate_repository(
                    repository,
                    &snapshots,
                    &period,
                    filter,
                )?);
            }
        }

        records.sort_by(|a, b| {
            (&a.organization, &a.repository, &a.login).cmp(&(&b.organization, &b.repository, &b.login))
        });
        Ok(records)
    }

    /// Run `aggregate` for every month in `[from, to]`.
    pub async fn aggregate_range(
        &self,
        filter: &AttributionFilter,
        from: MonthPeriod,
        to: MonthPeriod,
    ) -> Result<Vec<AttributionRecord>, AppError> {
        if from > to {
            return Err(AppError::invalid_input_field(
                format!("range start {} is after end {}", from, to),
                "from",
            ));
        }

        let mut records = Vec::new();
        let mut month = from;
        loop {
            let mut monthly = filter.clone();
            monthly.period = month;
            records.extend(self.aggregate(&monthly).await?);

            if month == to {
                break;
            }
            month = month.next()?;
        }
        Ok(records)
    }
}

/// Sum per-PR credit across one repository.
fn aggregate_repository(
    repository: &Repository,
    snapshots: &[PullRequestSnapshot],
    period: &MonthPeriod,
    filter: &AttributionFilter,
) -> Result<Vec<AttributionRecord>, AppError> {
    let mut commits = LoginTally::default();
    let mut merges = LoginTally::default();
    let mut reviews = LoginTally::default();
    let mut closed = CountTally::default();

    for snapshot in snapshots {
        if !filter.includes_pull_request(snapshot.pull_request.number) {
            continue;
        }
        let credit = attribute_pull_request(snapshot, period, filter)?;

        for login in credit.commits.logins() {
            if let Some(stats) = credit.commits.get(login) {
                commits.add(login, stats);
            }
        }
        for login in credit.merges.logins() {
            if let Some(stats) = credit.merges.get(login) {
                merges.add(login, stats);
            }
        }
        for (login, stats) in &credit.reviews {
            reviews.add(login, *stats);
        }
        if let Some(author) = &credit.closed_unmerged {
            closed.increment(author);
        }
    }

    let logins: BTreeSet<&str> = commits
        .logins()
        .chain(merges.logins())
        .chain(reviews.logins())
        .chain(closed.logins())
        .collect();

    Ok(logins
        .into_iter()
        .map(|login| {
            let c = commits.get(login).unwrap_or_default();
            let m = merges.get(login).unwrap_or_default();
            let r = reviews.get(login).unwrap_or_default();
            AttributionRecord {
                organization: repository.organization.clone(),
                repository: repository.full_name.clone(),
                year: period.year(),
                month: period.month(),
                login: login.to_string(),
                commit_additions: c.additions,
                commit_deletions: c.deletions,
                merge_additions: m.additions,
                merge_deletions: m.deletions,
                review_additions: r.additions,
                review_deletions: r.deletions,
                closed_unmerged_count: closed.get(login),
            }
        })
        .collect())
}
