//! Per-user monthly report served by the `userinformation` operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::RecordStore;
use crate::error::AppError;
use crate::models::{LineStats, MonthPeriod};
use crate::services::aggregator::{Aggregator, AttributionFilter};
use crate::services::convert::{
    self, PullRequestInformation, RepositoryInformation, ReviewInformation,
};

/// Result of the `userinformation` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInformationResult {
    pub user: String,
    pub organization: String,

    /// PRs authored by the user and merged in the month.
    pub prs: Vec<PullRequestInformation>,

    #[serde(rename = "repodetails")]
    pub repo_details: Vec<RepositoryInformation>,

    /// One entry per PR the user reviewed in the month.
    pub reviews: Vec<ReviewInformation>,
}

/// Build the monthly report for `user` in `organization`.
pub async fn user_information(
    store: &RecordStore,
    organization: &str,
    user: &str,
    year: i32,
    month: u32,
) -> Result<UserInformationResult, AppError> {
    if user.is_empty() {
        return Err(AppError::invalid_input_field("user must not be empty", "user"));
    }
    let period = MonthPeriod::new(year, month)?;

    let filter = AttributionFilter::new(vec![organization.to_string()], period).with_user(user);
    let records = Aggregator::new(store.clone()).aggregate(&filter).await?;

    let mut details: BTreeMap<String, RepositoryInformation> = BTreeMap::new();
    for record in &records {
        let info = details
            .entry(record.repository.clone())
            .or_insert_with(|| RepositoryInformation::new(&record.repository));
        info.add_commits(LineStats::new(record.commit_additions, record.commit_deletions));
        info.add_merges(LineStats::new(record.merge_additions, record.merge_deletions));
        info.add_reviews(LineStats::new(record.review_additions, record.review_deletions));
    }

    let mut prs = Vec::new();
    let mut reviews = Vec::new();
    for repository in store.list_repositories(organization).await? {
        let snapshots = store
            .load_repository_snapshots(&repository.key(), Some(period.start()))
            .await?;

        for snapshot in &snapshots {
            let pr = &snapshot.pull_request;

            if pr.author == user && pr.merged && pr.merged_at.is_some_and(|t| period.contains(t)) {
                prs.push(convert::pull_request_information(pr));
                details
                    .entry(pr.repository.clone())
                    .or_insert_with(|| RepositoryInformation::new(&pr.repository))
                    .prs
                    .push(pr.url.clone());
            }

            // Latest review by the user in the month stands for the PR.
            let latest = snapshot
                .reviews
                .iter()
                .filter(|r| r.reviewer == user)
                .filter(|r| r.submitted_at.is_some_and(|t| period.contains(t)))
                .max_by_key(|r| (r.submitted_at, r.id));
            if let Some(review) = latest {
                reviews.push(convert::review_information(pr, review));
            }
        }
    }

    log::debug!(
        "userinformation {}/{} {}: {} prs, {} reviews, {} repos",
        organization,
        user,
        period,
        prs.len(),
        reviews.len(),
        details.len()
    );

    Ok(UserInformationResult {
        user: user.to_string(),
        organization: organization.to_string(),
        prs,
        repo_details: details.into_values().collect(),
        reviews,
    })
}
