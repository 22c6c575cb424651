//! Pull request review model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A submitted review on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Review {
    /// GitHub review ID.
    pub id: i64,

    /// Reviewer login.
    pub reviewer: String,

    /// `APPROVED`, `COMMENTED`, `CHANGES_REQUESTED`, ...
    pub state: String,

    /// Submission time (Unix seconds).
    pub submitted_at: Option<i64>,

    /// SHA the review was submitted against. May be empty.
    pub commit_id: String,
}
