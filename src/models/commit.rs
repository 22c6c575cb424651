//! Commit model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A commit recorded against a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Commit {
    pub sha: String,

    /// GitHub login of the author. Empty when the commit email is not linked
    /// to an account.
    pub author: String,

    /// GitHub login of the committer.
    pub committer: String,

    /// Committer date (Unix seconds).
    pub committer_date: Option<i64>,

    pub additions: i64,
    pub deletions: i64,
    pub message: String,

    /// No longer part of the PR's commit list but kept because a review
    /// references its SHA. Earns no authorship credit.
    pub discarded: bool,
}
