//! Data models for the application.
//!
//! These models represent the records stored in the local SQLite database
//! and the transient attribution results computed from them.
//!
//! Persisted models derive FromRow for SQLx queries and Serialize for the RPC
//! layer.

pub mod attribution;
pub mod commit;
pub mod pull_request;
pub mod repository;
pub mod review;
pub mod timeline;

// Re-exports for convenient access
pub use attribution::{
    AttributionRecord, CountTally, LineStats, LoginTally, MonthPeriod, ReviewTally,
};
pub use commit::Commit;
pub use pull_request::{PullRequest, PullRequestKey, PullRequestSnapshot, PullRequestState};
pub use repository::{Repository, RepositoryKey};
pub use review::Review;
pub use timeline::{TimelineEvent, TimelineEventKind};
