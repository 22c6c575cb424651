//! Business logic services.
//!
//! This module contains the GitHub client behind the `RemoteSource` trait,
//! the payload conversion layer, the incremental sync engine and the
//! read-only attribution aggregator.
//!
//! Services only depend on the record store and the remote source trait, so
//! they can be exercised with a temp-dir database and an in-memory source.

pub mod aggregator;
pub mod convert;
pub mod github_client;
pub mod remote_source;
pub mod sync_engine;
pub mod user_info;

pub use aggregator::{Aggregator, AttributionFilter};
pub use github_client::GitHubClient;
pub use remote_source::RemoteSource;
pub use sync_engine::{SyncEngine, SyncReport};
