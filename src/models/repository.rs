//! Repository model and typed repository address.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Typed address of a repository container inside an organization.
///
/// `full_name` is GitHub's `owner/name` form, which is what the store keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryKey {
    pub organization: String,
    pub full_name: String,
}

impl RepositoryKey {
    pub fn new(organization: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            full_name: full_name.into(),
        }
    }

    /// Short repository name (the part after the owner).
    pub fn name(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.full_name)
    }
}

impl std::fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// Repository container persisted once per organization sync.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Repository {
    /// Organization the repository was listed under.
    pub organization: String,

    /// `owner/name`.
    pub full_name: String,

    /// Short name, used to build API paths.
    pub name: String,
}

impl Repository {
    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.organization, &self.full_name)
    }
}
