//! Timeline events consumed by the aggregator.
//!
//! Timelines are persisted as the raw GitHub JSON blob; these types only
//! exist while a PR is being aggregated.

/// The timeline event kinds the attribution rules care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEventKind {
    Reviewed,
    Merged,
    Other,
}

impl From<&str> for TimelineEventKind {
    fn from(s: &str) -> Self {
        match s {
            "reviewed" => Self::Reviewed,
            "merged" => Self::Merged,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub kind: TimelineEventKind,

    /// Login of the acting user, if GitHub reported one.
    pub actor: Option<String>,
}
