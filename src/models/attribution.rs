//! Attribution output types and the per-login accumulators behind them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::AppError;

/// Line counts credited to a login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub additions: i64,
    pub deletions: i64,
}

impl LineStats {
    pub fn new(additions: i64, deletions: i64) -> Self {
        Self {
            additions,
            deletions,
        }
    }
}

impl std::ops::AddAssign for LineStats {
    fn add_assign(&mut self, rhs: Self) {
        self.additions += rhs.additions;
        self.deletions += rhs.deletions;
    }
}

/// A calendar month in UTC: `[first day 00:00, first day of next month 00:00)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthPeriod {
    year: i32,
    month: u32,
    start: i64,
    end: i64,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            AppError::invalid_input_field(format!("invalid month {}-{}", year, month), "month")
        })?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| AppError::invalid_input_field("month out of range", "month"))?;

        let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
        let start = midnight(first)
            .ok_or_else(|| AppError::invalid_input_field("month out of range", "month"))?;
        let end = midnight(next)
            .ok_or_else(|| AppError::invalid_input_field("month out of range", "month"))?;

        Ok(Self {
            year,
            month,
            start,
            end,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First second of the month (Unix seconds).
    pub fn start(&self) -> i64 {
        self.start
    }

    /// First second of the following month (Unix seconds).
    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn next(&self) -> Result<Self, AppError> {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl std::fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthPeriod {
    type Err = AppError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| AppError::invalid_input(format!("expected YYYY-MM, got '{}'", s)))?;
        let year: i32 = year
            .parse()
            .map_err(|_| AppError::invalid_input_field(format!("bad year '{}'", year), "year"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| AppError::invalid_input_field(format!("bad month '{}'", month), "month"))?;
        Self::new(year, month)
    }
}

/// Per-login attribution for one repository and one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub organization: String,
    pub repository: String,
    pub year: i32,
    pub month: u32,
    pub login: String,
    pub commit_additions: i64,
    pub commit_deletions: i64,
    pub merge_additions: i64,
    pub merge_deletions: i64,
    pub review_additions: i64,
    pub review_deletions: i64,
    pub closed_unmerged_count: u64,
}

/// Running per-login totals where every credit accumulates.
#[derive(Debug, Clone, Default)]
pub struct LoginTally {
    totals: BTreeMap<String, LineStats>,
}

impl LoginTally {
    pub fn add(&mut self, login: &str, stats: LineStats) {
        *self.totals.entry(login.to_string()).or_default() += stats;
    }

    pub fn get(&self, login: &str) -> Option<LineStats> {
        self.totals.get(login).copied()
    }

    pub fn logins(&self) -> impl Iterator<Item = &str> {
        self.totals.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Per-PR review credit.
///
/// Commit-level acceptances are first-one-wins per `(reviewer, sha)`. A
/// full-PR override replaces whatever the reviewer accumulated on this PR.
#[derive(Debug, Clone, Default)]
pub struct ReviewTally {
    accepted: BTreeMap<String, BTreeMap<String, LineStats>>,
    overrides: BTreeMap<String, LineStats>,
}

impl ReviewTally {
    /// Record that `reviewer` covered commit `sha`. Returns `false` if the pair
    /// was already accepted.
    pub fn accept(&mut self, reviewer: &str, sha: &str, stats: LineStats) -> bool {
        let shas = self.accepted.entry(reviewer.to_string()).or_default();
        if shas.contains_key(sha) {
            return false;
        }
        shas.insert(sha.to_string(), stats);
        true
    }

    /// Give `login` credit for the whole PR, superseding commit-level credit.
    pub fn override_full(&mut self, login: &str, stats: LineStats) {
        self.overrides.insert(login.to_string(), stats);
    }

    /// Final review credit per login for this PR.
    pub fn contributions(&self) -> BTreeMap<String, LineStats> {
        let mut out: BTreeMap<String, LineStats> = self
            .accepted
            .iter()
            .map(|(login, shas)| {
                let mut sum = LineStats::default();
                for stats in shas.values() {
                    sum += *stats;
                }
                (login.clone(), sum)
            })
            .collect();
        for (login, stats) in &self.overrides {
            out.insert(login.clone(), *stats);
        }
        out
    }
}

/// Count of closed-but-unmerged PRs per author.
#[derive(Debug, Clone, Default)]
pub struct CountTally {
    counts: BTreeMap<String, u64>,
}

impl CountTally {
    pub fn increment(&mut self, login: &str) {
        *self.counts.entry(login.to_string()).or_default() += 1;
    }

    pub fn get(&self, login: &str) -> u64 {
        self.counts.get(login).copied().unwrap_or(0)
    }

    pub fn logins(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}
