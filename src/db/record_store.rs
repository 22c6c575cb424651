//! Typed record store over the SQLite schema.
//!
//! Records are addressed by organization → repository → pull request number,
//! with the commits, reviews and raw timeline of a PR hanging off it. All
//! writes for one PR go through a single transaction.

use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    Commit, PullRequest, PullRequestKey, PullRequestSnapshot, Repository, RepositoryKey, Review,
};

const PULL_REQUEST_COLUMNS: &str = "organization, repository, number, url, author, state, merged, \
     merged_by, additions, deletions, updated_at, merged_at, closed_at";

#[derive(FromRow)]
struct CommitRow {
    pr_number: i64,
    #[sqlx(flatten)]
    commit: Commit,
}

#[derive(FromRow)]
struct ReviewRow {
    pr_number: i64,
    #[sqlx(flatten)]
    review: Review,
}

/// Repository-style access to persisted pull request data.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: DbPool,
}

impl RecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Create or refresh the repository containers of an organization.
    pub async fn ensure_repositories(&self, repositories: &[Repository]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for repo in repositories {
            sqlx::query(
                r#"
                INSERT INTO repositories (organization, full_name, name)
                VALUES (?, ?, ?)
                ON CONFLICT(organization, full_name) DO UPDATE SET
                    name = excluded.name
                "#,
            )
            .bind(&repo.organization)
            .bind(&repo.full_name)
            .bind(&repo.name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Whether anything has ever been synced for `organization`.
    pub async fn organization_exists(&self, organization: &str) -> Result<bool, AppError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM repositories WHERE organization = ? LIMIT 1")
                .bind(organization)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// List the repositories of an organization, ordered by full name.
    pub async fn list_repositories(&self, organization: &str) -> Result<Vec<Repository>, AppError> {
        let repos = sqlx::query_as::<_, Repository>(
            "SELECT organization, full_name, name FROM repositories
             WHERE organization = ? ORDER BY full_name",
        )
        .bind(organization)
        .fetch_all(&self.pool)
        .await?;
        Ok(repos)
    }

    /// Load the persisted copy of a pull request, if any.
    pub async fn get_pull_request(
        &self,
        key: &PullRequestKey,
    ) -> Result<Option<PullRequest>, AppError> {
        let query = format!(
            "SELECT {} FROM pull_requests WHERE organization = ? AND repository = ? AND number = ?",
            PULL_REQUEST_COLUMNS
        );
        let pr = sqlx::query_as::<_, PullRequest>(&query)
            .bind(&key.repository.organization)
            .bind(&key.repository.full_name)
            .bind(key.number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pr)
    }

    /// Persist one PR snapshot atomically: upsert the PR and replace its
    /// commits, reviews and timeline. Either all four land or none do.
    pub async fn write_pull_request_snapshot(
        &self,
        snapshot: &PullRequestSnapshot,
    ) -> Result<(), AppError> {
        let pr = &snapshot.pull_request;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pull_requests (
                organization, repository, number, url, author, state, merged,
                merged_by, additions, deletions, updated_at, merged_at, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(organization, repository, number) DO UPDATE SET
                url = excluded.url,
                author = excluded.author,
                state = excluded.state,
                merged = excluded.merged,
                merged_by = excluded.merged_by,
                additions = excluded.additions,
                deletions = excluded.deletions,
                updated_at = excluded.updated_at,
                merged_at = excluded.merged_at,
                closed_at = excluded.closed_at
            "#,
        )
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .bind(&pr.url)
        .bind(&pr.author)
        .bind(&pr.state)
        .bind(pr.merged)
        .bind(&pr.merged_by)
        .bind(pr.additions)
        .bind(pr.deletions)
        .bind(pr.updated_at)
        .bind(pr.merged_at)
        .bind(pr.closed_at)
        .execute(&mut *tx)
        .await?;

        replace_commits(&mut tx, pr, &snapshot.commits).await?;
        replace_reviews(&mut tx, pr, &snapshot.reviews).await?;

        sqlx::query(
            r#"
            INSERT INTO timelines (organization, repository, pr_number, raw)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(organization, repository, pr_number) DO UPDATE SET
                raw = excluded.raw
            "#,
        )
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .bind(&snapshot.timeline)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Load one PR with its commits, reviews and timeline.
    pub async fn load_snapshot(
        &self,
        key: &PullRequestKey,
    ) -> Result<Option<PullRequestSnapshot>, AppError> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "SELECT {} FROM pull_requests WHERE organization = ? AND repository = ? AND number = ?",
            PULL_REQUEST_COLUMNS
        );
        let Some(pull_request) = sqlx::query_as::<_, PullRequest>(&query)
            .bind(&key.repository.organization)
            .bind(&key.repository.full_name)
            .bind(key.number)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let scope = Some(key.number);
        let mut commits = fetch_commits(&mut tx, &key.repository, scope, i64::MIN).await?;
        let mut reviews = fetch_reviews(&mut tx, &key.repository, scope, i64::MIN).await?;
        let mut timelines = fetch_timelines(&mut tx, &key.repository, scope, i64::MIN).await?;
        tx.commit().await?;

        let timeline = timelines.remove(&key.number).ok_or_else(|| {
            AppError::database_with_op(format!("timeline missing for {}", key), "load_snapshot")
        })?;

        Ok(Some(PullRequestSnapshot {
            pull_request,
            commits: commits.remove(&key.number).unwrap_or_default(),
            reviews: reviews.remove(&key.number).unwrap_or_default(),
            timeline,
        }))
    }

    /// Load every PR snapshot of a repository inside one read transaction, so
    /// each PR is observed either entirely before or entirely after a sync
    /// write. PRs are ordered by number.
    pub async fn load_repository_snapshots(
        &self,
        repository: &RepositoryKey,
        updated_since: Option<i64>,
    ) -> Result<Vec<PullRequestSnapshot>, AppError> {
        let since = updated_since.unwrap_or(i64::MIN);
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "SELECT {} FROM pull_requests WHERE organization = ? AND repository = ?
             AND COALESCE(updated_at, 0) >= ? ORDER BY number",
            PULL_REQUEST_COLUMNS
        );
        let pull_requests = sqlx::query_as::<_, PullRequest>(&query)
            .bind(&repository.organization)
            .bind(&repository.full_name)
            .bind(since)
            .fetch_all(&mut *tx)
            .await?;

        if pull_requests.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut commits = fetch_commits(&mut tx, repository, None, since).await?;
        let mut reviews = fetch_reviews(&mut tx, repository, None, since).await?;
        let mut timelines = fetch_timelines(&mut tx, repository, None, since).await?;
        tx.commit().await?;

        let mut snapshots = Vec::with_capacity(pull_requests.len());
        for pull_request in pull_requests {
            let number = pull_request.number;
            let timeline = timelines.remove(&number).ok_or_else(|| {
                AppError::database_with_op(
                    format!("timeline missing for {}", pull_request.key()),
                    "load_repository_snapshots",
                )
            })?;
            snapshots.push(PullRequestSnapshot {
                commits: commits.remove(&number).unwrap_or_default(),
                reviews: reviews.remove(&number).unwrap_or_default(),
                pull_request,
                timeline,
            });
        }

        Ok(snapshots)
    }
}

async fn replace_commits(
    conn: &mut SqliteConnection,
    pr: &PullRequest,
    commits: &[Commit],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM commits WHERE organization = ? AND repository = ? AND pr_number = ?")
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .execute(&mut *conn)
        .await?;

    for commit in commits {
        sqlx::query(
            r#"
            INSERT INTO commits (
                organization, repository, pr_number, sha, author, committer,
                committer_date, additions, deletions, message, discarded
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .bind(&commit.sha)
        .bind(&commit.author)
        .bind(&commit.committer)
        .bind(commit.committer_date)
        .bind(commit.additions)
        .bind(commit.deletions)
        .bind(&commit.message)
        .bind(commit.discarded)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn replace_reviews(
    conn: &mut SqliteConnection,
    pr: &PullRequest,
    reviews: &[Review],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM reviews WHERE organization = ? AND repository = ? AND pr_number = ?")
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .execute(&mut *conn)
        .await?;

    for review in reviews {
        sqlx::query(
            r#"
            INSERT INTO reviews (
                organization, repository, pr_number, id, reviewer, state,
                submitted_at, commit_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pr.organization)
        .bind(&pr.repository)
        .bind(pr.number)
        .bind(review.id)
        .bind(&review.reviewer)
        .bind(&review.state)
        .bind(review.submitted_at)
        .bind(&review.commit_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Child-row predicate limiting commits, reviews and timelines to the PRs a
/// load selected: one PR when `pr_number` is set, otherwise every PR updated
/// at or after `updated_since`.
const CHILD_SCOPE: &str = "organization = ? AND repository = ? AND pr_number IN (
        SELECT number FROM pull_requests
        WHERE organization = ? AND repository = ? AND (? IS NULL OR number = ?)
        AND COALESCE(updated_at, 0) >= ?)";

/// Commits grouped by PR number, each group ordered by (committer date, sha).
async fn fetch_commits(
    conn: &mut SqliteConnection,
    repository: &RepositoryKey,
    pr_number: Option<i64>,
    updated_since: i64,
) -> Result<HashMap<i64, Vec<Commit>>, AppError> {
    let query = format!(
        "SELECT pr_number, sha, author, committer, committer_date, additions,
                deletions, message, discarded
         FROM commits WHERE {}
         ORDER BY pr_number, committer_date, sha",
        CHILD_SCOPE
    );
    let rows = sqlx::query_as::<_, CommitRow>(&query)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(pr_number)
        .bind(pr_number)
        .bind(updated_since)
        .fetch_all(&mut *conn)
        .await?;

    let mut grouped: HashMap<i64, Vec<Commit>> = HashMap::new();
    for row in rows {
        grouped.entry(row.pr_number).or_default().push(row.commit);
    }
    Ok(grouped)
}

/// Reviews grouped by PR number, each group ordered by review id.
async fn fetch_reviews(
    conn: &mut SqliteConnection,
    repository: &RepositoryKey,
    pr_number: Option<i64>,
    updated_since: i64,
) -> Result<HashMap<i64, Vec<Review>>, AppError> {
    let query = format!(
        "SELECT pr_number, id, reviewer, state, submitted_at, commit_id
         FROM reviews WHERE {}
         ORDER BY pr_number, id",
        CHILD_SCOPE
    );
    let rows = sqlx::query_as::<_, ReviewRow>(&query)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(pr_number)
        .bind(pr_number)
        .bind(updated_since)
        .fetch_all(&mut *conn)
        .await?;

    let mut grouped: HashMap<i64, Vec<Review>> = HashMap::new();
    for row in rows {
        grouped.entry(row.pr_number).or_default().push(row.review);
    }
    Ok(grouped)
}

async fn fetch_timelines(
    conn: &mut SqliteConnection,
    repository: &RepositoryKey,
    pr_number: Option<i64>,
    updated_since: i64,
) -> Result<HashMap<i64, String>, AppError> {
    let query = format!("SELECT pr_number, raw FROM timelines WHERE {}", CHILD_SCOPE);
    let rows: Vec<(i64, String)> = sqlx::query_as(&query)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(&repository.organization)
        .bind(&repository.full_name)
        .bind(pr_number)
        .bind(pr_number)
        .bind(updated_since)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().collect())
}
