//! Diesel-based scrape job repository for SQLite.
//!
//! Every successful write is published on the [`ChangeFeed`] after the
//! database call returns, so subscribers never observe a change that was
//! rolled back.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use thiserror::Error;
use tracing::{debug, info};

use super::diesel_models::{NewScrapeJob, ScrapeJobJoinedRow, ScrapeJobRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::feed::{ChangeFeed, ScrapeJobChange};
use crate::models::{InvalidTransition, ScrapeJob, ScrapeJobStatus, ScrapeJobView};
use crate::schema::scrape_jobs;

const JOINED_FOR_OWNER_SQL: &str = r#"
    SELECT j.id, j.owner_id, j.search_query_id, j.source_id, j.status, j.jobs_found,
           j.started_at, j.completed_at, j.error_message, j.metadata, j.created_at,
           q.query_text AS query_text, q.location AS query_location, s.name AS source_name
    FROM scrape_jobs j
    LEFT JOIN search_queries q ON q.id = j.search_query_id AND q.owner_id = j.owner_id
    LEFT JOIN job_sources s ON s.id = j.source_id
    WHERE j.owner_id = ?
    ORDER BY j.created_at DESC, j.rowid DESC
"#;

const PENDING_SQL: &str = r#"
    SELECT * FROM scrape_jobs
    WHERE status = 'pending'
    ORDER BY created_at ASC, rowid ASC
    LIMIT ?
"#;

/// Errors from worker-driven status changes.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("scrape job not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),
}

impl From<ScrapeJobRecord> for ScrapeJob {
    fn from(record: ScrapeJobRecord) -> Self {
        ScrapeJob {
            id: record.id,
            owner_id: record.owner_id,
            search_query_id: record.search_query_id,
            source_id: record.source_id,
            status: ScrapeJobStatus::from_str(&record.status).unwrap_or(ScrapeJobStatus::Pending),
            jobs_found: record.jobs_found.max(0) as u32,
            started_at: parse_datetime(&record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
            error_message: record.error_message,
            metadata: serde_json::from_str(&record.metadata)
                .unwrap_or_else(|_| serde_json::json!({})),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

impl From<ScrapeJobJoinedRow> for ScrapeJobView {
    fn from(row: ScrapeJobJoinedRow) -> Self {
        let (record, query_text, query_location, source_name) = row.into_parts();
        ScrapeJobView {
            job: ScrapeJob::from(record),
            query_text,
            query_location,
            source_name,
        }
    }
}

/// Diesel-based scrape job repository.
#[derive(Clone)]
pub struct DieselScrapeJobRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl DieselScrapeJobRepository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// The feed this repository publishes changes to.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Insert a new scrape job.
    pub async fn insert(&self, job: &ScrapeJob) -> Result<(), diesel::result::Error> {
        let job_owned = job.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let job = &job_owned;
            let metadata = serde_json::to_string(&job.metadata).unwrap_or_else(|_| "{}".to_string());
            let started_at = format_datetime(&job.started_at);
            let completed_at = job.completed_at.as_ref().map(format_datetime);
            let created_at = format_datetime(&job.created_at);

            let record = NewScrapeJob {
                id: &job.id,
                owner_id: &job.owner_id,
                search_query_id: job.search_query_id.as_deref(),
                source_id: job.source_id.as_deref(),
                status: job.status.as_str(),
                jobs_found: i32::try_from(job.jobs_found).unwrap_or(i32::MAX),
                started_at: &started_at,
                completed_at: completed_at.as_deref(),
                error_message: job.error_message.as_deref(),
                metadata: &metadata,
                created_at: &created_at,
            };

            diesel::insert_into(scrape_jobs::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await?;

        self.feed.publish(ScrapeJobChange::Inserted(job.clone()));
        Ok(())
    }

    /// Get a scrape job by ID.
    pub async fn get(&self, id: &str) -> Result<Option<ScrapeJob>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            scrape_jobs::table
                .find(&id)
                .first::<ScrapeJobRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(ScrapeJob::from))
    }

    /// All of the owner's jobs joined with query and source, newest first.
    pub async fn list_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<ScrapeJobView>, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::sql_query(JOINED_FOR_OWNER_SQL)
                .bind::<Text, _>(&owner_id)
                .load::<ScrapeJobJoinedRow>(conn)
        })
        .await
        .map(|rows| rows.into_iter().map(ScrapeJobView::from).collect())
    }

    /// Count the owner's jobs.
    pub async fn count_for_owner(&self, owner_id: &str) -> Result<u64, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = scrape_jobs::table
                .filter(scrape_jobs::owner_id.eq(&owner_id))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Oldest pending jobs across all owners, for a polling worker.
    pub async fn pending(&self, limit: u32) -> Result<Vec<ScrapeJob>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::sql_query(PENDING_SQL)
                .bind::<BigInt, _>(limit as i64)
                .load::<ScrapeJobRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(ScrapeJob::from).collect())
    }

    /// pending -> running.
    pub async fn mark_running(&self, id: &str) -> Result<ScrapeJob, TransitionError> {
        self.transition(id, |job, now| job.start(now)).await
    }

    /// pending|running -> completed, freezing `jobs_found`.
    pub async fn mark_completed(&self, id: &str, jobs_found: u32) -> Result<ScrapeJob, TransitionError> {
        self.transition(id, move |job, now| job.complete(jobs_found, now))
            .await
    }

    /// pending|running -> failed with an error message.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<ScrapeJob, TransitionError> {
        let error = error.to_string();
        self.transition(id, move |job, now| job.fail(error, now)).await
    }

    /// Load, apply and store a status change inside one write transaction.
    async fn transition<F>(&self, id: &str, apply: F) -> Result<ScrapeJob, TransitionError>
    where
        F: FnOnce(&mut ScrapeJob, DateTime<Utc>) -> Result<(), InvalidTransition> + Send + 'static,
    {
        let id = id.to_string();
        let pool = self.pool.clone();

        let outcome = run_blocking(pool, move |conn| {
            conn.immediate_transaction(|conn| {
                let record = scrape_jobs::table
                    .find(&id)
                    .first::<ScrapeJobRecord>(conn)
                    .optional()?;
                let Some(record) = record else {
                    return Ok(Err(TransitionError::NotFound(id.clone())));
                };

                let mut job = ScrapeJob::from(record);
                if let Err(e) = apply(&mut job, Utc::now()) {
                    return Ok(Err(e.into()));
                }

                let started_at = format_datetime(&job.started_at);
                let completed_at = job.completed_at.as_ref().map(format_datetime);
                diesel::update(scrape_jobs::table.find(&id))
                    .set((
                        scrape_jobs::status.eq(job.status.as_str()),
                        scrape_jobs::jobs_found.eq(i32::try_from(job.jobs_found).unwrap_or(i32::MAX)),
                        scrape_jobs::started_at.eq(&started_at),
                        scrape_jobs::completed_at.eq(completed_at.as_deref()),
                        scrape_jobs::error_message.eq(job.error_message.as_deref()),
                    ))
                    .execute(conn)?;

                Ok(Ok(job))
            })
        })
        .await?;

        let job = outcome?;
        info!("Scrape job {} is now {}", job.id, job.status);
        self.feed.publish(ScrapeJobChange::Updated(job.clone()));
        Ok(job)
    }

    /// Delete one of the owner's jobs.
    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<bool, diesel::result::Error> {
        let owner = owner_id.to_string();
        let job_id = id.to_string();
        let pool = self.pool.clone();

        let deleted = run_blocking(pool, move |conn| {
            let rows = diesel::delete(
                scrape_jobs::table
                    .filter(scrape_jobs::id.eq(&job_id))
                    .filter(scrape_jobs::owner_id.eq(&owner)),
            )
            .execute(conn)?;
            Ok(rows > 0)
        })
        .await?;

        if deleted {
            debug!("Deleted scrape job {}", id);
            self.feed.publish(ScrapeJobChange::Deleted {
                id: id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchIntent, Source};
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use crate::repository::migrations::run_migrations;
    use crate::repository::{DieselSearchQueryRepository, DieselSourceRepository};
    use tempfile::tempdir;

    async fn setup_test_db() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_insert_and_list_joined() {
        let (pool, _dir) = setup_test_db().await;
        let sources = DieselSourceRepository::new(pool.clone());
        let queries = DieselSearchQueryRepository::new(pool.clone());
        let repo = DieselScrapeJobRepository::new(pool, ChangeFeed::new());

        let source = Source::new("Indeed".to_string(), "https://indeed.com".to_string())
            .with_id("indeed");
        sources.save(&source).await.unwrap();
        let query = queries
            .upsert("user-1", &SearchIntent::new("Rust").with_location("Remote"), Utc::now())
            .await
            .unwrap();

        let job = ScrapeJob::pending("user-1", &query.id, "indeed", Utc::now());
        repo.insert(&job).await.unwrap();

        let views = repo.list_for_owner("user-1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].job.id, job.id);
        assert_eq!(views[0].query_text.as_deref(), Some("Rust"));
        assert_eq!(views[0].query_location.as_deref(), Some("Remote"));
        assert_eq!(views[0].source_name.as_deref(), Some("Indeed"));

        assert!(repo.list_for_owner("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_source_keeps_jobs() {
        let (pool, _dir) = setup_test_db().await;
        let sources = DieselSourceRepository::new(pool.clone());
        let repo = DieselScrapeJobRepository::new(pool, ChangeFeed::new());

        let source = Source::new("Indeed".to_string(), "https://indeed.com".to_string())
            .with_id("indeed");
        sources.save(&source).await.unwrap();
        repo.insert(&ScrapeJob::pending("user-1", "gone", "indeed", Utc::now()))
            .await
            .unwrap();

        assert!(sources.delete("indeed").await.unwrap());

        let views = repo.list_for_owner("user-1").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].source_name, None);
        assert_eq!(views[0].query_text, None);
        assert_eq!(views[0].job.source_id.as_deref(), Some("indeed"));
    }

    #[tokio::test]
    async fn test_transitions() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScrapeJobRepository::new(pool, ChangeFeed::new());

        let job = ScrapeJob::pending("user-1", "q", "s", Utc::now());
        repo.insert(&job).await.unwrap();

        let running = repo.mark_running(&job.id).await.unwrap();
        assert_eq!(running.status, ScrapeJobStatus::Running);
        assert!(running.completed_at.is_none());

        let done = repo.mark_completed(&job.id, 12).await.unwrap();
        assert_eq!(done.status, ScrapeJobStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = repo.mark_failed(&job.id, "late").await.unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));

        let stored = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.jobs_found, 12);
        assert_eq!(stored.status, ScrapeJobStatus::Completed);
        assert!(stored.error_message.is_none());

        let missing = repo.mark_running("nope").await.unwrap_err();
        assert!(matches!(missing, TransitionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pending_lists_oldest_first() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselScrapeJobRepository::new(pool, ChangeFeed::new());

        let older = ScrapeJob::pending("user-1", "q", "a", Utc::now() - chrono::Duration::minutes(5));
        let newer = ScrapeJob::pending("user-2", "q", "b", Utc::now());
        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();
        repo.mark_failed(&newer.id, "boom").await.unwrap();

        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, older.id);
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let (pool, _dir) = setup_test_db().await;
        let feed = ChangeFeed::new();
        let repo = DieselScrapeJobRepository::new(pool, feed.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = feed.subscribe("user-1", move |change| {
            let _ = tx.send(change);
        });

        let job = ScrapeJob::pending("user-1", "q", "s", Utc::now());
        repo.insert(&job).await.unwrap();
        repo.mark_running(&job.id).await.unwrap();
        assert!(repo.delete("user-1", &job.id).await.unwrap());

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let change = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            kinds.push(match change {
                ScrapeJobChange::Inserted(_) => "inserted",
                ScrapeJobChange::Updated(_) => "updated",
                ScrapeJobChange::Deleted { .. } => "deleted",
            });
        }
        assert_eq!(kinds, vec!["inserted", "updated", "deleted"]);
    }
}
