//! Schema creation for the jobscout database.
//!
//! Scrape jobs reference queries and sources without foreign keys so that
//! deleting either never fails because of historical jobs.

use diesel::prelude::*;
use tracing::debug;

use super::diesel_pool::{run_blocking, DieselError, SqlitePool};

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS job_sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        base_url TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        rate_limit_per_hour INTEGER DEFAULT 100 CHECK (rate_limit_per_hour >= 0),
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS search_queries (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        query_text TEXT NOT NULL,
        location TEXT,
        job_type TEXT,
        salary_range TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_run_at TEXT,
        created_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_search_queries_owner ON search_queries(owner_id, query_text)",
    r#"CREATE TABLE IF NOT EXISTS scrape_jobs (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        search_query_id TEXT,
        source_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        jobs_found INTEGER NOT NULL DEFAULT 0 CHECK (jobs_found >= 0),
        started_at TEXT NOT NULL,
        completed_at TEXT,
        error_message TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_owner_created ON scrape_jobs(owner_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_status ON scrape_jobs(status, created_at)",
    r#"CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        company TEXT NOT NULL,
        location TEXT NOT NULL,
        description TEXT NOT NULL,
        job_type TEXT NOT NULL,
        salary_min INTEGER,
        salary_max INTEGER,
        skills TEXT NOT NULL DEFAULT '[]',
        source_id TEXT,
        external_id TEXT,
        external_url TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        scraped_at TEXT,
        created_at TEXT NOT NULL
    )"#,
];

/// Create all tables and indexes if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool.clone(), |conn| {
        for statement in STATEMENTS {
            diesel::sql_query(*statement).execute(conn)?;
        }
        Ok(())
    })
    .await?;

    debug!("Applied {} schema statements", STATEMENTS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
