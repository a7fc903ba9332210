//! Database access for sources, search queries, scrape jobs and postings.
//!
//! All repositories share one r2d2 pool over the SQLite database file.
//! Timestamps are stored as fixed-width RFC 3339 text so that ordering by
//! the column matches chronological order.

pub mod diesel_job_posting;
pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_scrape_job;
pub mod diesel_search_query;
pub mod diesel_source;
pub mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

pub use diesel_job_posting::{DieselJobPostingRepository, PostingFilter};
pub use diesel_pool::{create_diesel_pool, create_diesel_pool_from_url, DieselError, SqlitePool};
pub use diesel_scrape_job::{DieselScrapeJobRepository, TransitionError};
pub use diesel_search_query::DieselSearchQueryRepository;
pub use diesel_source::DieselSourceRepository;

use crate::feed::ChangeFeed;

/// Parse a stored timestamp, falling back to now for unreadable values.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Every repository over one database, sharing a pool and change feed.
#[derive(Clone)]
pub struct Repositories {
    pub sources: DieselSourceRepository,
    pub queries: DieselSearchQueryRepository,
    pub scrape_jobs: DieselScrapeJobRepository,
    pub postings: DieselJobPostingRepository,
}

impl Repositories {
    /// Open the database at `db_path`, creating tables as needed.
    pub async fn open(db_path: &Path, feed: ChangeFeed) -> anyhow::Result<Self> {
        let pool = create_diesel_pool(db_path)?;
        migrations::run_migrations(&pool).await?;
        Ok(Self::from_pool(pool, feed))
    }

    pub fn from_pool(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self {
            sources: DieselSourceRepository::new(pool.clone()),
            queries: DieselSearchQueryRepository::new(pool.clone()),
            scrape_jobs: DieselScrapeJobRepository::new(pool.clone(), feed),
            postings: DieselJobPostingRepository::new(pool),
        }
    }
}
