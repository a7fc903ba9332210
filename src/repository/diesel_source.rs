//! Diesel-based job source repository for SQLite.
//!
//! This module provides async database access for the source registry using Diesel ORM.
//! Since diesel-async only supports Postgres/MySQL, SQLite operations use sync Diesel
//! wrapped in spawn_blocking.

use diesel::prelude::*;

use super::diesel_models::{NewSource, SourceRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime};
use crate::models::{Source, DEFAULT_RATE_LIMIT_PER_HOUR};
use crate::schema::job_sources;

/// Convert a database record to a domain model.
impl From<SourceRecord> for Source {
    fn from(record: SourceRecord) -> Self {
        Source {
            id: record.id,
            name: record.name,
            base_url: record.base_url,
            is_active: record.is_active != 0,
            rate_limit_per_hour: record
                .rate_limit_per_hour
                .map(|n| n.max(0) as u32)
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_HOUR),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Diesel-based source repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselSourceRepository {
    pool: SqlitePool,
}

impl DieselSourceRepository {
    /// Create a new Diesel source repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a source by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Source>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            job_sources::table
                .find(&id)
                .first::<SourceRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(Source::from))
    }

    /// Get all sources, ordered by name.
    pub async fn get_all(&self) -> Result<Vec<Source>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            job_sources::table
                .order(job_sources::name.asc())
                .load::<SourceRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Source::from).collect())
    }

    /// Get sources eligible for dispatch, ordered by name.
    pub async fn get_active(&self) -> Result<Vec<Source>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            job_sources::table
                .filter(job_sources::is_active.ne(0))
                .order(job_sources::name.asc())
                .load::<SourceRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Source::from).collect())
    }

    /// Save a source (insert or replace).
    pub async fn save(&self, source: &Source) -> Result<(), diesel::result::Error> {
        let id = source.id.clone();
        let name = source.name.clone();
        let base_url = source.base_url.clone();
        let is_active = source.is_active as i32;
        let rate_limit = i32::try_from(source.rate_limit_per_hour).unwrap_or(i32::MAX);
        let created_at = format_datetime(&source.created_at);
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let record = NewSource {
                id: &id,
                name: &name,
                base_url: &base_url,
                is_active,
                rate_limit_per_hour: Some(rate_limit),
                created_at: &created_at,
            };

            // Use replace_into for SQLite upsert
            diesel::replace_into(job_sources::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Toggle whether a source takes part in dispatch.
    /// Returns false when no source has this ID.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::update(job_sources::table.find(&id))
                .set(job_sources::is_active.eq(active as i32))
                .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }

    /// Delete a source. Historical scrape jobs keep their dangling reference.
    pub async fn delete(&self, id: &str) -> Result<bool, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::delete(job_sources::table.find(&id)).execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }

    /// Check if a source exists.
    pub async fn exists(&self, id: &str) -> Result<bool, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = job_sources::table
                .filter(job_sources::id.eq(&id))
                .select(count_star())
                .first(conn)?;
            Ok(count > 0)
        })
        .await
    }
}
