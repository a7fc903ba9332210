//! Diesel-based search query repository for SQLite.
//!
//! Queries are owned by exactly one user; every lookup and mutation here is
//! filtered by `owner_id`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::diesel_models::{NewSearchQuery, SearchQueryRecord};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{SearchIntent, SearchQuery};
use crate::schema::search_queries;

impl From<SearchQueryRecord> for SearchQuery {
    fn from(record: SearchQueryRecord) -> Self {
        SearchQuery {
            id: record.id,
            owner_id: record.owner_id,
            query_text: record.query_text,
            location: record.location,
            job_type: record.job_type,
            salary_range: record.salary_range,
            is_active: record.is_active != 0,
            last_run_at: parse_datetime_opt(record.last_run_at),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Find the query matching the full upsert key.
fn find_by_key(
    conn: &mut SqliteConnection,
    owner_id: &str,
    intent: &SearchIntent,
) -> QueryResult<Option<SearchQueryRecord>> {
    let mut query = search_queries::table
        .filter(search_queries::owner_id.eq(owner_id))
        .filter(search_queries::query_text.eq(&intent.query_text))
        .into_boxed();

    query = match intent.location {
        Some(ref v) => query.filter(search_queries::location.eq(v)),
        None => query.filter(search_queries::location.is_null()),
    };
    query = match intent.job_type {
        Some(ref v) => query.filter(search_queries::job_type.eq(v)),
        None => query.filter(search_queries::job_type.is_null()),
    };
    query = match intent.salary_range {
        Some(ref v) => query.filter(search_queries::salary_range.eq(v)),
        None => query.filter(search_queries::salary_range.is_null()),
    };

    query
        .order(search_queries::created_at.asc())
        .first::<SearchQueryRecord>(conn)
        .optional()
}

/// Diesel-based search query repository.
#[derive(Clone)]
pub struct DieselSearchQueryRepository {
    pool: SqlitePool,
}

impl DieselSearchQueryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the intent for `owner_id`, or touch the existing identical query.
    ///
    /// The upsert key is `(owner_id, query_text, location, job_type,
    /// salary_range)` on the normalized intent. An existing row gets
    /// `last_run_at = now` and is reactivated.
    pub async fn upsert(
        &self,
        owner_id: &str,
        intent: &SearchIntent,
        now: DateTime<Utc>,
    ) -> Result<SearchQuery, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let intent = intent.normalized();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            conn.immediate_transaction(|conn| {
                let now_str = format_datetime(&now);

                if let Some(existing) = find_by_key(conn, &owner_id, &intent)? {
                    diesel::update(search_queries::table.find(&existing.id))
                        .set((
                            search_queries::last_run_at.eq(Some(&now_str)),
                            search_queries::is_active.eq(1),
                        ))
                        .execute(conn)?;

                    return search_queries::table
                        .find(&existing.id)
                        .first::<SearchQueryRecord>(conn);
                }

                let query = SearchQuery::from_intent(&owner_id, &intent, now);
                let record = NewSearchQuery {
                    id: &query.id,
                    owner_id: &query.owner_id,
                    query_text: &query.query_text,
                    location: query.location.as_deref(),
                    job_type: query.job_type.as_deref(),
                    salary_range: query.salary_range.as_deref(),
                    is_active: 1,
                    last_run_at: Some(&now_str),
                    created_at: &now_str,
                };
                diesel::insert_into(search_queries::table)
                    .values(&record)
                    .execute(conn)?;

                search_queries::table
                    .find(&query.id)
                    .first::<SearchQueryRecord>(conn)
            })
        })
        .await
        .map(SearchQuery::from)
    }

    /// Get one of the owner's queries.
    pub async fn get(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Option<SearchQuery>, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            search_queries::table
                .filter(search_queries::id.eq(&id))
                .filter(search_queries::owner_id.eq(&owner_id))
                .first::<SearchQueryRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(SearchQuery::from))
    }

    /// All of the owner's queries, most recently run first.
    pub async fn list_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<SearchQuery>, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            search_queries::table
                .filter(search_queries::owner_id.eq(&owner_id))
                .order((
                    search_queries::last_run_at.desc(),
                    search_queries::created_at.desc(),
                ))
                .load::<SearchQueryRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(SearchQuery::from).collect())
    }

    /// Count the owner's stored queries.
    pub async fn count_for_owner(&self, owner_id: &str) -> Result<u64, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = search_queries::table
                .filter(search_queries::owner_id.eq(&owner_id))
                .select(count_star())
                .first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Delete one of the owner's queries. Scrape jobs that reference it are kept.
    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<bool, diesel::result::Error> {
        let owner_id = owner_id.to_string();
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::delete(
                search_queries::table
                    .filter(search_queries::id.eq(&id))
                    .filter(search_queries::owner_id.eq(&owner_id)),
            )
            .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }
}
