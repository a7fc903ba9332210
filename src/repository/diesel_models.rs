//! Diesel row types for the jobscout tables.
//!
//! Booleans are stored as INTEGER and timestamps as RFC 3339 TEXT; the
//! repositories convert to and from the domain models.

use diesel::prelude::*;
use diesel::sql_types::{Integer, Nullable, Text};

use crate::schema;

/// Job source record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::job_sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub is_active: i32,
    pub rate_limit_per_hour: Option<i32>,
    pub created_at: String,
}

/// New job source for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::job_sources)]
pub struct NewSource<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub base_url: &'a str,
    pub is_active: i32,
    pub rate_limit_per_hour: Option<i32>,
    pub created_at: &'a str,
}

/// Search query record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::search_queries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SearchQueryRecord {
    pub id: String,
    pub owner_id: String,
    pub query_text: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub salary_range: Option<String>,
    pub is_active: i32,
    pub last_run_at: Option<String>,
    pub created_at: String,
}

/// New search query for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::search_queries)]
pub struct NewSearchQuery<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub query_text: &'a str,
    pub location: Option<&'a str>,
    pub job_type: Option<&'a str>,
    pub salary_range: Option<&'a str>,
    pub is_active: i32,
    pub last_run_at: Option<&'a str>,
    pub created_at: &'a str,
}

/// Scrape job record from the database.
#[derive(Queryable, QueryableByName, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scrape_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScrapeJobRecord {
    pub id: String,
    pub owner_id: String,
    pub search_query_id: Option<String>,
    pub source_id: Option<String>,
    pub status: String,
    pub jobs_found: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub metadata: String,
    pub created_at: String,
}

/// New scrape job for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scrape_jobs)]
pub struct NewScrapeJob<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub search_query_id: Option<&'a str>,
    pub source_id: Option<&'a str>,
    pub status: &'a str,
    pub jobs_found: i32,
    pub started_at: &'a str,
    pub completed_at: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub metadata: &'a str,
    pub created_at: &'a str,
}

/// Scrape job row joined with its query and source, loaded via raw SQL.
#[derive(QueryableByName, Debug, Clone)]
pub struct ScrapeJobJoinedRow {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = Text)]
    pub owner_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub search_query_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub source_id: Option<String>,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Integer)]
    pub jobs_found: i32,
    #[diesel(sql_type = Text)]
    pub started_at: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub completed_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_message: Option<String>,
    #[diesel(sql_type = Text)]
    pub metadata: String,
    #[diesel(sql_type = Text)]
    pub created_at: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub query_text: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub query_location: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub source_name: Option<String>,
}

impl ScrapeJobJoinedRow {
    /// Split into the plain job record and the joined columns.
    pub fn into_parts(self) -> (ScrapeJobRecord, Option<String>, Option<String>, Option<String>) {
        (
            ScrapeJobRecord {
                id: self.id,
                owner_id: self.owner_id,
                search_query_id: self.search_query_id,
                source_id: self.source_id,
                status: self.status,
                jobs_found: self.jobs_found,
                started_at: self.started_at,
                completed_at: self.completed_at,
                error_message: self.error_message,
                metadata: self.metadata,
                created_at: self.created_at,
            },
            self.query_text,
            self.query_location,
            self.source_name,
        )
    }
}

/// Job posting record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobPostingRecord {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub job_type: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub skills: String,
    pub source_id: Option<String>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub is_active: i32,
    pub scraped_at: Option<String>,
    pub created_at: String,
}

/// New job posting for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::jobs)]
pub struct NewJobPosting<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub description: &'a str,
    pub job_type: &'a str,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub skills: &'a str,
    pub source_id: Option<&'a str>,
    pub external_id: Option<&'a str>,
    pub external_url: Option<&'a str>,
    pub is_active: i32,
    pub scraped_at: Option<&'a str>,
    pub created_at: &'a str,
}
