//! Diesel-based job posting repository: storage and the manual text search.

use diesel::prelude::*;

use super::diesel_models::{JobPostingRecord, NewJobPosting};
use super::diesel_pool::{run_blocking, SqlitePool};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::JobPosting;
use crate::schema::jobs;

/// Default number of postings a search returns.
const DEFAULT_SEARCH_LIMIT: u32 = 50;

impl From<JobPostingRecord> for JobPosting {
    fn from(record: JobPostingRecord) -> Self {
        JobPosting {
            id: record.id,
            title: record.title,
            company: record.company,
            location: record.location,
            description: record.description,
            job_type: record.job_type,
            salary_min: record.salary_min,
            salary_max: record.salary_max,
            skills: serde_json::from_str(&record.skills).unwrap_or_default(),
            source_id: record.source_id,
            external_id: record.external_id,
            external_url: record.external_url,
            is_active: record.is_active != 0,
            scraped_at: parse_datetime_opt(record.scraped_at),
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Search parameters for job postings.
#[derive(Debug, Clone, Default)]
pub struct PostingFilter {
    /// Matched case-insensitively against title, company and description.
    pub text: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub limit: Option<u32>,
}

impl PostingFilter {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Wrap `text` for LIKE, escaping wildcard characters with `\`.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[derive(Clone)]
pub struct DieselJobPostingRepository {
    pool: SqlitePool,
}

impl DieselJobPostingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a posting (insert or replace).
    pub async fn save(&self, posting: &JobPosting) -> Result<(), diesel::result::Error> {
        let posting = posting.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let skills = serde_json::to_string(&posting.skills).unwrap_or_else(|_| "[]".to_string());
            let scraped_at = posting.scraped_at.as_ref().map(format_datetime);
            let created_at = format_datetime(&posting.created_at);

            let record = NewJobPosting {
                id: &posting.id,
                title: &posting.title,
                company: &posting.company,
                location: &posting.location,
                description: &posting.description,
                job_type: &posting.job_type,
                salary_min: posting.salary_min,
                salary_max: posting.salary_max,
                skills: &skills,
                source_id: posting.source_id.as_deref(),
                external_id: posting.external_id.as_deref(),
                external_url: posting.external_url.as_deref(),
                is_active: posting.is_active as i32,
                scraped_at: scraped_at.as_deref(),
                created_at: &created_at,
            };

            diesel::replace_into(jobs::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<JobPosting>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            jobs::table.find(&id).first::<JobPostingRecord>(conn).optional()
        })
        .await
        .map(|opt| opt.map(JobPosting::from))
    }

    /// Search active postings, newest first.
    pub async fn search(&self, filter: &PostingFilter) -> Result<Vec<JobPosting>, diesel::result::Error> {
        let text = filter.text.trim().to_string();
        let location = filter.location.clone();
        let job_type = filter.job_type.clone();
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as i64;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let mut query = jobs::table
                .filter(jobs::is_active.ne(0))
                .order(jobs::created_at.desc())
                .limit(limit)
                .into_boxed();

            if !text.is_empty() {
                let pattern = like_pattern(&text);
                query = query.filter(
                    jobs::title
                        .like(pattern.clone())
                        .escape('\\')
                        .or(jobs::company.like(pattern.clone()).escape('\\'))
                        .or(jobs::description.like(pattern).escape('\\')),
                );
            }
            if let Some(ref loc) = location {
                query = query.filter(jobs::location.like(like_pattern(loc)).escape('\\'));
            }
            if let Some(ref jt) = job_type {
                query = query.filter(jobs::job_type.eq(jt));
            }

            query.load::<JobPostingRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(JobPosting::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::diesel_pool::create_diesel_pool_from_url;
    use crate::repository::migrations::run_migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselJobPostingRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();
        run_migrations(&pool).await.unwrap();
        (DieselJobPostingRepository::new(pool), dir)
    }

    fn posting(title: &str, company: &str, location: &str, job_type: &str) -> JobPosting {
        JobPosting::new(
            title.to_string(),
            company.to_string(),
            location.to_string(),
            format!("{} at {}", title, company),
            job_type.to_string(),
        )
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }

    #[tokio::test]
    async fn test_search_matches_title_and_company() {
        let (repo, _dir) = setup_test_db().await;
        let mut react = posting("Senior React Developer", "Acme", "Berlin", "full-time");
        react.skills = vec!["react".to_string(), "typescript".to_string()];
        repo.save(&react).await.unwrap();
        repo.save(&posting("Backend Engineer", "Reactive Labs", "Remote", "contract"))
            .await
            .unwrap();
        repo.save(&posting("Data Analyst", "Globex", "Berlin", "full-time"))
            .await
            .unwrap();

        let hits = repo.search(&PostingFilter::new("react")).await.unwrap();
        assert_eq!(hits.len(), 2);

        let stored = repo.get(&react.id).await.unwrap().unwrap();
        assert_eq!(stored.skills, vec!["react", "typescript"]);
    }

    #[tokio::test]
    async fn test_search_filters_and_skips_inactive() {
        let (repo, _dir) = setup_test_db().await;
        repo.save(&posting("Rust Engineer", "Acme", "Berlin", "full-time"))
            .await
            .unwrap();
        let mut closed = posting("Rust Engineer", "Globex", "Berlin", "full-time");
        closed.is_active = false;
        repo.save(&closed).await.unwrap();
        repo.save(&posting("Rust Engineer", "Initech", "Remote", "contract"))
            .await
            .unwrap();

        let filter = PostingFilter {
            location: Some("berlin".to_string()),
            job_type: Some("full-time".to_string()),
            ..PostingFilter::new("rust")
        };
        let hits = repo.search(&filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].company, "Acme");

        let all = repo.search(&PostingFilter::new("")).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
