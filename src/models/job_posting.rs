//! Job posting model used by the manual search path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job listing stored by a scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub job_type: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub skills: Vec<String>,
    pub source_id: Option<String>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub is_active: bool,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn new(
        title: String,
        company: String,
        location: String,
        description: String,
        job_type: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            company,
            location,
            description,
            job_type,
            salary_min: None,
            salary_max: None,
            skills: Vec::new(),
            source_id: None,
            external_id: None,
            external_url: None,
            is_active: true,
            scraped_at: None,
            created_at: Utc::now(),
        }
    }
}
