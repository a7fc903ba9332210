//! Search intents and persisted search queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a user asked to search for, before it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIntent {
    pub query_text: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub salary_range: Option<String>,
}

impl SearchIntent {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_salary_range(mut self, salary_range: impl Into<String>) -> Self {
        self.salary_range = Some(salary_range.into());
        self
    }

    /// Trim every field and turn blank optional fields into `None`.
    ///
    /// Two intents that differ only in whitespace normalize to the same value,
    /// which is what the search query upsert keys on.
    pub fn normalized(&self) -> Self {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        Self {
            query_text: self.query_text.trim().to_string(),
            location: clean(&self.location),
            job_type: clean(&self.job_type),
            salary_range: clean(&self.salary_range),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.query_text.trim().is_empty()
    }
}

/// A search intent persisted under its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: String,
    pub owner_id: String,
    pub query_text: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub salary_range: Option<String>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SearchQuery {
    /// Build a fresh query row from an already normalized intent.
    pub fn from_intent(owner_id: &str, intent: &SearchIntent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            query_text: intent.query_text.clone(),
            location: intent.location.clone(),
            job_type: intent.job_type.clone(),
            salary_range: intent.salary_range.clone(),
            is_active: true,
            last_run_at: Some(now),
            created_at: now,
        }
    }

    pub fn intent(&self) -> SearchIntent {
        SearchIntent {
            query_text: self.query_text.clone(),
            location: self.location.clone(),
            job_type: self.job_type.clone(),
            salary_range: self.salary_range.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_blank_fields() {
        let intent = SearchIntent::new("  React Developer ")
            .with_location("   ")
            .with_job_type(" remote ");

        let normalized = intent.normalized();
        assert_eq!(normalized.query_text, "React Developer");
        assert_eq!(normalized.location, None);
        assert_eq!(normalized.job_type.as_deref(), Some("remote"));
        assert_eq!(normalized.salary_range, None);
    }

    #[test]
    fn test_has_text() {
        assert!(SearchIntent::new("rust").has_text());
        assert!(!SearchIntent::new("").has_text());
        assert!(!SearchIntent::new(" \t\n").has_text());
    }

    #[test]
    fn test_from_intent_round_trips_intent() {
        let intent = SearchIntent::new("Data Engineer").with_salary_range("100k-150k");
        let query = SearchQuery::from_intent("user-1", &intent, Utc::now());
        assert_eq!(query.owner_id, "user-1");
        assert!(query.is_active);
        assert!(query.last_run_at.is_some());
        assert_eq!(query.intent(), intent);
    }
}
