//! Job source model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Rate limit applied when a source row has none recorded.
pub const DEFAULT_RATE_LIMIT_PER_HOUR: u32 = 100;

/// An external job board eligible for scraping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    /// Dispatches allowed per user per window. Zero blocks every dispatch.
    pub rate_limit_per_hour: u32,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Create a new active source with the default rate limit.
    pub fn new(name: String, base_url: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            base_url,
            is_active: true,
            rate_limit_per_hour: DEFAULT_RATE_LIMIT_PER_HOUR,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_rate_limit(mut self, per_hour: u32) -> Self {
        self.rate_limit_per_hour = per_hour;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Parse the base URL, rejecting relative or malformed values.
    pub fn parsed_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Host part of the base URL, if it has one.
    pub fn domain(&self) -> Option<String> {
        self.parsed_url()
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_defaults() {
        let source = Source::new("LinkedIn".to_string(), "https://linkedin.com".to_string());
        assert!(source.is_active);
        assert_eq!(source.rate_limit_per_hour, DEFAULT_RATE_LIMIT_PER_HOUR);
        assert!(!source.id.is_empty());
    }

    #[test]
    fn test_domain() {
        let source = Source::new(
            "Indeed".to_string(),
            "https://www.indeed.com/jobs".to_string(),
        );
        assert_eq!(source.domain(), Some("www.indeed.com".to_string()));

        let bad = Source::new("Broken".to_string(), "not a url".to_string());
        assert!(bad.parsed_url().is_err());
        assert_eq!(bad.domain(), None);
    }
}
