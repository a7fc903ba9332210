//! Scrape job model and its status lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a scrape job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScrapeJobStatus {
    pub const ALL: [ScrapeJobStatus; 4] = [
        ScrapeJobStatus::Pending,
        ScrapeJobStatus::Running,
        ScrapeJobStatus::Completed,
        ScrapeJobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a worker may move a job from `self` to `next`.
    pub fn can_transition_to(&self, next: ScrapeJobStatus) -> bool {
        match (*self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScrapeJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move scrape job from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ScrapeJobStatus,
    pub to: ScrapeJobStatus,
}

/// One unit of work: fetch postings for a search query from one source.
///
/// `completed_at` is set exactly when the status is terminal, and
/// `jobs_found` does not change after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: String,
    pub owner_id: String,
    /// Weak reference; the query may have been deleted since.
    pub search_query_id: Option<String>,
    /// Weak reference; the source may have been deleted since.
    pub source_id: Option<String>,
    pub status: ScrapeJobStatus,
    pub jobs_found: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ScrapeJob {
    /// A freshly dispatched job.
    pub fn pending(owner_id: &str, search_query_id: &str, source_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            search_query_id: Some(search_query_id.to_string()),
            source_id: Some(source_id.to_string()),
            status: ScrapeJobStatus::Pending,
            jobs_found: 0,
            started_at: now,
            completed_at: None,
            error_message: None,
            metadata: serde_json::json!({}),
            created_at: now,
        }
    }

    fn check(&self, next: ScrapeJobStatus) -> Result<(), InvalidTransition> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    /// Mark the job as picked up by a worker.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.check(ScrapeJobStatus::Running)?;
        self.status = ScrapeJobStatus::Running;
        self.started_at = now;
        Ok(())
    }

    pub fn complete(&mut self, jobs_found: u32, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.check(ScrapeJobStatus::Completed)?;
        self.status = ScrapeJobStatus::Completed;
        self.jobs_found = jobs_found;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.check(ScrapeJobStatus::Failed)?;
        self.status = ScrapeJobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }
}

/// A scrape job joined with the query and source it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJobView {
    pub job: ScrapeJob,
    pub query_text: Option<String>,
    pub query_location: Option<String>,
    pub source_name: Option<String>,
}
