//! Scrape job status aggregation.

use serde::Serialize;
use tracing::warn;

use crate::feed::{ScrapeJobChange, Subscription};
use crate::models::{ScrapeJobStatus, ScrapeJobView};
use crate::repository::DieselScrapeJobRepository;

/// Default number of recent jobs in a summary.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Status overview of one owner's scrape jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// Sum of `jobs_found` over completed jobs.
    pub jobs_found: u64,
    /// Most recent jobs, newest first.
    pub recent: Vec<ScrapeJobView>,
}

impl JobSummary {
    /// Reduce a snapshot ordered newest first.
    pub fn from_views(views: &[ScrapeJobView], limit: usize) -> Self {
        let mut summary = JobSummary {
            total: views.len(),
            recent: views.iter().take(limit).cloned().collect(),
            ..Default::default()
        };

        for view in views {
            match view.job.status {
                ScrapeJobStatus::Pending => summary.pending += 1,
                ScrapeJobStatus::Running => summary.running += 1,
                ScrapeJobStatus::Completed => {
                    summary.completed += 1;
                    summary.jobs_found += u64::from(view.job.jobs_found);
                }
                ScrapeJobStatus::Failed => summary.failed += 1,
            }
        }

        summary
    }

    pub fn count(&self, status: ScrapeJobStatus) -> usize {
        match status {
            ScrapeJobStatus::Pending => self.pending,
            ScrapeJobStatus::Running => self.running,
            ScrapeJobStatus::Completed => self.completed,
            ScrapeJobStatus::Failed => self.failed,
        }
    }

    /// Jobs not yet in a terminal state.
    pub fn in_flight(&self) -> usize {
        self.pending + self.running
    }
}

/// Reads back scrape jobs and keeps callers informed of changes.
#[derive(Clone)]
pub struct SummaryService {
    scrape_jobs: DieselScrapeJobRepository,
    recent_limit: usize,
}

impl SummaryService {
    pub fn new(scrape_jobs: DieselScrapeJobRepository) -> Self {
        Self {
            scrape_jobs,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Summarize `owner_id`'s jobs from a fresh fetch.
    pub async fn summarize(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<JobSummary, diesel::result::Error> {
        let views = self.scrape_jobs.list_for_owner(owner_id).await?;
        Ok(JobSummary::from_views(&views, limit))
    }

    /// Deliver each change to `owner_id`'s jobs to `on_change`.
    pub fn subscribe<F>(&self, owner_id: &str, on_change: F) -> Subscription
    where
        F: Fn(ScrapeJobChange) + Send + Sync + 'static,
    {
        self.scrape_jobs.feed().subscribe(owner_id, on_change)
    }

    /// Deliver a freshly computed summary after every change to `owner_id`'s
    /// jobs. A failed fetch is logged and that notification dropped.
    pub fn watch_summary<F>(&self, owner_id: &str, limit: usize, on_summary: F) -> Subscription
    where
        F: Fn(JobSummary) + Send + Sync + 'static,
    {
        let repo = self.scrape_jobs.clone();
        let owner = owner_id.to_string();

        self.scrape_jobs.feed().listen(
            owner_id,
            move |_change| {
                let repo = repo.clone();
                let owner = owner.clone();
                async move {
                    match repo.list_for_owner(&owner).await {
                        Ok(views) => Some(JobSummary::from_views(&views, limit)),
                        Err(e) => {
                            warn!("Failed to refresh job summary for {}: {}", owner, e);
                            None
                        }
                    }
                }
            },
            on_summary,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapeJob;
    use chrono::Utc;

    fn view(status: ScrapeJobStatus, jobs_found: u32) -> ScrapeJobView {
        let mut job = ScrapeJob::pending("user-1", "query-1", "source-1", Utc::now());
        job.status = status;
        job.jobs_found = jobs_found;
        ScrapeJobView {
            job,
            query_text: Some("React Developer".to_string()),
            query_location: None,
            source_name: Some("Indeed".to_string()),
        }
    }

    #[test]
    fn test_counts_sum_to_total() {
        let views = vec![
            view(ScrapeJobStatus::Completed, 12),
            view(ScrapeJobStatus::Pending, 0),
            view(ScrapeJobStatus::Failed, 0),
            view(ScrapeJobStatus::Completed, 3),
            view(ScrapeJobStatus::Running, 0),
        ];
        let summary = JobSummary::from_views(&views, 2);

        assert_eq!(summary.total, 5);
        let by_status: usize = ScrapeJobStatus::ALL.iter().map(|s| summary.count(*s)).sum();
        assert_eq!(by_status, summary.total);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.jobs_found, 15);
        assert_eq!(summary.in_flight(), 2);
        assert_eq!(summary.recent, views[..2].to_vec());
    }

    #[test]
    fn test_jobs_found_ignores_unfinished() {
        let views = vec![view(ScrapeJobStatus::Running, 7), view(ScrapeJobStatus::Failed, 4)];
        assert_eq!(JobSummary::from_views(&views, 5).jobs_found, 0);
    }

    #[test]
    fn test_reduction_is_pure() {
        let views = vec![view(ScrapeJobStatus::Completed, 1), view(ScrapeJobStatus::Pending, 0)];
        let before = views.clone();
        let a = JobSummary::from_views(&views, 5);
        let b = JobSummary::from_views(&views, 5);
        assert_eq!(a, b);
        assert_eq!(views, before);
    }

    #[test]
    fn test_empty_snapshot() {
        let summary = JobSummary::from_views(&[], 5);
        assert_eq!(summary, JobSummary::default());
    }
}
