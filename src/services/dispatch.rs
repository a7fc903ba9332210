//! Scrape job dispatch: one pending job per active source for a search query.
//!
//! Dispatch only creates work records. It never waits on scraping, and it
//! does not retry: a rate-limited source is reported as skipped and the
//! caller decides whether to try again after the window resets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{ScrapeJob, SearchIntent, SearchQuery, Source};
use crate::rate_limit::{RateDecision, RateLimitBackend, RateLimitError};
use crate::repository::{
    DieselScrapeJobRepository, DieselSearchQueryRepository, DieselSourceRepository, Repositories,
};

/// Failure of the backing store or rate limiter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("search query text is empty")]
    InvalidQuery,
    #[error("no active job sources")]
    NoActiveSources,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<diesel::result::Error> for DispatchError {
    fn from(e: diesel::result::Error) -> Self {
        DispatchError::Store(StoreError::Database(e))
    }
}

impl From<RateLimitError> for DispatchError {
    fn from(e: RateLimitError) -> Self {
        DispatchError::Store(StoreError::RateLimit(e))
    }
}

/// Why a source got no job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited {
        limit: u32,
        used: u32,
        resets_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source_id: String,
    pub source_name: String,
    pub reason: SkipReason,
}

/// Result of a dispatch: the persisted query, the jobs created and the
/// sources passed over.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub search_query: SearchQuery,
    pub jobs: Vec<ScrapeJob>,
    pub skipped: Vec<SkippedSource>,
}

impl DispatchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Fans a search query out into scrape jobs.
#[derive(Clone)]
pub struct DispatchService {
    sources: DieselSourceRepository,
    queries: DieselSearchQueryRepository,
    scrape_jobs: DieselScrapeJobRepository,
    limiter: Arc<dyn RateLimitBackend>,
}

impl DispatchService {
    pub fn new(repos: &Repositories, limiter: Arc<dyn RateLimitBackend>) -> Self {
        Self {
            sources: repos.sources.clone(),
            queries: repos.queries.clone(),
            scrape_jobs: repos.scrape_jobs.clone(),
            limiter,
        }
    }

    /// Dispatch `intent` for `owner_id` now.
    pub async fn dispatch(
        &self,
        intent: &SearchIntent,
        owner_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch_at(intent, owner_id, Utc::now()).await
    }

    /// Dispatch with an explicit clock reading. All jobs created by one call
    /// share `now` as their start and creation time.
    pub async fn dispatch_at(
        &self,
        intent: &SearchIntent,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let intent = intent.normalized();
        if !intent.has_text() {
            return Err(DispatchError::InvalidQuery);
        }

        let search_query = self.queries.upsert(owner_id, &intent, now).await?;
        debug!(
            "Persisted search query {} for {}: {:?}",
            search_query.id, owner_id, search_query.query_text
        );

        let sources = self.sources.get_active().await?;
        if sources.is_empty() {
            warn!("No active sources to dispatch {:?}", search_query.query_text);
            return Err(DispatchError::NoActiveSources);
        }

        let mut jobs = Vec::with_capacity(sources.len());
        let mut skipped = Vec::new();

        for source in &sources {
            let decision = self
                .limiter
                .check_and_increment(owner_id, &source.id, source.rate_limit_per_hour, now)
                .await?;

            if let RateDecision::Denied {
                used,
                limit,
                resets_at,
            } = decision
            {
                warn!(
                    "Skipping {} for {}: rate limited ({}/{} until {})",
                    source.name, owner_id, used, limit, resets_at
                );
                skipped.push(SkippedSource {
                    source_id: source.id.clone(),
                    source_name: source.name.clone(),
                    reason: SkipReason::RateLimited {
                        limit,
                        used,
                        resets_at,
                    },
                });
                continue;
            }

            let job = ScrapeJob::pending(owner_id, &search_query.id, &source.id, now);
            self.insert_or_release(&job, source, now).await?;
            debug!("Created scrape job {} for {}", job.id, source.name);
            jobs.push(job);
        }

        info!(
            "Dispatched {:?} for {}: {} job(s), {} skipped",
            search_query.query_text,
            owner_id,
            jobs.len(),
            skipped.len()
        );

        Ok(DispatchOutcome {
            search_query,
            jobs,
            skipped,
        })
    }

    /// Insert `job`, giving back the source's rate-limit increment if the
    /// insert fails.
    async fn insert_or_release(
        &self,
        job: &ScrapeJob,
        source: &Source,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Err(e) = self.scrape_jobs.insert(job).await else {
            return Ok(());
        };

        if let Err(release_err) = self.limiter.release(&job.owner_id, &source.id, now).await {
            warn!(
                "Failed to release rate limit for {} after insert error: {}",
                source.name, release_err
            );
        }
        Err(e.into())
    }
}
