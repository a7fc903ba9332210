//! In-process rate limit storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{RateDecision, RateLimitBackend, RateLimitResult, RateLimitWindow};

type WindowKey = (String, String);

/// Rate limit windows held in memory. Counts are lost on restart and are not
/// shared between processes.
#[derive(Debug)]
pub struct InMemoryRateLimitBackend {
    length: Duration,
    windows: Mutex<HashMap<WindowKey, RateLimitWindow>>,
}

impl InMemoryRateLimitBackend {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn key(owner_id: &str, source_id: &str) -> WindowKey {
        (owner_id.to_string(), source_id.to_string())
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn check_and_increment(
        &self,
        owner_id: &str,
        source_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> RateLimitResult<RateDecision> {
        let mut windows = self.windows.lock().await;
        let window = windows
            .entry(Self::key(owner_id, source_id))
            .or_insert_with(|| RateLimitWindow::new(owner_id, source_id, now));

        let decision = window.check_and_increment(now, limit, self.length);
        debug!(
            "Rate limit {}/{}: {} of {} used",
            owner_id,
            source_id,
            decision.used(),
            limit
        );
        Ok(decision)
    }

    async fn release(
        &self,
        owner_id: &str,
        source_id: &str,
        now: DateTime<Utc>,
    ) -> RateLimitResult<()> {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(&Self::key(owner_id, source_id)) {
            window.release(now, self.length);
        }
        Ok(())
    }

    async fn window(
        &self,
        owner_id: &str,
        source_id: &str,
    ) -> RateLimitResult<Option<RateLimitWindow>> {
        let windows = self.windows.lock().await;
        Ok(windows.get(&Self::key(owner_id, source_id)).cloned())
    }
}
