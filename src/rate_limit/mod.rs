//! Per-user, per-source dispatch rate limiting.
//!
//! Each (owner, source) pair owns one fixed window. The dispatcher calls
//! [`RateLimitBackend::check_and_increment`] once per source before creating a
//! scrape job; the read-modify-write is atomic per key in every backend.
//!
//! Backends:
//! - `memory`: in-process map behind one lock (single process)
//! - `sqlite`: `rate_limits` table in the application database (multi-process)

mod memory;
mod sqlite;
mod window;

pub use memory::InMemoryRateLimitBackend;
pub use sqlite::SqliteRateLimitBackend;
pub use window::{RateDecision, RateLimitWindow};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::info;

/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit database error: {0}")]
    Database(String),
    #[error("rate limit state lock poisoned")]
    Poisoned,
    #[error("unknown rate limit backend '{0}' (expected 'memory' or 'sqlite')")]
    UnknownBackend(String),
}

impl From<rusqlite::Error> for RateLimitError {
    fn from(e: rusqlite::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Storage for rate limit windows.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Atomically count one request for `(owner_id, source_id)` if fewer than
    /// `limit` have been counted in the window containing `now`.
    async fn check_and_increment(
        &self,
        owner_id: &str,
        source_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> RateLimitResult<RateDecision>;

    /// Undo one increment in the current window. Saturates at zero.
    async fn release(
        &self,
        owner_id: &str,
        source_id: &str,
        now: DateTime<Utc>,
    ) -> RateLimitResult<()>;

    /// Current stored window, if any.
    async fn window(
        &self,
        owner_id: &str,
        source_id: &str,
    ) -> RateLimitResult<Option<RateLimitWindow>>;
}

/// Longest accepted window: ten years.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

/// Window length from a number of seconds, clamped to `1..=MAX_WINDOW_SECS`.
pub fn window_length(secs: u64) -> Duration {
    Duration::seconds(secs.clamp(1, MAX_WINDOW_SECS) as i64)
}

/// Build the backend named by `kind` (`None` means in-memory).
pub fn create_backend(
    kind: Option<&str>,
    db_path: &Path,
    window_secs: u64,
) -> RateLimitResult<Arc<dyn RateLimitBackend>> {
    let length = window_length(window_secs);
    match kind.map(str::trim).filter(|k| !k.is_empty()) {
        None | Some("memory") => {
            info!("Using in-memory rate limiting");
            Ok(Arc::new(InMemoryRateLimitBackend::new(length)))
        }
        Some("sqlite") => {
            info!("Using SQLite rate limiting at {}", db_path.display());
            Ok(Arc::new(SqliteRateLimitBackend::new(db_path, length)?))
        }
        Some(other) => Err(RateLimitError::UnknownBackend(other.to_string())),
    }
}
