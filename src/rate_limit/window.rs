//! Fixed-window counter for a single (owner, source) pair.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Outcome of a check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum RateDecision {
    /// The request was counted. `used` includes it.
    Allowed {
        used: u32,
        limit: u32,
        resets_at: DateTime<Utc>,
    },
    /// The window is full. Nothing was counted.
    Denied {
        used: u32,
        limit: u32,
        resets_at: DateTime<Utc>,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn used(&self) -> u32 {
        match self {
            Self::Allowed { used, .. } | Self::Denied { used, .. } => *used,
        }
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        match self {
            Self::Allowed { resets_at, .. } | Self::Denied { resets_at, .. } => *resets_at,
        }
    }
}

/// Request counter for one user against one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitWindow {
    pub owner_id: String,
    pub source_id: String,
    pub window_start: DateTime<Utc>,
    pub requests_count: u32,
}

impl RateLimitWindow {
    /// An empty window starting at `now`.
    pub fn new(owner_id: &str, source_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            source_id: source_id.to_string(),
            window_start: now,
            requests_count: 0,
        }
    }

    /// End of the window (exclusive), saturating at the latest representable time.
    pub fn resets_at(&self, length: Duration) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(length)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether `now` falls in `[window_start, window_start + length)`.
    pub fn contains(&self, now: DateTime<Utc>, length: Duration) -> bool {
        now >= self.window_start && now < self.resets_at(length)
    }

    /// Count one request if the window has room, starting a fresh window
    /// first when `now` is outside the current one.
    pub fn check_and_increment(
        &mut self,
        now: DateTime<Utc>,
        limit: u32,
        length: Duration,
    ) -> RateDecision {
        if !self.contains(now, length) {
            self.window_start = now;
            self.requests_count = 0;
        }

        let resets_at = self.resets_at(length);
        if self.requests_count < limit {
            self.requests_count += 1;
            RateDecision::Allowed {
                used: self.requests_count,
                limit,
                resets_at,
            }
        } else {
            RateDecision::Denied {
                used: self.requests_count,
                limit,
                resets_at,
            }
        }
    }

    /// Give back one counted request. Returns false if the window has
    /// already rolled over or nothing was counted.
    pub fn release(&mut self, now: DateTime<Utc>, length: Duration) -> bool {
        if !self.contains(now, length) || self.requests_count == 0 {
            return false;
        }
        self.requests_count -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour() -> Duration {
        Duration::hours(1)
    }

    #[test]
    fn test_denies_after_limit() {
        let now = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "linkedin", now);

        for i in 1..=3 {
            let decision = window.check_and_increment(now, 3, hour());
            assert!(decision.is_allowed());
            assert_eq!(decision.used(), i);
        }

        let denied = window.check_and_increment(now, 3, hour());
        assert!(!denied.is_allowed());
        assert_eq!(denied.used(), 3);
        assert_eq!(denied.resets_at(), now + hour());
        assert_eq!(window.requests_count, 3);
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let now = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "indeed", now);
        assert!(!window.check_and_increment(now, 0, hour()).is_allowed());
        assert_eq!(window.requests_count, 0);
    }

    #[test]
    fn test_resets_when_window_expires() {
        let start = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "indeed", start);
        window.check_and_increment(start, 1, hour());
        assert!(!window.check_and_increment(start, 1, hour()).is_allowed());

        let later = start + hour();
        let decision = window.check_and_increment(later, 1, hour());
        assert!(decision.is_allowed());
        assert_eq!(window.window_start, later);
        assert_eq!(window.requests_count, 1);
    }

    #[test]
    fn test_release_saturates() {
        let now = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "indeed", now);
        assert!(!window.release(now, hour()));

        window.check_and_increment(now, 5, hour());
        assert!(window.release(now, hour()));
        assert_eq!(window.requests_count, 0);
        assert!(!window.release(now, hour()));
    }

    #[test]
    fn test_release_ignores_expired_window() {
        let now = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "indeed", now);
        window.check_and_increment(now, 5, hour());
        assert!(!window.release(now + Duration::hours(2), hour()));
        assert_eq!(window.requests_count, 1);
    }

    #[test]
    fn test_resets_at_saturates() {
        let now = Utc::now();
        let mut window = RateLimitWindow::new("user-1", "indeed", now);
        let decision = window.check_and_increment(now, 1, Duration::MAX);
        assert!(decision.is_allowed());
        assert_eq!(decision.resets_at(), DateTime::<Utc>::MAX_UTC);
        assert!(window.contains(now, Duration::MAX));
    }
}
