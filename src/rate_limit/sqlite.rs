//! SQLite-backed rate limiter for multi-process coordination.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{RateDecision, RateLimitBackend, RateLimitError, RateLimitResult, RateLimitWindow};

const SELECT_WINDOW: &str = "SELECT owner_id, source_id, window_start_ms, requests_count
     FROM rate_limits WHERE owner_id = ? AND source_id = ?";

const UPSERT_WINDOW: &str = "INSERT INTO rate_limits (owner_id, source_id, window_start_ms, requests_count)
     VALUES (?, ?, ?, ?)
     ON CONFLICT(owner_id, source_id) DO UPDATE SET
        window_start_ms = excluded.window_start_ms,
        requests_count = excluded.requests_count";

/// SQLite-backed rate limit storage.
/// Each check runs in a `BEGIN IMMEDIATE` transaction, so processes sharing
/// the database file never double-grant capacity.
pub struct SqliteRateLimitBackend {
    length: Duration,
    conn: Mutex<Connection>,
}

impl SqliteRateLimitBackend {
    /// Open (or create) the `rate_limits` table in the database at `db_path`.
    pub fn new(db_path: &Path, length: Duration) -> RateLimitResult<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent access
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Set busy timeout for lock contention
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limits (
                owner_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                window_start_ms INTEGER NOT NULL,
                requests_count INTEGER NOT NULL DEFAULT 0 CHECK (requests_count >= 0),
                PRIMARY KEY (owner_id, source_id)
            );
        "#,
        )?;

        Ok(Self {
            length,
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RateLimitResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RateLimitError::Poisoned)
    }

    fn row_to_window(row: &rusqlite::Row) -> rusqlite::Result<RateLimitWindow> {
        let start_ms: i64 = row.get(2)?;
        Ok(RateLimitWindow {
            owner_id: row.get(0)?,
            source_id: row.get(1)?,
            // An out-of-range start reads as an expired window.
            window_start: DateTime::from_timestamp_millis(start_ms).unwrap_or(DateTime::UNIX_EPOCH),
            requests_count: row.get::<_, i64>(3)?.max(0) as u32,
        })
    }

    fn load(
        conn: &Connection,
        owner_id: &str,
        source_id: &str,
    ) -> RateLimitResult<Option<RateLimitWindow>> {
        Ok(conn
            .query_row(SELECT_WINDOW, params![owner_id, source_id], Self::row_to_window)
            .optional()?)
    }

    fn store(conn: &Connection, window: &RateLimitWindow) -> RateLimitResult<()> {
        conn.execute(
            UPSERT_WINDOW,
            params![
                window.owner_id,
                window.source_id,
                window.window_start.timestamp_millis(),
                window.requests_count as i64,
            ],
        )?;
        Ok(())
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success.
    /// The transaction is rolled back if `f` or the commit fails.
    fn in_write_transaction<T>(
        conn: &Connection,
        f: impl FnOnce(&Connection) -> RateLimitResult<T>,
    ) -> RateLimitResult<T> {
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = f(conn).and_then(|value| {
            conn.execute("COMMIT", [])?;
            Ok(value)
        });
        if result.is_err() && !conn.is_autocommit() {
            let _ = conn.execute("ROLLBACK", []);
        }
        result
    }
}

#[async_trait]
impl RateLimitBackend for SqliteRateLimitBackend {
    async fn check_and_increment(
        &self,
        owner_id: &str,
        source_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> RateLimitResult<RateDecision> {
        let conn = self.lock()?;
        let length = self.length;

        let decision = Self::in_write_transaction(&conn, |conn| {
            let mut window = Self::load(conn, owner_id, source_id)?
                .unwrap_or_else(|| RateLimitWindow::new(owner_id, source_id, now));
            let decision = window.check_and_increment(now, limit, length);
            Self::store(conn, &window)?;
            Ok(decision)
        })?;

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
        let conn = self.lock()?;
        let length = self.length;

        Self::in_write_transaction(&conn, |conn| {
            if let Some(mut window) = Self::load(conn, owner_id, source_id)? {
                if window.release(now, length) {
                    Self::store(conn, &window)?;
                }
            }
            Ok(())
        })
    }

    async fn window(
        &self,
        owner_id: &str,
        source_id: &str,
    ) -> RateLimitResult<Option<RateLimitWindow>> {
        let conn = self.lock()?;
        Self::load(&conn, owner_id, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_limit_plus_one_is_denied() {
        let dir = tempdir().unwrap();
        let backend =
            SqliteRateLimitBackend::new(&dir.path().join("limits.db"), Duration::hours(1)).unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            assert!(backend
                .check_and_increment("user-1", "indeed", 3, now)
                .await
                .unwrap()
                .is_allowed());
        }
        let denied = backend
            .check_and_increment("user-1", "indeed", 3, now)
            .await
            .unwrap();
        assert!(!denied.is_allowed());
        assert_eq!(denied.used(), 3);

        let window = backend.window("user-1", "indeed").await.unwrap().unwrap();
        assert_eq!(window.requests_count, 3);
    }

    #[tokio::test]
    async fn test_windows_shared_between_connections() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("limits.db");
        let first = SqliteRateLimitBackend::new(&db_path, Duration::hours(1)).unwrap();
        let second = SqliteRateLimitBackend::new(&db_path, Duration::hours(1)).unwrap();
        let now = Utc::now();

        assert!(first
            .check_and_increment("user-1", "linkedin", 1, now)
            .await
            .unwrap()
            .is_allowed());
        assert!(!second
            .check_and_increment("user-1", "linkedin", 1, now)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_window_resets_and_release() {
        let dir = tempdir().unwrap();
        let backend =
            SqliteRateLimitBackend::new(&dir.path().join("limits.db"), Duration::minutes(1))
                .unwrap();
        let now = Utc::now();

        backend.check_and_increment("user-1", "indeed", 1, now).await.unwrap();
        backend.release("user-1", "indeed", now).await.unwrap();
        backend.release("user-1", "indeed", now).await.unwrap();
        let window = backend.window("user-1", "indeed").await.unwrap().unwrap();
        assert_eq!(window.requests_count, 0);

        backend.check_and_increment("user-1", "indeed", 1, now).await.unwrap();
        let later = now + Duration::minutes(2);
        let decision = backend
            .check_and_increment("user-1", "indeed", 1, later)
            .await
            .unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.used(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_open_transaction() {
        let dir = tempdir().unwrap();
        let backend =
            SqliteRateLimitBackend::new(&dir.path().join("limits.db"), Duration::hours(1)).unwrap();

        {
            let conn = backend.lock().unwrap();
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE boards (id TEXT PRIMARY KEY);
                 CREATE TABLE listings (
                     board_id TEXT REFERENCES boards(id) DEFERRABLE INITIALLY DEFERRED
                 );",
            )
            .unwrap();

            // The deferred foreign key is only checked at COMMIT, so the commit fails.
            let result = SqliteRateLimitBackend::in_write_transaction(&conn, |conn| {
                conn.execute("INSERT INTO listings (board_id) VALUES ('missing')", [])?;
                Ok(())
            });
            assert!(matches!(result, Err(RateLimitError::Database(_))));
            assert!(conn.is_autocommit());
        }

        let decision = backend
            .check_and_increment("user-1", "indeed", 1, Utc::now())
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
}
