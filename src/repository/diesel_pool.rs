//! r2d2 pool over SQLite connections.
//!
//! Diesel's SQLite connection is synchronous, so repository calls check a
//! connection out of this pool inside `spawn_blocking`. The rate limiter's
//! SQLite backend opens its own connection to the same file; both sides use
//! WAL and a busy timeout so they can write concurrently.

use std::path::Path;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::DatabaseErrorKind;

pub type DieselError = diesel::result::Error;

pub type R2D2Error = diesel::r2d2::PoolError;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const MAX_CONNECTIONS: u32 = 10;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-connection pragmas, applied whenever the pool opens a connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 30_000,
        }
    }
}

impl ConnectionOptions {
    fn apply(&self, conn: &mut SqliteConnection) -> Result<(), DieselError> {
        diesel::sql_query("PRAGMA journal_mode = WAL").execute(conn)?;
        diesel::sql_query("PRAGMA synchronous = NORMAL").execute(conn)?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .execute(conn)?;
        diesel::sql_query("PRAGMA temp_store = MEMORY").execute(conn)?;
        Ok(())
    }
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        self.apply(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pool for the database file at `db_path`.
pub fn create_diesel_pool(db_path: &Path) -> Result<SqlitePool, R2D2Error> {
    create_diesel_pool_from_url(&db_path.display().to_string())
}

/// Pool for a Diesel SQLite URL. A leading `sqlite:` is accepted and dropped.
pub fn create_diesel_pool_from_url(database_url: &str) -> Result<SqlitePool, R2D2Error> {
    let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

    Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .connection_timeout(CHECKOUT_TIMEOUT)
        .connection_customizer(Box::new(ConnectionOptions::default()))
        .build(ConnectionManager::<SqliteConnection>::new(path))
}

fn unknown_error(message: String) -> DieselError {
    DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(message))
}

/// Run `f` on a pooled connection without blocking the async runtime.
///
/// Pool checkout failures and panics in `f` surface as
/// `DatabaseErrorKind::Unknown`.
pub async fn run_blocking<F, T>(pool: SqlitePool, f: F) -> Result<T, DieselError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, DieselError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| unknown_error(e.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| unknown_error(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::sql_types::Text;
    use tempfile::tempdir;

    #[derive(QueryableByName)]
    struct JournalMode {
        #[diesel(sql_type = Text)]
        journal_mode: String,
    }

    #[tokio::test]
    async fn test_connections_use_wal() {
        let dir = tempdir().unwrap();
        let pool = create_diesel_pool(&dir.path().join("pool.db")).unwrap();

        let mode = run_blocking(pool, |conn| {
            diesel::sql_query("PRAGMA journal_mode").get_result::<JournalMode>(conn)
        })
        .await
        .unwrap();
        assert_eq!(mode.journal_mode.to_lowercase(), "wal");
    }
}
