//! Store handle for the identity cache.
//!
//! [`Database`] owns the single SQLite connection of a process. Clone it
//! and hand it to every store that needs it; operations run on tokio's
//! blocking pool through [`Database::execute`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// How long a writer waits on another connection's lock, in milliseconds.
const BUSY_TIMEOUT_MS: i32 = 5_000;

/// Shared, cloneable handle to the cache database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the cache file at `path`. Blocks on file I/O.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening cache database");
        Self::configure(Connection::open(path)?)
    }

    /// Open a private in-memory cache.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory cache database");
        Self::configure(Connection::open_in_memory()?)
    }

    /// Open the database and run all pending migrations.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending schema migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(migration::run_all).await
    }

    /// Run `f` on the blocking pool with the connection locked.
    ///
    /// No other operation of this handle interleaves with `f`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let count = conn.query_row("SELECT count(*) FROM entries", [], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }

    fn configure(conn: Connection) -> StoreResult<Self> {
        // Readers on other connections keep working while a set is in flight.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // entry_attrs rows go away with their entry.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)?;
        debug!("connection configured");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────
