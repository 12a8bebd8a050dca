//! Scoped transactions on a shared connection.
//!
//! [`Txn`] issues `BEGIN IMMEDIATE` on creation and `ROLLBACK` when it is
//! dropped without a successful [`Txn::commit`]. It borrows the connection
//! immutably, so it works inside [`Database::execute`](crate::Database::execute)
//! closures. A failed rollback is logged, never returned: the caller
//! always sees the error that caused the cancellation.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// An open transaction. Rolls back on drop unless committed.
#[must_use = "dropping a Txn immediately rolls it back"]
pub struct Txn<'c> {
    conn: &'c Connection,
    open: bool,
}

impl<'c> Txn<'c> {
    /// Start a write transaction on `conn`.
    pub fn begin(conn: &'c Connection) -> StoreResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE;")
            .map_err(|source| StoreError::Transaction {
                stage: "begin",
                source,
            })?;
        debug!("transaction started");
        Ok(Self { conn, open: true })
    }

    /// The connection this transaction runs on.
    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    /// Commit the transaction.
    ///
    /// On failure the transaction is still cancelled (by `Drop`) and the
    /// commit error is returned.
    pub fn commit(mut self) -> StoreResult<()> {
        self.conn
            .execute_batch("COMMIT;")
            .map_err(|source| StoreError::Transaction {
                stage: "commit",
                source,
            })?;
        self.open = false;
        debug!("transaction committed");
        Ok(())
    }

    /// Cancel the transaction explicitly.
    pub fn cancel(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        // SQLite already rolled back on some failures (e.g. SQLITE_FULL).
        if self.conn.is_autocommit() {
            return;
        }
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!("transaction cancelled"),
            Err(err) => warn!(%err, "could not cancel transaction"),
        }
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

// ── tests ────────────────────────────────────────────────────────────
