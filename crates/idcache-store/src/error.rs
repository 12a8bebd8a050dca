//! Error types for the idcache-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// SQLite could not allocate memory for the operation.
    #[error("out of memory")]
    OutOfMemory,

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// More than one entry matched a lookup that must be unique.
    #[error("{count} entries share the name {name}")]
    DuplicateKey { name: String, count: usize },

    /// The cache contents contradict a store invariant.
    #[error("invalid cache state: {0}")]
    InvalidState(String),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A modify request tried to add a value the attribute already holds.
    #[error("attribute {attr} already contains value {value}")]
    AttributeValueExists { attr: String, value: String },

    /// Beginning or committing an explicit transaction failed.
    #[error("transaction {stage} failed: {source}")]
    Transaction {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Returns `true` for the "does not exist yet" class of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref inner, _) = err
            && inner.code == rusqlite::ErrorCode::OutOfMemory
        {
            return Self::OutOfMemory;
        }
        Self::Sqlite(err)
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
