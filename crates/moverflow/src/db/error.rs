//! Database error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt value in column '{column}': {value}")]
    Decode { column: &'static str, value: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A store call did not finish within its time budget.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// The blocking task running a store call panicked or was cancelled.
    #[error("Store task failed: {0}")]
    TaskFailed(String),
}

impl DatabaseError {
    /// Returns true when the error came from a constraint violation on a
    /// single row rather than from the store being unusable.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
