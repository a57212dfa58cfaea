use chatline_shared::ChatlineError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row violates a domain invariant.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    Poisoned,
}

impl From<StoreError> for ChatlineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ChatlineError::ConversationNotFound("record".to_string()),
            other => ChatlineError::Storage(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
