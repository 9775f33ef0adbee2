//! Metadata store error types.

use thiserror::Error;

/// Result type for metadata store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur against the metadata store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Map a sqlx error, turning unique violations into [`DbError::Conflict`].
    pub fn from_query(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                return Self::Conflict(db.message().to_string());
            }
        }
        Self::Database(err)
    }
}
