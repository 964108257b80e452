//! Error types for the persistence layer.
//!
//! [`StoreError`] is returned by all store operations. Variants stay specific
//! enough for exhaustive matching at the call sites that care (the session
//! gate distinguishes a missing session from a database failure).

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// No session row for the presented token, or the row has expired.
    #[error("session not found")]
    SessionNotFound,

    /// Requested user was not found.
    #[error("user not found: {0}")]
    UserNotFound(i64),

    /// Requested room was not found.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Requested group was not found.
    #[error("group not found: {0}")]
    GroupNotFound(i64),

    /// Invalid operation on the store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
