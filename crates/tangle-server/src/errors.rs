//! Server error type.

use tangle_store::StoreError;
use thiserror::Error;

/// Errors surfaced by hub and router operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Inbound frame failed to decode as a known envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// An operation referenced a room the caller may not use.
    #[error("not a participant of room {0}")]
    NotAParticipant(String),

    /// An operation referenced a group the caller does not own.
    #[error("user {user_id} is not the creator of group {group_id}")]
    NotGroupCreator {
        /// The acting user.
        user_id: i64,
        /// The group whose requests they tried to answer.
        group_id: i64,
    },

    /// A frame decoded but its payload cannot be acted on.
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    /// Binding the listener failed.
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),
}

/// Convenience alias for server results.
pub type Result<T> = std::result::Result<T, ServerError>;
