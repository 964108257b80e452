//! Identifiers and token generation.
//!
//! User and group ids are numeric (they come from the relational store's
//! autoincrement columns); room and message ids are server-generated strings
//! so reconnecting clients can rediscover conversations by a durable handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Numeric user identifier from the persistence collaborator.
pub type UserId = i64;

/// Numeric group identifier from the persistence collaborator.
pub type GroupId = i64;

/// Durable identity of a broadcast room.
///
/// A pure function of its participants: the canonically-ordered user pair
/// for a private conversation, or the group id for a group chat, resolved
/// to one stable string by the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Generate a fresh room id (UUID v7, time-ordered).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("room_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generate a message id (UUID v7, time-ordered).
#[must_use]
pub fn message_id() -> String {
    format!("msg_{}", Uuid::now_v7())
}

/// Generate an opaque session token: 16 random bytes, hex-encoded.
#[must_use]
pub fn session_token() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
