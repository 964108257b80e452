//! Row structs mirroring table rows.

use chrono::{DateTime, Utc};
use tangle_core::{GroupId, RoomId, UserId};

/// A row of the `users` table (minus the password hash).
#[derive(Clone, Debug)]
pub struct UserRow {
    /// Primary key.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Nickname.
    pub nickname: String,
    /// Avatar reference, if set.
    pub profile_picture: Option<String>,
    /// Whether the profile is public.
    pub is_public: bool,
}

/// A row of the `sessions` table.
#[derive(Clone, Debug)]
pub struct SessionRow {
    /// Opaque cookie value.
    pub token: String,
    /// Owning user.
    pub user_id: UserId,
    /// When the session lapses unless extended first.
    pub expires_at: DateTime<Utc>,
}

/// What a room id resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomKind {
    /// A private conversation between two users.
    Private {
        /// Smaller user id of the canonical pair.
        user_lo: UserId,
        /// Larger user id of the canonical pair.
        user_hi: UserId,
    },
    /// A group chat.
    Group(GroupId),
}

/// A row of the `groups` table.
#[derive(Clone, Debug)]
pub struct GroupRow {
    /// Primary key.
    pub id: GroupId,
    /// User who created the group.
    pub creator_id: UserId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
}

/// A resolved room: its durable id and what it is.
#[derive(Clone, Debug)]
pub struct RoomRow {
    /// Durable room id.
    pub room_id: RoomId,
    /// Private pair or group.
    pub kind: RoomKind,
}
