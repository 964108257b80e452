//! Room repository — durable room identities.
//!
//! A room id is a pure function of its participants: the canonically
//! ordered user pair for a private conversation, or the group id for a
//! group chat. Resolving the same participants always yields the same
//! room id, so reconnecting clients land back in their conversations.

use rusqlite::{Connection, OptionalExtension, params};
use tangle_core::{GroupId, RoomId, UserId};

use crate::errors::{Result, StoreError};
use crate::row_types::{RoomKind, RoomRow};

/// Room repository — stateless, every method takes `&Connection`.
pub struct RoomRepo;

impl RoomRepo {
    /// Resolve (or create) the private room for an unordered user pair.
    pub fn get_or_create_private(conn: &Connection, a: UserId, b: UserId) -> Result<RoomId> {
        if a == b {
            return Err(StoreError::InvalidOperation(
                "a private room needs two distinct users".into(),
            ));
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        if let Some(existing) = conn
            .query_row(
                "SELECT room_id FROM private_rooms WHERE user_lo = ?1 AND user_hi = ?2",
                params![lo, hi],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok(RoomId::from(existing));
        }

        // A concurrent caller may have inserted since the SELECT; the
        // conflict clause turns losing the race into a no-op, and the
        // re-select returns the winner's id.
        let room_id = RoomId::generate();
        let inserted = conn.execute(
            "INSERT INTO private_rooms (room_id, user_lo, user_hi, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_lo, user_hi) DO NOTHING",
            params![room_id.as_str(), lo, hi, chrono::Utc::now()],
        )?;
        if inserted == 0 {
            let existing = conn.query_row(
                "SELECT room_id FROM private_rooms WHERE user_lo = ?1 AND user_hi = ?2",
                params![lo, hi],
                |row| row.get::<_, String>(0),
            )?;
            return Ok(RoomId::from(existing));
        }
        Ok(room_id)
    }

    /// Resolve (or create) the room for a group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GroupNotFound`] if the group does not exist.
    pub fn get_or_create_group(conn: &Connection, group_id: GroupId) -> Result<RoomId> {
        if let Some(existing) = conn
            .query_row(
                "SELECT room_id FROM group_rooms WHERE group_id = ?1",
                params![group_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok(RoomId::from(existing));
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
            params![group_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::GroupNotFound(group_id));
        }

        let room_id = RoomId::generate();
        let inserted = conn.execute(
            "INSERT INTO group_rooms (room_id, group_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (group_id) DO NOTHING",
            params![room_id.as_str(), group_id, chrono::Utc::now()],
        )?;
        if inserted == 0 {
            let existing = conn.query_row(
                "SELECT room_id FROM group_rooms WHERE group_id = ?1",
                params![group_id],
                |row| row.get::<_, String>(0),
            )?;
            return Ok(RoomId::from(existing));
        }
        Ok(room_id)
    }

    /// Resolve a room id to its participants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RoomNotFound`] if the id matches neither a
    /// private nor a group room.
    pub fn resolve(conn: &Connection, room_id: &RoomId) -> Result<RoomRow> {
        if let Some((user_lo, user_hi)) = conn
            .query_row(
                "SELECT user_lo, user_hi FROM private_rooms WHERE room_id = ?1",
                params![room_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        {
            return Ok(RoomRow {
                room_id: room_id.clone(),
                kind: RoomKind::Private { user_lo, user_hi },
            });
        }

        if let Some(group_id) = conn
            .query_row(
                "SELECT group_id FROM group_rooms WHERE room_id = ?1",
                params![room_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
        {
            return Ok(RoomRow {
                room_id: room_id.clone(),
                kind: RoomKind::Group(group_id),
            });
        }

        Err(StoreError::RoomNotFound(room_id.as_str().to_owned()))
    }
}
