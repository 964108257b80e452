//! Message repository — chat history and unread tracking.
//!
//! Private and group messages live in separate tables: private rows carry
//! a receiver and a read flag, group rows carry neither. History queries
//! join in the sender's display details so the hub never does a second
//! lookup per message.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tangle_core::envelope::StoredMessage;
use tangle_core::ids::message_id;
use tangle_core::{GroupId, RoomId, UserId};

use crate::errors::Result;

/// Message repository — stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Persist a private message; returns the generated message id.
    pub fn insert_private(
        conn: &Connection,
        room_id: &RoomId,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String> {
        let id = message_id();
        let _ = conn.execute(
            "INSERT INTO private_messages (message_id, room_id, sender_id, receiver_id, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, room_id.as_str(), sender_id, receiver_id, content, timestamp],
        )?;
        Ok(id)
    }

    /// Persist a group message; returns the generated message id.
    pub fn insert_group(
        conn: &Connection,
        room_id: &RoomId,
        group_id: GroupId,
        sender_id: UserId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String> {
        let id = message_id();
        let _ = conn.execute(
            "INSERT INTO group_messages (message_id, room_id, group_id, sender_id, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, room_id.as_str(), group_id, sender_id, content, timestamp],
        )?;
        Ok(id)
    }

    /// A private room's history, most recent first.
    pub fn private_history(conn: &Connection, room_id: &RoomId) -> Result<Vec<StoredMessage>> {
        let mut stmt = conn.prepare(
            "SELECT m.message_id, m.room_id, m.content, m.timestamp,
                    m.sender_id, u.first_name, u.last_name, u.nickname,
                    m.receiver_id, m.read
             FROM private_messages m
             JOIN users u ON u.id = m.sender_id
             WHERE m.room_id = ?1
             ORDER BY m.timestamp DESC",
        )?;
        let rows = stmt.query_map(params![room_id.as_str()], row_to_private_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A group room's history, most recent first.
    pub fn group_history(conn: &Connection, room_id: &RoomId) -> Result<Vec<StoredMessage>> {
        let mut stmt = conn.prepare(
            "SELECT m.message_id, m.room_id, m.content, m.timestamp,
                    m.sender_id, u.first_name, u.last_name, u.nickname
             FROM group_messages m
             JOIN users u ON u.id = m.sender_id
             WHERE m.room_id = ?1
             ORDER BY m.timestamp DESC",
        )?;
        let rows = stmt.query_map(params![room_id.as_str()], row_to_group_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark every private message addressed to `reader` in a room as read.
    /// Returns how many rows changed.
    pub fn mark_read(conn: &Connection, room_id: &RoomId, reader_id: UserId) -> Result<usize> {
        let updated = conn.execute(
            "UPDATE private_messages SET read = 1
             WHERE room_id = ?1 AND receiver_id = ?2 AND read = 0",
            params![room_id.as_str(), reader_id],
        )?;
        Ok(updated)
    }

    /// How many unread private messages `reader` has from `sender`.
    pub fn unread_count(conn: &Connection, reader_id: UserId, sender_id: UserId) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM private_messages
             WHERE receiver_id = ?1 AND sender_id = ?2 AND read = 0",
            params![reader_id, sender_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_private_message(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        message_id: row.get(0)?,
        room_id: RoomId::from(row.get::<_, String>(1)?),
        content: row.get(2)?,
        timestamp: row.get(3)?,
        sender_user_id: row.get(4)?,
        sender_first_name: row.get(5)?,
        sender_last_name: row.get(6)?,
        sender_nickname: row.get(7)?,
        receiver_user_id: Some(row.get(8)?),
        read: Some(row.get(9)?),
    })
}

fn row_to_group_message(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        message_id: row.get(0)?,
        room_id: RoomId::from(row.get::<_, String>(1)?),
        content: row.get(2)?,
        timestamp: row.get(3)?,
        sender_user_id: row.get(4)?,
        sender_first_name: row.get(5)?,
        sender_last_name: row.get(6)?,
        sender_nickname: row.get(7)?,
        receiver_user_id: None,
        read: None,
    })
}
