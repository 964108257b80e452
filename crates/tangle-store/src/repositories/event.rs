//! Event repository — group events and their invitations.
//!
//! Creating an event invites every current group member except the
//! creator: one `event_responses` row each, with a NULL response until
//! the member answers going/notGoing.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tangle_core::envelope::{EventInviteNotice, EventRsvp};
use tangle_core::{GroupId, UserId};

use crate::errors::{Result, StoreError};

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Create an event and invite the group's current members.
    /// Returns the event id.
    pub fn create(
        conn: &Connection,
        group_id: GroupId,
        creator_id: UserId,
        title: &str,
        description: &str,
        event_date_time: DateTime<Utc>,
    ) -> Result<i64> {
        let now = Utc::now();
        let tx = conn.unchecked_transaction()?;
        let _ = tx.execute(
            "INSERT INTO events (group_id, creator_id, title, description, event_date_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![group_id, creator_id, title, description, event_date_time, now],
        )?;
        let event_id = tx.last_insert_rowid();
        let _ = tx.execute(
            "INSERT INTO event_responses (event_id, user_id)
             SELECT ?1, user_id FROM group_members WHERE group_id = ?2 AND user_id <> ?3",
            params![event_id, group_id, creator_id],
        )?;
        tx.commit()?;
        Ok(event_id)
    }

    /// Unanswered invitations for a user, newest event first.
    pub fn pending_for(conn: &Connection, user_id: UserId) -> Result<Vec<EventInviteNotice>> {
        let mut stmt = conn.prepare(
            "SELECT e.id, e.group_id, g.name, e.title, e.description, e.event_date_time,
                    e.creator_id, u.first_name, u.last_name, e.created_at,
                    r.id, r.user_id, r.response
             FROM event_responses r
             JOIN events e ON e.id = r.event_id
             JOIN groups g ON g.id = e.group_id
             JOIN users u ON u.id = e.creator_id
             WHERE r.user_id = ?1 AND r.response IS NULL
             ORDER BY e.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(EventInviteNotice {
                event_id: row.get(0)?,
                group_id: row.get(1)?,
                group_name: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                event_date_time: row.get(5)?,
                creator_id: row.get(6)?,
                creator_first_name: row.get(7)?,
                creator_last_name: row.get(8)?,
                created_at: row.get(9)?,
                response_id: row.get(10)?,
                user_id: row.get(11)?,
                response: row.get(12)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Record a user's answer on their own invitation row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if the row does not exist
    /// or belongs to a different user.
    pub fn record_response(
        conn: &Connection,
        response_id: i64,
        user_id: UserId,
        rsvp: EventRsvp,
    ) -> Result<()> {
        let updated = conn.execute(
            "UPDATE event_responses SET response = ?1 WHERE id = ?2 AND user_id = ?3",
            params![rsvp.as_str(), response_id, user_id],
        )?;
        if updated == 0 {
            return Err(StoreError::InvalidOperation(format!(
                "event response {response_id} does not belong to user {user_id}"
            )));
        }
        Ok(())
    }
}
