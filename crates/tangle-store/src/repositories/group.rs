//! Group repository — membership, invitations, and join requests.
//!
//! Two paths into a group: an invitation (accepted by the invitee) or a
//! join request (accepted by the group's creator). Either acceptance
//! inserts the membership row and deletes the pending row in one
//! transaction.

use rusqlite::{Connection, OptionalExtension, params};
use tangle_core::envelope::{GroupInviteNotice, GroupJoinRequestNotice};
use tangle_core::{GroupId, UserId};

use crate::errors::{Result, StoreError};
use crate::row_types::GroupRow;

/// Group repository — stateless, every method takes `&Connection`.
pub struct GroupRepo;

impl GroupRepo {
    /// Create a group; the creator becomes its first member.
    pub fn create(
        conn: &Connection,
        creator_id: UserId,
        name: &str,
        description: &str,
    ) -> Result<GroupRow> {
        let now = chrono::Utc::now();
        let tx = conn.unchecked_transaction()?;
        let _ = tx.execute(
            "INSERT INTO groups (creator_id, name, description, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![creator_id, name, description, now],
        )?;
        let id = tx.last_insert_rowid();
        let _ = tx.execute(
            "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![id, creator_id, now],
        )?;
        tx.commit()?;
        Ok(GroupRow {
            id,
            creator_id,
            name: name.to_owned(),
            description: description.to_owned(),
        })
    }

    /// Fetch a group by id.
    pub fn get(conn: &Connection, id: GroupId) -> Result<GroupRow> {
        conn.query_row(
            "SELECT id, creator_id, name, description FROM groups WHERE id = ?1",
            params![id],
            |row| {
                Ok(GroupRow {
                    id: row.get(0)?,
                    creator_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::GroupNotFound(id))
    }

    /// Whether a user is a member of a group.
    pub fn is_member(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let member: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
            params![group_id, user_id],
            |row| row.get(0),
        )?;
        Ok(member)
    }

    /// Groups a user is an accepted member of.
    pub fn groups_of(conn: &Connection, user_id: UserId) -> Result<Vec<GroupId>> {
        let mut stmt = conn
            .prepare("SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY group_id")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Invite a user to a group. Inviting an existing member is a no-op.
    pub fn invite(
        conn: &Connection,
        group_id: GroupId,
        user_id: UserId,
        inviter_id: UserId,
    ) -> Result<()> {
        if Self::is_member(conn, group_id, user_id)? {
            return Ok(());
        }
        let _ = conn.execute(
            "INSERT OR IGNORE INTO group_invites (group_id, user_id, inviter_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![group_id, user_id, inviter_id, chrono::Utc::now()],
        )?;
        Ok(())
    }

    /// Pending invitations for a user, with group and creator details.
    pub fn invites_for(conn: &Connection, user_id: UserId) -> Result<Vec<GroupInviteNotice>> {
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.description, g.creator_id,
                    u.first_name || ' ' || u.last_name
             FROM group_invites i
             JOIN groups g ON g.id = i.group_id
             JOIN users u ON u.id = g.creator_id
             WHERE i.user_id = ?1
             ORDER BY i.created_at",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(GroupInviteNotice {
                group_id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                creator_user_id: row.get(3)?,
                creator_name: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Accept an invitation: membership row in, invite row out.
    pub fn accept_invite(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        let _ = tx.execute(
            "DELETE FROM group_invites WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )?;
        let _ = tx.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, user_id, chrono::Utc::now()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Decline an invitation.
    pub fn decline_invite(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM group_invites WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    /// Ask to join a group. Asking again while pending, or as a member,
    /// is a no-op.
    pub fn request_join(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<()> {
        if Self::is_member(conn, group_id, user_id)? {
            return Ok(());
        }
        let _ = conn.execute(
            "INSERT OR IGNORE INTO group_join_requests (group_id, user_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, user_id, chrono::Utc::now()],
        )?;
        Ok(())
    }

    /// Pending join requests across every group a user created.
    pub fn join_requests_for_creator(
        conn: &Connection,
        creator_id: UserId,
    ) -> Result<Vec<GroupJoinRequestNotice>> {
        let mut stmt = conn.prepare(
            "SELECT r.id, r.user_id, u.first_name, u.last_name, g.id, g.name
             FROM group_join_requests r
             JOIN groups g ON g.id = r.group_id
             JOIN users u ON u.id = r.user_id
             WHERE g.creator_id = ?1
             ORDER BY r.created_at",
        )?;
        let rows = stmt.query_map(params![creator_id], |row| {
            Ok(GroupJoinRequestNotice {
                request_id: row.get(0)?,
                user_id: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                group_id: row.get(4)?,
                group_name: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Groups a user has asked to join and is still waiting on.
    pub fn join_requests_of(conn: &Connection, user_id: UserId) -> Result<Vec<GroupId>> {
        let mut stmt = conn.prepare(
            "SELECT group_id FROM group_join_requests WHERE user_id = ?1 ORDER BY group_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Accept a join request by its row id; returns the joined pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if the request no longer
    /// exists (already answered, or the group was deleted).
    pub fn accept_join_request(conn: &Connection, request_id: i64) -> Result<(GroupId, UserId)> {
        let tx = conn.unchecked_transaction()?;
        let pair: Option<(GroupId, UserId)> = tx
            .query_row(
                "SELECT group_id, user_id FROM group_join_requests WHERE id = ?1",
                params![request_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((group_id, user_id)) = pair else {
            return Err(StoreError::InvalidOperation(format!(
                "join request {request_id} no longer exists"
            )));
        };
        let _ = tx.execute(
            "DELETE FROM group_join_requests WHERE id = ?1",
            params![request_id],
        )?;
        let _ = tx.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, user_id, chrono::Utc::now()],
        )?;
        tx.commit()?;
        Ok((group_id, user_id))
    }

    /// The group a pending join request belongs to, if it still exists.
    pub fn join_request_group(conn: &Connection, request_id: i64) -> Result<Option<GroupId>> {
        Ok(conn
            .query_row(
                "SELECT group_id FROM group_join_requests WHERE id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Decline a join request by its row id.
    pub fn decline_join_request(conn: &Connection, request_id: i64) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM group_join_requests WHERE id = ?1",
            params![request_id],
        )?;
        Ok(())
    }
}
