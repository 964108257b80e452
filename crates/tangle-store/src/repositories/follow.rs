//! Follow repository — the request/accept/decline/cancel lifecycle and
//! the resulting follow edges.
//!
//! A request row exists only while pending. Accepting moves the pair into
//! `follows` and deletes the request in one transaction; declining and
//! cancelling just delete it.

use rusqlite::{Connection, params};
use tangle_core::UserId;
use tangle_core::envelope::FollowRequestNotice;

use crate::errors::Result;

/// Follow repository — stateless, every method takes `&Connection`.
pub struct FollowRepo;

impl FollowRepo {
    /// Record a follow request. Re-sending an already-pending request is
    /// a no-op, as is requesting someone the requester already follows.
    pub fn request(conn: &Connection, requester_id: UserId, target_id: UserId) -> Result<()> {
        let already_following: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2)",
            params![requester_id, target_id],
            |row| row.get(0),
        )?;
        if already_following {
            return Ok(());
        }
        let _ = conn.execute(
            "INSERT OR IGNORE INTO follow_requests (requester_id, target_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![requester_id, target_id, chrono::Utc::now()],
        )?;
        Ok(())
    }

    /// Withdraw a pending request the requester sent earlier.
    pub fn cancel(conn: &Connection, requester_id: UserId, target_id: UserId) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2",
            params![requester_id, target_id],
        )?;
        Ok(())
    }

    /// Accept a pending request: delete it and create the follow edge.
    pub fn accept(conn: &Connection, target_id: UserId, requester_id: UserId) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        let _ = tx.execute(
            "DELETE FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2",
            params![requester_id, target_id],
        )?;
        let _ = tx.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![requester_id, target_id, chrono::Utc::now()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Decline a pending request: just delete it.
    pub fn decline(conn: &Connection, target_id: UserId, requester_id: UserId) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2",
            params![requester_id, target_id],
        )?;
        Ok(())
    }

    /// Pending incoming requests for a user, with requester display details.
    pub fn pending_for(conn: &Connection, target_id: UserId) -> Result<Vec<FollowRequestNotice>> {
        let mut stmt = conn.prepare(
            "SELECT r.requester_id, u.first_name, u.last_name
             FROM follow_requests r
             JOIN users u ON u.id = r.requester_id
             WHERE r.target_id = ?1
             ORDER BY r.created_at",
        )?;
        let rows = stmt.query_map(params![target_id], |row| {
            Ok(FollowRequestNotice {
                follower_user_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Targets of a user's still-pending outgoing requests.
    pub fn pending_targets_of(conn: &Connection, requester_id: UserId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT target_id FROM follow_requests WHERE requester_id = ?1 ORDER BY target_id",
        )?;
        let rows = stmt.query_map(params![requester_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The users a user follows.
    pub fn following_of(conn: &Connection, user_id: UserId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY followee_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The users following a user.
    pub fn followers_of(conn: &Connection, user_id: UserId) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare(
            "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY follower_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::{open_db, seed_user};

    #[test]
    fn request_then_accept_creates_edge() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        let pending = FollowRepo::pending_for(&conn, bob).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].follower_user_id, ada);
        assert_eq!(pending[0].first_name, "ada");

        FollowRepo::accept(&conn, bob, ada).unwrap();
        assert!(FollowRepo::pending_for(&conn, bob).unwrap().is_empty());
        assert_eq!(FollowRepo::following_of(&conn, ada).unwrap(), vec![bob]);
        assert_eq!(FollowRepo::followers_of(&conn, bob).unwrap(), vec![ada]);
    }

    #[test]
    fn duplicate_request_is_a_noop() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        FollowRepo::request(&conn, ada, bob).unwrap();
        assert_eq!(FollowRepo::pending_for(&conn, bob).unwrap().len(), 1);
    }

    #[test]
    fn request_after_following_is_a_noop() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        FollowRepo::accept(&conn, bob, ada).unwrap();
        FollowRepo::request(&conn, ada, bob).unwrap();
        assert!(FollowRepo::pending_for(&conn, bob).unwrap().is_empty());
    }

    #[test]
    fn decline_removes_request_without_edge() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        FollowRepo::decline(&conn, bob, ada).unwrap();
        assert!(FollowRepo::pending_for(&conn, bob).unwrap().is_empty());
        assert!(FollowRepo::following_of(&conn, ada).unwrap().is_empty());
    }

    #[test]
    fn cancel_removes_the_requesters_own_request() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        assert_eq!(FollowRepo::pending_targets_of(&conn, ada).unwrap(), vec![bob]);

        FollowRepo::cancel(&conn, ada, bob).unwrap();
        assert!(FollowRepo::pending_targets_of(&conn, ada).unwrap().is_empty());
        assert!(FollowRepo::pending_for(&conn, bob).unwrap().is_empty());
    }

    #[test]
    fn follows_are_directional() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        let bob = seed_user(&conn, "bob");

        FollowRepo::request(&conn, ada, bob).unwrap();
        FollowRepo::accept(&conn, bob, ada).unwrap();

        assert_eq!(FollowRepo::following_of(&conn, ada).unwrap(), vec![bob]);
        assert!(FollowRepo::following_of(&conn, bob).unwrap().is_empty());
    }

    #[test]
    fn no_pending_requests_is_an_empty_vec() {
        let conn = open_db();
        let ada = seed_user(&conn, "ada");
        assert!(FollowRepo::pending_for(&conn, ada).unwrap().is_empty());
    }
}
