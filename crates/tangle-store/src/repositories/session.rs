//! Session repository — opaque-token login sessions with a sliding TTL.
//!
//! Every gated request that presents a valid token extends its expiry,
//! so a session lapses only after 45 minutes of inactivity.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tangle_core::UserId;
use tangle_core::constants::SESSION_TTL;
use tangle_core::ids::session_token;

use crate::errors::{Result, StoreError};
use crate::row_types::SessionRow;

fn ttl() -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(SESSION_TTL.as_secs()).unwrap_or(i64::MAX))
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Create a session for a user: fresh token, expiry one TTL from now.
    pub fn create(conn: &Connection, user_id: UserId) -> Result<SessionRow> {
        let token = session_token();
        let expires_at = Utc::now() + ttl();
        let _ = conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at],
        )?;
        Ok(SessionRow {
            token,
            user_id,
            expires_at,
        })
    }

    /// Resolve a token to its session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionNotFound`] if the token is unknown or
    /// the session has already expired. An expired row is deleted on the
    /// spot rather than left for the sweeper.
    pub fn validate(conn: &Connection, token: &str) -> Result<SessionRow> {
        let row = conn
            .query_row(
                "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(SessionRow {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::SessionNotFound)?;

        if row.expires_at <= Utc::now() {
            let _ = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            return Err(StoreError::SessionNotFound);
        }
        Ok(row)
    }

    /// Push a session's expiry one TTL into the future.
    pub fn extend(conn: &Connection, token: &str) -> Result<DateTime<Utc>> {
        let expires_at = Utc::now() + ttl();
        let updated = conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            params![expires_at, token],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound);
        }
        Ok(expires_at)
    }

    /// Delete a session (logout).
    pub fn delete(conn: &Connection, token: &str) -> Result<()> {
        let _ = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    /// Delete every expired session; returns how many were removed.
    pub fn sweep_expired(conn: &Connection) -> Result<usize> {
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now()],
        )?;
        Ok(removed)
    }
}
