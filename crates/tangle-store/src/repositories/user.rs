//! User repository — account rows and display details.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tangle_core::UserId;

use crate::errors::{Result, StoreError};
use crate::row_types::UserRow;

/// Fields for inserting a new user.
pub struct NewUser<'a> {
    /// Login email (unique).
    pub email: &'a str,
    /// Hashed password; the store never sees plaintext.
    pub password_hash: &'a str,
    /// First name.
    pub first_name: &'a str,
    /// Last name.
    pub last_name: &'a str,
    /// Nickname.
    pub nickname: &'a str,
    /// Free-form bio.
    pub about_me: &'a str,
    /// Avatar reference.
    pub profile_picture: Option<&'a str>,
    /// Whether the profile is public.
    pub is_public: bool,
}

/// User repository — stateless, every method takes `&Connection`.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user and return the stored row.
    pub fn create(conn: &Connection, new: &NewUser<'_>) -> Result<UserRow> {
        let now = chrono::Utc::now();
        let _ = conn.execute(
            "INSERT INTO users (email, password_hash, first_name, last_name, nickname,
             about_me, profile_picture, is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.email,
                new.password_hash,
                new.first_name,
                new.last_name,
                new.nickname,
                new.about_me,
                new.profile_picture,
                new.is_public,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(UserRow {
            id,
            email: new.email.to_owned(),
            first_name: new.first_name.to_owned(),
            last_name: new.last_name.to_owned(),
            nickname: new.nickname.to_owned(),
            profile_picture: new.profile_picture.map(str::to_owned),
            is_public: new.is_public,
        })
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if no such user exists.
    pub fn get(conn: &Connection, id: UserId) -> Result<UserRow> {
        conn.query_row(
            "SELECT id, email, first_name, last_name, nickname, profile_picture, is_public
             FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .optional()?
        .ok_or(StoreError::UserNotFound(id))
    }

    /// Fetch a user by login email.
    pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
        Ok(conn
            .query_row(
                "SELECT id, email, first_name, last_name, nickname, profile_picture, is_public
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    /// The stored password hash for a login email, if the user exists.
    pub fn password_hash(conn: &Connection, email: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT password_hash FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        nickname: row.get(4)?,
        profile_picture: row.get(5)?,
        is_public: row.get(6)?,
    })
}
