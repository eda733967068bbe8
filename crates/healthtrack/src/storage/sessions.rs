//! Login session and password reset token queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{format_timestamp, parse_timestamp, Storage};
use crate::auth::Session;
use crate::error::Result;

impl Storage {
    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO sessions (token_hash, user_id, created_at, expires_at, flash)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                session.token_hash,
                session.user_id,
                format_timestamp(session.created_at),
                format_timestamp(session.expires_at),
                session.flash,
            ],
        )?;
        Ok(())
    }

    /// Look up a session that is still valid at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                r"
                SELECT token_hash, user_id, created_at, expires_at, flash
                FROM sessions WHERE token_hash = ?1 AND expires_at > ?2
                ",
                params![token_hash, format_timestamp(now)],
                |row| {
                    let created_at: String = row.get(2)?;
                    let expires_at: String = row.get(3)?;
                    Ok(Session {
                        token_hash: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: parse_timestamp(2, &created_at)?,
                        expires_at: parse_timestamp(3, &expires_at)?,
                        flash: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Remove a session (logout).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?;
        Ok(affected > 0)
    }

    /// Attach a one-shot message to a session, replacing any pending one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_flash(&self, token_hash: &str, message: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET flash = ?2 WHERE token_hash = ?1",
            params![token_hash, message],
        )?;
        Ok(())
    }

    /// Remove and return the pending one-shot message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn take_flash(&self, token_hash: &str) -> Result<Option<String>> {
        let flash: Option<String> = self
            .conn
            .query_row(
                "SELECT flash FROM sessions WHERE token_hash = ?1",
                [token_hash],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if flash.is_some() {
            self.conn.execute(
                "UPDATE sessions SET flash = NULL WHERE token_hash = ?1",
                [token_hash],
            )?;
        }
        Ok(flash)
    }

    /// Delete expired sessions and reset tokens, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let stamp = format_timestamp(now);
        let sessions = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", [&stamp])?;
        let resets = self
            .conn
            .execute("DELETE FROM password_resets WHERE expires_at <= ?1", [&stamp])?;
        if sessions + resets > 0 {
            debug!("Purged {} sessions and {} reset tokens", sessions, resets);
        }
        Ok(sessions + resets)
    }

    /// Store a password reset token hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_password_reset(
        &self,
        token_hash: &str,
        user_id: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO password_resets (token_hash, user_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                token_hash,
                user_id,
                format_timestamp(now),
                format_timestamp(expires_at)
            ],
        )?;
        Ok(())
    }

    /// The user a still-valid reset token belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_password_reset(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let user_id = self
            .conn
            .query_row(
                "SELECT user_id FROM password_resets WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, format_timestamp(now)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    /// Drop every reset token and session of a user after a password change.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear_credentials_state(&self, user_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM password_resets WHERE user_id = ?1", [user_id])?;
        self.conn
            .execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::super::test_support::insert_user;
    use super::*;
    use crate::user::Role;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_session_lifecycle() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        let (session, _token) = Session::start(uid, now, Duration::hours(1));
        storage.insert_session(&session).unwrap();

        let found = storage.get_session(&session.token_hash, now).unwrap().unwrap();
        assert_eq!(found.user_id, uid);

        // Expired sessions are not returned.
        assert!(storage
            .get_session(&session.token_hash, now + Duration::hours(2))
            .unwrap()
            .is_none());

        assert!(storage.delete_session(&session.token_hash).unwrap());
        assert!(storage.get_session(&session.token_hash, now).unwrap().is_none());
    }

    #[test]
    fn test_flash_is_one_shot() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let (session, _) = Session::start(uid, Utc::now(), Duration::hours(1));
        storage.insert_session(&session).unwrap();

        assert_eq!(storage.take_flash(&session.token_hash).unwrap(), None);
        storage.set_flash(&session.token_hash, "Saved!").unwrap();
        assert_eq!(
            storage.take_flash(&session.token_hash).unwrap().as_deref(),
            Some("Saved!")
        );
        assert_eq!(storage.take_flash(&session.token_hash).unwrap(), None);
    }

    #[test]
    fn test_purge_expired() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        let (old, _) = Session::start(uid, now - Duration::hours(3), Duration::hours(1));
        let (fresh, _) = Session::start(uid, now, Duration::hours(1));
        storage.insert_session(&old).unwrap();
        storage.insert_session(&fresh).unwrap();
        storage
            .insert_password_reset("h", uid, now - Duration::hours(2), now - Duration::hours(1))
            .unwrap();

        assert_eq!(storage.purge_expired(now).unwrap(), 2);
        assert!(storage.get_session(&fresh.token_hash, now).unwrap().is_some());
    }

    #[test]
    fn test_password_reset_tokens() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        storage
            .insert_password_reset("abc", uid, now, now + Duration::hours(1))
            .unwrap();

        assert_eq!(storage.find_password_reset("abc", now).unwrap(), Some(uid));
        assert_eq!(
            storage
                .find_password_reset("abc", now + Duration::hours(2))
                .unwrap(),
            None
        );
        assert_eq!(storage.find_password_reset("nope", now).unwrap(), None);

        storage.clear_credentials_state(uid).unwrap();
        assert_eq!(storage.find_password_reset("abc", now).unwrap(), None);
    }
}
