//! Account queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{
    format_timestamp, parse_code, parse_optional_timestamp, parse_timestamp, Storage,
};
use crate::error::Result;
use crate::user::{Goals, NewUser, ProfileUpdate, Role, User};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, role, \
     is_verified, age, gender, weight_goal, sleep_goal, water_goal, last_login_ip, \
     failed_login_attempts, account_locked_until, date_joined, last_login";

impl Storage {
    /// Insert a new account and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the username or email is taken or the insert fails.
    pub fn insert_user(&self, user: &NewUser) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO users (username, email, first_name, last_name, password_hash, role, date_joined)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                user.username,
                user.email,
                user.first_name,
                user.last_name,
                user.password_hash,
                user.role.code(),
                format_timestamp(Utc::now()),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted user {} with id {}", user.username, id);
        Ok(id)
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get an account by exact username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get an account by email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get an account by username or email, username first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        match self.find_user_by_username(login)? {
            Some(user) => Ok(Some(user)),
            None => self.find_user_by_email(login),
        }
    }

    /// Whether a username is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn username_exists(&self, username: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether an email is used by any account other than `exclude`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn email_exists(&self, email: &str, exclude: Option<i64>) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
            params![email, exclude.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List accounts ordered by username, optionally filtered by role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE ?1 IS NULL OR role = ?1 ORDER BY username"
        ))?;
        let users = stmt
            .query_map([role.map(Role::code)], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Reset the failure counter and lock after a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_login_success(
        &self,
        id: i64,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r"
            UPDATE users
            SET failed_login_attempts = 0, account_locked_until = NULL,
                last_login_ip = COALESCE(?2, last_login_ip), last_login = ?3
            WHERE id = ?1
            ",
            params![id, ip, format_timestamp(now)],
        )?;
        Ok(())
    }

    /// Count one failed login and lock the account once `threshold`
    /// consecutive failures are reached.
    ///
    /// The increment happens in a single statement, so concurrent failures
    /// are never lost. Returns the new failure count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_login_failure(
        &self,
        id: i64,
        threshold: u32,
        lock_until: DateTime<Utc>,
    ) -> Result<u32> {
        let attempts = self.conn.query_row(
            r"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                account_locked_until = CASE
                    WHEN failed_login_attempts + 1 >= ?2 THEN ?3
                    ELSE account_locked_until
                END
            WHERE id = ?1
            RETURNING failed_login_attempts
            ",
            params![id, threshold, format_timestamp(lock_until)],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    /// Clear a lock and the failure counter.
    ///
    /// Returns `false` when the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unlock_user(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE users SET failed_login_attempts = 0, account_locked_until = NULL WHERE id = ?1",
            [id],
        )?;
        Ok(affected > 0)
    }

    /// Save profile fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<()> {
        self.conn.execute(
            r"
            UPDATE users
            SET first_name = ?2, last_name = ?3, email = ?4, age = ?5, gender = ?6,
                weight_goal = ?7, sleep_goal = ?8, water_goal = ?9
            WHERE id = ?1
            ",
            params![
                id,
                profile.first_name,
                profile.last_name,
                profile.email,
                profile.age,
                profile.gender.map(|g| g.code()),
                profile.goals.weight,
                profile.goals.sleep,
                profile.goals.water,
            ],
        )?;
        Ok(())
    }

    /// Replace a password hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        Ok(())
    }
}

/// Insert an account with every column, keeping its id.
pub(super) fn insert_full(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            user.id,
            user.username,
            user.email,
            user.first_name,
            user.last_name,
            user.password_hash,
            user.role.code(),
            user.is_verified,
            user.age,
            user.gender.map(|g| g.code()),
            user.goals.weight,
            user.goals.sleep,
            user.goals.water,
            user.last_login_ip,
            user.failed_login_attempts,
            user.account_locked_until.map(format_timestamp),
            format_timestamp(user.date_joined),
            user.last_login.map(format_timestamp),
        ],
    )?;
    Ok(())
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(6)?;
    let gender: Option<String> = row.get(9)?;
    let date_joined: String = row.get(16)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        role: parse_code(6, &role)?,
        is_verified: row.get(7)?,
        age: row.get(8)?,
        gender: gender.map(|g| parse_code(9, &g)).transpose()?,
        goals: Goals {
            weight: row.get(10)?,
            sleep: row.get(11)?,
            water: row.get(12)?,
        },
        last_login_ip: row.get(13)?,
        failed_login_attempts: row.get(14)?,
        account_locked_until: parse_optional_timestamp(15, row.get(15)?)?,
        date_joined: parse_timestamp(16, &date_joined)?,
        last_login: parse_optional_timestamp(17, row.get(17)?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::super::test_support::insert_user;
    use super::*;
    use crate::user::Gender;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_insert_and_get() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);

        let user = storage.get_user(id).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::Patient);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.account_locked_until.is_none());
        assert_eq!(user.goals, Goals::default());
    }

    #[test]
    fn test_get_missing_user() {
        let storage = create_test_storage();
        assert!(storage.get_user(42).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let storage = create_test_storage();
        insert_user(&storage, "alice", Role::Patient);
        let err = storage
            .insert_user(&NewUser {
                username: "alice".to_string(),
                email: "other@example.com".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: "x".to_string(),
                role: Role::Patient,
            })
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::DatabaseQuery(_)));
    }

    #[test]
    fn test_find_by_login_username_or_email() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);

        assert_eq!(storage.find_user_by_login("alice").unwrap().unwrap().id, id);
        assert_eq!(
            storage
                .find_user_by_login("ALICE@example.com")
                .unwrap()
                .unwrap()
                .id,
            id
        );
        assert!(storage.find_user_by_login("nobody").unwrap().is_none());
    }

    #[test]
    fn test_email_exists_excluding_self() {
        let storage = create_test_storage();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);

        assert!(storage.email_exists("alice@example.com", None).unwrap());
        assert!(!storage.email_exists("alice@example.com", Some(alice)).unwrap());
        assert!(storage.email_exists("alice@example.com", Some(bob)).unwrap());
        assert!(storage.username_exists("bob").unwrap());
        assert!(!storage.username_exists("carol").unwrap());
    }

    #[test]
    fn test_list_users_by_role() {
        let storage = create_test_storage();
        insert_user(&storage, "zed", Role::Patient);
        insert_user(&storage, "amy", Role::Patient);
        insert_user(&storage, "doc", Role::Doctor);

        let all: Vec<String> = storage
            .list_users(None)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(all, vec!["amy", "doc", "zed"]);

        let patients = storage.list_users(Some(Role::Patient)).unwrap();
        assert_eq!(patients.len(), 2);
    }

    #[test]
    fn test_login_failure_and_success() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        let until = now + Duration::minutes(15);

        assert_eq!(storage.record_login_failure(id, 2, until).unwrap(), 1);
        assert!(!storage.get_user(id).unwrap().unwrap().is_locked(now));

        assert_eq!(storage.record_login_failure(id, 2, until).unwrap(), 2);
        let user = storage.get_user(id).unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 2);
        assert_eq!(user.account_locked_until, Some(until));
        assert!(user.is_locked(now));

        storage.record_login_success(id, Some("10.0.0.1"), now).unwrap();
        let user = storage.get_user(id).unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.account_locked_until.is_none());
        assert_eq!(user.last_login_ip.as_deref(), Some("10.0.0.1"));
        assert!(user.last_login.is_some());
    }

    #[test]
    fn test_unlock_user() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);
        storage
            .record_login_failure(id, 1, Utc::now() + Duration::minutes(15))
            .unwrap();

        assert!(storage.unlock_user(id).unwrap());
        assert!(!storage.get_user(id).unwrap().unwrap().is_locked(Utc::now()));
        assert!(!storage.unlock_user(999).unwrap());
    }

    #[test]
    fn test_update_profile() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);
        let mut profile = ProfileUpdate::from_user(&storage.get_user(id).unwrap().unwrap());
        profile.age = Some(34);
        profile.gender = Some(Gender::Female);
        profile.goals = Goals {
            weight: Some(65.0),
            sleep: Some(8.0),
            water: Some(2.5),
        };
        storage.update_profile(id, &profile).unwrap();

        let user = storage.get_user(id).unwrap().unwrap();
        assert_eq!(user.age, Some(34));
        assert_eq!(user.gender, Some(Gender::Female));
        assert_eq!(user.goals, profile.goals);
    }

    #[test]
    fn test_set_password_hash() {
        let storage = create_test_storage();
        let id = insert_user(&storage, "alice", Role::Patient);
        storage.set_password_hash(id, "new-hash").unwrap();
        assert_eq!(
            storage.get_user(id).unwrap().unwrap().password_hash,
            "new-hash"
        );
    }
}
