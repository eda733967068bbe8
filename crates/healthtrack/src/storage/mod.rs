//! Storage layer for healthtrack.
//!
//! This module provides `SQLite`-based persistent storage for accounts,
//! health records, notifications, reminder settings, food recommendations
//! and login sessions. Queries are grouped by table in submodules, each
//! adding methods to [`Storage`].

pub mod migrations;
pub mod schema;

mod foods;
mod notifications;
mod records;
mod sessions;
mod users;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::food::FoodRecommendation;
use crate::notification::{DailyReminderSetting, Notification};
use crate::record::HealthRecord;
use crate::user::User;

use schema::DOMAIN_TABLES_DELETE_ORDER;

/// Storage engine for the tracker.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes or migrates the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the reminder loop read while a request writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&mut conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&mut conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |table: &str| -> Result<i64> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            Ok(n)
        };

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM health_records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_users: count("users")?,
            total_records: count("health_records")?,
            total_notifications: count("notifications")?,
            unread_notifications: self.conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE is_read = 0",
                [],
                |row| row.get(0),
            )?,
            active_sessions: count("sessions")?,
            oldest_record: oldest.and_then(|s| s.parse().ok()),
            newest_record: newest.and_then(|s| s.parse().ok()),
            db_size_bytes,
        })
    }

    /// Read every domain table for a backup.
    ///
    /// Sessions and pending password resets are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn snapshot(&self) -> Result<SnapshotTables> {
        Ok(SnapshotTables {
            users: self.list_users(None)?,
            health_records: self.all_records()?,
            notifications: self.all_notifications()?,
            reminder_settings: self.all_reminder_settings()?,
            food_recommendations: self.list_foods()?,
        })
    }

    /// Replace every domain table with the given rows in one transaction.
    ///
    /// Existing sessions are dropped, so every user has to log in again.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is changed in that case.
    pub fn restore(&mut self, tables: &SnapshotTables) -> Result<()> {
        let tx = self.conn.transaction()?;

        for table in DOMAIN_TABLES_DELETE_ORDER {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }

        for user in &tables.users {
            users::insert_full(&tx, user)?;
        }
        for record in &tables.health_records {
            records::insert_full(&tx, record)?;
        }
        for notification in &tables.notifications {
            notifications::insert_full(&tx, notification)?;
        }
        for setting in &tables.reminder_settings {
            notifications::upsert_setting(&tx, setting)?;
        }
        for food in &tables.food_recommendations {
            foods::insert_full(&tx, food)?;
        }

        tx.commit()?;
        info!(
            "Restored {} users and {} records",
            tables.users.len(),
            tables.health_records.len()
        );
        Ok(())
    }

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Registered accounts.
    pub total_users: i64,
    /// Stored health records.
    pub total_records: i64,
    /// Stored notifications.
    pub total_notifications: i64,
    /// Notifications not yet read.
    pub unread_notifications: i64,
    /// Login sessions, including expired ones not yet purged.
    pub active_sessions: i64,
    /// Earliest record date.
    pub oldest_record: Option<NaiveDate>,
    /// Latest record date.
    pub newest_record: Option<NaiveDate>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Every domain table, as read for a backup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotTables {
    /// Accounts, including password hashes.
    pub users: Vec<User>,
    /// Health records.
    pub health_records: Vec<HealthRecord>,
    /// Notifications.
    pub notifications: Vec<Notification>,
    /// Daily reminder settings.
    pub reminder_settings: Vec<DailyReminderSetting>,
    /// Food recommendations.
    pub food_recommendations: Vec<FoodRecommendation>,
}

/// Format a timestamp for storage.
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Format a time of day for storage.
pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Parse a stored timestamp column.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {value:?}: {e}")))
}

/// Parse an optional stored timestamp column.
pub(crate) fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, &v)).transpose()
}

/// Parse a stored date column.
pub(crate) fn parse_date(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    value
        .parse()
        .map_err(|e| conversion_error(idx, format!("bad date {value:?}: {e}")))
}

/// Parse a stored time-of-day column.
pub(crate) fn parse_time(idx: usize, value: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| conversion_error(idx, format!("bad time {value:?}: {e}")))
}

/// Parse a stored enum code column.
pub(crate) fn parse_code<T: std::str::FromStr>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value
        .parse()
        .map_err(|_| conversion_error(idx, format!("unknown code {value:?}")))
}

/// Convert a row limit for binding.
pub(crate) fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use crate::user::{NewUser, Role};

    /// Insert a user with a dummy hash and return its id.
    pub fn insert_user(storage: &Storage, username: &str, role: Role) -> i64 {
        storage
            .insert_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                first_name: "Test".to_string(),
                last_name: username.to_string(),
                password_hash: "hash".to_string(),
                role,
            })
            .expect("insert test user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Mood, RecordInput};
    use crate::user::Role;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/healthtrack.db");
        let storage = Storage::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(storage.path(), path.as_path());
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.oldest_record, None);

        let uid = test_support::insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        for day in [3, 1, 2] {
            let date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
            storage
                .insert_record(uid, &RecordInput::new(date, 7.0, 2.0, Mood::Good), Some(uid), now)
                .unwrap();
        }

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.oldest_record, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(stats.newest_record, NaiveDate::from_ymd_opt(2024, 5, 3));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut storage = create_test_storage();
        let uid = test_support::insert_user(&storage, "alice", Role::Patient);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let input = RecordInput::new(date, 7.0, 2.0, Mood::Good);
        storage.insert_record(uid, &input, Some(uid), Utc::now()).unwrap();
        let snapshot = storage.snapshot().unwrap();

        test_support::insert_user(&storage, "bob", Role::Doctor);
        assert_eq!(storage.stats().unwrap().total_users, 2);

        storage.restore(&snapshot).unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_records, 1);
        assert_eq!(storage.snapshot().unwrap(), snapshot);
    }

    #[test]
    fn test_restore_failure_leaves_data() {
        let mut storage = create_test_storage();
        test_support::insert_user(&storage, "alice", Role::Patient);
        let mut snapshot = storage.snapshot().unwrap();
        // Duplicate usernames violate the unique constraint.
        let mut duplicate = snapshot.users[0].clone();
        duplicate.id += 1;
        duplicate.email = "other@example.com".to_string();
        snapshot.users.push(duplicate);

        assert!(storage.restore(&snapshot).is_err());
        assert_eq!(storage.stats().unwrap().total_users, 1);
    }

    #[test]
    fn test_metadata_round_trip() {
        let storage = create_test_storage();
        assert_eq!(storage.metadata("last_backup").unwrap(), None);
        storage.set_metadata("last_backup", "x").unwrap();
        assert_eq!(storage.metadata("last_backup").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_format_timestamp_sorts_lexically() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + chrono::Duration::milliseconds(5);
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_timestamp(0, &format_timestamp(b)).unwrap(), b);
    }
}
