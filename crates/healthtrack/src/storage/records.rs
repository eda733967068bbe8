//! Health record queries.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{format_timestamp, limit_param, parse_code, parse_date, parse_timestamp, Storage};
use crate::error::{Error, Result};
use crate::record::{HealthRecord, RecordInput};

const RECORD_COLUMNS: &str = "id, user_id, date, sleep_hours, water_intake, weight, height, \
     weight_goal, mood, notes, created_by, last_modified_by, created_at, last_modified";

impl Storage {
    /// Insert a record for `user_id` and return it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_record(
        &self,
        user_id: i64,
        input: &RecordInput,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<HealthRecord> {
        let stamp = format_timestamp(now);
        self.conn.execute(
            r"
            INSERT INTO health_records (user_id, date, sleep_hours, water_intake, weight, height,
                weight_goal, mood, notes, created_by, last_modified_by, created_at, last_modified)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?11, ?11)
            ",
            params![
                user_id,
                input.date.to_string(),
                input.sleep_hours,
                input.water_intake,
                input.weight,
                input.height,
                input.weight_goal,
                input.mood.code(),
                input.notes,
                actor,
                stamp,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted health record {} for user {}", id, user_id);
        self.require_record(id)
    }

    /// Overwrite the data fields of a record and return it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the record does not exist.
    pub fn update_record(
        &self,
        id: i64,
        input: &RecordInput,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<HealthRecord> {
        let affected = self.conn.execute(
            r"
            UPDATE health_records
            SET date = ?2, sleep_hours = ?3, water_intake = ?4, weight = ?5, height = ?6,
                weight_goal = ?7, mood = ?8, notes = ?9, last_modified_by = ?10, last_modified = ?11
            WHERE id = ?1
            ",
            params![
                id,
                input.date.to_string(),
                input.sleep_hours,
                input.water_intake,
                input.weight,
                input.height,
                input.weight_goal,
                input.mood.code(),
                input.notes,
                actor,
                format_timestamp(now),
            ],
        )?;
        if affected == 0 {
            return Err(Error::NotFound {
                entity: "health record",
                id,
            });
        }
        self.require_record(id)
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_record(&self, id: i64) -> Result<Option<HealthRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM health_records WHERE id = ?1"),
                [id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn require_record(&self, id: i64) -> Result<HealthRecord> {
        self.get_record(id)?.ok_or(Error::NotFound {
            entity: "health record",
            id,
        })
    }

    /// A user's records in date order, optionally limited to an inclusive range.
    ///
    /// Records on the same day keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn records_between(
        &self,
        user_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<HealthRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {RECORD_COLUMNS} FROM health_records
            WHERE user_id = ?1 AND (?2 IS NULL OR date >= ?2) AND (?3 IS NULL OR date <= ?3)
            ORDER BY date ASC, id ASC
            "
        ))?;
        let records = stmt
            .query_map(
                params![
                    user_id,
                    start.map(|d| d.to_string()),
                    end.map(|d| d.to_string())
                ],
                row_to_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All of a user's records in date order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn records_for_user(&self, user_id: i64) -> Result<Vec<HealthRecord>> {
        self.records_between(user_id, None, None)
    }

    /// A user's newest records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_records(&self, user_id: i64, limit: usize) -> Result<Vec<HealthRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {RECORD_COLUMNS} FROM health_records
            WHERE user_id = ?1 ORDER BY date DESC, id DESC LIMIT ?2
            "
        ))?;
        let records = stmt
            .query_map(params![user_id, limit_param(limit)], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Number of records a user has.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_records(&self, user_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM health_records WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Whether the user logged anything on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has_record_on(&self, user_id: i64, date: NaiveDate) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM health_records WHERE user_id = ?1 AND date = ?2",
            params![user_id, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ids of users with at least one record dated on or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn users_with_records_since(&self, since: NaiveDate) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT user_id FROM health_records WHERE date >= ?1 ORDER BY user_id",
        )?;
        let ids = stmt
            .query_map([since.to_string()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub(super) fn all_records(&self) -> Result<Vec<HealthRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM health_records ORDER BY id"))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Insert a record with every column, keeping its id.
pub(super) fn insert_full(conn: &Connection, record: &HealthRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO health_records ({RECORD_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            record.id,
            record.user_id,
            record.date.to_string(),
            record.sleep_hours,
            record.water_intake,
            record.weight,
            record.height,
            record.weight_goal,
            record.mood.code(),
            record.notes,
            record.created_by,
            record.last_modified_by,
            format_timestamp(record.created_at),
            format_timestamp(record.last_modified),
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &Row) -> rusqlite::Result<HealthRecord> {
    let date: String = row.get(2)?;
    let mood: String = row.get(8)?;
    let created_at: String = row.get(12)?;
    let last_modified: String = row.get(13)?;

    Ok(HealthRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: parse_date(2, &date)?,
        sleep_hours: row.get(3)?,
        water_intake: row.get(4)?,
        weight: row.get(5)?,
        height: row.get(6)?,
        weight_goal: row.get(7)?,
        mood: parse_code(8, &mood)?,
        notes: row.get(9)?,
        created_by: row.get(10)?,
        last_modified_by: row.get(11)?,
        created_at: parse_timestamp(12, &created_at)?,
        last_modified: parse_timestamp(13, &last_modified)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::super::test_support::insert_user;
    use super::*;
    use crate::record::Mood;
    use crate::user::Role;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let mut input = RecordInput::new(day(1), 7.5, 2.0, Mood::Good);
        input.weight = Some(70.0);
        input.notes = Some("felt fine".to_string());

        let record = storage.insert_record(uid, &input, Some(uid), Utc::now()).unwrap();
        assert_eq!(record.user_id, uid);
        assert_eq!(record.date, day(1));
        assert_eq!(record.weight, Some(70.0));
        assert_eq!(record.mood, Mood::Good);
        assert_eq!(record.created_by, Some(uid));
        assert_eq!(record.last_modified_by, Some(uid));

        let fetched = storage.get_record(record.id).unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_update_record() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let doc = insert_user(&storage, "doc", Role::Doctor);
        let created = Utc::now();
        let record = storage
            .insert_record(uid, &RecordInput::new(day(1), 7.0, 2.0, Mood::Good), Some(uid), created)
            .unwrap();

        let mut input = RecordInput::new(day(1), 8.0, 2.5, Mood::Excellent);
        input.weight = Some(68.0);
        let later = created + Duration::hours(2);
        let updated = storage.update_record(record.id, &input, Some(doc), later).unwrap();

        assert_eq!(updated.sleep_hours, 8.0);
        assert_eq!(updated.mood, Mood::Excellent);
        assert_eq!(updated.created_by, Some(uid));
        assert_eq!(updated.last_modified_by, Some(doc));
        assert!(updated.last_modified > updated.created_at);
    }

    #[test]
    fn test_update_missing_record() {
        let storage = create_test_storage();
        let input = RecordInput::new(day(1), 7.0, 2.0, Mood::Good);
        let err = storage.update_record(5, &input, None, Utc::now()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_records_between_filters_and_orders() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let other = insert_user(&storage, "bob", Role::Patient);
        let now = Utc::now();
        for d in [5, 1, 3, 9] {
            storage
                .insert_record(uid, &RecordInput::new(day(d), 7.0, 2.0, Mood::Good), None, now)
                .unwrap();
        }
        storage
            .insert_record(other, &RecordInput::new(day(3), 7.0, 2.0, Mood::Bad), None, now)
            .unwrap();

        let all: Vec<NaiveDate> = storage
            .records_for_user(uid)
            .unwrap()
            .iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(all, vec![day(1), day(3), day(5), day(9)]);

        let ranged = storage.records_between(uid, Some(day(3)), Some(day(5))).unwrap();
        assert_eq!(ranged.len(), 2);

        let from = storage.records_between(uid, Some(day(4)), None).unwrap();
        assert_eq!(from.len(), 2);
    }

    #[test]
    fn test_recent_records_newest_first() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();
        for d in 1..=5 {
            storage
                .insert_record(uid, &RecordInput::new(day(d), 7.0, 2.0, Mood::Good), None, now)
                .unwrap();
        }

        let recent = storage.recent_records(uid, 3).unwrap();
        let dates: Vec<NaiveDate> = recent.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(5), day(4), day(3)]);
        assert_eq!(storage.count_records(uid).unwrap(), 5);
    }

    #[test]
    fn test_has_record_on_and_active_users() {
        let storage = create_test_storage();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);
        let now = Utc::now();
        storage
            .insert_record(alice, &RecordInput::new(day(10), 7.0, 2.0, Mood::Good), None, now)
            .unwrap();
        storage
            .insert_record(bob, &RecordInput::new(day(2), 7.0, 2.0, Mood::Good), None, now)
            .unwrap();

        assert!(storage.has_record_on(alice, day(10)).unwrap());
        assert!(!storage.has_record_on(alice, day(11)).unwrap());
        assert_eq!(storage.users_with_records_since(day(5)).unwrap(), vec![alice]);
    }

    #[test]
    fn test_records_removed_with_owner() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        storage
            .insert_record(uid, &RecordInput::new(day(1), 7.0, 2.0, Mood::Good), None, Utc::now())
            .unwrap();

        storage.conn.execute("DELETE FROM users WHERE id = ?1", [uid]).unwrap();
        assert_eq!(storage.count_records(uid).unwrap(), 0);
    }
}
