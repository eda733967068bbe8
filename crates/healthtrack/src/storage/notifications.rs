//! Notification and reminder setting queries.

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    format_time, format_timestamp, parse_code, parse_optional_timestamp, parse_time,
    parse_timestamp, Storage,
};
use crate::error::Result;
use crate::notification::{DailyReminderSetting, NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, notification_type, title, message, is_read, created_at, scheduled_for";

impl Storage {
    /// Store a notification and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_notification(
        &self,
        notification: &NewNotification,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO notifications (user_id, notification_type, title, message, created_at, scheduled_for)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                notification.user_id,
                notification.kind.code(),
                notification.title,
                notification.message,
                format_timestamp(now),
                notification.scheduled_for.map(format_timestamp),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// A user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ?1 \
             ORDER BY created_at DESC, id DESC"
        ))?;
        let notifications = stmt
            .query_map([user_id], row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Number of unread notifications for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark one notification read if it belongs to the user.
    ///
    /// Returns `false` when no such notification is owned by the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_notification_read(&self, user_id: i64, id: i64) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(affected > 0)
    }

    /// Mark every notification of a user read and return how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id],
        )?;
        Ok(affected)
    }

    /// A user's reminder setting, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_reminder_setting(&self, user_id: i64) -> Result<Option<DailyReminderSetting>> {
        let setting = self
            .conn
            .query_row(
                "SELECT user_id, reminder_time, send_email, send_in_app \
                 FROM reminder_settings WHERE user_id = ?1",
                [user_id],
                row_to_setting,
            )
            .optional()?;
        Ok(setting)
    }

    /// Create or replace a user's reminder setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn save_reminder_setting(&self, setting: &DailyReminderSetting) -> Result<()> {
        upsert_setting(&self.conn, setting)
    }

    /// Settings whose reminder time is exactly `time` (minute precision).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn reminder_settings_at(&self, time: NaiveTime) -> Result<Vec<DailyReminderSetting>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, reminder_time, send_email, send_in_app \
             FROM reminder_settings WHERE reminder_time = ?1 ORDER BY user_id",
        )?;
        let settings = stmt
            .query_map([format_time(time)], row_to_setting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(settings)
    }

    pub(super) fn all_notifications(&self) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY id"
        ))?;
        let notifications = stmt
            .query_map([], row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub(super) fn all_reminder_settings(&self) -> Result<Vec<DailyReminderSetting>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, reminder_time, send_email, send_in_app \
             FROM reminder_settings ORDER BY user_id",
        )?;
        let settings = stmt
            .query_map([], row_to_setting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(settings)
    }
}

/// Insert a notification with every column, keeping its id.
pub(super) fn insert_full(conn: &Connection, notification: &Notification) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            notification.id,
            notification.user_id,
            notification.kind.code(),
            notification.title,
            notification.message,
            notification.is_read,
            format_timestamp(notification.created_at),
            notification.scheduled_for.map(format_timestamp),
        ],
    )?;
    Ok(())
}

pub(super) fn upsert_setting(conn: &Connection, setting: &DailyReminderSetting) -> Result<()> {
    conn.execute(
        r"
        INSERT INTO reminder_settings (user_id, reminder_time, send_email, send_in_app)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(user_id) DO UPDATE SET
            reminder_time = excluded.reminder_time,
            send_email = excluded.send_email,
            send_in_app = excluded.send_in_app
        ",
        params![
            setting.user_id,
            format_time(setting.reminder_time),
            setting.send_email,
            setting.send_in_app,
        ],
    )?;
    Ok(())
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(6)?;

    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_code(2, &kind)?,
        title: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        scheduled_for: parse_optional_timestamp(7, row.get(7)?)?,
    })
}

fn row_to_setting(row: &Row) -> rusqlite::Result<DailyReminderSetting> {
    let time: String = row.get(1)?;
    Ok(DailyReminderSetting {
        user_id: row.get(0)?,
        reminder_time: parse_time(1, &time)?,
        send_email: row.get(2)?,
        send_in_app: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::super::test_support::insert_user;
    use super::*;
    use crate::notification::NotificationType;
    use crate::user::Role;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_insert_and_list_newest_first() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        let now = Utc::now();

        storage
            .insert_notification(&NewNotification::check_in(uid), now)
            .unwrap();
        storage
            .insert_notification(
                &NewNotification::weight_goal(uid, 70.0, 65.0),
                now + Duration::seconds(1),
            )
            .unwrap();

        let list = storage.list_notifications(uid).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind, NotificationType::WeightGoal);
        assert_eq!(list[1].kind, NotificationType::DailyReminder);
        assert!(!list[0].is_read);
    }

    #[test]
    fn test_unread_and_mark_read() {
        let storage = create_test_storage();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);
        let now = Utc::now();
        let first = storage
            .insert_notification(&NewNotification::check_in(alice), now)
            .unwrap();
        storage
            .insert_notification(&NewNotification::daily_reminder(alice), now)
            .unwrap();
        assert_eq!(storage.unread_count(alice).unwrap(), 2);

        // Not owned by bob.
        assert!(!storage.mark_notification_read(bob, first).unwrap());
        assert!(storage.mark_notification_read(alice, first).unwrap());
        assert_eq!(storage.unread_count(alice).unwrap(), 1);

        assert_eq!(storage.mark_all_notifications_read(alice).unwrap(), 1);
        assert_eq!(storage.unread_count(alice).unwrap(), 0);
        assert_eq!(storage.mark_all_notifications_read(alice).unwrap(), 0);
    }

    #[test]
    fn test_reminder_setting_upsert() {
        let storage = create_test_storage();
        let uid = insert_user(&storage, "alice", Role::Patient);
        assert!(storage.get_reminder_setting(uid).unwrap().is_none());

        let mut setting = DailyReminderSetting::new(uid, at(8, 30));
        storage.save_reminder_setting(&setting).unwrap();
        assert_eq!(storage.get_reminder_setting(uid).unwrap(), Some(setting.clone()));

        setting.reminder_time = at(21, 0);
        setting.send_email = true;
        storage.save_reminder_setting(&setting).unwrap();
        assert_eq!(storage.get_reminder_setting(uid).unwrap(), Some(setting));
    }

    #[test]
    fn test_reminder_settings_at_matches_minute() {
        let storage = create_test_storage();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);
        storage
            .save_reminder_setting(&DailyReminderSetting::new(alice, at(9, 0)))
            .unwrap();
        storage
            .save_reminder_setting(&DailyReminderSetting::new(bob, at(9, 1)))
            .unwrap();

        let due = storage.reminder_settings_at(at(9, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, alice);
        assert!(storage.reminder_settings_at(at(10, 0)).unwrap().is_empty());
    }
}
