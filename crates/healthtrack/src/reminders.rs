//! Scheduled reminders and weekly summaries.
//!
//! A dispatch pass looks up every reminder setting for the current minute,
//! raises the in-app notifications while the storage lock is held, and hands
//! back the emails so they can be sent after the lock is released.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::analytics::stats;
use crate::error::Result;
use crate::mailer::{Email, Mailer};
use crate::notification::{truncate_to_minute, NewNotification};
use crate::record::{HealthRecord, Metric};
use crate::storage::Storage;
use crate::tracker::Tracker;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuePass {
    /// Settings whose time matched.
    pub matched: usize,
    /// In-app notifications raised.
    pub notified: usize,
    /// Emails still to be delivered.
    pub emails: Vec<Email>,
}

/// Raise the in-app reminders due at `at` and collect the emails.
///
/// # Errors
///
/// Returns an error if a database operation fails.
pub fn collect_due(storage: &Storage, at: NaiveTime, now: DateTime<Utc>) -> Result<DuePass> {
    let at = truncate_to_minute(at);
    let settings = storage.reminder_settings_at(at)?;
    let mut pass = DuePass {
        matched: settings.len(),
        ..DuePass::default()
    };

    for setting in settings {
        if setting.send_in_app {
            storage.insert_notification(&NewNotification::daily_reminder(setting.user_id), now)?;
            pass.notified += 1;
        }
        if setting.send_email {
            match storage.get_user(setting.user_id)? {
                Some(user) if !user.email.is_empty() => {
                    pass.emails.push(Email::daily_reminder(&user.email, &user.full_name()));
                }
                _ => debug!("User {} has no email, skipping", setting.user_id),
            }
        }
    }

    Ok(pass)
}

/// Send emails one by one; failures are logged and skipped.
///
/// Returns the number delivered.
pub async fn deliver(mailer: &dyn Mailer, emails: &[Email]) -> usize {
    let mut delivered = 0;
    for email in emails {
        match mailer.send(email).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Failed to send reminder to {}: {}", email.to, e),
        }
    }
    delivered
}

/// Raise a weekly summary for every user with records in the last 7 days.
///
/// Returns the number of summaries raised.
///
/// # Errors
///
/// Returns an error if a database operation fails.
pub fn weekly_summaries(storage: &Storage, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
    let since = today - ChronoDuration::days(crate::analytics::WEEK_DAYS);
    let users = storage.users_with_records_since(since)?;

    for &user_id in &users {
        let records = storage.records_between(user_id, Some(since), Some(today))?;
        let refs: Vec<&HealthRecord> = records.iter().collect();
        let avg_sleep = stats::average(&refs, Metric::SleepHours).unwrap_or(0.0);
        let avg_water = stats::average(&refs, Metric::WaterIntake).unwrap_or(0.0);
        storage.insert_notification(
            &NewNotification::weekly_summary(user_id, records.len(), avg_sleep, avg_water),
            now,
        )?;
    }

    info!("Raised {} weekly summaries", users.len());
    Ok(users.len())
}

/// Longest gap the loop replays; anything wider is a clock jump.
const MAX_CATCH_UP_MINUTES: i64 = 60;

/// Minutes to dispatch when the previous pass covered `last` and the clock
/// now reads `now`: every minute in `(last, now]`, wrapping at midnight.
///
/// A gap wider than [`MAX_CATCH_UP_MINUTES`] dispatches only `now`.
#[must_use]
pub fn minutes_due(last: Option<NaiveTime>, now: NaiveTime) -> Vec<NaiveTime> {
    let now = truncate_to_minute(now);
    let Some(last) = last.map(truncate_to_minute) else {
        return vec![now];
    };

    let mut gap = (now - last).num_minutes();
    if gap < 0 {
        gap += 24 * 60;
    }
    if gap > MAX_CATCH_UP_MINUTES {
        warn!(
            "Clock moved {} minutes since the last reminder pass, dispatching {} only",
            gap,
            now.format("%H:%M")
        );
        return vec![now];
    }
    (1..=gap)
        .map(|step| last + ChronoDuration::minutes(step))
        .collect()
}

/// Run a dispatch pass every `every`, using local wall-clock minutes.
///
/// Each minute is dispatched once. Minutes missed between ticks are caught
/// up on the next one.
pub async fn run(tracker: Arc<Tracker>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last: Option<NaiveTime> = None;
    info!("Reminder loop started, checking every {}s", every.as_secs());

    loop {
        ticker.tick().await;
        let now = truncate_to_minute(Local::now().time());

        for minute in minutes_due(last, now) {
            match tracker.dispatch_reminders(minute).await {
                Ok(0) => {}
                Ok(n) => info!("Sent {} daily reminders at {}", n, minute.format("%H:%M")),
                Err(e) => warn!("Reminder dispatch failed: {}", e),
            }
        }
        last = Some(now);
        tracker.prune_rate_limits();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::mailer::test_support::RecordingMailer;
    use crate::notification::{DailyReminderSetting, NotificationType};
    use crate::record::{Mood, RecordInput};
    use crate::storage::test_support::insert_user;
    use crate::user::Role;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_collect_due_matches_minute() {
        let storage = Storage::open_in_memory().unwrap();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);
        let carol = insert_user(&storage, "carol", Role::Patient);

        let mut a = DailyReminderSetting::new(alice, time(8, 0));
        a.send_email = true;
        storage.save_reminder_setting(&a).unwrap();

        let mut b = DailyReminderSetting::new(bob, time(8, 0));
        b.send_in_app = false;
        storage.save_reminder_setting(&b).unwrap();

        storage
            .save_reminder_setting(&DailyReminderSetting::new(carol, time(9, 30)))
            .unwrap();

        // Seconds are ignored.
        let pass = collect_due(
            &storage,
            NaiveTime::from_hms_opt(8, 0, 42).unwrap(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(pass.matched, 2);
        assert_eq!(pass.notified, 1);
        assert_eq!(pass.emails.len(), 1);
        assert_eq!(pass.emails[0].subject, "Your Daily Health Reminder");

        let inbox = storage.list_notifications(alice).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationType::DailyReminder);
        assert!(storage.list_notifications(bob).unwrap().is_empty());
        assert!(storage.list_notifications(carol).unwrap().is_empty());
    }

    #[test]
    fn test_minutes_due_catches_up_skipped_minutes() {
        assert_eq!(minutes_due(None, time(10, 0)), vec![time(10, 0)]);
        assert!(minutes_due(Some(time(10, 0)), time(10, 0)).is_empty());
        assert_eq!(
            minutes_due(Some(time(10, 0)), time(10, 2)),
            vec![time(10, 1), time(10, 2)]
        );
        assert_eq!(
            minutes_due(Some(time(23, 59)), time(0, 1)),
            vec![time(0, 0), time(0, 1)]
        );
        // A large jump only dispatches the current minute.
        assert_eq!(minutes_due(Some(time(10, 0)), time(14, 0)), vec![time(14, 0)]);
    }

    #[tokio::test]
    async fn test_skipped_minute_still_dispatches() {
        let tracker = crate::tracker::test_support::tracker();
        let alice = crate::tracker::test_support::user(&tracker, "alice", Role::Patient).await;
        tracker
            .save_reminder_setting(&alice, &DailyReminderSetting::new(alice.id, time(10, 1)))
            .await
            .unwrap();

        let mut sent = 0;
        for minute in minutes_due(Some(time(10, 0)), time(10, 2)) {
            sent += tracker.dispatch_reminders(minute).await.unwrap();
        }
        assert_eq!(sent, 1);
        assert_eq!(tracker.notifications(&alice).await.unwrap().len(), 1);
    }

    #[test]
    fn test_collect_due_nothing_scheduled() {
        let storage = Storage::open_in_memory().unwrap();
        let pass = collect_due(&storage, time(3, 15), Utc::now()).unwrap();
        assert_eq!(pass, DuePass::default());
    }

    #[tokio::test]
    async fn test_deliver_counts_and_survives_failures() {
        let emails = vec![
            Email::daily_reminder("a@example.com", "A"),
            Email::daily_reminder("b@example.com", "B"),
        ];
        let ok = RecordingMailer::default();
        assert_eq!(deliver(&ok, &emails).await, 2);
        assert_eq!(ok.sent().len(), 2);

        let failing = RecordingMailer::failing();
        assert_eq!(deliver(&failing, &emails).await, 0);
    }

    #[test]
    fn test_weekly_summaries() {
        let storage = Storage::open_in_memory().unwrap();
        let alice = insert_user(&storage, "alice", Role::Patient);
        let bob = insert_user(&storage, "bob", Role::Patient);
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let now = Utc::now();

        for (offset, sleep) in [(1, 7.0), (2, 8.0)] {
            let input = RecordInput::new(
                today - ChronoDuration::days(offset),
                sleep,
                2.0,
                Mood::Good,
            );
            storage.insert_record(alice, &input, Some(alice), now).unwrap();
        }
        let old = RecordInput::new(today - ChronoDuration::days(20), 6.0, 1.0, Mood::Bad);
        storage.insert_record(bob, &old, Some(bob), now).unwrap();

        assert_eq!(weekly_summaries(&storage, today, now).unwrap(), 1);

        let inbox = storage.list_notifications(alice).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationType::WeeklySummary);
        assert!(inbox[0].message.contains("2 record(s)"));
        assert!(inbox[0].message.contains("7.5 hours"));
        assert!(storage.list_notifications(bob).unwrap().is_empty());
    }
}
