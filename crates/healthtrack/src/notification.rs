//! In-app notifications and daily reminder settings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::weight_progress;

/// Why a notification was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// Distance to the weight goal after logging a weight.
    WeightGoal,
    /// Weight changed by at least the milestone step.
    WeightMilestone,
    /// Reminder to log today's data.
    DailyReminder,
    /// Digest of the last seven days.
    WeeklySummary,
}

impl NotificationType {
    /// Stored code, e.g. `WEIGHT_GOAL`.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::WeightGoal => "WEIGHT_GOAL",
            Self::WeightMilestone => "WEIGHT_MILESTONE",
            Self::DailyReminder => "DAILY_REMINDER",
            Self::WeeklySummary => "WEEKLY_SUMMARY",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::WeightGoal => "Weight Goal",
            Self::WeightMilestone => "Weight Milestone",
            Self::DailyReminder => "Daily Reminder",
            Self::WeeklySummary => "Weekly Summary",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WEIGHT_GOAL" => Ok(Self::WeightGoal),
            "WEIGHT_MILESTONE" => Ok(Self::WeightMilestone),
            "DAILY_REMINDER" => Ok(Self::DailyReminder),
            "WEEKLY_SUMMARY" => Ok(Self::WeeklySummary),
            other => Err(Error::internal(format!("unknown notification type: {other}"))),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: i64,
    /// Recipient.
    pub user_id: i64,
    /// Category.
    pub kind: NotificationType,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Whether the user has seen it.
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Optional delivery time.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// Recipient.
    pub user_id: i64,
    /// Category.
    pub kind: NotificationType,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Optional delivery time.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// A goal weight as the user entered it: whole numbers keep one decimal,
/// anything else is shown unrounded.
fn goal_kg(goal: f64) -> String {
    if goal.fract() == 0.0 {
        format!("{goal:.1}")
    } else {
        goal.to_string()
    }
}

impl NewNotification {
    /// Create a notification for immediate display.
    #[must_use]
    pub fn new(
        user_id: i64,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            scheduled_for: None,
        }
    }

    /// Progress toward a weight goal after logging `current` kg.
    #[must_use]
    pub fn weight_goal(user_id: i64, current: f64, goal: f64) -> Self {
        let progress = weight_progress(current, goal);
        let goal = goal_kg(goal);
        let message = if progress >= 0.0 {
            format!(
                "You're {:.1}% away from your goal weight of {goal} kg!",
                progress.abs()
            )
        } else {
            format!(
                "Congratulations! You've exceeded your goal weight of {goal} kg by {:.1}%!",
                progress.abs()
            )
        };
        Self::new(
            user_id,
            NotificationType::WeightGoal,
            "Weight Goal Update",
            message,
        )
    }

    /// A weight change of at least `step` kg between two readings.
    ///
    /// Returns `None` when the change is smaller than the step.
    #[must_use]
    pub fn weight_milestone(user_id: i64, previous: f64, current: f64, step: f64) -> Option<Self> {
        if (current - previous).abs() < step {
            return None;
        }
        let direction = if current < previous { "lost" } else { "gained" };
        Some(Self::new(
            user_id,
            NotificationType::WeightMilestone,
            "Weight Milestone Achieved!",
            format!(
                "Congratulations! You've reached {current:.1} kg - You've {direction} {step:.0} kg!"
            ),
        ))
    }

    /// Manual check-in reminder raised from the dashboard.
    #[must_use]
    pub fn check_in(user_id: i64) -> Self {
        Self::new(
            user_id,
            NotificationType::DailyReminder,
            "Daily Health Check-in",
            "Don't forget to log your health data today! Track your sleep, water intake, weight, and mood.",
        )
    }

    /// Scheduled daily reminder.
    #[must_use]
    pub fn daily_reminder(user_id: i64) -> Self {
        Self::new(
            user_id,
            NotificationType::DailyReminder,
            "Daily Health Reminder",
            "It's time to log your health data!",
        )
    }

    /// Weekly digest.
    #[must_use]
    pub fn weekly_summary(user_id: i64, records: usize, avg_sleep: f64, avg_water: f64) -> Self {
        Self::new(
            user_id,
            NotificationType::WeeklySummary,
            "Your Weekly Summary",
            format!(
                "You logged {records} record(s) this week, averaging {avg_sleep:.1} hours of sleep and {avg_water:.1} L of water per day."
            ),
        )
    }
}

/// When and how a user wants to be reminded to log data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReminderSetting {
    /// Owner.
    pub user_id: i64,
    /// Local time of day, minute precision.
    pub reminder_time: NaiveTime,
    /// Send an email.
    pub send_email: bool,
    /// Raise an in-app notification.
    pub send_in_app: bool,
}

impl DailyReminderSetting {
    /// Default setting for a user at the given time.
    #[must_use]
    pub fn new(user_id: i64, reminder_time: NaiveTime) -> Self {
        Self {
            user_id,
            reminder_time,
            send_email: false,
            send_in_app: true,
        }
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) time, dropping seconds.
///
/// # Errors
///
/// Returns a field error on `reminder_time` when the text is not a time.
pub fn parse_reminder_time(text: &str) -> Result<NaiveTime> {
    let text = text.trim();
    let time = NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|_| Error::field("reminder_time", "Enter a valid time."))?;
    Ok(truncate_to_minute(time))
}

/// Drop seconds and sub-second precision.
#[must_use]
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
