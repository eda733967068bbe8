//! Goal progress and streaks.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::record::{HealthRecord, Metric};
use crate::user::Goals;

/// Days looked back when counting a streak.
pub const STREAK_WINDOW_DAYS: i64 = 7;

/// Percent progress toward each goal, each clamped to `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalProgress {
    /// Weight goal progress.
    pub weight: f64,
    /// Sleep goal progress.
    pub sleep: f64,
    /// Water goal progress.
    pub water: f64,
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// A goal or measurement that is absent or zero does not count.
fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

impl GoalProgress {
    /// Progress of the latest record against the user's goals.
    ///
    /// Weight progress measures the distance to the goal in units of 10% of
    /// the goal, so being 10% of the goal away (either side) reads 100.
    #[must_use]
    pub fn from_latest(goals: &Goals, latest: Option<&HealthRecord>) -> Self {
        let Some(latest) = latest else {
            return Self::default();
        };

        let weight = match (positive(goals.weight), positive(latest.weight)) {
            (Some(goal), Some(weight)) if goal > weight => {
                clamp_percent((goal - weight) / (goal * 0.1) * 100.0)
            }
            (Some(goal), Some(weight)) => clamp_percent((weight - goal) / (goal * 0.1) * 100.0),
            _ => 0.0,
        };

        let ratio = |goal: Option<f64>, value: f64| match (positive(goal), positive(Some(value))) {
            (Some(goal), Some(value)) => clamp_percent(value / goal * 100.0),
            _ => 0.0,
        };

        Self {
            weight,
            sleep: ratio(goals.sleep, latest.sleep_hours),
            water: ratio(goals.water, latest.water_intake),
        }
    }

    /// Mean of the three progress values.
    #[must_use]
    pub fn achievement(&self) -> f64 {
        (self.weight + self.sleep + self.water) / 3.0
    }
}

/// Consecutive days, ending today, on which `metric` met `goal`.
///
/// Each day is judged by its first record. The count stops at the first
/// day that misses the goal or has no record, and never exceeds
/// [`STREAK_WINDOW_DAYS`]. Without a goal the streak is zero.
#[must_use]
pub fn streak(
    records: &[HealthRecord],
    metric: Metric,
    goal: Option<f64>,
    today: NaiveDate,
) -> u32 {
    let Some(goal) = positive(goal) else {
        return 0;
    };

    let mut count = 0;
    for offset in 0..STREAK_WINDOW_DAYS {
        let day = today - Duration::days(offset);
        let first = records
            .iter()
            .filter(|r| r.date == day)
            .min_by_key(|r| r.id);
        match first.and_then(|r| r.metric(metric)) {
            Some(value) if value >= goal => count += 1,
            _ => break,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::record;
    use crate::record::Mood;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn goals(weight: Option<f64>, sleep: Option<f64>, water: Option<f64>) -> Goals {
        Goals {
            weight,
            sleep,
            water,
        }
    }

    #[test]
    fn test_no_latest_record() {
        let progress = GoalProgress::from_latest(&goals(Some(70.0), Some(8.0), Some(2.0)), None);
        assert_eq!(progress, GoalProgress::default());
        assert_eq!(progress.achievement(), 0.0);
    }

    #[test]
    fn test_weight_progress_both_directions() {
        let mut latest = record(1, today(), 8.0, 2.0, Mood::Good);

        // Goal above weight: (70 - 66.5) / 7 * 100 = 50.
        latest.weight = Some(66.5);
        let p = GoalProgress::from_latest(&goals(Some(70.0), None, None), Some(&latest));
        assert!((p.weight - 50.0).abs() < 1e-9);

        // Goal below weight, far away: clamped to 100.
        latest.weight = Some(90.0);
        let p = GoalProgress::from_latest(&goals(Some(70.0), None, None), Some(&latest));
        assert_eq!(p.weight, 100.0);

        // Exactly at goal.
        latest.weight = Some(70.0);
        let p = GoalProgress::from_latest(&goals(Some(70.0), None, None), Some(&latest));
        assert_eq!(p.weight, 0.0);
    }

    #[test]
    fn test_sleep_and_water_ratios() {
        let latest = record(1, today(), 6.0, 3.0, Mood::Good);
        let p = GoalProgress::from_latest(&goals(None, Some(8.0), Some(2.0)), Some(&latest));
        assert_eq!(p.sleep, 75.0);
        assert_eq!(p.water, 100.0);
        assert_eq!(p.weight, 0.0);
        assert!((p.achievement() - 175.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_values_do_not_count() {
        let latest = record(1, today(), 0.0, 0.0, Mood::Good);
        let p = GoalProgress::from_latest(&goals(Some(70.0), Some(8.0), Some(2.0)), Some(&latest));
        assert_eq!(p, GoalProgress::default());
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let d = |offset: i64| today() - Duration::days(offset);
        let records = vec![
            record(1, d(3), 8.0, 2.0, Mood::Good),
            record(2, d(2), 6.0, 2.0, Mood::Good),
            record(3, d(1), 8.5, 2.0, Mood::Good),
            record(4, d(0), 9.0, 2.0, Mood::Good),
        ];
        assert_eq!(streak(&records, Metric::SleepHours, Some(8.0), today()), 2);
        assert_eq!(streak(&records, Metric::WaterIntake, Some(2.0), today()), 4);
        assert_eq!(streak(&records, Metric::WaterIntake, None, today()), 0);
    }

    #[test]
    fn test_streak_missing_today_is_zero() {
        let yesterday = today() - Duration::days(1);
        let records = vec![record(1, yesterday, 9.0, 3.0, Mood::Good)];
        assert_eq!(streak(&records, Metric::SleepHours, Some(8.0), today()), 0);
    }

    #[test]
    fn test_streak_uses_first_record_of_day() {
        let records = vec![
            record(2, today(), 9.0, 2.0, Mood::Good),
            record(1, today(), 5.0, 2.0, Mood::Good),
        ];
        assert_eq!(streak(&records, Metric::SleepHours, Some(8.0), today()), 0);
    }

    #[test]
    fn test_streak_capped_at_window() {
        let records: Vec<HealthRecord> = (0..10)
            .map(|i| record(i + 1, today() - Duration::days(i), 8.0, 2.0, Mood::Good))
            .collect();
        assert_eq!(streak(&records, Metric::SleepHours, Some(8.0), today()), 7);
    }
}
