//! Dashboard analytics.
//!
//! Everything the dashboard and the summary export show is derived here
//! from a user's records and goals. The functions take `today` explicitly so
//! that the windows (last 7 and last 30 days) are testable.

pub mod goals;
pub mod stats;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::record::{round1, HealthRecord, Metric};
use crate::user::User;

pub use goals::{streak, GoalProgress};
pub use stats::{ChartSeries, MoodCount, WeekSummary};

/// Length of the weekly window in days.
pub const WEEK_DAYS: i64 = 7;
/// Length of the monthly window in days.
pub const MONTH_DAYS: i64 = 30;

/// One day and the value recorded on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayValue {
    /// Record date.
    pub date: NaiveDate,
    /// Metric value.
    pub value: f64,
}

/// Highest value, keeping the latest of equal maxima.
fn best_day(records: &[&HealthRecord], metric: Metric) -> Option<DayValue> {
    records
        .iter()
        .filter_map(|r| r.metric(metric).map(|value| DayValue { date: r.date, value }))
        .fold(None, |best: Option<DayValue>, day| match best {
            Some(b) if b.value > day.value => Some(b),
            _ => Some(day),
        })
}

/// Lowest value, keeping the earliest of equal minima.
fn worst_day(records: &[&HealthRecord], metric: Metric) -> Option<DayValue> {
    records
        .iter()
        .filter_map(|r| r.metric(metric).map(|value| DayValue { date: r.date, value }))
        .fold(None, |worst: Option<DayValue>, day| match worst {
            Some(w) if w.value <= day.value => Some(w),
            _ => Some(day),
        })
}

/// Headline numbers for the last seven days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeeklyStats {
    /// Mean sleep hours, 0 without records.
    pub avg_sleep: f64,
    /// Mean water intake, 0 without records.
    pub avg_water: f64,
    /// Records in the window.
    pub records_count: usize,
    /// Mean goal progress of the latest record.
    pub goal_achievement: f64,
}

/// Detail for the last seven days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklyAnalytics {
    /// Mean sleep hours.
    pub avg_sleep: f64,
    /// Mean water intake.
    pub avg_water: f64,
    /// Night with the most sleep.
    pub best_sleep_day: Option<DayValue>,
    /// Night with the least sleep.
    pub worst_sleep_day: Option<DayValue>,
    /// Day with the most water.
    pub best_water_day: Option<DayValue>,
    /// Day with the least water.
    pub worst_water_day: Option<DayValue>,
    /// Days in a row meeting the sleep goal.
    pub sleep_streak: u32,
    /// Days in a row meeting the water goal.
    pub water_streak: u32,
}

impl WeeklyAnalytics {
    /// Compute from the records of the weekly window.
    #[must_use]
    pub fn build(
        user: &User,
        all: &[HealthRecord],
        weekly: &[&HealthRecord],
        today: NaiveDate,
    ) -> Self {
        Self {
            avg_sleep: stats::average(weekly, Metric::SleepHours).unwrap_or(0.0),
            avg_water: stats::average(weekly, Metric::WaterIntake).unwrap_or(0.0),
            best_sleep_day: best_day(weekly, Metric::SleepHours),
            worst_sleep_day: worst_day(weekly, Metric::SleepHours),
            best_water_day: best_day(weekly, Metric::WaterIntake),
            worst_water_day: worst_day(weekly, Metric::WaterIntake),
            sleep_streak: streak(all, Metric::SleepHours, user.goals.sleep, today),
            water_streak: streak(all, Metric::WaterIntake, user.goals.water, today),
        }
    }
}

/// Goal attainment over the last thirty days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlyAnalytics {
    /// Mean sleep hours.
    pub avg_sleep: f64,
    /// Mean water intake.
    pub avg_water: f64,
    /// Records in the window.
    pub total_records: usize,
    /// Records meeting the sleep goal.
    pub sleep_goal_achieved: usize,
    /// Records meeting the water goal.
    pub water_goal_achieved: usize,
    /// `sleep_goal_achieved` as a percentage of `total_records`.
    pub sleep_goal_percentage: f64,
    /// `water_goal_achieved` as a percentage of `total_records`.
    pub water_goal_percentage: f64,
}

impl MonthlyAnalytics {
    /// Compute from the records of the monthly window.
    #[must_use]
    pub fn build(user: &User, monthly: &[&HealthRecord]) -> Self {
        let achieved = |metric: Metric, goal: Option<f64>| {
            goal.map_or(0, |goal| {
                monthly
                    .iter()
                    .filter(|r| r.metric(metric).is_some_and(|v| v >= goal))
                    .count()
            })
        };
        let total_records = monthly.len();
        let percentage = |count: usize| {
            if total_records == 0 {
                0.0
            } else {
                count as f64 / total_records as f64 * 100.0
            }
        };

        let sleep_goal_achieved = achieved(Metric::SleepHours, user.goals.sleep);
        let water_goal_achieved = achieved(Metric::WaterIntake, user.goals.water);

        Self {
            avg_sleep: stats::average(monthly, Metric::SleepHours).unwrap_or(0.0),
            avg_water: stats::average(monthly, Metric::WaterIntake).unwrap_or(0.0),
            total_records,
            sleep_goal_achieved,
            water_goal_achieved,
            sleep_goal_percentage: percentage(sleep_goal_achieved),
            water_goal_percentage: percentage(water_goal_achieved),
        }
    }
}

/// Mood correlation with each metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Correlations {
    /// Mood vs sleep hours.
    pub sleep: Option<f64>,
    /// Mood vs water intake.
    pub water: Option<f64>,
    /// Mood vs weight.
    pub weight: Option<f64>,
}

/// Everything the dashboard page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Most recent record by date.
    pub latest: Option<HealthRecord>,
    /// Progress of the latest record toward the user's goals.
    pub goal_progress: GoalProgress,
    /// Last-seven-days headline.
    pub weekly_stats: WeeklyStats,
    /// Last-seven-days detail.
    pub weekly: WeeklyAnalytics,
    /// Last-thirty-days goal attainment.
    pub monthly: MonthlyAnalytics,
    /// Chart data over all records.
    pub charts: ChartSeries,
    /// All five moods with counts.
    pub mood_histogram: Vec<MoodCount>,
    /// Mood correlations.
    pub correlations: Correlations,
    /// Per-week averages, oldest first.
    pub weeks: Vec<WeekSummary>,
    /// Number of records overall.
    pub total_records: usize,
}

impl Dashboard {
    /// Build the dashboard for `user` from all of their records, ordered by
    /// date then id.
    #[must_use]
    pub fn build(user: &User, records: &[HealthRecord], today: NaiveDate) -> Self {
        // Ties on date go to the record entered last.
        let latest = records.iter().max_by_key(|r| (r.date, r.id)).cloned();
        let goal_progress = GoalProgress::from_latest(&user.goals, latest.as_ref());

        let weekly_records = stats::since(records, today - Duration::days(WEEK_DAYS));
        let monthly_records = stats::since(records, today - Duration::days(MONTH_DAYS));

        let weekly_stats = WeeklyStats {
            avg_sleep: stats::average(&weekly_records, Metric::SleepHours).unwrap_or(0.0),
            avg_water: stats::average(&weekly_records, Metric::WaterIntake).unwrap_or(0.0),
            records_count: weekly_records.len(),
            goal_achievement: goal_progress.achievement(),
        };

        Self {
            goal_progress,
            weekly_stats,
            weekly: WeeklyAnalytics::build(user, records, &weekly_records, today),
            monthly: MonthlyAnalytics::build(user, &monthly_records),
            charts: stats::chart_series(records),
            mood_histogram: stats::mood_histogram(records),
            correlations: Correlations {
                sleep: stats::mood_correlation(records, Metric::SleepHours),
                water: stats::mood_correlation(records, Metric::WaterIntake),
                weight: stats::mood_correlation(records, Metric::Weight),
            },
            weeks: stats::weekly_rollup(records),
            total_records: records.len(),
            latest,
        }
    }
}

/// Window of a summary export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// The last 7 days.
    Week,
    /// The last 30 days.
    Month,
}

impl Period {
    /// `week` selects a week; anything else a month.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("week") {
            Self::Week
        } else {
            Self::Month
        }
    }

    /// Window length in days.
    #[must_use]
    pub fn days(self) -> i64 {
        match self {
            Self::Week => WEEK_DAYS,
            Self::Month => MONTH_DAYS,
        }
    }

    /// `Weekly` or `Monthly`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Week => "Weekly",
            Self::Month => "Monthly",
        }
    }
}

/// Aggregates over a summary window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// Selected window.
    pub period: Period,
    /// First day of the window.
    pub start_date: NaiveDate,
    /// Last day of the window.
    pub end_date: NaiveDate,
    /// Records in the window.
    pub total_records: usize,
    /// Mean sleep hours, 1 decimal.
    pub avg_sleep: f64,
    /// Mean water intake, 1 decimal.
    pub avg_water: f64,
    /// Mean weight over records that have one, 1 decimal.
    pub avg_weight: Option<f64>,
    /// Moods in the window, first appearance first.
    pub mood_distribution: Vec<MoodCount>,
}

impl PeriodSummary {
    /// Summarize the records dated inside the window ending `today`.
    #[must_use]
    pub fn build(period: Period, records: &[HealthRecord], today: NaiveDate) -> Self {
        let start_date = today - Duration::days(period.days());
        let window: Vec<&HealthRecord> = records
            .iter()
            .filter(|r| r.date >= start_date && r.date <= today)
            .collect();

        Self {
            period,
            start_date,
            end_date: today,
            total_records: window.len(),
            avg_sleep: round1(stats::average(&window, Metric::SleepHours).unwrap_or(0.0)),
            avg_water: round1(stats::average(&window, Metric::WaterIntake).unwrap_or(0.0)),
            avg_weight: stats::average(&window, Metric::Weight).map(round1),
            mood_distribution: stats::mood_distribution(window.iter().copied()),
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::test_support::record;
    use super::*;
    use crate::record::Mood;
    use crate::user::{Goals, Role};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    fn user(goals: Goals) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            password_hash: String::new(),
            role: Role::Patient,
            is_verified: false,
            age: None,
            gender: None,
            goals,
            last_login_ip: None,
            failed_login_attempts: 0,
            account_locked_until: None,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    fn goals() -> Goals {
        Goals {
            weight: None,
            sleep: Some(8.0),
            water: Some(2.0),
        }
    }

    #[test]
    fn test_empty_dashboard() {
        let dashboard = Dashboard::build(&user(goals()), &[], today());
        assert!(dashboard.latest.is_none());
        assert_eq!(dashboard.weekly_stats, WeeklyStats::default());
        assert_eq!(dashboard.monthly, MonthlyAnalytics::default());
        assert_eq!(dashboard.weekly.sleep_streak, 0);
        assert!(dashboard.weekly.best_sleep_day.is_none());
        assert_eq!(dashboard.correlations, Correlations::default());
        assert_eq!(dashboard.total_records, 0);
    }

    #[test]
    fn test_windows_and_latest() {
        let records = vec![
            record(1, days_ago(40), 5.0, 1.0, Mood::Bad),
            record(2, days_ago(20), 7.0, 2.0, Mood::Neutral),
            record(3, days_ago(7), 6.0, 1.5, Mood::Good),
            record(4, days_ago(1), 8.0, 2.5, Mood::Good),
            record(5, days_ago(0), 9.0, 3.0, Mood::Excellent),
        ];
        let dashboard = Dashboard::build(&user(goals()), &records, today());

        assert_eq!(dashboard.latest.as_ref().map(|r| r.id), Some(5));
        // days_ago(7) is inside the weekly window.
        assert_eq!(dashboard.weekly_stats.records_count, 3);
        assert!((dashboard.weekly_stats.avg_sleep - 23.0 / 3.0).abs() < 1e-9);
        assert_eq!(dashboard.monthly.total_records, 4);
        assert_eq!(dashboard.monthly.sleep_goal_achieved, 2);
        assert_eq!(dashboard.monthly.water_goal_achieved, 3);
        assert_eq!(dashboard.monthly.sleep_goal_percentage, 50.0);
        assert_eq!(dashboard.monthly.water_goal_percentage, 75.0);
        assert_eq!(dashboard.weekly.sleep_streak, 2);
        assert_eq!(dashboard.weekly.water_streak, 2);
        assert_eq!(dashboard.total_records, 5);

        // Sleep 100% + water 100%, no weight goal.
        assert!((dashboard.weekly_stats.goal_achievement - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_latest_prefers_highest_id_on_same_date() {
        let records = vec![
            record(7, today(), 6.0, 2.0, Mood::Good),
            record(9, today(), 4.0, 2.0, Mood::Good),
        ];
        let dashboard = Dashboard::build(&user(goals()), &records, today());
        assert_eq!(dashboard.latest.map(|r| r.id), Some(9));
        assert_eq!(dashboard.goal_progress.sleep, 50.0);
    }

    #[test]
    fn test_best_and_worst_days() {
        let records = vec![
            record(1, days_ago(3), 8.0, 1.0, Mood::Good),
            record(2, days_ago(2), 6.0, 3.0, Mood::Good),
            record(3, days_ago(1), 8.0, 1.0, Mood::Good),
            record(4, days_ago(0), 6.0, 2.0, Mood::Good),
        ];
        let refs: Vec<&HealthRecord> = records.iter().collect();
        let weekly = WeeklyAnalytics::build(&user(goals()), &records, &refs, today());

        assert_eq!(
            weekly.best_sleep_day,
            Some(DayValue {
                date: days_ago(1),
                value: 8.0
            })
        );
        assert_eq!(
            weekly.worst_sleep_day,
            Some(DayValue {
                date: days_ago(2),
                value: 6.0
            })
        );
        assert_eq!(weekly.best_water_day.map(|d| d.date), Some(days_ago(2)));
        assert_eq!(weekly.worst_water_day.map(|d| d.date), Some(days_ago(3)));
    }

    #[test]
    fn test_monthly_without_goals() {
        let records = vec![record(1, today(), 9.0, 3.0, Mood::Good)];
        let refs: Vec<&HealthRecord> = records.iter().collect();
        let monthly = MonthlyAnalytics::build(&user(Goals::default()), &refs);
        assert_eq!(monthly.total_records, 1);
        assert_eq!(monthly.sleep_goal_achieved, 0);
        assert_eq!(monthly.sleep_goal_percentage, 0.0);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse("week"), Period::Week);
        assert_eq!(Period::parse("WEEK"), Period::Week);
        assert_eq!(Period::parse("month"), Period::Month);
        assert_eq!(Period::parse("year"), Period::Month);
        assert_eq!(Period::Week.name(), "Weekly");
        assert_eq!(Period::Month.days(), 30);
    }

    #[test]
    fn test_period_summary() {
        let mut records = vec![
            record(1, days_ago(10), 5.0, 1.0, Mood::Bad),
            record(2, days_ago(3), 7.0, 2.0, Mood::Good),
            record(3, days_ago(1), 8.0, 2.5, Mood::Good),
        ];
        records[2].weight = Some(70.04);

        let summary = PeriodSummary::build(Period::Week, &records, today());
        assert_eq!(summary.start_date, days_ago(7));
        assert_eq!(summary.end_date, today());
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.avg_sleep, 7.5);
        assert_eq!(summary.avg_water, 2.3);
        assert_eq!(summary.avg_weight, Some(70.0));
        assert_eq!(summary.mood_distribution.len(), 1);

        let month = PeriodSummary::build(Period::Month, &records, today());
        assert_eq!(month.total_records, 3);
        assert_eq!(month.mood_distribution[0].mood, Mood::Bad);
    }
}
