//! Aggregates over a slice of health records.
//!
//! Every function here is pure: callers fetch the records (already ordered
//! by date, then id) and pass them in.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::record::{round1, HealthRecord, Metric, Mood};

/// Arithmetic mean, `None` for no values.
#[must_use]
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Mean of a metric over the records where it is present.
#[must_use]
pub fn average(records: &[&HealthRecord], metric: Metric) -> Option<f64> {
    mean(records.iter().filter_map(|r| r.metric(metric)))
}

/// Records dated on or after `since`.
#[must_use]
pub fn since(records: &[HealthRecord], since: NaiveDate) -> Vec<&HealthRecord> {
    records.iter().filter(|r| r.date >= since).collect()
}

/// Pearson correlation coefficient.
///
/// Returns `None` for fewer than two pairs, mismatched lengths, or when
/// either side has zero variance.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x.iter().copied())?;
    let mean_y = mean(y.iter().copied())?;

    let cov: f64 = x
        .iter()
        .zip(y)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let variance_x: f64 = x.iter().map(|x| (x - mean_x).powi(2)).sum();
    let variance_y: f64 = y.iter().map(|y| (y - mean_y).powi(2)).sum();

    let denominator = (variance_x * variance_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(cov / denominator)
}

/// Correlation between mood score and a metric, over records that have it.
#[must_use]
pub fn mood_correlation(records: &[HealthRecord], metric: Metric) -> Option<f64> {
    let (moods, values): (Vec<f64>, Vec<f64>) = records
        .iter()
        .filter_map(|r| r.metric(metric).map(|v| (r.mood.score(), v)))
        .unzip();
    pearson(&moods, &values)
}

/// How often a mood was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoodCount {
    /// The mood.
    pub mood: Mood,
    /// Number of records with it.
    pub count: usize,
}

/// Mood counts in the order each mood first appears.
#[must_use]
pub fn mood_distribution<'a>(
    records: impl IntoIterator<Item = &'a HealthRecord>,
) -> Vec<MoodCount> {
    let mut counts: Vec<MoodCount> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|c| c.mood == record.mood) {
            Some(entry) => entry.count += 1,
            None => counts.push(MoodCount {
                mood: record.mood,
                count: 1,
            }),
        }
    }
    counts
}

/// Counts for all five moods, best first, zeros included.
#[must_use]
pub fn mood_histogram<'a>(records: impl IntoIterator<Item = &'a HealthRecord>) -> Vec<MoodCount> {
    let mut counts: Vec<MoodCount> = Mood::ALL
        .iter()
        .map(|&mood| MoodCount { mood, count: 0 })
        .collect();
    for record in records {
        if let Some(entry) = counts.iter_mut().find(|c| c.mood == record.mood) {
            entry.count += 1;
        }
    }
    counts
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Averages for one calendar week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    /// Monday of the week.
    pub week_start: NaiveDate,
    /// Records in the week.
    pub records: usize,
    /// Mean sleep hours.
    pub avg_sleep: f64,
    /// Mean water intake.
    pub avg_water: f64,
    /// Mean weight over records that have one.
    pub avg_weight: Option<f64>,
}

/// Group records by week, oldest week first.
#[must_use]
pub fn weekly_rollup(records: &[HealthRecord]) -> Vec<WeekSummary> {
    let mut weeks: BTreeMap<NaiveDate, Vec<&HealthRecord>> = BTreeMap::new();
    for record in records {
        weeks.entry(week_start(record.date)).or_default().push(record);
    }
    weeks
        .into_iter()
        .map(|(week_start, group)| WeekSummary {
            week_start,
            records: group.len(),
            avg_sleep: round1(average(&group, Metric::SleepHours).unwrap_or(0.0)),
            avg_water: round1(average(&group, Metric::WaterIntake).unwrap_or(0.0)),
            avg_weight: average(&group, Metric::Weight).map(round1),
        })
        .collect()
}

/// Dates and values for one line chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    /// `YYYY-MM-DD` labels.
    pub dates: Vec<String>,
    /// Values, one per label.
    pub values: Vec<f64>,
}

impl Series {
    fn from_metric(records: &[HealthRecord], metric: Metric) -> Self {
        let (dates, values) = records
            .iter()
            .filter_map(|r| r.metric(metric).map(|v| (r.date.to_string(), v)))
            .unzip();
        Self { dates, values }
    }
}

/// Data behind the dashboard charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    /// Weight over time, only where recorded.
    pub weight: Series,
    /// Sleep over time.
    pub sleep: Series,
    /// Water over time.
    pub water: Series,
    /// Mood labels for the pie chart.
    pub mood_labels: Vec<String>,
    /// Counts matching `mood_labels`.
    pub mood_data: Vec<usize>,
}

/// Build chart series from date-ordered records.
#[must_use]
pub fn chart_series(records: &[HealthRecord]) -> ChartSeries {
    let moods = mood_distribution(records);
    ChartSeries {
        weight: Series::from_metric(records, Metric::Weight),
        sleep: Series::from_metric(records, Metric::SleepHours),
        water: Series::from_metric(records, Metric::WaterIntake),
        mood_labels: moods.iter().map(|m| m.mood.code().to_string()).collect(),
        mood_data: moods.iter().map(|m| m.count).collect(),
    }
}
