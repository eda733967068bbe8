//! Core health record types for healthtrack.
//!
//! A health record is one user's entry for one day: sleep, water intake,
//! optional body measurements and a mood. This module also carries the
//! per-record calculations (BMI, weight progress).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ValidationErrors};

/// How the user felt on the day of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    /// Best possible day.
    Excellent,
    /// A good day.
    Good,
    /// Neither good nor bad.
    Neutral,
    /// A bad day.
    Bad,
    /// Worst possible day.
    Terrible,
}

impl Mood {
    /// All moods, best first.
    pub const ALL: [Mood; 5] = [
        Mood::Excellent,
        Mood::Good,
        Mood::Neutral,
        Mood::Bad,
        Mood::Terrible,
    ];

    /// Numeric encoding used for correlation: 5 (excellent) down to 1 (terrible).
    #[must_use]
    pub fn score(self) -> f64 {
        match self {
            Self::Excellent => 5.0,
            Self::Good => 4.0,
            Self::Neutral => 3.0,
            Self::Bad => 2.0,
            Self::Terrible => 1.0,
        }
    }

    /// Stored code, e.g. `EXCELLENT`.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Neutral => "NEUTRAL",
            Self::Bad => "BAD",
            Self::Terrible => "TERRIBLE",
        }
    }

    /// Human-readable label, e.g. `Excellent`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Neutral => "Neutral",
            Self::Bad => "Bad",
            Self::Terrible => "Terrible",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Mood {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        Mood::ALL
            .into_iter()
            .find(|m| m.code() == code)
            .ok_or_else(|| {
                Error::field(
                    "mood",
                    format!("Select a valid choice. {s} is not one of the available choices."),
                )
            })
    }
}

/// Body-mass-index band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmiCategory {
    /// BMI below 18.5.
    Underweight,
    /// BMI from 18.5 up to 25.
    Normal,
    /// BMI from 25 up to 30.
    Overweight,
    /// BMI of 30 or more.
    Obese,
}

impl BmiCategory {
    /// Classify a BMI value.
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            Self::Underweight
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else {
            Self::Obese
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Underweight => "Underweight",
            Self::Normal => "Normal weight",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
        })
    }
}

/// Round to one decimal place.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// BMI from weight (kg) and height (cm), rounded to one decimal.
///
/// Returns `None` unless both values are present and positive.
#[must_use]
pub fn calculate_bmi(weight: Option<f64>, height: Option<f64>) -> Option<f64> {
    match (weight, height) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => {
            let meters = h / 100.0;
            Some(round1(w / (meters * meters)))
        }
        _ => None,
    }
}

/// Signed percentage between a weight and a goal, relative to the weight.
///
/// Positive means the goal lies above the current weight.
#[must_use]
pub fn weight_progress(weight: f64, goal: f64) -> f64 {
    (goal - weight) / weight * 100.0
}

/// A stored health record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Unique identifier (assigned by storage layer).
    pub id: i64,
    /// Owner of the record.
    pub user_id: i64,
    /// Day the record describes.
    pub date: NaiveDate,
    /// Hours slept.
    pub sleep_hours: f64,
    /// Water drunk, in liters.
    pub water_intake: f64,
    /// Weight in kilograms.
    pub weight: Option<f64>,
    /// Height in centimeters.
    pub height: Option<f64>,
    /// Target weight in kilograms at the time of the record.
    pub weight_goal: Option<f64>,
    /// Mood for the day.
    pub mood: Mood,
    /// Free-form notes.
    pub notes: Option<String>,
    /// User who created the record.
    pub created_by: Option<i64>,
    /// User who last changed the record.
    pub last_modified_by: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

impl HealthRecord {
    /// BMI for this record, if weight and height are both known.
    #[must_use]
    pub fn bmi(&self) -> Option<f64> {
        calculate_bmi(self.weight, self.height)
    }

    /// BMI band for this record.
    #[must_use]
    pub fn bmi_category(&self) -> Option<BmiCategory> {
        self.bmi().map(BmiCategory::from_bmi)
    }

    /// Percentage from the recorded weight to the recorded goal, rounded.
    #[must_use]
    pub fn weight_progress(&self) -> Option<f64> {
        match (self.weight, self.weight_goal) {
            (Some(w), Some(g)) if w > 0.0 && g > 0.0 => Some(round1(weight_progress(w, g))),
            _ => None,
        }
    }

    /// Value of a numeric metric on this record.
    #[must_use]
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::SleepHours => Some(self.sleep_hours),
            Metric::WaterIntake => Some(self.water_intake),
            Metric::Weight => self.weight,
            Metric::Height => self.height,
        }
    }
}

/// Numeric columns of a health record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Hours slept.
    SleepHours,
    /// Liters of water.
    WaterIntake,
    /// Kilograms.
    Weight,
    /// Centimeters.
    Height,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SleepHours => "sleep_hours",
            Self::WaterIntake => "water_intake",
            Self::Weight => "weight",
            Self::Height => "height",
        })
    }
}

/// Values submitted for a new or edited record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInput {
    /// Day the record describes.
    pub date: NaiveDate,
    /// Hours slept.
    pub sleep_hours: f64,
    /// Water drunk, in liters.
    pub water_intake: f64,
    /// Weight in kilograms.
    pub weight: Option<f64>,
    /// Height in centimeters.
    pub height: Option<f64>,
    /// Target weight in kilograms.
    pub weight_goal: Option<f64>,
    /// Mood for the day.
    pub mood: Mood,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl RecordInput {
    /// Create an input with the required fields; optional ones start empty.
    #[must_use]
    pub fn new(date: NaiveDate, sleep_hours: f64, water_intake: f64, mood: Mood) -> Self {
        Self {
            date,
            sleep_hours,
            water_intake,
            weight: None,
            height: None,
            weight_goal: None,
            mood,
            notes: None,
        }
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` listing each offending field.
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if !self.sleep_hours.is_finite() || !(0.0..=24.0).contains(&self.sleep_hours) {
            errors.add("sleep_hours", "Sleep hours must be between 0 and 24");
        }

        if !self.water_intake.is_finite() || self.water_intake < 0.0 {
            errors.add("water_intake", "Water intake cannot be negative");
        } else if self.water_intake > 10.0 {
            errors.add("water_intake", "Please enter a realistic water intake amount");
        }

        if let Some(weight) = self.weight {
            check_range(&mut errors, "weight", weight, 20.0, 300.0, "Weight", "kg");
        }
        if let Some(height) = self.height {
            check_range(&mut errors, "height", height, 100.0, 250.0, "Height", "cm");
        }
        if let Some(goal) = self.weight_goal {
            check_range(&mut errors, "weight_goal", goal, 20.0, 300.0, "Weight goal", "kg");
        }

        errors.into_result()
    }
}

fn check_range(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    label: &str,
    unit: &str,
) {
    if !value.is_finite() || value < min {
        errors.add(field, format!("{label} must be at least {min} {unit}"));
    } else if value > max {
        errors.add(field, format!("{label} must be less than {max} {unit}"));
    }
}
