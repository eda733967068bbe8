//! Form payloads posted by the HTML pages.
//!
//! Browsers submit empty strings for blank inputs, so numeric fields arrive
//! as text and are parsed here with per-field messages.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{Error, Result, ValidationErrors};
use crate::notification::{parse_reminder_time, DailyReminderSetting};
use crate::record::{HealthRecord, Mood, RecordInput};
use crate::template::{escape, opt1};
use crate::user::{Gender, Goals, ProfileUpdate, User};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginQuery {
    pub next: Option<String>,
    pub registered: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailForm {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordForm {
    pub new_password1: String,
    pub new_password2: String,
}

/// Health record form, as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecordForm {
    pub date: String,
    pub sleep_hours: String,
    pub water_intake: String,
    pub weight: String,
    pub height: String,
    pub weight_goal: String,
    pub mood: String,
    pub notes: String,
}

impl RecordForm {
    /// Empty form for a new record.
    pub fn blank(today: NaiveDate, user: &User) -> Self {
        Self {
            date: today.to_string(),
            weight_goal: opt1(user.goals.weight),
            mood: Mood::Neutral.code().to_string(),
            ..Self::default()
        }
    }

    /// Form pre-filled from a stored record.
    pub fn from_record(record: &HealthRecord) -> Self {
        Self {
            date: record.date.to_string(),
            sleep_hours: record.sleep_hours.to_string(),
            water_intake: record.water_intake.to_string(),
            weight: opt1(record.weight),
            height: opt1(record.height),
            weight_goal: opt1(record.weight_goal),
            mood: record.mood.code().to_string(),
            notes: record.notes.clone().unwrap_or_default(),
        }
    }

    /// Parse into a record input. Range checks happen on save.
    pub fn parse(&self) -> Result<RecordInput> {
        let mut errors = ValidationErrors::new();
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| errors.add("date", "Enter a valid date."))
            .ok();
        let sleep_hours = required_number(&mut errors, "sleep_hours", &self.sleep_hours);
        let water_intake = required_number(&mut errors, "water_intake", &self.water_intake);
        let weight = optional_number(&mut errors, "weight", &self.weight);
        let height = optional_number(&mut errors, "height", &self.height);
        let weight_goal = optional_number(&mut errors, "weight_goal", &self.weight_goal);
        let mood = match self.mood.parse::<Mood>() {
            Ok(mood) => Some(mood),
            Err(e) => {
                merge(&mut errors, &e);
                None
            }
        };

        match (date, sleep_hours, water_intake, mood) {
            (Some(date), Some(sleep_hours), Some(water_intake), Some(mood))
                if errors.is_empty() =>
            {
                let notes = self.notes.trim();
                Ok(RecordInput {
                    date,
                    sleep_hours,
                    water_intake,
                    weight,
                    height,
                    weight_goal,
                    mood,
                    notes: (!notes.is_empty()).then(|| notes.to_string()),
                })
            }
            _ => Err(Error::Validation(errors)),
        }
    }

    /// `<option>` list for the mood select.
    pub fn mood_options(&self) -> String {
        Mood::ALL
            .iter()
            .map(|mood| {
                let selected = if mood.code() == self.mood { " selected" } else { "" };
                format!(
                    "<option value=\"{}\"{selected}>{}</option>",
                    mood.code(),
                    mood.label()
                )
            })
            .collect()
    }
}

/// Profile form, as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: String,
    pub gender: String,
    pub weight_goal: String,
    pub sleep_goal: String,
    pub water_goal: String,
}

impl ProfileForm {
    pub fn from_user(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            age: user.age.map(|a| a.to_string()).unwrap_or_default(),
            gender: user.gender.map(|g| g.code().to_string()).unwrap_or_default(),
            weight_goal: opt1(user.goals.weight),
            sleep_goal: opt1(user.goals.sleep),
            water_goal: opt1(user.goals.water),
        }
    }

    pub fn parse(&self) -> Result<ProfileUpdate> {
        let mut errors = ValidationErrors::new();
        let age = optional_parse::<u32>(&mut errors, "age", &self.age, "Enter a whole number.");
        let gender = match self.gender.trim() {
            "" => None,
            code => match code.parse::<Gender>() {
                Ok(gender) => Some(gender),
                Err(e) => {
                    merge(&mut errors, &e);
                    None
                }
            },
        };
        let goals = Goals {
            weight: optional_number(&mut errors, "weight_goal", &self.weight_goal),
            sleep: optional_number(&mut errors, "sleep_goal", &self.sleep_goal),
            water: optional_number(&mut errors, "water_goal", &self.water_goal),
        };
        errors.into_result()?;

        Ok(ProfileUpdate {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            age,
            gender,
            goals,
        })
    }

    pub fn gender_options(&self) -> String {
        let mut options = String::from("<option value=\"\">---------</option>");
        for gender in Gender::ALL {
            let selected = if gender.code() == self.gender { " selected" } else { "" };
            let _ = write!(
                options,
                "<option value=\"{}\"{selected}>{}</option>",
                gender.code(),
                gender.label()
            );
        }
        options
    }
}

/// Reminder settings form. Unchecked boxes are absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReminderForm {
    pub reminder_time: String,
    pub send_email: Option<String>,
    pub send_in_app: Option<String>,
}

impl ReminderForm {
    pub fn from_setting(setting: &DailyReminderSetting) -> Self {
        Self {
            reminder_time: setting.reminder_time.format("%H:%M").to_string(),
            send_email: setting.send_email.then(|| "on".to_string()),
            send_in_app: setting.send_in_app.then(|| "on".to_string()),
        }
    }

    pub fn parse(&self, user_id: i64) -> Result<DailyReminderSetting> {
        let time = parse_reminder_time(&self.reminder_time)?;
        Ok(DailyReminderSetting {
            user_id,
            reminder_time: time,
            send_email: self.send_email.is_some(),
            send_in_app: self.send_in_app.is_some(),
        })
    }
}

/// CSV export date filters.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    pub fn parse(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut errors = ValidationErrors::new();
        let start = optional_date(&mut errors, "start_date", self.start_date.as_deref());
        let end = optional_date(&mut errors, "end_date", self.end_date.as_deref());
        errors.into_result()?;
        Ok((start, end))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonExportQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SummaryQuery {
    pub period: Option<String>,
}

/// Error block shown above a form.
pub fn errors_html(error: &Error) -> String {
    let messages: Vec<String> = match error {
        Error::Validation(errors) => errors
            .iter()
            .map(|(field, message)| {
                if field == ValidationErrors::NON_FIELD {
                    escape(message)
                } else {
                    format!("{}: {}", escape(&field.replace('_', " ")), escape(message))
                }
            })
            .collect(),
        other => vec![escape(&other.to_string())],
    };
    let items: String = messages.iter().map(|m| format!("<li>{m}</li>")).collect();
    format!("<div class=\"errors\"><ul>{items}</ul></div>")
}

fn merge(errors: &mut ValidationErrors, error: &Error) {
    if let Some(fields) = error.validation_errors() {
        for (field, message) in fields.iter() {
            errors.add(field, message);
        }
    }
}

fn required_number(errors: &mut ValidationErrors, field: &'static str, text: &str) -> Option<f64> {
    if text.trim().is_empty() {
        errors.add(field, "This field is required.");
        return None;
    }
    optional_number(errors, field, text)
}

fn optional_number(errors: &mut ValidationErrors, field: &'static str, text: &str) -> Option<f64> {
    optional_parse::<f64>(errors, field, text, "Enter a number.").filter(|v| v.is_finite())
}

fn optional_parse<T: FromStr>(
    errors: &mut ValidationErrors,
    field: &'static str,
    text: &str,
    message: &str,
) -> Option<T> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse()
        .map_err(|_| errors.add(field, message))
        .ok()
}

fn optional_date(
    errors: &mut ValidationErrors,
    field: &'static str,
    text: Option<&str>,
) -> Option<NaiveDate> {
    let text = text.map(str::trim).filter(|t| !t.is_empty())?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| errors.add(field, "Enter a valid date."))
        .ok()
}
