//! User accounts, roles and profiles.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ValidationErrors};
use crate::record::HealthRecord;

/// What a user is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full access to every record.
    Admin,
    /// May view and edit patient records.
    Doctor,
    /// Sees only their own records.
    #[default]
    Patient,
}

impl Role {
    /// Stored code, e.g. `PATIENT`.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Doctor => "DOCTOR",
            Self::Patient => "PATIENT",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Doctor => "Doctor",
            Self::Patient => "Patient",
        }
    }

    /// Admins and doctors can reach other users' data.
    #[must_use]
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Doctor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "DOCTOR" => Ok(Self::Doctor),
            "PATIENT" => Ok(Self::Patient),
            other => Err(Error::field("role", format!("unknown role: {other}"))),
        }
    }
}

/// Self-reported gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// `M`
    #[serde(rename = "M")]
    Male,
    /// `F`
    #[serde(rename = "F")]
    Female,
    /// `O`
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    /// All genders in display order.
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    /// Stored code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "O",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" => Ok(Self::Male),
            "F" => Ok(Self::Female),
            "O" => Ok(Self::Other),
            _ => Err(Error::field("gender", "Select a valid gender.")),
        }
    }
}

/// Personal targets used by the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    /// Target weight in kilograms.
    pub weight: Option<f64>,
    /// Target sleep hours per night.
    pub sleep: Option<f64>,
    /// Target water intake in liters per day.
    pub water: Option<f64>,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Argon2 PHC string.
    #[serde(default)]
    pub password_hash: String,
    /// Access level.
    pub role: Role,
    /// Whether the email address was confirmed.
    pub is_verified: bool,
    /// Age in years.
    pub age: Option<u32>,
    /// Self-reported gender.
    pub gender: Option<Gender>,
    /// Personal goals.
    pub goals: Goals,
    /// Client address of the last successful login.
    pub last_login_ip: Option<String>,
    /// Consecutive failed logins.
    pub failed_login_attempts: u32,
    /// Lock expiry after too many failures.
    pub account_locked_until: Option<DateTime<Utc>>,
    /// Registration time.
    pub date_joined: DateTime<Utc>,
    /// Last successful login.
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// `First Last`, falling back to the username.
    #[must_use]
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }

    /// Whether a lock is still in force at `now`.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.account_locked_until.is_some_and(|until| until > now)
    }

    /// Whether this user may view or edit the given record.
    #[must_use]
    pub fn can_access_record(&self, record: &HealthRecord) -> bool {
        self.role.is_staff() || record.user_id == self.id
    }

    /// Whether this user may read data belonging to `owner_id`.
    #[must_use]
    pub fn can_access_user(&self, owner_id: i64) -> bool {
        self.role.is_staff() || owner_id == self.id
    }

    /// Require one of the given roles.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` when the user's role is not allowed.
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::permission_denied(
                "You don't have permission to access this page.",
            ))
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.role.label())
    }
}

/// An account about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Access level.
    pub role: Role,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    })
}

/// Basic shape check for an email address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Data submitted on the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Registration {
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Password.
    pub password1: String,
    /// Password confirmation.
    pub password2: String,
}

impl Registration {
    /// Check presence, matching passwords and email shape.
    ///
    /// Uniqueness and the password policy are checked by the caller, which
    /// has access to storage and configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Registration` with the first failing rule.
    pub fn validate_shape(&self) -> Result<()> {
        let fields = [
            &self.username,
            &self.email,
            &self.first_name,
            &self.last_name,
            &self.password1,
            &self.password2,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::registration("All fields are required."));
        }
        if self.password1 != self.password2 {
            return Err(Error::registration("Passwords do not match."));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(Error::registration("Enter a valid email address."));
        }
        Ok(())
    }
}

/// Editable profile fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Email address.
    pub email: String,
    /// Age in years.
    pub age: Option<u32>,
    /// Self-reported gender.
    pub gender: Option<Gender>,
    /// Goals.
    pub goals: Goals,
}

impl ProfileUpdate {
    /// Start from a user's current profile.
    #[must_use]
    pub fn from_user(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            age: user.age,
            gender: user.gender,
            goals: user.goals,
        }
    }

    /// Check ranges and email shape. Uniqueness is checked by the caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` listing each offending field.
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if !is_valid_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }
        if let Some(age) = self.age {
            if age < 1 {
                errors.add("age", "Age must be at least 1");
            } else if age > 120 {
                errors.add("age", "Age must be less than 120");
            }
        }
        if let Some(goal) = self.goals.weight {
            if !goal.is_finite() || goal < 20.0 {
                errors.add("weight_goal", "Weight goal must be at least 20 kg");
            } else if goal > 300.0 {
                errors.add("weight_goal", "Weight goal must be less than 300 kg");
            }
        }
        if let Some(goal) = self.goals.sleep {
            if !goal.is_finite() || goal < 4.0 {
                errors.add("sleep_goal", "Sleep goal must be at least 4 hours");
            } else if goal > 12.0 {
                errors.add("sleep_goal", "Sleep goal must be less than 12 hours");
            }
        }
        if let Some(goal) = self.goals.water {
            if !goal.is_finite() || goal < 1.0 {
                errors.add("water_goal", "Water goal must be at least 1 liter");
            } else if goal > 10.0 {
                errors.add("water_goal", "Water goal must be less than 10 liters");
            }
        }

        errors.into_result()
    }
}
