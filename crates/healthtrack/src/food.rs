//! Food recommendations shown on the public list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A suggested food.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodRecommendation {
    /// Unique identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Why it is recommended.
    pub description: String,
    /// Energy per serving, in kcal.
    pub calories: Option<u32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A food recommendation about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFood {
    /// Display name.
    pub name: String,
    /// Why it is recommended.
    pub description: String,
    /// Energy per serving, in kcal.
    pub calories: Option<u32>,
}

impl NewFood {
    /// Trim the text fields and reject an empty name.
    ///
    /// # Errors
    ///
    /// Returns a field error on `name` when it is blank.
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::field("name", "This field is required."));
        }
        Ok(Self {
            name,
            description: self.description.trim().to_string(),
            calories: self.calories,
        })
    }
}
