//! JSON export of a user's records.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::record::HealthRecord;

/// One exported record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedRecord {
    pub date: NaiveDate,
    pub sleep_hours: f64,
    pub water_intake: f64,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    /// Mood label, e.g. `Excellent`.
    pub mood: String,
    /// Username of the creator.
    pub created_by: Option<String>,
    /// Username of the last editor.
    pub last_modified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

/// Convert records, resolving audit user ids through `usernames`.
#[must_use]
pub fn exported(records: &[HealthRecord], usernames: &HashMap<i64, String>) -> Vec<ExportedRecord> {
    let name = |id: Option<i64>| id.and_then(|id| usernames.get(&id).cloned());
    records
        .iter()
        .map(|r| ExportedRecord {
            date: r.date,
            sleep_hours: r.sleep_hours,
            water_intake: r.water_intake,
            weight: r.weight,
            height: r.height,
            mood: r.mood.label().to_string(),
            created_by: name(r.created_by),
            last_modified_by: name(r.last_modified_by),
            created_at: r.created_at,
            last_modified_at: r.last_modified,
        })
        .collect()
}

/// Pretty-printed JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_string(records: &[HealthRecord], usernames: &HashMap<i64, String>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&exported(records, usernames))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::record;
    use crate::record::Mood;

    #[test]
    fn test_export_resolves_usernames() {
        let mut r = record(
            1,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            7.0,
            2.0,
            Mood::Excellent,
        );
        r.last_modified_by = Some(2);
        let usernames = HashMap::from([(1, "alice".to_string()), (2, "dr_who".to_string())]);

        let json = to_string(&[r], &usernames).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let row = &value[0];
        assert_eq!(row["date"], "2024-02-01");
        assert_eq!(row["mood"], "Excellent");
        assert_eq!(row["created_by"], "alice");
        assert_eq!(row["last_modified_by"], "dr_who");
        assert!(row["weight"].is_null());
        assert!(row["last_modified_at"].as_str().unwrap().starts_with("2024-01-01T12:00:00"));
    }

    #[test]
    fn test_empty_export() {
        assert_eq!(to_string(&[], &HashMap::new()).unwrap(), "[]");
    }
}
