//! Record export formats.
//!
//! - [`records_csv`]: spreadsheet download with optional date filters
//! - [`records_json`]: full dump with audit usernames
//! - [`report`]: printable HTML report, converted to PDF when a browser is available

pub mod records_csv;
pub mod records_json;
pub mod report;

use chrono::{DateTime, Local, NaiveDate};

/// `health_records_YYYYMMDD.csv`.
#[must_use]
pub fn csv_filename(today: NaiveDate) -> String {
    format!("health_records_{}.csv", today.format("%Y%m%d"))
}

/// `health_records_<slug>_YYYYMMDD_HHMMSS.json`.
#[must_use]
pub fn json_filename(username: &str, now: DateTime<Local>) -> String {
    format!(
        "health_records_{}_{}.json",
        slugify(username),
        now.format("%Y%m%d_%H%M%S")
    )
}

/// `health_report_YYYYMMDD.pdf` (or `.html`).
#[must_use]
pub fn report_filename(today: NaiveDate, extension: &str) -> String {
    format!("health_report_{}.{extension}", today.format("%Y%m%d"))
}

/// Lowercase ASCII letters, digits, `_` and `-`; whitespace runs become `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.trim().chars() {
        if c.is_whitespace() || c == '-' {
            pending_dash = !slug.is_empty();
        } else if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.push(c.to_ascii_lowercase());
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Alice"), "alice");
        assert_eq!(slugify("  Dr. John  Smith "), "dr-john-smith");
        assert_eq!(slugify("user_1@x"), "user_1x");
        assert_eq!(slugify("a--b"), "a-b");
    }

    #[test]
    fn test_filenames() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(csv_filename(day), "health_records_20240305.csv");
        assert_eq!(report_filename(day, "pdf"), "health_report_20240305.pdf");

        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            json_filename("Bob Smith", now),
            "health_records_bob-smith_20240305_140709.json"
        );
    }
}
