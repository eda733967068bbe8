//! Printable health report.
//!
//! The report is a self-contained HTML page. PDF output is produced by
//! printing that page with headless Chrome or Chromium, or with the
//! converter named in the configuration.

use std::fmt::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::analytics::stats;
use crate::error::{Error, Result};
use crate::record::{round1, HealthRecord, Metric};
use crate::template::{escape, opt1, render, table_row};
use crate::user::User;

/// Records included in a report.
pub const REPORT_RECORD_LIMIT: usize = 30;

const REPORT_TEMPLATE: &str = include_str!("templates/report.html");

/// Everything a report shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Display name of the owner.
    pub user_name: String,
    /// Newest records first, at most [`REPORT_RECORD_LIMIT`].
    pub records: Vec<HealthRecord>,
    /// All records the user has.
    pub total_records: usize,
    pub avg_sleep: f64,
    pub avg_water: f64,
    /// `None` when no record has a weight.
    pub avg_weight: Option<f64>,
    /// e.g. `March 05, 2024`.
    pub generated_date: String,
    /// e.g. `Last 12 records`.
    pub date_range: String,
}

impl Report {
    /// Summarize the newest records of `user`.
    #[must_use]
    pub fn build(
        user: &User,
        recent: Vec<HealthRecord>,
        total_records: usize,
        today: NaiveDate,
    ) -> Self {
        let refs: Vec<&HealthRecord> = recent.iter().collect();
        let avg_sleep = round1(stats::average(&refs, Metric::SleepHours).unwrap_or(0.0));
        let avg_water = round1(stats::average(&refs, Metric::WaterIntake).unwrap_or(0.0));
        let avg_weight = stats::average(&refs, Metric::Weight).map(round1);

        Self {
            user_name: user.full_name(),
            total_records,
            avg_sleep,
            avg_water,
            avg_weight,
            generated_date: today.format("%B %d, %Y").to_string(),
            date_range: format!("Last {} records", recent.len()),
            records: recent,
        }
    }

    /// Render as a standalone HTML page.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for r in &self.records {
            rows.push_str(&table_row(&[
                r.date.to_string(),
                format!("{:.1}", r.sleep_hours),
                format!("{:.1}", r.water_intake),
                opt1(r.weight),
                r.mood.label().to_string(),
                r.notes.clone().unwrap_or_default(),
            ]));
        }
        if rows.is_empty() {
            rows.push_str("<tr><td colspan=\"6\">No records yet.</td></tr>\n");
        }

        let mut weight = String::new();
        if let Some(w) = self.avg_weight {
            let _ = write!(
                weight,
                "<div class=\"stat\"><span>Average Weight</span><strong>{w:.1} kg</strong></div>"
            );
        }

        render(
            REPORT_TEMPLATE,
            &[
                ("user_name", escape(&self.user_name)),
                ("generated_date", escape(&self.generated_date)),
                ("date_range", escape(&self.date_range)),
                ("total_records", self.total_records.to_string()),
                ("avg_sleep", format!("{:.1}", self.avg_sleep)),
                ("avg_water", format!("{:.1}", self.avg_water)),
                ("avg_weight", weight),
                ("rows", rows),
            ],
        )
    }
}

/// Turns report HTML into PDF bytes with a headless browser.
#[derive(Debug, Clone, Default)]
pub struct PdfConverter {
    converter: Option<String>,
}

impl PdfConverter {
    /// Use `converter` when given, otherwise detect Chrome or Chromium.
    #[must_use]
    pub fn new(converter: Option<String>) -> Self {
        Self { converter }
    }

    fn detect_chrome() -> Option<String> {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ];

        candidates
            .iter()
            .find(|candidate| {
                Command::new(candidate)
                    .arg("--version")
                    .output()
                    .is_ok_and(|out| out.status.success())
            })
            .map(|c| (*c).to_string())
    }

    fn print_to_pdf(browser: &str, html_path: &Path, pdf_path: &Path) -> Result<()> {
        debug!("Printing {} with {}", html_path.display(), browser);
        let status = Command::new(browser)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", html_path.canonicalize()?.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if !status.success() {
            return Err(Error::export(format!(
                "{browser} exited with {status} while printing the report"
            )));
        }
        Ok(())
    }

    /// Convert an HTML page to PDF.
    ///
    /// Blocks while the browser runs.
    ///
    /// # Errors
    ///
    /// Returns `Error::Export` when no converter is available or conversion fails.
    pub fn convert(&self, html: &str) -> Result<Vec<u8>> {
        let browser = self
            .converter
            .clone()
            .or_else(Self::detect_chrome)
            .ok_or_else(|| {
                Error::export(
                    "Chrome/Chromium not found; install one or set export.pdf_converter",
                )
            })?;

        let dir = tempfile::tempdir()?;
        let html_path = dir.path().join("report.html");
        let pdf_path = dir.path().join("report.pdf");
        std::fs::write(&html_path, html)?;

        Self::print_to_pdf(&browser, &html_path, &pdf_path)?;
        let bytes = std::fs::read(&pdf_path)?;
        info!("Generated PDF report ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::analytics::test_support::record;
    use crate::record::Mood;
    use crate::user::{Goals, Role};

    fn user() -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "<Smith>".to_string(),
            password_hash: String::new(),
            role: Role::Patient,
            is_verified: true,
            age: None,
            gender: None,
            goals: Goals::default(),
            last_login_ip: None,
            failed_login_attempts: 0,
            account_locked_until: None,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_build_averages() {
        let mut records = vec![
            record(2, day(2), 8.0, 2.0, Mood::Good),
            record(1, day(1), 6.5, 1.0, Mood::Bad),
        ];
        records[0].weight = Some(70.0);

        let report = Report::build(&user(), records, 12, day(5));
        assert_eq!(report.avg_sleep, 7.3);
        assert_eq!(report.avg_water, 1.5);
        assert_eq!(report.avg_weight, Some(70.0));
        assert_eq!(report.generated_date, "March 05, 2024");
        assert_eq!(report.date_range, "Last 2 records");
        assert_eq!(report.total_records, 12);
    }

    #[test]
    fn test_html_escapes_and_omits_missing_weight() {
        let mut r = record(1, day(1), 7.0, 2.0, Mood::Good);
        r.notes = Some("<b>tired</b>".to_string());
        let report = Report::build(&user(), vec![r], 1, day(5));

        let html = report.to_html();
        assert!(html.contains("Alice &lt;Smith&gt;"));
        assert!(html.contains("&lt;b&gt;tired&lt;/b&gt;"));
        assert!(!html.contains("Average Weight"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_empty_report() {
        let report = Report::build(&user(), Vec::new(), 0, day(5));
        assert_eq!(report.avg_sleep, 0.0);
        assert_eq!(report.avg_weight, None);
        assert!(report.to_html().contains("No records yet."));
    }

    #[test]
    fn test_missing_converter_fails() {
        let converter = PdfConverter::new(Some("/nonexistent/healthtrack-chrome".to_string()));
        assert!(converter.convert("<html></html>").is_err());
    }
}
