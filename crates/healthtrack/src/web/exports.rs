//! Download and report handlers under `/export/`.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use chrono::Local;
use tracing::{error, info};

use super::forms::{DateRangeQuery, JsonExportQuery, SummaryQuery};
use super::pages::{page, redirect_with_flash};
use super::{AppState, CurrentUser};
use crate::analytics::Period;
use crate::error::Result;
use crate::export::{csv_filename, report_filename};
use crate::template::{escape, render, table_row};

const EXPORT: &str = include_str!("templates/export.html");
const SUMMARY: &str = include_str!("templates/summary.html");

fn attachment(content_type: &'static str, filename: &str, body: impl IntoResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub(super) async fn export_dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    page(&state, &current, "Export", EXPORT).await
}

pub(super) async fn csv(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<DateRangeQuery>,
) -> Result<Response> {
    let (start, end) = query.parse()?;
    let body = state.tracker.export_csv(&current.user, start, end).await?;
    info!("{} exported CSV", current.user.username);
    Ok(attachment(
        "text/csv; charset=utf-8",
        &csv_filename(Local::now().date_naive()),
        body,
    ))
}

pub(super) async fn json(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<JsonExportQuery>,
) -> Result<Response> {
    let owner_id = query.user_id.unwrap_or(current.user.id);
    let (filename, body) = state
        .tracker
        .export_json(&current.user, owner_id, Local::now())
        .await?;
    info!("{} exported JSON for user {}", current.user.username, owner_id);
    Ok(attachment("application/json", &filename, body))
}

pub(super) async fn report(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response> {
    let report = state
        .tracker
        .report(&current.user, Local::now().date_naive())
        .await?;
    Ok(Html(report.to_html()).into_response())
}

pub(super) async fn pdf(State(state): State<AppState>, current: CurrentUser) -> Result<Response> {
    let today = Local::now().date_naive();
    match state.tracker.report_pdf(&current.user, today).await {
        Ok(bytes) => Ok(attachment(
            "application/pdf",
            &report_filename(today, "pdf"),
            bytes,
        )),
        Err(e) => {
            error!("PDF generation failed for {}: {}", current.user.username, e);
            redirect_with_flash(&state, &current, "/export/", "Error generating PDF.").await
        }
    }
}

pub(super) async fn summary(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<SummaryQuery>,
) -> Result<Response> {
    let period = Period::parse(query.period.as_deref().unwrap_or("week"));
    let summary = state
        .tracker
        .summary(&current.user, period, Local::now().date_naive())
        .await?;

    let mut mood_rows: String = summary
        .mood_distribution
        .iter()
        .map(|m| table_row(&[m.mood.label().to_string(), m.count.to_string()]))
        .collect();
    if mood_rows.is_empty() {
        mood_rows = table_row(&["No records in this period."]);
    }
    let content = render(
        SUMMARY,
        &[
            ("period", escape(period.name())),
            ("start_date", summary.start_date.to_string()),
            ("end_date", summary.end_date.to_string()),
            ("total_records", summary.total_records.to_string()),
            ("avg_sleep", format!("{:.1}", summary.avg_sleep)),
            ("avg_water", format!("{:.1}", summary.avg_water)),
            (
                "avg_weight",
                summary
                    .avg_weight
                    .map_or_else(|| "-".to_string(), |w| format!("{w:.1} kg")),
            ),
            ("mood_rows", mood_rows),
        ],
    );
    let title = format!("{} summary", period.name());
    page(&state, &current, &title, &content).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use chrono::Utc;

    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::mailer::test_support::RecordingMailer;
    use crate::record::{Mood, RecordInput};
    use crate::storage::Storage;
    use crate::tracker::Tracker;
    use crate::user::Role;
    use crate::web::test_support::{body_text, location, signed_in, state};

    async fn add(state: &AppState, current: &CurrentUser, sleep: f64) {
        state
            .tracker
            .add_record(
                &current.user,
                &RecordInput::new(Local::now().date_naive(), sleep, 2.0, Mood::Good),
                Utc::now(),
            )
            .await
            .unwrap();
    }

    fn header_value<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_csv_download() {
        let state = state();
        let current = signed_in(&state, "alice", Role::Patient).await;
        add(&state, &current, 7.5).await;

        let response = csv(State(state.clone()), current, Query(DateRangeQuery::default()))
            .await
            .unwrap();
        assert!(header_value(&response, header::CONTENT_TYPE).starts_with("text/csv"));
        assert!(header_value(&response, header::CONTENT_DISPOSITION)
            .contains(&csv_filename(Local::now().date_naive())));
        let body = body_text(response).await;
        assert!(body.starts_with("Date,"));
        assert!(body.contains("7.5"));
    }

    #[tokio::test]
    async fn test_csv_rejects_bad_dates() {
        let state = state();
        let current = signed_in(&state, "alice", Role::Patient).await;
        let query = DateRangeQuery {
            start_date: Some("yesterday".to_string()),
            end_date: None,
        };
        let err = csv(State(state), current, Query(query)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_json_export_permissions() {
        let state = state();
        let alice = signed_in(&state, "alice", Role::Patient).await;
        let bob = signed_in(&state, "bob", Role::Patient).await;
        let doctor = signed_in(&state, "drjones", Role::Doctor).await;
        add(&state, &alice, 7.0).await;

        let response = json(State(state.clone()), alice.clone(), Query(JsonExportQuery::default()))
            .await
            .unwrap();
        let disposition = header_value(&response, header::CONTENT_DISPOSITION);
        assert!(disposition.contains("health_records_alice_"));

        let query = || {
            Query(JsonExportQuery {
                user_id: Some(alice.user.id),
            })
        };
        let err = json(State(state.clone()), bob, query()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

        let response = json(State(state), doctor, query()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_report_is_inline_html() {
        let state = state();
        let current = signed_in(&state, "alice", Role::Patient).await;
        add(&state, &current, 6.5).await;

        let response = report(State(state), current).await.unwrap();
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
        assert!(body_text(response).await.contains("<html"));
    }

    #[tokio::test]
    async fn test_pdf_failure_redirects_with_flash() {
        let mut config = Config::default();
        config.export.pdf_converter = Some("/nonexistent/pdf-converter".to_string());
        let tracker = Tracker::new(
            Storage::open_in_memory().unwrap(),
            config,
            Arc::new(RecordingMailer::default()),
        );
        let state = AppState::new(Arc::new(tracker));
        let current = signed_in(&state, "alice", Role::Patient).await;

        let response = pdf(State(state.clone()), current.clone()).await.unwrap();
        assert_eq!(location(&response), "/export/");
        assert_eq!(
            state.tracker.take_flash(&current.token).await.unwrap().as_deref(),
            Some("Error generating PDF.")
        );
    }

    #[tokio::test]
    async fn test_summary_defaults_to_week() {
        let state = state();
        let current = signed_in(&state, "alice", Role::Patient).await;
        add(&state, &current, 8.0).await;

        let body = body_text(
            summary(State(state.clone()), current.clone(), Query(SummaryQuery::default()))
                .await
                .unwrap(),
        )
        .await;
        assert!(body.contains("Weekly Summary"));
        assert!(body.contains("8.0 h"));

        let query = SummaryQuery {
            period: Some("month".to_string()),
        };
        let body = body_text(summary(State(state), current, Query(query)).await.unwrap()).await;
        assert!(body.contains("Monthly Summary"));
    }
}
