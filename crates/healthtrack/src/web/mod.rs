//! HTTP front end.
//!
//! Pages are rendered from the embedded templates under `templates/`. Every
//! handler delegates to the shared [`Tracker`]; handlers only translate
//! between HTTP and the service layer.

mod api;
mod exports;
mod forms;
mod pages;
mod session;

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::reminders;
use crate::template::{escape, render};
use crate::tracker::Tracker;
use crate::user::User;

pub use session::{CurrentUser, SESSION_COOKIE};

const LAYOUT: &str = include_str!("templates/layout.html");
const MESSAGE: &str = include_str!("templates/message.html");

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The service behind every page.
    pub tracker: Arc<Tracker>,
}

impl AppState {
    /// Wrap a tracker.
    #[must_use]
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::welcome))
        .route("/register/", get(pages::register_form).post(pages::register))
        .route("/login/", get(pages::login_form).post(pages::login))
        .route("/logout/", get(pages::logout).post(pages::logout))
        .route("/dashboard/", get(pages::dashboard))
        .route("/mood-journal/", get(pages::dashboard))
        .route("/add/", get(pages::add_record_form).post(pages::add_record))
        .route("/records/:id/", get(pages::record_detail))
        .route(
            "/records/:id/edit/",
            get(pages::edit_record_form).post(pages::edit_record),
        )
        .route("/profile/", get(pages::profile_form).post(pages::update_profile))
        .route("/notifications/", get(pages::notifications))
        .route(
            "/daily-reminder/",
            get(pages::daily_reminder).post(pages::daily_reminder),
        )
        .route(
            "/daily-reminder-settings/",
            get(pages::reminder_settings_form).post(pages::save_reminder_settings),
        )
        .route("/patients/", get(pages::patients))
        .route("/food-recommendations/", get(pages::foods))
        .route(
            "/password_reset/",
            get(pages::password_reset_form).post(pages::password_reset),
        )
        .route("/password_reset/done/", get(pages::password_reset_done))
        .route("/password_reset/complete/", get(pages::password_reset_complete))
        .route(
            "/reset/:token/",
            get(pages::reset_confirm_form).post(pages::reset_confirm),
        )
        .route("/api/unread-notifications/", get(api::unread_notifications))
        .route(
            "/api/mark-notification-read/:id/",
            post(api::mark_notification_read),
        )
        .route(
            "/api/mark-all-notifications-read/",
            post(api::mark_all_notifications_read),
        )
        .route("/export/", get(exports::export_dashboard))
        .route("/export/csv/", get(exports::csv))
        .route("/export/json/", get(exports::json))
        .route("/export/report/", get(exports::report))
        .route("/export/pdf/", get(exports::pdf))
        .route("/export/summary/", get(exports::summary))
        .fallback(not_found)
        .with_state(state)
}

/// Serve HTTP until Ctrl-C, running the reminder loop alongside.
///
/// # Errors
///
/// Returns an error if the bind address is invalid or cannot be bound.
pub async fn serve(tracker: Arc<Tracker>) -> Result<()> {
    let config = tracker.config();
    let addr: SocketAddr =
        config
            .server
            .bind_address
            .parse()
            .map_err(|e| Error::ConfigValidation {
                message: format!("invalid bind address {}: {e}", config.server.bind_address),
            })?;

    if config.reminders.enabled {
        tokio::spawn(reminders::run(
            Arc::clone(&tracker),
            config.reminder_interval(),
        ));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let app = router(AppState::new(tracker));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn not_found(user: Option<CurrentUser>) -> Response {
    message_page(
        StatusCode::NOT_FOUND,
        user.as_ref().map(|u| &u.user),
        "Page not found",
        "The page you requested does not exist.",
    )
}

/// Wrap page content in the site layout.
pub(crate) fn layout(
    title: &str,
    user: Option<&User>,
    flash: Option<&str>,
    content: &str,
) -> Html<String> {
    let nav = match user {
        Some(user) => {
            let mut links = String::from(
                "<a class=\"brand\" href=\"/dashboard/\">Health Tracker</a>\
                 <a href=\"/add/\">Add record</a>\
                 <a href=\"/notifications/\">Notifications <span class=\"badge\" id=\"unread-count\"></span></a>\
                 <a href=\"/export/\">Export</a>\
                 <a href=\"/food-recommendations/\">Foods</a>",
            );
            if user.role.is_staff() {
                links.push_str("<a href=\"/patients/\">Patients</a>");
            }
            let _ = write!(
                links,
                "<a href=\"/profile/\">{}</a><a href=\"/logout/\">Log out</a>",
                escape(&user.username)
            );
            links
        }
        None => "<a class=\"brand\" href=\"/\">Health Tracker</a>\
                 <a href=\"/food-recommendations/\">Foods</a>\
                 <a href=\"/login/\">Log in</a><a href=\"/register/\">Register</a>"
            .to_string(),
    };
    let messages = flash
        .map(|m| format!("<div class=\"flash\">{}</div>", escape(m)))
        .unwrap_or_default();

    Html(render(
        LAYOUT,
        &[
            ("title", escape(title)),
            ("nav", nav),
            ("messages", messages),
            ("content", content.to_string()),
        ],
    ))
}

/// A one-paragraph page with a status code.
pub(crate) fn message_page(
    status: StatusCode,
    user: Option<&User>,
    heading: &str,
    text: &str,
) -> Response {
    let (link, link_text) = if user.is_some() {
        ("/dashboard/", "Back to dashboard")
    } else {
        ("/", "Back to start")
    };
    let content = render(
        MESSAGE,
        &[
            ("heading", escape(heading)),
            ("text", escape(text)),
            ("link", link.to_string()),
            ("link_text", link_text.to_string()),
        ],
    );
    (status, layout(heading, user, None, &content)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Self::NotFound { .. } => message_page(
                StatusCode::NOT_FOUND,
                None,
                "Page not found",
                "The page you requested does not exist.",
            ),
            Self::PermissionDenied { message } => {
                message_page(StatusCode::FORBIDDEN, None, "Access denied", message)
            }
            Self::RateLimited { retry_after_secs } => {
                warn!("Rate limited request, retry in {}s", retry_after_secs);
                let mut response = message_page(
                    StatusCode::TOO_MANY_REQUESTS,
                    None,
                    "Too many requests",
                    &format!("Too many attempts. Try again in {retry_after_secs} seconds."),
                );
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            Self::AuthenticationFailed | Self::AccountLocked { .. } => message_page(
                StatusCode::UNAUTHORIZED,
                None,
                "Login failed",
                &self.to_string(),
            ),
            Self::Validation(_) | Self::Registration { .. } => message_page(
                StatusCode::BAD_REQUEST,
                None,
                "Invalid request",
                &self.to_string(),
            ),
            _ => {
                error!("Request failed: {}", self);
                message_page(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    "Server error",
                    "Something went wrong on our end. Please try again later.",
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::to_bytes;

    use super::*;
    use crate::tracker::test_support;
    use crate::user::Role;

    pub fn state() -> AppState {
        AppState::new(Arc::new(test_support::tracker()))
    }

    pub async fn signed_in(state: &AppState, username: &str, role: Role) -> CurrentUser {
        let user = test_support::user(&state.tracker, username, role).await;
        let token = state
            .tracker
            .start_session(user.id, chrono::Utc::now())
            .await
            .unwrap();
        CurrentUser { user, token }
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{body_text, state};
    use super::*;

    #[test]
    fn test_router_builds() {
        let _ = router(state());
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let cases = [
            (
                Error::NotFound {
                    entity: "health record",
                    id: 3,
                },
                StatusCode::NOT_FOUND,
            ),
            (Error::permission_denied("no"), StatusCode::FORBIDDEN),
            (
                Error::RateLimited {
                    retry_after_secs: 30,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (Error::field("date", "Enter a valid date."), StatusCode::BAD_REQUEST),
            (Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = Error::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let body = body_text(Error::internal("secret detail").into_response()).await;
        assert!(!body.contains("secret detail"));
        assert!(body.contains("Something went wrong"));
    }

    #[tokio::test]
    async fn test_not_found_page() {
        let response = not_found(None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page not found"));
    }

    #[test]
    fn test_layout_escapes_flash() {
        let Html(page) = layout("Title", None, Some("<b>hi</b>"), "<p>content</p>");
        assert!(page.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(page.contains("<p>content</p>"));
        assert!(page.contains("/login/"));
    }
}
