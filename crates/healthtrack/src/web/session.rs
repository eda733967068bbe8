//! Session cookies and the signed-in user extractor.

use std::fmt::Write as _;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Utc;

use super::AppState;
use crate::user::User;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "healthtrack_session";

/// The user behind a valid session cookie.
///
/// Pages that take this extractor redirect anonymous visitors to
/// `/login/?next=<path>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Signed-in user.
    pub user: User,
    /// Raw session token from the cookie.
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Err(login_redirect(&parts.uri));
        };
        match state.tracker.session_user(&token, Utc::now()).await {
            Ok(Some(user)) => Ok(Self { user, token }),
            Ok(None) => Err(login_redirect(&parts.uri)),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// Session token from the `Cookie` header.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value starting a session.
pub(crate) fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value ending a session.
pub(crate) fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Redirect to the login page, remembering where the visitor was going.
pub(crate) fn login_redirect(uri: &Uri) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    Redirect::to(&format!("/login/?next={}", encode_component(&target))).into_response()
}

/// Only same-site absolute paths are followed after login.
pub(crate) fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
        {
            path
        }
        _ => "/dashboard/",
    }
}

/// Percent-encode a query parameter value.
pub(crate) fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(char::from(byte));
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request, StatusCode};

    use super::*;
    use crate::web::test_support::{location, signed_in, state};
    use crate::user::Role;

    #[test]
    fn test_session_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; healthtrack_session=abc123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("healthtrack_session="));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookies() {
        let cookie = session_cookie("tok", 3600, true);
        assert!(cookie.starts_with("healthtrack_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!session_cookie("tok", 60, false).contains("Secure"));
        assert!(expired_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_login_redirect_keeps_target() {
        let uri: Uri = "/export/csv/?start_date=2024-01-01".parse().unwrap();
        let response = login_redirect(&uri);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/login/?next=/export/csv/%3Fstart_date%3D2024-01-01"
        );
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/profile/")), "/profile/");
        assert_eq!(safe_next(Some("//evil.example")), "/dashboard/");
        assert_eq!(safe_next(Some("https://evil.example")), "/dashboard/");
        assert_eq!(safe_next(None), "/dashboard/");
    }

    #[tokio::test]
    async fn test_extractor() {
        let state = state();
        let current = signed_in(&state, "alice", Role::Patient).await;

        let request = Request::builder()
            .uri("/dashboard/")
            .header(header::COOKIE, format!("{SESSION_COOKIE}={}", current.token))
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        let extracted = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(extracted.user.id, current.user.id);

        let anonymous = Request::builder().uri("/profile/").body(()).unwrap();
        let (mut parts, ()) = anonymous.into_parts();
        let rejection = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(location(&rejection), "/login/?next=/profile/");
    }
}
