//! JSON endpoints used by the notification badge.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::{AppState, CurrentUser};
use crate::error::Result;

pub(super) async fn unread_notifications(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<serde_json::Value>> {
    let count = state.tracker.unread_count(&current.user).await?;
    Ok(Json(json!({ "unread_count": count })))
}

pub(super) async fn mark_notification_read(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    match state.tracker.mark_notification_read(&current.user, id).await {
        Ok(()) => Ok(Json(json!({ "success": true })).into_response()),
        Err(e) if e.is_not_found() => {
            Ok((StatusCode::NOT_FOUND, Json(json!({ "success": false }))).into_response())
        }
        Err(e) => Err(e),
    }
}

pub(super) async fn mark_all_notifications_read(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<serde_json::Value>> {
    let updated = state.tracker.mark_all_read(&current.user).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
