use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, NotificationDetails},
};

use super::{caller_fid, require_credential, AppState};

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// GET /api/v1/notifications/details
pub async fn get_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Option<NotificationDetails>>>> {
    let credential = require_credential(&headers, &state).await?;
    let fid = caller_fid(&state, &credential).await?;

    let details = state.notifications.get(fid).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// PUT /api/v1/notifications/details
pub async fn set_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NotificationDetails>,
) -> Result<Json<ApiResponse<NotificationDetails>>> {
    let credential = require_credential(&headers, &state).await?;
    if req.token.trim().is_empty() {
        return Err(AppError::BadRequest("Missing notification token".to_string()));
    }
    url::Url::parse(req.url.trim())
        .map_err(|_| AppError::BadRequest("Invalid notification url".to_string()))?;
    let fid = caller_fid(&state, &credential).await?;

    let details = NotificationDetails {
        url: req.url.trim().to_string(),
        token: req.token.trim().to_string(),
    };
    state.notifications.set(fid, &details).await?;
    tracing::debug!("Stored notification details for fid {}", fid);
    Ok(Json(ApiResponse::success(details)))
}

/// DELETE /api/v1/notifications/details
pub async fn delete_details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<DeleteResponse>>> {
    let credential = require_credential(&headers, &state).await?;
    let fid = caller_fid(&state, &credential).await?;

    state.notifications.delete(fid).await?;
    Ok(Json(ApiResponse::success(DeleteResponse { deleted: true })))
}
