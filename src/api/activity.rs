use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    constants::{NO_SESSION_SENTINEL, QUICK_SESSION_NAME},
    error::{AppError, Result},
    models::{Action, ActivityWithUser, ApiResponse, CatStats},
    utils::{clamp_limit, parse_uuid},
};

use super::{credential_fid, require_credential, resolve_caller, AppState, CallerHints};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub action: String,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityResponse {
    pub activity: ActivityWithUser,
    pub stats: CatStats,
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListActivitiesQuery {
    pub session_id: Option<String>,
    pub limit: Option<i64>,
}

/// POST /api/v1/activity
pub async fn log_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogActivityRequest>,
) -> Result<Json<ApiResponse<LogActivityResponse>>> {
    let credential = require_credential(&headers, &state).await?;
    let sink = state.log_sink();
    sink.info(
        "Activity request received",
        json!({ "sessionId": req.session_id, "action": req.action }),
        credential_fid(&credential),
    )
    .await;

    let action = Action::from_str(&req.action)?;

    // Clients without a session yet send nothing or the sentinel.
    let session_id = match req.session_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) if raw == NO_SESSION_SENTINEL => None,
        Some(raw) => Some(parse_uuid(raw, "sessionId")?),
    };

    let mut fid = credential_fid(&credential);
    let result = async {
        if let Some(id) = session_id {
            if state.store.find_session(id).await?.is_none() {
                return Err(AppError::NotFound("Cat session not found".to_string()));
            }
        }

        let user = resolve_caller(
            &state,
            &credential,
            CallerHints {
                wallet_address: req.wallet_address,
                ..Default::default()
            },
        )
        .await?;
        fid = Some(user.fid);

        let session_id = match session_id {
            Some(id) => id,
            None => {
                let detail = state
                    .sessions()
                    .create_session(user.id, None, Some(QUICK_SESSION_NAME))
                    .await?;
                sink.info(
                    "Quick cat session created",
                    json!({ "sessionId": detail.session.id }),
                    Some(user.fid),
                )
                .await;
                detail.session.id
            }
        };

        let logged = state
            .activities()
            .log_activity(session_id, user.id, action)
            .await?;
        Ok::<_, AppError>((session_id, logged))
    }
    .await;

    match result {
        Ok((session_id, logged)) => {
            sink.info(
                "Activity logged",
                json!({
                    "sessionId": session_id,
                    "action": action.as_str(),
                    "stats": logged.stats.values(),
                }),
                fid,
            )
            .await;
            Ok(Json(ApiResponse::success(LogActivityResponse {
                activity: logged.activity,
                stats: logged.stats,
                session_id,
            })))
        }
        Err(e) => {
            sink.record_failure("Error logging activity", &e, fid).await;
            Err(e)
        }
    }
}

/// GET /api/v1/activity?sessionId=&limit=
pub async fn list_activities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<Json<ApiResponse<Vec<ActivityWithUser>>>> {
    let credential = require_credential(&headers, &state).await?;
    let raw = query
        .session_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing sessionId".to_string()))?;
    let session_id = parse_uuid(raw, "sessionId")?;

    match state
        .activities()
        .list_activities(session_id, clamp_limit(query.limit))
        .await
    {
        Ok(activities) => Ok(Json(ApiResponse::success(activities))),
        Err(e) => {
            state
                .log_sink()
                .record_failure("Error fetching activities", &e, credential_fid(&credential))
                .await;
            Err(e)
        }
    }
}
