use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, SessionDetail},
    services::identity_resolver::IdentityHint,
    utils::parse_uuid,
};

use super::{
    credential_fid, find_caller, require_credential, resolve_caller, AppState, CallerHints,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub partner_fid: Option<i64>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
    pub wallet_address: Option<String>,
}

/// POST /api/v1/cat-session
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<ApiResponse<SessionDetail>>> {
    let credential = require_credential(&headers, &state).await?;
    let sink = state.log_sink();
    sink.info(
        "Cat session request received",
        json!({ "partnerFid": req.partner_fid, "name": req.name }),
        credential_fid(&credential),
    )
    .await;

    if let Some(partner_fid) = req.partner_fid {
        if partner_fid <= 0 {
            return Err(AppError::BadRequest("partnerFid must be positive".to_string()));
        }
        let caller_fid = match credential_fid(&credential) {
            Some(fid) => Some(fid),
            None => find_caller(&state, &credential).await?.map(|user| user.fid),
        };
        if caller_fid == Some(partner_fid) {
            return Err(AppError::BadRequest("partnerFid cannot be the caller".to_string()));
        }
    }

    let mut fid = credential_fid(&credential);
    let result = async {
        let owner = resolve_caller(
            &state,
            &credential,
            CallerHints {
                wallet_address: req.wallet_address,
                display_name: req.display_name,
                pfp_url: req.pfp_url,
            },
        )
        .await?;
        fid = Some(owner.fid);

        let partner = match req.partner_fid {
            Some(partner_fid) => Some(
                state
                    .identity()
                    .resolve_or_create(IdentityHint::by_fid(partner_fid))
                    .await?,
            ),
            None => None,
        };

        let detail = state
            .sessions()
            .create_session(owner.id, partner.map(|p| p.id), req.name.as_deref())
            .await?;
        Ok::<_, AppError>(detail)
    }
    .await;

    match result {
        Ok(detail) => {
            sink.info(
                "Cat session created",
                json!({
                    "sessionId": detail.session.id,
                    "partnerId": detail.session.partner_id,
                }),
                fid,
            )
            .await;
            Ok(Json(ApiResponse::success(detail)))
        }
        Err(e) => {
            sink.record_failure("Error creating cat session", &e, fid).await;
            Err(e)
        }
    }
}

/// GET /api/v1/cat-session
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<SessionDetail>>>> {
    let credential = require_credential(&headers, &state).await?;
    let result = async {
        let user = find_caller(&state, &credential)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        state.sessions().list_sessions_for_user(user.id).await
    }
    .await;

    match result {
        Ok(sessions) => Ok(Json(ApiResponse::success(sessions))),
        Err(e) => {
            state
                .log_sink()
                .record_failure("Error fetching cat sessions", &e, credential_fid(&credential))
                .await;
            Err(e)
        }
    }
}

/// GET /api/v1/cat-session/{id}
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionDetail>>> {
    let credential = require_credential(&headers, &state).await?;
    let session_id = parse_uuid(&id, "session id")?;

    match state.sessions().get_session(session_id).await {
        Ok(detail) => Ok(Json(ApiResponse::success(detail))),
        Err(e) => {
            state
                .log_sink()
                .record_failure("Error fetching cat session", &e, credential_fid(&credential))
                .await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::test_support::{bearer, state_with},
        db::{CatStore, MemoryStore},
        models::{LogLevel, StatValues},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn create_resolves_owner_and_partner() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let Json(response) = create_session(
            State(state.clone()),
            bearer("101"),
            Json(CreateSessionRequest {
                partner_fid: Some(202),
                name: Some("Biscuit".to_string()),
                display_name: Some("alice".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        let detail = response.data;
        assert_eq!(detail.session.name, "Biscuit");
        assert_eq!(detail.owner.fid, 101);
        assert_eq!(detail.owner.username, "alice");
        assert_eq!(detail.partner.as_ref().map(|p| p.fid), Some(202));
        assert_eq!(detail.stats.map(|s| s.values()), Some(StatValues::seed()));
        assert_eq!(store.user_count().await, 2);

        let logs = store.log_entries().await;
        assert!(logs.iter().any(|entry| entry.message == "Cat session created"));
    }

    #[tokio::test]
    async fn list_requires_existing_user() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let missing = list_sessions(State(state.clone()), bearer("7")).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        create_session(
            State(state.clone()),
            bearer("7"),
            Json(CreateSessionRequest::default()),
        )
        .await
        .unwrap();

        let Json(listed) = list_sessions(State(state), bearer("7")).await.unwrap();
        assert_eq!(listed.data.len(), 1);
        assert_eq!(listed.data[0].session.name, "cattyyy");
    }

    #[tokio::test]
    async fn get_by_id_validates_and_finds() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let bad = get_session(State(state.clone()), bearer("7"), Path("xyz".to_string())).await;
        assert!(matches!(bad, Err(AppError::BadRequest(_))));

        let Json(created) = create_session(
            State(state.clone()),
            bearer("7"),
            Json(CreateSessionRequest::default()),
        )
        .await
        .unwrap();
        let id = created.data.session.id;

        let Json(fetched) = get_session(State(state), bearer("7"), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(fetched.data.session.id, id);
        assert!(store.find_session(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn partner_equal_to_caller_is_rejected_before_any_write() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let result = create_session(
            State(state.clone()),
            bearer("44"),
            Json(CreateSessionRequest {
                partner_fid: Some(44),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(store.user_count().await, 0);

        let negative = create_session(
            State(state),
            bearer("44"),
            Json(CreateSessionRequest {
                partner_fid: Some(-3),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(negative, Err(AppError::BadRequest(_))));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn store_failure_is_logged_with_caller_fid() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());
        store.fail_next_stats_write();

        let result = create_session(
            State(state),
            bearer("45"),
            Json(CreateSessionRequest::default()),
        )
        .await;
        assert!(result.is_err());

        let logs = store.log_entries().await;
        let failure = logs
            .iter()
            .find(|entry| entry.level == LogLevel::Error)
            .unwrap();
        assert_eq!(failure.message, "Error creating cat session");
        assert_eq!(failure.fid, Some(45));
    }

    #[tokio::test]
    async fn unauthenticated_create_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let result = create_session(
            State(state),
            HeaderMap::new(),
            Json(CreateSessionRequest::default()),
        )
        .await;
        assert!(matches!(result, Err(AppError::AuthError(_))));
        assert_eq!(store.user_count().await, 0);
    }
}
