use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, WalletConnection, WalletConnectionWithUser},
    services::{
        identity_resolver::IdentityHint, wallet_connection_service::WalletConnectionService,
    },
};

use super::{credential_fid, require_credential, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConnectionRequest {
    pub address: String,
    pub chain_id: i64,
    pub connector: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub address: Option<String>,
}

/// POST /api/v1/wallet-connection
///
/// The connected address is resolved to a user, created on first sight, and
/// the connection is linked to it.
pub async fn log_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogConnectionRequest>,
) -> Result<Json<ApiResponse<WalletConnection>>> {
    let credential = require_credential(&headers, &state).await?;
    let sink = state.log_sink();
    sink.info(
        "Wallet connection request received",
        json!({ "address": req.address, "chainId": req.chain_id }),
        credential_fid(&credential),
    )
    .await;

    let valid = WalletConnectionService::validate(&req.address, req.chain_id, &req.connector)?;

    let mut fid = credential_fid(&credential);
    let result = async {
        let user = state
            .identity()
            .resolve_or_create(IdentityHint {
                fid,
                ..IdentityHint::by_address(valid.address.clone())
            })
            .await?;
        fid = Some(user.fid);

        state
            .wallets()
            .log_connection(&valid.address, valid.chain_id, &valid.connector, Some(user.id))
            .await
    }
    .await;

    match result {
        Ok(connection) => {
            sink.info(
                "Wallet connected",
                json!({
                    "address": connection.address,
                    "chainId": connection.chain_id,
                    "connector": connection.connector,
                }),
                fid,
            )
            .await;
            Ok(Json(ApiResponse::success(connection)))
        }
        Err(e) => {
            sink.record_failure("Error logging wallet connection", &e, fid)
                .await;
            Err(e)
        }
    }
}

/// GET /api/v1/wallet-connection?address=
pub async fn get_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConnectionQuery>,
) -> Result<Json<ApiResponse<Option<WalletConnectionWithUser>>>> {
    let credential = require_credential(&headers, &state).await?;
    let address = query
        .address
        .ok_or_else(|| AppError::BadRequest("Missing address".to_string()))?;

    match state.wallets().get_connection(&address).await {
        Ok(connection) => Ok(Json(ApiResponse::success(connection))),
        Err(e) => {
            state
                .log_sink()
                .record_failure("Error fetching wallet connection", &e, credential_fid(&credential))
                .await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            resolve_caller,
            test_support::{bearer, state_with},
            CallerHints,
        },
        crypto::Credential,
        db::{CatStore, MemoryStore},
        models::LogLevel,
    };
    use std::sync::Arc;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    #[tokio::test]
    async fn connection_links_known_caller() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());
        let user = resolve_caller(&state, &Credential::Fid(31), CallerHints::default())
            .await
            .unwrap();

        let Json(logged) = log_connection(
            State(state.clone()),
            bearer("31"),
            Json(LogConnectionRequest {
                address: ADDR.to_string(),
                chain_id: 8453,
                connector: "farcasterFrame".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(logged.data.user_id, Some(user.id));

        let Json(fetched) = get_connection(
            State(state),
            bearer("31"),
            Query(ConnectionQuery {
                address: Some(ADDR.to_string()),
            }),
        )
        .await
        .unwrap();
        let fetched = fetched.data.unwrap();
        assert_eq!(fetched.connection.chain_id, 8453);
        assert_eq!(fetched.user.map(|u| u.fid), Some(31));
    }

    #[tokio::test]
    async fn first_connection_creates_and_links_user() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let Json(logged) = log_connection(
            State(state.clone()),
            bearer("77"),
            Json(LogConnectionRequest {
                address: ADDR.to_string(),
                chain_id: 84532,
                connector: "injected".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(store.user_count().await, 1);
        let owner = store.find_user_by_address(ADDR).await.unwrap().unwrap();
        assert_eq!(owner.fid, 77);
        assert_eq!(logged.data.user_id, Some(owner.id));

        // A wallet-only caller gets a user for its own address.
        let wallet = "0x2222222222222222222222222222222222222222";
        let Json(second) = log_connection(
            State(state),
            bearer(wallet),
            Json(LogConnectionRequest {
                address: wallet.to_string(),
                chain_id: 8453,
                connector: "coinbaseWallet".to_string(),
            }),
        )
        .await
        .unwrap();
        let created = store.find_user_by_address(wallet).await.unwrap().unwrap();
        assert_eq!(second.data.user_id, Some(created.id));
        assert_eq!(store.user_count().await, 2);

        let logs = store.log_entries().await;
        assert!(logs.iter().all(|entry| entry.level == LogLevel::Info));
        assert_eq!(
            logs.iter().filter(|entry| entry.message == "Wallet connected").count(),
            2
        );
    }

    #[tokio::test]
    async fn invalid_address_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone());

        let result = log_connection(
            State(state),
            bearer("31"),
            Json(LogConnectionRequest {
                address: "0x123".to_string(),
                chain_id: 8453,
                connector: "injected".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(store.user_count().await, 0);
        assert!(store
            .log_entries()
            .await
            .iter()
            .all(|entry| entry.level != LogLevel::Error));
    }
}
