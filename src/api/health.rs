use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::config::StorageBackend;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: String,
    pub storage_backend: String,
    pub notifications: String,
    pub marketplace: bool,
}

fn connection_status(ok: bool) -> String {
    if ok { "connected" } else { "disconnected" }.to_string()
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_ok = state.store.ping().await;
    let notifications_ok = state.notifications.ping().await;

    let status = if storage_ok && notifications_ok {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: connection_status(storage_ok),
        storage_backend: match state.config.storage_backend {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
        .to_string(),
        notifications: connection_status(notifications_ok),
        marketplace: state.marketplace.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::test_support::state_with, db::MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_backed_state_is_healthy() {
        let state = state_with(Arc::new(MemoryStore::new()));
        let Json(health) = health_check(State(state)).await;

        assert_eq!(health.status, "ok");
        assert_eq!(health.storage, "connected");
        assert_eq!(health.storage_backend, "memory");
        assert!(!health.marketplace);
    }
}
