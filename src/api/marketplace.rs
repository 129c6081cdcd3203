use axum::{extract::State, http::HeaderMap, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{AppError, Result},
    models::ApiResponse,
    services::marketplace::{prepare_purchase, MarketItem, MarketplaceReader, PurchaseCall},
};

use super::{credential_fid, require_credential, AppState};

fn marketplace(state: &AppState) -> Result<Arc<dyn MarketplaceReader>> {
    state
        .marketplace
        .clone()
        .ok_or_else(|| AppError::NotFound("Marketplace is not configured".to_string()))
}

/// GET /api/v1/marketplace/item
pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<MarketItem>>> {
    let credential = require_credential(&headers, &state).await?;
    let reader = marketplace(&state)?;

    match reader.get_item().await {
        Ok(item) => Ok(Json(ApiResponse::success(item))),
        Err(e) => {
            state
                .log_sink()
                .record_failure("Error reading marketplace item", &e, credential_fid(&credential))
                .await;
            Err(e)
        }
    }
}

/// POST /api/v1/marketplace/purchase
///
/// Returns an unsigned payable call; the client wallet signs and sends it.
pub async fn prepare_purchase_call(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<PurchaseCall>>> {
    let credential = require_credential(&headers, &state).await?;
    let fid = credential_fid(&credential);
    let sink = state.log_sink();
    sink.info("Purchase request received", json!({}), fid).await;
    let reader = marketplace(&state)?;

    let item = match reader.get_item().await {
        Ok(item) => item,
        Err(e) => {
            sink.record_failure("Error reading marketplace item", &e, fid)
                .await;
            return Err(e);
        }
    };
    let call = prepare_purchase(&item, &reader.contract_address(), reader.chain_id())?;

    sink.info(
        "Purchase prepared",
        json!({ "itemId": item.id, "value": call.value, "chainId": call.chain_id }),
        fid,
    )
    .await;
    Ok(Json(ApiResponse::success(call)))
}
