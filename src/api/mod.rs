// src/api/mod.rs

pub mod activity;
pub mod cat_session;
pub mod health;
pub mod marketplace;
pub mod notifications;
pub mod wallet_connection;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::{Credential, TokenVerifier};
use crate::db::CatStore;
use crate::error::{AppError, Result};
use crate::models::User;
use crate::services::{
    activity_log::ActivityLog,
    identity_resolver::{normalize_wallet_address, IdentityHint, IdentityResolver},
    log_sink::LogSink,
    marketplace::MarketplaceReader,
    notification_store::NotificationStore,
    session_manager::SessionManager,
    wallet_connection_service::WalletConnectionService,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub marketplace: Option<Arc<dyn MarketplaceReader>>,
    pub config: Config,
}

impl AppState {
    pub fn identity(&self) -> IdentityResolver {
        IdentityResolver::new(self.store.clone())
    }

    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.store.clone())
    }

    pub fn activities(&self) -> ActivityLog {
        ActivityLog::new(self.store.clone())
    }

    pub fn wallets(&self) -> WalletConnectionService {
        WalletConnectionService::new(self.store.clone())
    }

    pub fn log_sink(&self) -> LogSink {
        LogSink::new(self.store.clone())
    }
}

pub async fn require_credential(headers: &HeaderMap, state: &AppState) -> Result<Credential> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::AuthError("Missing Authorization header".to_string()))?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::AuthError("Invalid Authorization header".to_string()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::AuthError("Invalid Authorization scheme".to_string()))?;

    state
        .verifier
        .verify(token)
        .await
        .ok_or_else(|| AppError::AuthError("Invalid or expired token".to_string()))
}

/// Profile fields a request may carry alongside its credential.
#[derive(Debug, Default)]
pub struct CallerHints {
    pub wallet_address: Option<String>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
}

/// Resolves the caller to a user record, creating it on first contact.
///
/// The credential decides who the caller is. For fid callers the body wallet
/// address is only a hint: it is dropped when it already belongs to another
/// user.
pub async fn resolve_caller(
    state: &AppState,
    credential: &Credential,
    hints: CallerHints,
) -> Result<User> {
    let hint = match credential {
        Credential::Fid(fid) => IdentityHint {
            fid: Some(*fid),
            address: unclaimed_address(state, *fid, hints.wallet_address).await?,
            display_name: hints.display_name,
            pfp_url: hints.pfp_url,
        },
        Credential::Wallet(address) => IdentityHint {
            display_name: hints.display_name,
            pfp_url: hints.pfp_url,
            ..IdentityHint::by_address(address.clone())
        },
    };
    state.identity().resolve_or_create(hint).await
}

async fn unclaimed_address(
    state: &AppState,
    fid: i64,
    address: Option<String>,
) -> Result<Option<String>> {
    let Some(raw) = address else {
        return Ok(None);
    };
    let address = normalize_wallet_address(&raw)?;
    match state.store.find_user_by_address(&address).await? {
        Some(owner) if owner.fid != fid => {
            state
                .log_sink()
                .warn(
                    "Ignoring wallet address owned by another user",
                    json!({ "address": address, "ownerFid": owner.fid }),
                    Some(fid),
                )
                .await;
            Ok(None)
        }
        _ => Ok(Some(address)),
    }
}

/// Fid carried by the credential itself, if any.
pub fn credential_fid(credential: &Credential) -> Option<i64> {
    match credential {
        Credential::Fid(fid) => Some(*fid),
        Credential::Wallet(_) => None,
    }
}

/// Looks the caller up without creating anything.
pub async fn find_caller(state: &AppState, credential: &Credential) -> Result<Option<User>> {
    match credential {
        Credential::Fid(fid) => state.store.find_user_by_fid(*fid).await,
        Credential::Wallet(address) => state.store.find_user_by_address(address).await,
    }
}

/// Fid the caller acts under; wallet callers borrow the fid of their user.
pub async fn caller_fid(state: &AppState, credential: &Credential) -> Result<i64> {
    match credential {
        Credential::Fid(fid) => Ok(*fid),
        Credential::Wallet(_) => find_caller(state, credential)
            .await?
            .map(|user| user.fid)
            .ok_or_else(|| AppError::NotFound("User not found".to_string())),
    }
}
