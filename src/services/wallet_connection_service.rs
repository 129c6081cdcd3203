use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::CatStore,
    error::{AppError, Result},
    models::{NewWalletConnection, WalletConnection, WalletConnectionWithUser},
    services::identity_resolver::normalize_wallet_address,
};

#[derive(Clone)]
pub struct WalletConnectionService {
    store: Arc<dyn CatStore>,
}

impl WalletConnectionService {
    pub fn new(store: Arc<dyn CatStore>) -> Self {
        Self { store }
    }

    /// Normalizes and checks a connection before anything is written.
    pub fn validate(address: &str, chain_id: i64, connector: &str) -> Result<NewWalletConnection> {
        let address = normalize_wallet_address(address)?;
        let connector = connector.trim();
        if connector.is_empty() {
            return Err(AppError::BadRequest("Missing connector".to_string()));
        }
        if chain_id <= 0 {
            return Err(AppError::BadRequest("chainId must be positive".to_string()));
        }
        Ok(NewWalletConnection {
            address,
            chain_id,
            connector: connector.to_string(),
            user_id: None,
        })
    }

    /// Upserts by address: reconnecting overwrites chain, connector and user.
    pub async fn log_connection(
        &self,
        address: &str,
        chain_id: i64,
        connector: &str,
        user_id: Option<Uuid>,
    ) -> Result<WalletConnection> {
        let connection = NewWalletConnection {
            user_id,
            ..Self::validate(address, chain_id, connector)?
        };
        self.store.upsert_wallet_connection(&connection).await
    }

    pub async fn get_connection(&self, address: &str) -> Result<Option<WalletConnectionWithUser>> {
        let address = normalize_wallet_address(address)?;
        self.store.find_wallet_connection(&address).await
    }
}
