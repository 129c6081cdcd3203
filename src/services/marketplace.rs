use async_trait::async_trait;
use ethers::{
    providers::{Http, Provider},
    types::{Address, U256},
    utils::format_ether,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    constants::MARKETPLACE_RPC_TIMEOUT_SECS,
    error::{AppError, Result},
};

ethers::contract::abigen!(
    CatMarketplace,
    r#"[
        function getItem() view returns ((uint256,string,string,uint256,address,bool))
        function purchase() payable
    ]"#
);

/// The single listing exposed by the marketplace contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    /// Price in wei, as a decimal string.
    pub price: String,
    pub price_eth: String,
    pub seller: String,
    pub available: bool,
}

impl MarketItem {
    fn from_tuple(raw: (U256, String, String, U256, Address, bool)) -> Self {
        let (id, name, metadata_uri, price, seller, available) = raw;
        Self {
            id: id.to_string(),
            name,
            metadata_uri,
            price: price.to_string(),
            price_eth: format_ether(price),
            seller: format!("{:#x}", seller),
            available,
        }
    }
}

/// Unsigned transaction for the client wallet to sign and send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCall {
    pub to: String,
    pub data: String,
    /// Value in wei, as a decimal string.
    pub value: String,
    pub chain_id: u64,
}

#[async_trait]
pub trait MarketplaceReader: Send + Sync {
    async fn get_item(&self) -> Result<MarketItem>;
    fn contract_address(&self) -> String;
    fn chain_id(&self) -> u64;
}

pub struct EthersMarketplace {
    contract: CatMarketplace<Provider<Http>>,
    address: Address,
    chain_id: u64,
}

impl EthersMarketplace {
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let (Some(rpc_url), Some(address)) = (&config.ethereum_rpc_url, &config.marketplace_address)
        else {
            return Ok(None);
        };

        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .map_err(|e| AppError::Internal(format!("Invalid EVM RPC URL: {}", e)))?;
        let address = Address::from_str(address)
            .map_err(|_| AppError::Internal("Invalid MARKETPLACE_ADDRESS".to_string()))?;
        let contract = CatMarketplace::new(address, Arc::new(provider));

        Ok(Some(Self {
            contract,
            address,
            chain_id: config.marketplace_chain_id,
        }))
    }
}

#[async_trait]
impl MarketplaceReader for EthersMarketplace {
    async fn get_item(&self) -> Result<MarketItem> {
        let call = self.contract.get_item();
        let raw = tokio::time::timeout(
            Duration::from_secs(MARKETPLACE_RPC_TIMEOUT_SECS),
            call.call(),
        )
        .await
        .map_err(|_| AppError::BlockchainRPC("getItem timed out".to_string()))?
        .map_err(|e| AppError::BlockchainRPC(e.to_string()))?;
        Ok(MarketItem::from_tuple(raw))
    }

    fn contract_address(&self) -> String {
        format!("{:#x}", self.address)
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Builds the payable `purchase()` call sized to the listed price.
pub fn prepare_purchase(item: &MarketItem, contract: &str, chain_id: u64) -> Result<PurchaseCall> {
    if !item.available {
        return Err(AppError::BadRequest("Item is no longer available".to_string()));
    }
    U256::from_dec_str(&item.price)
        .map_err(|_| AppError::Internal(format!("Unparseable listing price: {}", item.price)))?;

    Ok(PurchaseCall {
        to: contract.to_string(),
        data: format!("0x{}", hex::encode(ethers::utils::id("purchase()"))),
        value: item.price.clone(),
        chain_id,
    })
}
