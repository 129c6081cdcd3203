use std::env;

use crate::constants::{
    DEFAULT_APP_NAME, DEFAULT_MARKETPLACE_CHAIN_ID, DEFAULT_QUICK_AUTH_ISSUER,
    DEFAULT_QUICK_AUTH_JWKS_URL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown STORAGE_BACKEND: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub app_name: String,
    pub app_public_url: Option<String>,

    // Storage
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Redis (notification details)
    pub redis_url: Option<String>,

    // Auth
    pub quick_auth_jwks_url: String,
    pub quick_auth_issuer: String,
    pub auth_shared_secret: Option<String>,

    // Marketplace
    pub ethereum_rpc_url: Option<String>,
    pub marketplace_address: Option<String>,
    pub marketplace_chain_id: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            app_name: env::var("APP_NAME").unwrap_or_else(|_| DEFAULT_APP_NAME.to_string()),
            app_public_url: optional_var("APP_PUBLIC_URL"),

            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "postgres".to_string())
                .parse()?,
            database_url: optional_var("DATABASE_URL"),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            redis_url: optional_var("REDIS_URL"),

            quick_auth_jwks_url: env::var("QUICK_AUTH_JWKS_URL")
                .unwrap_or_else(|_| DEFAULT_QUICK_AUTH_JWKS_URL.to_string()),
            quick_auth_issuer: env::var("QUICK_AUTH_ISSUER")
                .unwrap_or_else(|_| DEFAULT_QUICK_AUTH_ISSUER.to_string()),
            auth_shared_secret: optional_var("AUTH_SHARED_SECRET"),

            ethereum_rpc_url: optional_var("ETHEREUM_RPC_URL"),
            marketplace_address: optional_var("MARKETPLACE_ADDRESS"),
            marketplace_chain_id: env::var("MARKETPLACE_CHAIN_ID")
                .unwrap_or_else(|_| DEFAULT_MARKETPLACE_CHAIN_ID.to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage_backend == StorageBackend::Postgres
            && self.database_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            anyhow::bail!("DATABASE_URL is required when STORAGE_BACKEND=postgres");
        }
        if self.app_name.trim().is_empty() {
            anyhow::bail!("APP_NAME is empty");
        }
        if self.is_production() && self.auth_domain().is_none() {
            anyhow::bail!("APP_PUBLIC_URL must be a valid URL in production");
        }
        if self.is_production() && self.storage_backend == StorageBackend::Memory {
            tracing::warn!("In-memory storage in production loses all data on restart");
        }

        if let Some(secret) = &self.auth_shared_secret {
            if secret.len() < 16 {
                tracing::warn!("AUTH_SHARED_SECRET is shorter than 16 bytes");
            }
        }

        match (&self.ethereum_rpc_url, &self.marketplace_address) {
            (Some(_), Some(address)) if address.starts_with("0x0000") => {
                tracing::warn!("Using placeholder marketplace address");
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Marketplace needs both ETHEREUM_RPC_URL and MARKETPLACE_ADDRESS; disabled"
                );
            }
            _ => {}
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Raw error text is only returned to clients outside production.
    pub fn expose_error_details(&self) -> bool {
        !self.is_production()
    }

    /// Hostname of the public app URL; Quick Auth tokens are issued for it.
    pub fn auth_domain(&self) -> Option<String> {
        let raw = self.app_public_url.as_deref()?;
        let parsed = url::Url::parse(raw).ok()?;
        parsed.host_str().map(str::to_string)
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "development".to_string(),
        app_name: DEFAULT_APP_NAME.to_string(),
        app_public_url: Some("https://meow.example.com".to_string()),
        storage_backend: StorageBackend::Memory,
        database_url: None,
        database_max_connections: 1,
        redis_url: None,
        quick_auth_jwks_url: DEFAULT_QUICK_AUTH_JWKS_URL.to_string(),
        quick_auth_issuer: DEFAULT_QUICK_AUTH_ISSUER.to_string(),
        auth_shared_secret: None,
        ethereum_rpc_url: None,
        marketplace_address: None,
        marketplace_chain_id: DEFAULT_MARKETPLACE_CHAIN_ID,
        cors_allowed_origins: "*".to_string(),
    }
}
