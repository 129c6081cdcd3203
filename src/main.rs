use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod crypto;
mod db;
mod error;
mod models;
mod services;
mod utils;

use config::{Config, StorageBackend};
use constants::API_VERSION;
use crypto::{QuickAuthVerifier, TokenVerifier};
use db::{CatStore, Database, MemoryStore};
use services::marketplace::{EthersMarketplace, MarketplaceReader};
use services::notification_store::{
    MemoryNotificationStore, NotificationStore, RedisNotificationStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onbase_meow_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;
    error::set_expose_error_details(config.expose_error_details());

    tracing::info!("Starting {} backend", config.app_name);
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    let store: Arc<dyn CatStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let db = Database::new(&config).await?;
            tracing::info!("Running database migrations...");
            db.run_migrations().await?;
            Arc::new(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let notifications: Arc<dyn NotificationStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisNotificationStore::connect(url, &config.app_name).await?),
        None => {
            tracing::warn!("REDIS_URL not set; notification details kept in memory");
            Arc::new(MemoryNotificationStore::new(&config.app_name))
        }
    };

    let verifier: Arc<dyn TokenVerifier> = Arc::new(QuickAuthVerifier::from_config(&config));
    if config.is_development() {
        tracing::warn!("Development mode: bare fid and wallet bearer tokens are accepted");
    }

    let marketplace = EthersMarketplace::from_config(&config)?
        .map(|reader| Arc::new(reader) as Arc<dyn MarketplaceReader>);
    if let Some(reader) = &marketplace {
        tracing::info!(
            "Marketplace contract {} on chain {}",
            reader.contract_address(),
            reader.chain_id()
        );
    }

    let app_state = api::AppState {
        store,
        notifications,
        verifier,
        marketplace,
        config: config.clone(),
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Cat sessions
        .route(
            "/api/v1/cat-session",
            post(api::cat_session::create_session).get(api::cat_session::list_sessions),
        )
        .route(
            "/api/v1/cat-session/{id}",
            get(api::cat_session::get_session),
        )
        // Activities
        .route(
            "/api/v1/activity",
            post(api::activity::log_activity).get(api::activity::list_activities),
        )
        // Wallet connections
        .route(
            "/api/v1/wallet-connection",
            post(api::wallet_connection::log_connection)
                .get(api::wallet_connection::get_connection),
        )
        // Notifications
        .route(
            "/api/v1/notifications/details",
            get(api::notifications::get_details)
                .put(api::notifications::set_details)
                .delete(api::notifications::delete_details),
        )
        // Marketplace
        .route("/api/v1/marketplace/item", get(api::marketplace::get_item))
        .route(
            "/api/v1/marketplace/purchase",
            post(api::marketplace::prepare_purchase_call),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
