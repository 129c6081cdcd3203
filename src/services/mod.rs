// All service modules
pub mod activity_log;
pub mod identity_resolver;
pub mod log_sink;
pub mod marketplace;
pub mod notification_store;
pub mod session_manager;
pub mod stat_engine;
pub mod wallet_connection_service;

