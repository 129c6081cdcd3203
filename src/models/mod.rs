// src/models/mod.rs
pub mod cat;
pub mod user;

// Re-export commonly used types so other modules can use `crate::models::X`
pub use cat::{
    Action, Activity, ActivityWithUser, CatSession, CatStats, SessionDetail, StatValues,
};
pub use user::{
    ApiResponse, InsertUserOutcome, LogLevel, NewLogEntry, NewUser, NewWalletConnection,
    NotificationDetails, User, UserUpdate, WalletConnection, WalletConnectionWithUser,
};
