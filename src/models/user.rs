use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ==================== USER ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub fid: i64,
    pub address: Option<String>,
    pub username: String,
    pub pfp_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fid: i64,
    pub address: Option<String>,
    pub username: String,
    pub pfp_url: Option<String>,
}

/// Partial update applied to an existing user. `None` leaves a column alone;
/// `address` is only attached when the user has none yet.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub pfp_url: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub enum InsertUserOutcome {
    Created(User),
    FidTaken,
    AddressTaken,
}

// ==================== WALLET CONNECTION ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
    pub id: Uuid,
    pub address: String,
    pub chain_id: i64,
    pub connector: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWalletConnection {
    pub address: String,
    pub chain_id: i64,
    pub connector: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnectionWithUser {
    #[serde(flatten)]
    pub connection: WalletConnection,
    pub user: Option<User>,
}

// ==================== LOG ENTRY ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: serde_json::Value,
    pub fid: Option<i64>,
}

// ==================== NOTIFICATIONS ====================
/// Push-notification target handed out by the Farcaster client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDetails {
    pub url: String,
    pub token: String,
}

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_sets_flag() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }

    #[test]
    fn user_serializes_camel_case() {
        let now = Utc::now();
        let user = User {
            id: Uuid::nil(),
            fid: 42,
            address: None,
            username: "user_42".to_string(),
            pfp_url: Some("https://img/cat.png".to_string()),
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["pfpUrl"], "https://img/cat.png");
        assert!(value.get("pfp_url").is_none());
    }

    #[test]
    fn wallet_connection_flattens_with_user() {
        let now = Utc::now();
        let connection = WalletConnectionWithUser {
            connection: WalletConnection {
                id: Uuid::nil(),
                address: "0xabc".to_string(),
                chain_id: 8453,
                connector: "coinbaseWallet".to_string(),
                user_id: None,
                created_at: now,
                updated_at: now,
            },
            user: None,
        };
        let value = serde_json::to_value(&connection).unwrap();
        assert_eq!(value["chainId"], 8453);
        assert!(value["user"].is_null());
    }
}
