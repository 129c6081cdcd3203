use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

static EXPOSE_ERROR_DETAILS: OnceLock<bool> = OnceLock::new();

/// Enables raw error text in 5xx responses. Called once at startup.
pub fn set_expose_error_details(enabled: bool) {
    let _ = EXPOSE_ERROR_DETAILS.set(enabled);
}

fn expose_error_details() -> bool {
    EXPOSE_ERROR_DETAILS.get().copied().unwrap_or(false)
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Blockchain RPC error: {0}")]
    BlockchainRPC(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unable to create user after {attempts} attempts")]
    CreationExhausted { attempts: u32 },

    #[error("External API error: {0}")]
    ExternalAPI(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::BlockchainRPC(_) => "BLOCKCHAIN_RPC_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::CreationExhausted { .. } => "CREATION_EXHAUSTED",
            AppError::ExternalAPI(_) => "EXTERNAL_API_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    fn from_error(err: &AppError, expose_details: bool) -> Self {
        let (message, details) = match err {
            AppError::AuthError(msg) | AppError::NotFound(msg) | AppError::BadRequest(msg) => {
                (msg.clone(), None)
            }
            _ => (
                "Internal server error".to_string(),
                expose_details.then(|| serde_json::Value::String(err.to_string())),
            ),
        };

        Self {
            success: false,
            error: ErrorDetail {
                code: err.code().to_string(),
                message,
                details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = Json(ErrorResponse::from_error(&self, expose_error_details()));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
