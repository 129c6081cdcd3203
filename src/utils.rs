// Utility helpers shared by the HTTP handlers

use uuid::Uuid;

use crate::{
    constants::{ACTIVITY_LIST_DEFAULT_LIMIT, ACTIVITY_LIST_MAX_LIMIT},
    error::{AppError, Result},
};

/// Defaults a missing activity limit and keeps it inside [1, max].
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(ACTIVITY_LIST_DEFAULT_LIMIT)
        .clamp(1, ACTIVITY_LIST_MAX_LIMIT)
}

pub fn parse_uuid(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {}", field)))
}
