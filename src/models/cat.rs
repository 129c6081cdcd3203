use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::user::User;
use crate::{
    constants::{SEED_HAPPINESS, SEED_HUNGER, SEED_LOVE},
    error::AppError,
};

// ==================== ACTION ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Feed,
    Cuddle,
    Love,
}

impl Action {
    pub fn all() -> [Self; 3] {
        [Self::Feed, Self::Cuddle, Self::Love]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Cuddle => "cuddle",
            Self::Love => "love",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::BadRequest("Missing action".to_string()));
        }
        Self::all()
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::BadRequest("Invalid action".to_string()))
    }
}

// ==================== STATS ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatValues {
    pub love: i32,
    pub hunger: i32,
    pub happiness: i32,
}

impl StatValues {
    pub const fn seed() -> Self {
        Self {
            love: SEED_LOVE,
            hunger: SEED_HUNGER,
            happiness: SEED_HAPPINESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CatStats {
    pub session_id: Uuid,
    pub love: i32,
    pub hunger: i32,
    pub happiness: i32,
    pub updated_at: DateTime<Utc>,
}

impl CatStats {
    pub fn values(&self) -> StatValues {
        StatValues {
            love: self.love,
            hunger: self.hunger,
            happiness: self.happiness,
        }
    }
}

// ==================== SESSION ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CatSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: CatSession,
    pub owner: User,
    pub partner: Option<User>,
    pub activities: Vec<ActivityWithUser>,
    pub stats: Option<CatStats>,
}

// ==================== ACTIVITY ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityWithUser {
    #[serde(flatten)]
    pub activity: Activity,
    pub user: User,
}
