use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::CatStore,
    error::{AppError, Result},
    models::{Action, ActivityWithUser, CatStats},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedActivity {
    pub activity: ActivityWithUser,
    pub stats: CatStats,
}

/// Records actions against a session and feeds them through the stat engine.
#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn CatStore>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn CatStore>) -> Self {
        Self { store }
    }

    pub async fn log_activity(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: Action,
    ) -> Result<LoggedActivity> {
        if self.store.find_session(session_id).await?.is_none() {
            return Err(AppError::NotFound("Cat session not found".to_string()));
        }
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let activity = self
            .store
            .insert_activity(session_id, user_id, action)
            .await?;
        let stats = self.store.apply_action_to_stats(session_id, action).await?;

        tracing::debug!(
            "Session {}: {} by {} -> love={} hunger={} happiness={}",
            session_id,
            action,
            user.username,
            stats.love,
            stats.hunger,
            stats.happiness
        );

        Ok(LoggedActivity {
            activity: ActivityWithUser { activity, user },
            stats,
        })
    }

    /// Newest-first activities of one session, each with its acting user.
    pub async fn list_activities(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActivityWithUser>> {
        if self.store.find_session(session_id).await?.is_none() {
            return Err(AppError::NotFound("Cat session not found".to_string()));
        }
        self.store.recent_activities(session_id, limit).await
    }
}
