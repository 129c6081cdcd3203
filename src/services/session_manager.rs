use std::sync::Arc;
use uuid::Uuid;

use crate::{
    constants::{DEFAULT_SESSION_NAME, SESSION_DETAIL_ACTIVITY_LIMIT, SESSION_LIST_ACTIVITY_LIMIT},
    db::CatStore,
    error::{AppError, Result},
    models::{CatSession, SessionDetail, StatValues},
};

/// Creates cat sessions together with their seed stats and assembles the
/// session views returned by the API.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CatStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CatStore>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        owner_id: Uuid,
        partner_id: Option<Uuid>,
        name: Option<&str>,
    ) -> Result<SessionDetail> {
        if partner_id == Some(owner_id) {
            return Err(AppError::BadRequest(
                "A cat cannot be co-parented with yourself".to_string(),
            ));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_SESSION_NAME);

        let session = self.store.insert_session(owner_id, partner_id, name).await?;

        // Every session must own a stats row; undo the session if seeding fails.
        if let Err(e) = self.store.upsert_stats(session.id, StatValues::seed()).await {
            tracing::error!("Seeding stats for session {} failed: {}", session.id, e);
            if let Err(cleanup) = self.store.delete_session(session.id).await {
                tracing::error!(
                    "Compensating delete of session {} failed: {}",
                    session.id,
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("Created cat session {} for owner {}", session.id, owner_id);
        self.detail(session, SESSION_DETAIL_ACTIVITY_LIMIT).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionDetail> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Cat session not found".to_string()))?;
        self.detail(session, SESSION_DETAIL_ACTIVITY_LIMIT).await
    }

    /// Sessions the user owns or co-parents, newest first.
    pub async fn list_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<SessionDetail>> {
        let sessions = self.store.sessions_for_user(user_id).await?;
        let mut details = Vec::with_capacity(sessions.len());
        for session in sessions {
            details.push(self.detail(session, SESSION_LIST_ACTIVITY_LIMIT).await?);
        }
        Ok(details)
    }

    async fn detail(&self, session: CatSession, activity_limit: i64) -> Result<SessionDetail> {
        let owner = self
            .store
            .find_user(session.owner_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Owner of session {} missing", session.id)))?;
        let partner = match session.partner_id {
            Some(partner_id) => self.store.find_user(partner_id).await?,
            None => None,
        };
        let activities = self
            .store
            .recent_activities(session.id, activity_limit)
            .await?;
        let stats = self.store.get_stats(session.id).await?;

        Ok(SessionDetail {
            session,
            owner,
            partner,
            activities,
            stats,
        })
    }
}
