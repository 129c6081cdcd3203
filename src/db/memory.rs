use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CatStore;
use crate::{
    error::{AppError, Result},
    models::*,
    services::stat_engine,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    // sessions and activities keep insertion order, oldest first
    sessions: Vec<CatSession>,
    stats: HashMap<Uuid, CatStats>,
    activities: Vec<Activity>,
    wallet_connections: HashMap<String, WalletConnection>,
    log_entries: Vec<NewLogEntry>,
}

/// Process-local store with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    fail_stats_write: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn stats_count(&self, session_id: Uuid) -> usize {
        let state = self.state.read().await;
        usize::from(state.stats.contains_key(&session_id))
    }

    pub async fn log_entries(&self) -> Vec<NewLogEntry> {
        self.state.read().await.log_entries.clone()
    }

    #[cfg(test)]
    pub(crate) fn fail_next_stats_write(&self) {
        self.fail_stats_write
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl CatStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_fid(&self, fid: i64) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|user| user.fid == fid).cloned())
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|user| user.address.as_deref() == Some(address))
            .cloned())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<InsertUserOutcome> {
        let mut state = self.state.write().await;
        if state.users.values().any(|existing| existing.fid == user.fid) {
            return Ok(InsertUserOutcome::FidTaken);
        }
        if let Some(address) = &user.address {
            if state
                .users
                .values()
                .any(|existing| existing.address.as_ref() == Some(address))
            {
                return Ok(InsertUserOutcome::AddressTaken);
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            fid: user.fid,
            address: user.address.clone(),
            username: user.username.clone(),
            pfp_url: user.pfp_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(InsertUserOutcome::Created(created))
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let mut state = self.state.write().await;
        let attaches_address = update.address.is_some()
            && state.users.get(&id).is_some_and(|user| user.address.is_none());
        if attaches_address
            && state
                .users
                .values()
                .any(|other| other.id != id && other.address == update.address)
        {
            return Err(AppError::Internal(
                "duplicate key value violates users_address_key".to_string(),
            ));
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        if let Some(username) = &update.username {
            user.username = username.clone();
        }
        if let Some(pfp_url) = &update.pfp_url {
            user.pfp_url = Some(pfp_url.clone());
        }
        if user.address.is_none() {
            user.address = update.address.clone();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn insert_session(
        &self,
        owner_id: Uuid,
        partner_id: Option<Uuid>,
        name: &str,
    ) -> Result<CatSession> {
        let mut state = self.state.write().await;
        let session = CatSession {
            id: Uuid::new_v4(),
            owner_id,
            partner_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.sessions.retain(|session| session.id != id);
        state.stats.remove(&id);
        state.activities.retain(|activity| activity.session_id != id);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<CatSession>> {
        let state = self.state.read().await;
        Ok(state.sessions.iter().find(|session| session.id == id).cloned())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<CatSession>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .rev()
            .filter(|session| session.owner_id == user_id || session.partner_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn upsert_stats(&self, session_id: Uuid, values: StatValues) -> Result<CatStats> {
        #[cfg(test)]
        if self
            .fail_stats_write
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(AppError::Internal("stats write failed".to_string()));
        }
        let mut state = self.state.write().await;
        let stats = CatStats {
            session_id,
            love: values.love,
            hunger: values.hunger,
            happiness: values.happiness,
            updated_at: Utc::now(),
        };
        state.stats.insert(session_id, stats.clone());
        Ok(stats)
    }

    async fn get_stats(&self, session_id: Uuid) -> Result<Option<CatStats>> {
        Ok(self.state.read().await.stats.get(&session_id).cloned())
    }

    async fn apply_action_to_stats(&self, session_id: Uuid, action: Action) -> Result<CatStats> {
        let mut state = self.state.write().await;
        let current = state
            .stats
            .get(&session_id)
            .map(CatStats::values)
            .unwrap_or_else(StatValues::seed);
        let next = stat_engine::apply_action(current, action);
        let stats = CatStats {
            session_id,
            love: next.love,
            hunger: next.hunger,
            happiness: next.happiness,
            updated_at: Utc::now(),
        };
        state.stats.insert(session_id, stats.clone());
        Ok(stats)
    }

    async fn insert_activity(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: Action,
    ) -> Result<Activity> {
        let mut state = self.state.write().await;
        let activity = Activity {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            action,
            created_at: Utc::now(),
        };
        state.activities.push(activity.clone());
        Ok(activity)
    }

    async fn recent_activities(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActivityWithUser>> {
        let state = self.state.read().await;
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        state
            .activities
            .iter()
            .rev()
            .filter(|activity| activity.session_id == session_id)
            .take(take)
            .map(|activity| {
                let user = state.users.get(&activity.user_id).cloned().ok_or_else(|| {
                    AppError::Internal(format!("Activity {} references a missing user", activity.id))
                })?;
                Ok(ActivityWithUser {
                    activity: activity.clone(),
                    user,
                })
            })
            .collect()
    }

    async fn upsert_wallet_connection(
        &self,
        connection: &NewWalletConnection,
    ) -> Result<WalletConnection> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let saved = match state.wallet_connections.get(&connection.address) {
            Some(existing) => WalletConnection {
                chain_id: connection.chain_id,
                connector: connection.connector.clone(),
                user_id: connection.user_id,
                updated_at: now,
                ..existing.clone()
            },
            None => WalletConnection {
                id: Uuid::new_v4(),
                address: connection.address.clone(),
                chain_id: connection.chain_id,
                connector: connection.connector.clone(),
                user_id: connection.user_id,
                created_at: now,
                updated_at: now,
            },
        };
        state
            .wallet_connections
            .insert(saved.address.clone(), saved.clone());
        Ok(saved)
    }

    async fn find_wallet_connection(
        &self,
        address: &str,
    ) -> Result<Option<WalletConnectionWithUser>> {
        let state = self.state.read().await;
        Ok(state.wallet_connections.get(address).map(|connection| {
            WalletConnectionWithUser {
                connection: connection.clone(),
                user: connection
                    .user_id
                    .and_then(|user_id| state.users.get(&user_id).cloned()),
            }
        }))
    }

    async fn insert_log_entry(&self, entry: &NewLogEntry) -> Result<()> {
        self.state.write().await.log_entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(fid: i64, address: Option<&str>) -> NewUser {
        NewUser {
            fid,
            address: address.map(str::to_string),
            username: format!("user_{fid}"),
            pfp_url: None,
        }
    }

    #[tokio::test]
    async fn insert_user_enforces_unique_keys() {
        let store = MemoryStore::new();
        let first = store.insert_user(&new_user(1, Some("0xaa"))).await.unwrap();
        assert!(matches!(first, InsertUserOutcome::Created(_)));

        let same_fid = store.insert_user(&new_user(1, None)).await.unwrap();
        assert!(matches!(same_fid, InsertUserOutcome::FidTaken));

        let same_address = store.insert_user(&new_user(2, Some("0xaa"))).await.unwrap();
        assert!(matches!(same_address, InsertUserOutcome::AddressTaken));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn update_user_keeps_existing_address() {
        let store = MemoryStore::new();
        let InsertUserOutcome::Created(user) =
            store.insert_user(&new_user(7, Some("0xaa"))).await.unwrap()
        else {
            panic!("expected created user");
        };

        let update = UserUpdate {
            username: Some("neko".to_string()),
            pfp_url: None,
            address: Some("0xbb".to_string()),
        };
        let updated = store.update_user(user.id, &update).await.unwrap();
        assert_eq!(updated.username, "neko");
        assert_eq!(updated.address.as_deref(), Some("0xaa"));
    }

    #[tokio::test]
    async fn apply_action_seeds_missing_stats() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let stats = store
            .apply_action_to_stats(session_id, Action::Feed)
            .await
            .unwrap();
        assert_eq!(stats.values(), StatValues { love: 50, hunger: 50, happiness: 80 });
        assert_eq!(store.stats_count(session_id).await, 1);
    }

    #[tokio::test]
    async fn wallet_connection_upsert_overwrites() {
        let store = MemoryStore::new();
        let first = store
            .upsert_wallet_connection(&NewWalletConnection {
                address: "0xaa".to_string(),
                chain_id: 8453,
                connector: "injected".to_string(),
                user_id: None,
            })
            .await
            .unwrap();
        let user_id = Uuid::new_v4();
        let second = store
            .upsert_wallet_connection(&NewWalletConnection {
                address: "0xaa".to_string(),
                chain_id: 84532,
                connector: "coinbaseWallet".to_string(),
                user_id: Some(user_id),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.chain_id, 84532);
        assert_eq!(second.connector, "coinbaseWallet");
        assert_eq!(second.user_id, Some(user_id));
    }
}
