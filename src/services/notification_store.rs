use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, Result},
    models::NotificationDetails,
};

/// Key/value storage for Farcaster push-notification details, keyed by fid.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get(&self, fid: i64) -> Result<Option<NotificationDetails>>;
    async fn set(&self, fid: i64, details: &NotificationDetails) -> Result<()>;
    async fn delete(&self, fid: i64) -> Result<()>;
    async fn ping(&self) -> bool;
}

pub fn notification_key(app_name: &str, fid: i64) -> String {
    format!("{}:user:{}", app_name, fid)
}

// ==================== REDIS ====================

pub struct RedisNotificationStore {
    conn: ConnectionManager,
    app_name: String,
}

impl RedisNotificationStore {
    pub async fn connect(redis_url: &str, app_name: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            app_name: app_name.to_string(),
        })
    }
}

#[async_trait]
impl NotificationStore for RedisNotificationStore {
    async fn get(&self, fid: i64) -> Result<Option<NotificationDetails>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(notification_key(&self.app_name, fid))
            .query_async(&mut conn)
            .await?;
        raw.map(|value| {
            serde_json::from_str(&value)
                .map_err(|e| AppError::Internal(format!("Corrupt notification details: {}", e)))
        })
        .transpose()
    }

    async fn set(&self, fid: i64, details: &NotificationDetails) -> Result<()> {
        let value = serde_json::to_string(details)
            .map_err(|e| AppError::Internal(format!("Failed to encode notification details: {}", e)))?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(notification_key(&self.app_name, fid))
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, fid: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(notification_key(&self.app_name, fid))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

// ==================== IN-MEMORY ====================

pub struct MemoryNotificationStore {
    app_name: String,
    entries: RwLock<HashMap<String, NotificationDetails>>,
}

impl MemoryNotificationStore {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn get(&self, fid: i64) -> Result<Option<NotificationDetails>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&notification_key(&self.app_name, fid)).cloned())
    }

    async fn set(&self, fid: i64, details: &NotificationDetails) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(notification_key(&self.app_name, fid), details.clone());
        Ok(())
    }

    async fn delete(&self, fid: i64) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&notification_key(&self.app_name, fid));
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
