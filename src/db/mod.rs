use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::*,
    services::stat_engine::{self, StatDelta},
};

pub mod memory;

pub use memory::MemoryStore;

const USERS_FID_CONSTRAINT: &str = "users_fid_key";
const USERS_ADDRESS_CONSTRAINT: &str = "users_address_key";

/// Persistence boundary for users, sessions, stats, activities, wallet
/// connections and the diagnostic log.
#[async_trait]
pub trait CatStore: Send + Sync {
    async fn ping(&self) -> bool;

    // users
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_fid(&self, fid: i64) -> Result<Option<User>>;
    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &NewUser) -> Result<InsertUserOutcome>;
    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User>;

    // sessions
    async fn insert_session(
        &self,
        owner_id: Uuid,
        partner_id: Option<Uuid>,
        name: &str,
    ) -> Result<CatSession>;
    async fn delete_session(&self, id: Uuid) -> Result<()>;
    async fn find_session(&self, id: Uuid) -> Result<Option<CatSession>>;
    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<CatSession>>;

    // stats
    async fn upsert_stats(&self, session_id: Uuid, values: StatValues) -> Result<CatStats>;
    async fn get_stats(&self, session_id: Uuid) -> Result<Option<CatStats>>;
    /// Applies the action's delta in one atomic step, seeding the row first
    /// when the session has no stats yet.
    async fn apply_action_to_stats(&self, session_id: Uuid, action: Action) -> Result<CatStats>;

    // activities
    async fn insert_activity(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: Action,
    ) -> Result<Activity>;
    async fn recent_activities(&self, session_id: Uuid, limit: i64)
        -> Result<Vec<ActivityWithUser>>;

    // wallet connections
    async fn upsert_wallet_connection(
        &self,
        connection: &NewWalletConnection,
    ) -> Result<WalletConnection>;
    async fn find_wallet_connection(
        &self,
        address: &str,
    ) -> Result<Option<WalletConnectionWithUser>>;

    // diagnostic log
    async fn insert_log_entry(&self, entry: &NewLogEntry) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    action: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = AppError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        let action = row
            .action
            .parse::<Action>()
            .map_err(|_| AppError::Internal(format!("Unknown stored action: {}", row.action)))?;
        Ok(Activity {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            action,
            created_at: row.created_at,
        })
    }
}

fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl CatStore for Database {
    async fn ping(&self) -> bool {
        self.pool.acquire().await.is_ok()
    }

    // ==================== USER QUERIES ====================
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_fid(&self, fid: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE fid = $1")
            .bind(fid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_address(&self, address: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<InsertUserOutcome> {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (fid, address, username, pfp_url)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(user.fid)
        .bind(&user.address)
        .bind(&user.username)
        .bind(&user.pfp_url)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(InsertUserOutcome::Created(created)),
            Err(err) => match unique_violation_constraint(&err).as_deref() {
                Some(USERS_FID_CONSTRAINT) => Ok(InsertUserOutcome::FidTaken),
                Some(USERS_ADDRESS_CONSTRAINT) => Ok(InsertUserOutcome::AddressTaken),
                _ => Err(err.into()),
            },
        }
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username   = COALESCE($2, username),
                pfp_url    = COALESCE($3, pfp_url),
                address    = COALESCE(address, $4),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.username)
        .bind(&update.pfp_url)
        .bind(&update.address)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    // ==================== SESSION QUERIES ====================
    async fn insert_session(
        &self,
        owner_id: Uuid,
        partner_id: Option<Uuid>,
        name: &str,
    ) -> Result<CatSession> {
        let session = sqlx::query_as::<_, CatSession>(
            "INSERT INTO cat_sessions (owner_id, partner_id, name)
             VALUES ($1, $2, $3)
             RETURNING id, owner_id, partner_id, name, created_at",
        )
        .bind(owner_id)
        .bind(partner_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cat_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<CatSession>> {
        let session = sqlx::query_as::<_, CatSession>(
            "SELECT id, owner_id, partner_id, name, created_at FROM cat_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<CatSession>> {
        let sessions = sqlx::query_as::<_, CatSession>(
            "SELECT id, owner_id, partner_id, name, created_at FROM cat_sessions
             WHERE owner_id = $1 OR partner_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    // ==================== STATS QUERIES ====================
    async fn upsert_stats(&self, session_id: Uuid, values: StatValues) -> Result<CatStats> {
        let stats = sqlx::query_as::<_, CatStats>(
            r#"
            INSERT INTO cat_stats (session_id, love, hunger, happiness)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id) DO UPDATE
            SET love       = EXCLUDED.love,
                hunger     = EXCLUDED.hunger,
                happiness  = EXCLUDED.happiness,
                updated_at = NOW()
            RETURNING session_id, love, hunger, happiness, updated_at
            "#,
        )
        .bind(session_id)
        .bind(values.love)
        .bind(values.hunger)
        .bind(values.happiness)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn get_stats(&self, session_id: Uuid) -> Result<Option<CatStats>> {
        let stats = sqlx::query_as::<_, CatStats>(
            "SELECT session_id, love, hunger, happiness, updated_at
             FROM cat_stats WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn apply_action_to_stats(&self, session_id: Uuid, action: Action) -> Result<CatStats> {
        // Row-level upsert keeps concurrent activities on one session from
        // losing updates.
        let seeded = stat_engine::apply_action(StatValues::seed(), action);
        let delta = StatDelta::for_action(action);

        let stats = sqlx::query_as::<_, CatStats>(
            r#"
            INSERT INTO cat_stats (session_id, love, hunger, happiness)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id) DO UPDATE
            SET love       = LEAST(100, cat_stats.love + $5),
                hunger     = LEAST(100, cat_stats.hunger + $6),
                happiness  = LEAST(100, cat_stats.happiness + $7),
                updated_at = NOW()
            RETURNING session_id, love, hunger, happiness, updated_at
            "#,
        )
        .bind(session_id)
        .bind(seeded.love)
        .bind(seeded.hunger)
        .bind(seeded.happiness)
        .bind(delta.love)
        .bind(delta.hunger)
        .bind(delta.happiness)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    // ==================== ACTIVITY QUERIES ====================
    async fn insert_activity(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        action: Action,
    ) -> Result<Activity> {
        let row = sqlx::query_as::<_, ActivityRow>(
            "INSERT INTO activities (session_id, user_id, action)
             VALUES ($1, $2, $3)
             RETURNING id, session_id, user_id, action, created_at",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(action.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn recent_activities(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActivityWithUser>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, session_id, user_id, action, created_at FROM activities
             WHERE session_id = $1
             ORDER BY created_at DESC, seq DESC
             LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut user_ids: Vec<Uuid> = rows.iter().map(|row| row.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users = self.users_by_ids(&user_ids).await?;

        rows.into_iter()
            .map(|row| {
                let user = users.get(&row.user_id).cloned().ok_or_else(|| {
                    AppError::Internal(format!("Activity {} references a missing user", row.id))
                })?;
                Ok(ActivityWithUser {
                    activity: row.try_into()?,
                    user,
                })
            })
            .collect()
    }

    // ==================== WALLET CONNECTION QUERIES ====================
    async fn upsert_wallet_connection(
        &self,
        connection: &NewWalletConnection,
    ) -> Result<WalletConnection> {
        let saved = sqlx::query_as::<_, WalletConnection>(
            r#"
            INSERT INTO wallet_connections (address, chain_id, connector, user_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address) DO UPDATE
            SET chain_id   = EXCLUDED.chain_id,
                connector  = EXCLUDED.connector,
                user_id    = EXCLUDED.user_id,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&connection.address)
        .bind(connection.chain_id)
        .bind(&connection.connector)
        .bind(connection.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn find_wallet_connection(
        &self,
        address: &str,
    ) -> Result<Option<WalletConnectionWithUser>> {
        let connection = sqlx::query_as::<_, WalletConnection>(
            "SELECT * FROM wallet_connections WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        let Some(connection) = connection else {
            return Ok(None);
        };
        let user = match connection.user_id {
            Some(user_id) => self.find_user(user_id).await?,
            None => None,
        };
        Ok(Some(WalletConnectionWithUser { connection, user }))
    }

    // ==================== LOG QUERIES ====================
    async fn insert_log_entry(&self, entry: &NewLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO log_entries (level, message, context, fid)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.context)
        .bind(entry.fid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let mut config = crate::config::test_config();
        config.database_url = Some("not-a-url".to_string());
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn database_new_requires_url() {
        let config = crate::config::test_config();
        assert!(Database::new(&config).await.is_err());
    }

    fn random_address() -> String {
        format!("0x00000000{}", Uuid::new_v4().simple())
    }

    async fn insert(db: &Database, fid: i64, address: Option<String>) -> User {
        let outcome = db
            .insert_user(&NewUser {
                fid,
                address,
                username: format!("user_{}", fid),
                pfp_url: None,
            })
            .await
            .unwrap();
        match outcome {
            InsertUserOutcome::Created(user) => user,
            other => panic!("unexpected insert outcome: {:?}", other),
        }
    }

    /// Needs a disposable Postgres: `DATABASE_URL=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn postgres_keeps_address_and_clamps_stats() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let mut config = crate::config::test_config();
        config.database_url = Some(url);
        let db = Database::new(&config).await.unwrap();
        db.run_migrations().await.unwrap();

        use rand::Rng;
        let base_fid = rand::rng().random_range(1_000_000..1_000_000_000i64);

        // An existing address is never replaced; a missing one is attached.
        let original = random_address();
        let with_address = insert(&db, base_fid, Some(original.clone())).await;
        let updated = db
            .update_user(
                with_address.id,
                &UserUpdate {
                    address: Some(random_address()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.address.as_deref(), Some(original.as_str()));

        let bare = insert(&db, base_fid + 1, None).await;
        let attached = random_address();
        let updated = db
            .update_user(
                bare.id,
                &UserUpdate {
                    address: Some(attached.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.address.as_deref(), Some(attached.as_str()));

        let taken = db
            .insert_user(&NewUser {
                fid: base_fid + 2,
                address: Some(original),
                username: "dup".to_string(),
                pfp_url: None,
            })
            .await
            .unwrap();
        assert!(matches!(taken, InsertUserOutcome::AddressTaken));

        // Stat updates are clamped inside the upsert.
        let session = db.insert_session(bare.id, None, "pg-test").await.unwrap();
        db.upsert_stats(
            session.id,
            StatValues { love: 50, hunger: 95, happiness: 75 },
        )
        .await
        .unwrap();
        let stats = db
            .apply_action_to_stats(session.id, Action::Feed)
            .await
            .unwrap();
        assert_eq!(
            stats.values(),
            StatValues { love: 50, hunger: 100, happiness: 80 }
        );

        db.delete_session(session.id).await.unwrap();
    }

    #[test]
    fn stored_action_text_maps_back() {
        let row = ActivityRow {
            id: Uuid::nil(),
            session_id: Uuid::nil(),
            user_id: Uuid::nil(),
            action: "cuddle".to_string(),
            created_at: chrono::Utc::now(),
        };
        let activity = Activity::try_from(row).unwrap();
        assert_eq!(activity.action, Action::Cuddle);
    }

    #[test]
    fn corrupt_stored_action_is_internal_error() {
        let row = ActivityRow {
            id: Uuid::nil(),
            session_id: Uuid::nil(),
            user_id: Uuid::nil(),
            action: "nap".to_string(),
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(Activity::try_from(row), Err(AppError::Internal(_))));
    }
}
