use rand::Rng;
use std::sync::Arc;

use crate::{
    constants::{
        DERIVED_FID_HEX_SUFFIX, FID_PERTURBATION_MAX, MAX_DERIVED_FID,
        PLACEHOLDER_ADDRESS_SUFFIX, USER_CREATE_MAX_ATTEMPTS,
    },
    db::CatStore,
    error::{AppError, Result},
    models::{InsertUserOutcome, NewUser, User, UserUpdate},
};

/// What an inbound request knows about its caller.
#[derive(Debug, Clone, Default)]
pub struct IdentityHint {
    pub address: Option<String>,
    pub fid: Option<i64>,
    pub display_name: Option<String>,
    pub pfp_url: Option<String>,
}

impl IdentityHint {
    pub fn by_fid(fid: i64) -> Self {
        Self {
            fid: Some(fid),
            ..Default::default()
        }
    }

    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

/// Maps a wallet address and/or fid to exactly one user record.
///
/// Lookup order is address first, then fid; a miss on both creates the user.
/// A fid-keyed user that already owns a different address is updated in place
/// and keeps its address, so two identities are never merged.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn CatStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn CatStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_or_create(&self, hint: IdentityHint) -> Result<User> {
        let address = hint
            .address
            .as_deref()
            .map(normalize_wallet_address)
            .transpose()?;
        let display_name = clean_text(hint.display_name);
        let pfp_url = clean_text(hint.pfp_url);

        if address.is_none() && hint.fid.is_none() {
            return Err(AppError::BadRequest(
                "A wallet address or fid is required".to_string(),
            ));
        }
        if let Some(fid) = hint.fid {
            if fid <= 0 {
                return Err(AppError::BadRequest("fid must be positive".to_string()));
            }
        }

        if let Some(address) = &address {
            if let Some(existing) = self.store.find_user_by_address(address).await? {
                let update = UserUpdate {
                    username: display_name,
                    pfp_url,
                    address: None,
                };
                return self.apply_update(existing, &update).await;
            }
        }

        let fid = match hint.fid {
            Some(fid) => {
                if let Some(existing) = self.store.find_user_by_fid(fid).await? {
                    if existing.address.is_some() && address.is_some() && existing.address != address
                    {
                        tracing::warn!(
                            "fid {} already bound to {:?}; keeping it instead of {:?}",
                            fid,
                            existing.address,
                            address
                        );
                    }
                    let update = UserUpdate {
                        username: display_name,
                        pfp_url,
                        address,
                    };
                    return self.apply_update(existing, &update).await;
                }
                fid
            }
            // A derived fid is not an identity; collisions go through the retry loop.
            None => derive_fid_from_address(address.as_deref().unwrap_or_default())?,
        };

        let username = display_name.unwrap_or_else(|| placeholder_username(address.as_deref(), fid));
        self.create_with_retries(NewUser {
            fid,
            address,
            username,
            pfp_url,
        })
        .await
    }

    async fn apply_update(&self, existing: User, update: &UserUpdate) -> Result<User> {
        let changes_anything = update
            .username
            .as_ref()
            .is_some_and(|name| *name != existing.username)
            || (update.pfp_url.is_some() && update.pfp_url != existing.pfp_url)
            || (update.address.is_some() && existing.address.is_none());
        if !changes_anything {
            return Ok(existing);
        }
        self.store.update_user(existing.id, update).await
    }

    async fn create_with_retries(&self, mut user: NewUser) -> Result<User> {
        for attempt in 1..=USER_CREATE_MAX_ATTEMPTS {
            match self.store.insert_user(&user).await? {
                InsertUserOutcome::Created(created) => {
                    tracing::info!("Created user {} (fid {})", created.id, created.fid);
                    return Ok(created);
                }
                InsertUserOutcome::AddressTaken => {
                    // Lost a race against another request for the same wallet.
                    let address = user.address.as_deref().unwrap_or_default();
                    return self
                        .store
                        .find_user_by_address(address)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(format!("User for {} vanished after conflict", address))
                        });
                }
                InsertUserOutcome::FidTaken => {
                    let next = perturb_fid(user.fid, rand::rng().random_range(1..FID_PERTURBATION_MAX));
                    tracing::debug!(
                        "fid {} taken on attempt {}; retrying with {}",
                        user.fid,
                        attempt,
                        next
                    );
                    user.fid = next;
                }
            }
        }

        Err(AppError::CreationExhausted {
            attempts: USER_CREATE_MAX_ATTEMPTS,
        })
    }
}

/// Lowercases and validates an EVM wallet address (`0x` + 40 hex chars).
pub fn normalize_wallet_address(value: &str) -> Result<String> {
    let normalized = value.trim().to_ascii_lowercase();
    let valid = normalized.starts_with("0x")
        && normalized.len() == 42
        && normalized[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::BadRequest(
            "Invalid wallet address format (expected 0x + 40 hex chars)".to_string(),
        ));
    }
    Ok(normalized)
}

/// Pseudo-fid for wallet-only users: the last 8 hex chars of the address,
/// reduced into the positive signed 32-bit range. Not unique.
pub fn derive_fid_from_address(address: &str) -> Result<i64> {
    let suffix_start = address.len().saturating_sub(DERIVED_FID_HEX_SUFFIX);
    let suffix = address.get(suffix_start..).unwrap_or_default();
    let raw = u32::from_str_radix(suffix, 16).map_err(|_| {
        AppError::BadRequest("Wallet address must end in hex digits".to_string())
    })?;
    // Suffixes that reduce to 0 are folded back into the positive range.
    Ok(perturb_fid(i64::from(raw), 0))
}

// Internal helper that keeps retried fids positive and inside the derived range.
fn perturb_fid(fid: i64, offset: i64) -> i64 {
    let next = (fid + offset) % MAX_DERIVED_FID;
    if next <= 0 {
        next + MAX_DERIVED_FID - 1
    } else {
        next
    }
}

pub fn placeholder_username(address: Option<&str>, fid: i64) -> String {
    match address {
        Some(address) => {
            let start = address.len().saturating_sub(PLACEHOLDER_ADDRESS_SUFFIX);
            format!("wallet_{}", &address[start..])
        }
        None => format!("user_{}", fid),
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ADDR_A: &str = "0x00000000000000000000000000000000000000aa";
    const ADDR_B: &str = "0x00000000000000000000000000000000000000bb";

    fn resolver(store: &Arc<MemoryStore>) -> IdentityResolver {
        IdentityResolver::new(store.clone())
    }

    #[test]
    fn derive_fid_uses_last_eight_hex_chars() {
        let fid = derive_fid_from_address("0x1234567890abcdef1234567890abcdef12345678").unwrap();
        assert_eq!(fid, 0x1234_5678);

        // 0xffffffff exceeds i32::MAX and wraps into range
        let wrapped = derive_fid_from_address("0x00000000000000000000000000000000ffffffff").unwrap();
        assert_eq!(wrapped, 0xffff_ffff_i64 % MAX_DERIVED_FID);
        assert!(wrapped <= i64::from(i32::MAX));
    }

    #[test]
    fn derived_fid_is_never_zero() {
        for address in [
            "0x0000000000000000000000000000000000000000",
            "0x000000000000000000000000000000007fffffff",
        ] {
            let fid = derive_fid_from_address(address).unwrap();
            assert!(fid > 0, "{address} derived {fid}");
            assert_eq!(fid, MAX_DERIVED_FID - 1);
        }
    }

    #[test]
    fn normalize_rejects_malformed_addresses() {
        assert!(normalize_wallet_address("0x123").is_err());
        assert!(normalize_wallet_address("1234567890abcdef1234567890abcdef1234567890").is_err());
        assert_eq!(
            normalize_wallet_address("  0xABCDEF0000000000000000000000000000000001 ").unwrap(),
            "0xabcdef0000000000000000000000000000000001"
        );
    }

    #[test]
    fn placeholder_names() {
        assert_eq!(placeholder_username(Some(ADDR_A), 1), "wallet_0000aa");
        assert_eq!(placeholder_username(None, 42), "user_42");
    }

    #[test]
    fn perturbed_fid_stays_in_range() {
        assert_eq!(perturb_fid(10, 5), 15);
        let wrapped = perturb_fid(MAX_DERIVED_FID - 1, 1);
        assert!(wrapped > 0 && wrapped < MAX_DERIVED_FID);
    }

    #[tokio::test]
    async fn same_address_resolves_to_same_user() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        let first = resolver
            .resolve_or_create(IdentityHint::by_address(ADDR_A))
            .await
            .unwrap();
        assert_eq!(first.username, "wallet_0000aa");
        assert_eq!(first.fid, 0xaa);

        let second = resolver
            .resolve_or_create(IdentityHint {
                address: Some(ADDR_A.to_uppercase().replace("0X", "0x")),
                display_name: Some("Mochi".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.address.as_deref(), Some(ADDR_A));
        assert_eq!(second.username, "Mochi");
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn fid_bound_to_other_address_is_updated_not_merged() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        let original = resolver
            .resolve_or_create(IdentityHint {
                address: Some(ADDR_A.to_string()),
                fid: Some(500),
                ..Default::default()
            })
            .await
            .unwrap();

        let resolved = resolver
            .resolve_or_create(IdentityHint {
                address: Some(ADDR_B.to_string()),
                fid: Some(500),
                display_name: Some("Tama".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(resolved.id, original.id);
        assert_eq!(resolved.address.as_deref(), Some(ADDR_A));
        assert_eq!(resolved.username, "Tama");
        assert_eq!(store.user_count().await, 1);
        assert!(store.find_user_by_address(ADDR_B).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fid_user_without_address_gets_address_attached() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        let by_fid = resolver.resolve_or_create(IdentityHint::by_fid(77)).await.unwrap();
        assert_eq!(by_fid.username, "user_77");
        assert!(by_fid.address.is_none());

        let linked = resolver
            .resolve_or_create(IdentityHint {
                address: Some(ADDR_B.to_string()),
                fid: Some(77),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(linked.id, by_fid.id);
        assert_eq!(linked.address.as_deref(), Some(ADDR_B));
    }

    #[tokio::test]
    async fn derived_fid_collision_retries_with_new_fid() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        // fid 0xaa belongs to a fid-only user; the wallet-only caller derives
        // the same fid from ADDR_A and must get its own record.
        let fid_user = resolver.resolve_or_create(IdentityHint::by_fid(0xaa)).await.unwrap();
        let wallet_user = resolver
            .resolve_or_create(IdentityHint::by_address(ADDR_A))
            .await
            .unwrap();

        assert_ne!(wallet_user.id, fid_user.id);
        assert_ne!(wallet_user.fid, fid_user.fid);
        assert_eq!(wallet_user.address.as_deref(), Some(ADDR_A));
        assert!(fid_user.address.is_none());
        assert_eq!(store.user_count().await, 2);
    }

    #[tokio::test]
    async fn missing_identifiers_is_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let result = resolver(&store).resolve_or_create(IdentityHint::default()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_before_writes() {
        let store = Arc::new(MemoryStore::new());
        let result = resolver(&store)
            .resolve_or_create(IdentityHint::by_address("not-a-wallet"))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(store.user_count().await, 0);
    }

    /// Store whose fid column is always taken, with a counter of insert calls.
    struct AlwaysTakenStore {
        inner: MemoryStore,
        inserts: AtomicU32,
    }

    #[async_trait]
    impl CatStore for AlwaysTakenStore {
        async fn ping(&self) -> bool {
            true
        }
        async fn find_user(&self, id: uuid::Uuid) -> Result<Option<User>> {
            self.inner.find_user(id).await
        }
        async fn find_user_by_fid(&self, _fid: i64) -> Result<Option<User>> {
            Ok(None)
        }
        async fn find_user_by_address(&self, address: &str) -> Result<Option<User>> {
            self.inner.find_user_by_address(address).await
        }
        async fn insert_user(&self, _user: &NewUser) -> Result<InsertUserOutcome> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(InsertUserOutcome::FidTaken)
        }
        async fn update_user(&self, id: uuid::Uuid, update: &UserUpdate) -> Result<User> {
            self.inner.update_user(id, update).await
        }
        async fn insert_session(
            &self,
            owner_id: uuid::Uuid,
            partner_id: Option<uuid::Uuid>,
            name: &str,
        ) -> Result<crate::models::CatSession> {
            self.inner.insert_session(owner_id, partner_id, name).await
        }
        async fn delete_session(&self, id: uuid::Uuid) -> Result<()> {
            self.inner.delete_session(id).await
        }
        async fn find_session(&self, id: uuid::Uuid) -> Result<Option<crate::models::CatSession>> {
            self.inner.find_session(id).await
        }
        async fn sessions_for_user(
            &self,
            user_id: uuid::Uuid,
        ) -> Result<Vec<crate::models::CatSession>> {
            self.inner.sessions_for_user(user_id).await
        }
        async fn upsert_stats(
            &self,
            session_id: uuid::Uuid,
            values: crate::models::StatValues,
        ) -> Result<crate::models::CatStats> {
            self.inner.upsert_stats(session_id, values).await
        }
        async fn get_stats(&self, session_id: uuid::Uuid) -> Result<Option<crate::models::CatStats>> {
            self.inner.get_stats(session_id).await
        }
        async fn apply_action_to_stats(
            &self,
            session_id: uuid::Uuid,
            action: crate::models::Action,
        ) -> Result<crate::models::CatStats> {
            self.inner.apply_action_to_stats(session_id, action).await
        }
        async fn insert_activity(
            &self,
            session_id: uuid::Uuid,
            user_id: uuid::Uuid,
            action: crate::models::Action,
        ) -> Result<crate::models::Activity> {
            self.inner.insert_activity(session_id, user_id, action).await
        }
        async fn recent_activities(
            &self,
            session_id: uuid::Uuid,
            limit: i64,
        ) -> Result<Vec<crate::models::ActivityWithUser>> {
            self.inner.recent_activities(session_id, limit).await
        }
        async fn upsert_wallet_connection(
            &self,
            connection: &crate::models::NewWalletConnection,
        ) -> Result<crate::models::WalletConnection> {
            self.inner.upsert_wallet_connection(connection).await
        }
        async fn find_wallet_connection(
            &self,
            address: &str,
        ) -> Result<Option<crate::models::WalletConnectionWithUser>> {
            self.inner.find_wallet_connection(address).await
        }
        async fn insert_log_entry(&self, entry: &crate::models::NewLogEntry) -> Result<()> {
            self.inner.insert_log_entry(entry).await
        }
    }

    #[tokio::test]
    async fn fid_conflicts_exhaust_after_bounded_attempts() {
        let store = Arc::new(AlwaysTakenStore {
            inner: MemoryStore::new(),
            inserts: AtomicU32::new(0),
        });
        let resolver = IdentityResolver::new(store.clone());

        let result = resolver.resolve_or_create(IdentityHint::by_fid(9)).await;
        match result {
            Err(AppError::CreationExhausted { attempts }) => {
                assert_eq!(attempts, USER_CREATE_MAX_ATTEMPTS)
            }
            other => panic!("expected CreationExhausted, got {other:?}"),
        }
        assert_eq!(store.inserts.load(Ordering::SeqCst), USER_CREATE_MAX_ATTEMPTS);
    }
}
