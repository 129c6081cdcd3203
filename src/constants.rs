/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// App identity
pub const DEFAULT_APP_NAME: &str = "onbase-meow";

// Auth (Farcaster Quick Auth)
pub const DEFAULT_QUICK_AUTH_JWKS_URL: &str = "https://auth.farcaster.xyz/.well-known/jwks.json";
pub const DEFAULT_QUICK_AUTH_ISSUER: &str = "https://auth.farcaster.xyz";
pub const JWKS_CACHE_TTL_SECS: u64 = 3600;
/// Unknown kids do not trigger a refetch more often than this.
pub const JWKS_MIN_REFETCH_SECS: u64 = 60;

// Cat stats
pub const STAT_MIN: i32 = 0;
pub const STAT_MAX: i32 = 100;
pub const SEED_LOVE: i32 = 50;
pub const SEED_HUNGER: i32 = 30;
pub const SEED_HAPPINESS: i32 = 75;

// Sessions
pub const DEFAULT_SESSION_NAME: &str = "cattyyy";
pub const QUICK_SESSION_NAME: &str = "Quick Cat Session";
pub const NO_SESSION_SENTINEL: &str = "no-session";
pub const SESSION_DETAIL_ACTIVITY_LIMIT: i64 = 10;
pub const SESSION_LIST_ACTIVITY_LIMIT: i64 = 5;

// Activities
pub const ACTIVITY_LIST_DEFAULT_LIMIT: i64 = 10;
pub const ACTIVITY_LIST_MAX_LIMIT: i64 = 50;

// Identity
pub const MAX_DERIVED_FID: i64 = 2_147_483_647; // keeps fids inside signed 32-bit
pub const DERIVED_FID_HEX_SUFFIX: usize = 8;
pub const PLACEHOLDER_ADDRESS_SUFFIX: usize = 6;
pub const USER_CREATE_MAX_ATTEMPTS: u32 = 10;
pub const FID_PERTURBATION_MAX: i64 = 1000;

// Marketplace
pub const DEFAULT_MARKETPLACE_CHAIN_ID: u64 = 84532; // Base Sepolia
pub const MARKETPLACE_RPC_TIMEOUT_SECS: u64 = 6;
