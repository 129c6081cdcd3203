pub mod quick_auth;

pub use quick_auth::{Credential, QuickAuthVerifier, TokenVerifier};
