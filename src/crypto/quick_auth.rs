use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm},
    Algorithm, DecodingKey, Validation,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{
    config::Config,
    constants::{JWKS_CACHE_TTL_SECS, JWKS_MIN_REFETCH_SECS},
    error::{AppError, Result},
    services::identity_resolver::normalize_wallet_address,
};

/// Who the bearer token says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Fid(i64),
    Wallet(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` whenever the token cannot be trusted.
    async fn verify(&self, token: &str) -> Option<Credential>;
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    sub: serde_json::Value,
}

enum KeySource {
    Shared(DecodingKey),
    Jwks {
        url: String,
        client: reqwest::Client,
        cache: RwLock<Option<(Instant, JwkSet)>>,
    },
}

pub struct QuickAuthVerifier {
    keys: KeySource,
    audience: Option<String>,
    issuer: String,
    accept_dev_tokens: bool,
}

impl QuickAuthVerifier {
    pub fn from_config(config: &Config) -> Self {
        let keys = match &config.auth_shared_secret {
            Some(secret) => KeySource::Shared(DecodingKey::from_secret(secret.as_bytes())),
            None => KeySource::Jwks {
                url: config.quick_auth_jwks_url.clone(),
                client: reqwest::Client::new(),
                cache: RwLock::new(None),
            },
        };
        Self {
            keys,
            audience: config.auth_domain(),
            issuer: config.quick_auth_issuer.clone(),
            accept_dev_tokens: config.is_development(),
        }
    }

    async fn verify_jwt(&self, token: &str) -> Result<i64> {
        let header = decode_header(token)
            .map_err(|e| AppError::AuthError(format!("Malformed token: {}", e)))?;

        let (key, algorithm) = match &self.keys {
            KeySource::Shared(key) => (key.clone(), Algorithm::HS256),
            KeySource::Jwks { .. } => {
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| AppError::AuthError("Token has no kid".to_string()))?;
                self.jwk_key(kid).await?
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        match &self.audience {
            Some(domain) => validation.set_audience(&[domain.as_str()]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AppError::AuthError(format!("Invalid or expired token: {}", e)))?;
        fid_from_subject(&data.claims.sub)
            .ok_or_else(|| AppError::AuthError("Token subject is not a fid".to_string()))
    }

    /// Key and algorithm for `kid`; the algorithm comes from the JWK, never
    /// from the token header.
    async fn jwk_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm)> {
        let KeySource::Jwks { url, client, cache } = &self.keys else {
            return Err(AppError::Internal("JWKS lookup without JWKS source".to_string()));
        };
        let ttl = Duration::from_secs(JWKS_CACHE_TTL_SECS);
        let min_refetch = Duration::from_secs(JWKS_MIN_REFETCH_SECS);

        {
            let cached = cache.read().await;
            if let Some((fetched_at, set)) = cached.as_ref() {
                let age = fetched_at.elapsed();
                match set.find(kid) {
                    Some(jwk) if age < ttl => return key_from_jwk(jwk),
                    None if age < min_refetch => {
                        return Err(AppError::AuthError(format!("Unknown signing key {}", kid)));
                    }
                    _ => {}
                }
            }
        }

        // Miss or stale: refetch, which also picks up rotated keys.
        tracing::debug!("Fetching Quick Auth JWKS from {}", url);
        let set: JwkSet = client
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::ExternalAPI(format!("JWKS fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::ExternalAPI(format!("JWKS decode failed: {}", e)))?;

        let key = set
            .find(kid)
            .ok_or_else(|| AppError::AuthError(format!("Unknown signing key {}", kid)))
            .and_then(key_from_jwk);
        *cache.write().await = Some((Instant::now(), set));
        key
    }
}

fn key_from_jwk(jwk: &Jwk) -> Result<(DecodingKey, Algorithm)> {
    let algorithm = jwk_algorithm(jwk)
        .ok_or_else(|| AppError::AuthError("JWK has no usable algorithm".to_string()))?;
    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AppError::AuthError(format!("Unusable JWK: {}", e)))?;
    Ok((key, algorithm))
}

/// Declared `alg` of the key, else the one implied by its key type.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(declared) = &jwk.common.key_algorithm {
        return match declared {
            KeyAlgorithm::HS256 => Some(Algorithm::HS256),
            KeyAlgorithm::HS384 => Some(Algorithm::HS384),
            KeyAlgorithm::HS512 => Some(Algorithm::HS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }
    match &jwk.algorithm {
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        // Symmetric keys must declare their algorithm.
        _ => None,
    }
}

#[async_trait]
impl TokenVerifier for QuickAuthVerifier {
    async fn verify(&self, token: &str) -> Option<Credential> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        if self.accept_dev_tokens {
            if let Some(credential) = parse_dev_token(token) {
                return Some(credential);
            }
        }

        match self.verify_jwt(token).await {
            Ok(fid) => Some(Credential::Fid(fid)),
            Err(e) => {
                tracing::debug!("Token rejected: {}", e);
                None
            }
        }
    }
}

/// Development bearer forms: a bare fid or a wallet address.
fn parse_dev_token(token: &str) -> Option<Credential> {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse::<i64>()
            .ok()
            .filter(|fid| *fid > 0)
            .map(Credential::Fid);
    }
    if token.starts_with("0x") {
        return normalize_wallet_address(token).ok().map(Credential::Wallet);
    }
    None
}

fn fid_from_subject(sub: &serde_json::Value) -> Option<i64> {
    let fid = match sub {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (fid > 0).then_some(fid)
}
