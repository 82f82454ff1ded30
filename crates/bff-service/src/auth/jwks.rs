//! Key set cache for verifying access tokens.
//!
//! Fetches the identity provider's JWKS document and keeps the parsed
//! verification keys in memory.
//!
//! # Refresh policy
//!
//! - A scheduled refresh (see `tasks::jwks_refresher`) re-fetches the whole
//!   set on a fixed interval regardless of misses.
//! - A lookup miss triggers a refresh only if the rate-limit window has
//!   elapsed since the last attempt, then retries the lookup once.
//! - A failed fetch never discards the current keys.
//!
//! # Concurrency
//!
//! Readers clone an `Arc` snapshot under a short read lock. A refresh does
//! its network I/O without holding that lock and swaps the snapshot in when
//! done, so lookups are never blocked by an in-progress fetch. At most one
//! refresh runs at a time.

use crate::observability::metrics;
use common::jwt::decode_jwk_component;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Default scheduled refresh interval (1 hour).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Default minimum spacing between miss-triggered refreshes (5 minutes).
pub const DEFAULT_REFRESH_RATE_LIMIT: Duration = Duration::from_secs(300);

/// Default timeout for one key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Stand-in for a rate limit too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Errors from the key set cache.
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("key not found")]
    KeyNotFound,

    #[error("key set fetch failed: {0}")]
    FetchFailed(String),
}

/// What caused a refresh; used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Initial,
    Scheduled,
    Miss,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Initial => "initial",
            RefreshTrigger::Scheduled => "scheduled",
            RefreshTrigger::Miss => "miss",
        }
    }
}

/// Key-set cache settings.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    pub jwks_url: String,
    pub refresh_interval: Duration,
    pub refresh_rate_limit: Duration,
    pub fetch_timeout: Duration,
}

impl KeySetConfig {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_rate_limit: DEFAULT_REFRESH_RATE_LIMIT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Key family a JWK decodes to; a token's `alg` must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Ed25519,
}

impl KeyFamily {
    pub fn supports(&self, alg: Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::Ec => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            KeyFamily::Ed25519 => alg == Algorithm::EdDSA,
        }
    }
}

/// A parsed public verification key.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: String,
    pub family: KeyFamily,
    /// Algorithm pinned by the JWK's `alg` member, if present.
    pub alg: Option<Algorithm>,
    pub decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Whether this key may verify a token declaring `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.supports(alg) && self.alg.map_or(true, |pinned| pinned == alg)
    }
}

/// JSON Web Key as published by the key-distribution endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

impl Jwk {
    /// Convert to a verification key, or say why the entry is unusable.
    pub fn to_verification_key(&self) -> Result<VerificationKey, String> {
        let kid = self
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or("missing kid")?
            .to_string();

        if let Some(key_use) = &self.key_use {
            if key_use != "sig" {
                return Err(format!("unsupported use '{key_use}'"));
            }
        }

        let alg = match self.alg.as_deref() {
            Some(name) => {
                Some(Algorithm::from_str(name).map_err(|_| format!("unknown alg '{name}'"))?)
            }
            None => None,
        };

        let (family, decoding_key) = match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => {
                let n = required(&self.n, "n")?;
                let e = required(&self.e, "e")?;
                (
                    KeyFamily::Rsa,
                    DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?,
                )
            }
            ("EC", Some("P-256" | "P-384")) => {
                let x = required(&self.x, "x")?;
                let y = required(&self.y, "y")?;
                (
                    KeyFamily::Ec,
                    DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?,
                )
            }
            ("OKP", Some("Ed25519")) => {
                let x = required(&self.x, "x")?;
                if decode_jwk_component(x).map_err(|e| e.to_string())?.len() != 32 {
                    return Err("Ed25519 key must be 32 bytes".to_string());
                }
                (
                    KeyFamily::Ed25519,
                    DecodingKey::from_ed_components(x).map_err(|e| e.to_string())?,
                )
            }
            (kty, crv) => return Err(format!("unsupported key type {kty}/{crv:?}")),
        };

        let key = VerificationKey {
            kid,
            family,
            alg,
            decoding_key,
        };

        if let Some(pinned) = key.alg {
            if !key.family.supports(pinned) {
                return Err(format!("alg {pinned:?} does not match key type"));
            }
        }

        Ok(key)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {name}"))
}

/// Immutable snapshot of the cached keys.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub keys: Arc<HashMap<String, Arc<VerificationKey>>>,
    /// When the current key set was fetched (`None` before the first success).
    pub fetched_at: Option<Instant>,
    /// Earliest instant a miss may trigger another fetch.
    pub next_refresh_allowed_at: Instant,
}

impl KeyMaterial {
    fn empty(now: Instant) -> Self {
        Self {
            keys: Arc::new(HashMap::new()),
            fetched_at: None,
            next_refresh_allowed_at: now,
        }
    }
}

/// Shared cache of verification keys, fetched from a remote JWKS endpoint.
pub struct KeySetCache {
    config: KeySetConfig,
    http_client: reqwest::Client,
    snapshot: RwLock<Arc<KeyMaterial>>,
    refresh_lock: Mutex<()>,
}

impl KeySetCache {
    /// Create an empty cache. Call [`KeySetCache::initialize`] before use.
    pub fn new(config: KeySetConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "bff.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            config,
            http_client,
            snapshot: RwLock::new(Arc::new(KeyMaterial::empty(Instant::now()))),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Create a cache and perform the first fetch.
    ///
    /// # Errors
    ///
    /// Returns `KeySetError::FetchFailed` if the first fetch fails or yields
    /// no usable keys. Without keys no request can be authenticated, so the
    /// caller should treat this as fatal.
    pub async fn initialize(config: KeySetConfig) -> Result<Self, KeySetError> {
        let cache = Self::new(config);
        cache.refresh(RefreshTrigger::Initial).await?;
        Ok(cache)
    }

    pub fn config(&self) -> &KeySetConfig {
        &self.config
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> Arc<KeyMaterial> {
        self.snapshot.read().await.clone()
    }

    /// Number of keys in the current snapshot.
    pub async fn key_count(&self) -> usize {
        self.snapshot().await.keys.len()
    }

    /// Look up a key by `kid`.
    ///
    /// On a miss, refreshes if the rate-limit window allows and retries once.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` - kid absent and no refresh allowed, or still absent after refresh
    /// - `FetchFailed` - the miss-triggered refresh failed
    #[instrument(skip_all, name = "bff.auth.jwks.get", fields(kid = %kid))]
    pub async fn get(&self, kid: &str) -> Result<Arc<VerificationKey>, KeySetError> {
        let snapshot = self.snapshot().await;
        if let Some(key) = snapshot.keys.get(kid) {
            tracing::trace!(target: "bff.auth.jwks", kid = %kid, "Key cache hit");
            return Ok(key.clone());
        }

        if Instant::now() < snapshot.next_refresh_allowed_at {
            tracing::debug!(target: "bff.auth.jwks", kid = %kid, "Key not cached and refresh is rate limited");
            return Err(KeySetError::KeyNotFound);
        }

        self.refresh(RefreshTrigger::Miss).await?;

        self.snapshot()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(target: "bff.auth.jwks", kid = %kid, "Key not found after refresh");
                KeySetError::KeyNotFound
            })
    }

    /// Fetch the key set and replace the snapshot.
    ///
    /// A miss-triggered refresh that finds the rate-limit window closed
    /// (because a concurrent caller just refreshed) returns without fetching.
    /// On failure the existing keys are kept.
    ///
    /// # Errors
    ///
    /// Returns `KeySetError::FetchFailed` if the fetch fails.
    #[instrument(skip_all, name = "bff.auth.jwks.refresh", fields(trigger = trigger.as_str()))]
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<usize, KeySetError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.snapshot().await;
        if trigger == RefreshTrigger::Miss && Instant::now() < current.next_refresh_allowed_at {
            tracing::debug!(target: "bff.auth.jwks", "Concurrent refresh already completed, skipping");
            return Ok(current.keys.len());
        }

        let result = self.fetch().await;
        let now = Instant::now();
        let next_refresh_allowed_at = now
            .checked_add(self.config.refresh_rate_limit)
            .unwrap_or_else(|| now + FAR_FUTURE);

        match result {
            Ok(keys) => {
                let count = keys.len();
                *self.snapshot.write().await = Arc::new(KeyMaterial {
                    keys: Arc::new(keys),
                    fetched_at: Some(now),
                    next_refresh_allowed_at,
                });
                metrics::record_jwks_refresh(trigger.as_str(), "success");
                tracing::info!(target: "bff.auth.jwks", key_count = count, trigger = trigger.as_str(), "JWKS cache refreshed");
                Ok(count)
            }
            Err(e) => {
                *self.snapshot.write().await = Arc::new(KeyMaterial {
                    keys: current.keys.clone(),
                    fetched_at: current.fetched_at,
                    next_refresh_allowed_at,
                });
                metrics::record_jwks_refresh(trigger.as_str(), "error");
                tracing::warn!(
                    target: "bff.auth.jwks",
                    error = %e,
                    trigger = trigger.as_str(),
                    retained_keys = current.keys.len(),
                    "JWKS refresh failed, keeping previous keys"
                );
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<HashMap<String, Arc<VerificationKey>>, KeySetError> {
        tracing::debug!(target: "bff.auth.jwks", url = %self.config.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.config.jwks_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeySetError::FetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::FetchFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeySetError::FetchFailed(format!("invalid JWKS document: {e}")))?;

        let mut keys = HashMap::with_capacity(document.keys.len());
        for jwk in &document.keys {
            match jwk.to_verification_key() {
                Ok(key) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(reason) => {
                    tracing::warn!(target: "bff.auth.jwks", kid = ?jwk.kid, kty = %jwk.kty, reason = %reason, "Skipping unusable JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(KeySetError::FetchFailed(
                "JWKS contained no usable keys".to_string(),
            ));
        }

        Ok(keys)
    }
}
