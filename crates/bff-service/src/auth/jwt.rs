//! Access-token verification.
//!
//! Validates externally issued tokens against keys from the [`KeySetCache`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must be on the configured allow-list and match the
//!   selected key's type; `none` and HMAC can never be allowed
//! - Issuer must match exactly, audience must be contained
//! - `exp` (and `nbf` when present) are checked with a fixed leeway
//! - Callers only ever see a generic 401; the failure kind is logged

use crate::auth::claims::Claims;
use crate::auth::jwks::{KeySetCache, KeySetError};
use crate::auth::principal::Principal;
use crate::auth::roles::RoleResolver;
use crate::observability::metrics;
use common::jwt::{inspect_header, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Claims every accepted token must carry.
const REQUIRED_CLAIMS: [&str; 4] = ["exp", "iss", "aud", "sub"];

/// Why a token was rejected.
///
/// Every variant renders the same message; use [`AuthError::kind`] for
/// logs, metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("The access token is invalid or expired")]
    MissingToken,
    #[error("The access token is invalid or expired")]
    TokenTooLarge,
    #[error("The access token is invalid or expired")]
    MalformedToken,
    #[error("The access token is invalid or expired")]
    MissingKid,
    #[error("The access token is invalid or expired")]
    DisallowedAlgorithm,
    #[error("The access token is invalid or expired")]
    KeyUnavailable,
    #[error("The access token is invalid or expired")]
    InvalidSignature,
    #[error("The access token is invalid or expired")]
    InvalidIssuer,
    #[error("The access token is invalid or expired")]
    InvalidAudience,
    #[error("The access token is invalid or expired")]
    Expired,
    #[error("The access token is invalid or expired")]
    NotYetValid,
    #[error("The access token is invalid or expired")]
    InvalidClaims,
}

impl AuthError {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::TokenTooLarge => "token_too_large",
            AuthError::MalformedToken => "malformed_token",
            AuthError::MissingKid => "missing_kid",
            AuthError::DisallowedAlgorithm => "disallowed_algorithm",
            AuthError::KeyUnavailable => "key_unavailable",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::Expired => "expired",
            AuthError::NotYetValid => "not_yet_valid",
            AuthError::InvalidClaims => "invalid_claims",
        }
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge => AuthError::TokenTooLarge,
            JwtValidationError::MalformedToken => AuthError::MalformedToken,
            JwtValidationError::MissingKid => AuthError::MissingKid,
            JwtValidationError::DisallowedAlgorithm => AuthError::DisallowedAlgorithm,
        }
    }
}

impl From<KeySetError> for AuthError {
    fn from(_: KeySetError) -> Self {
        AuthError::KeyUnavailable
    }
}

fn map_decode_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidAlgorithm => AuthError::DisallowedAlgorithm,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            AuthError::MalformedToken
        }
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
            AuthError::KeyUnavailable
        }
        _ => AuthError::InvalidClaims,
    }
}

/// Verification settings fixed at startup.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub issuer: String,
    pub audience: String,
    pub leeway: Duration,
    pub allowed_algorithms: Vec<Algorithm>,
}

/// Validates bearer tokens and builds the request [`Principal`].
pub struct TokenVerifier {
    key_set: Arc<KeySetCache>,
    roles: RoleResolver,
    config: VerifierConfig,
}

impl TokenVerifier {
    pub fn new(key_set: Arc<KeySetCache>, roles: RoleResolver, config: VerifierConfig) -> Self {
        Self {
            key_set,
            roles,
            config,
        }
    }

    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.key_set
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as an [`AuthError`]. Checks run in
    /// this order: size and shape, algorithm allow-list, key lookup (may
    /// refresh the key set), key/algorithm compatibility, signature,
    /// issuer, audience, time window, required claims.
    #[instrument(skip_all, name = "bff.auth.verify")]
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let result = self.verify_inner(token).await;

        match &result {
            Ok(_) => {
                metrics::record_token_validation("success");
                tracing::debug!(target: "bff.auth.jwt", "Token validated successfully");
            }
            Err(e) => {
                metrics::record_token_validation(e.kind());
                tracing::debug!(target: "bff.auth.jwt", kind = e.kind(), "Token rejected");
            }
        }

        result
    }

    /// Verify `token` and resolve the caller's role set.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify`].
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.verify(token).await?;
        let roles = self.roles.resolve(&claims);
        Ok(Principal::from_claims(&claims, roles))
    }

    async fn verify_inner(&self, token: &str) -> Result<Claims, AuthError> {
        let header = inspect_header(token)?;

        if !self.config.allowed_algorithms.contains(&header.alg) {
            tracing::debug!(target: "bff.auth.jwt", alg = ?header.alg, "Algorithm not on allow-list");
            return Err(AuthError::DisallowedAlgorithm);
        }

        let key = self.key_set.get(&header.kid).await.map_err(|e| {
            tracing::debug!(target: "bff.auth.jwt", kid = %header.kid, error = %e, "No verification key");
            AuthError::from(e)
        })?;

        if !key.accepts(header.alg) {
            tracing::warn!(
                target: "bff.auth.jwt",
                kid = %header.kid,
                alg = ?header.alg,
                family = ?key.family,
                "Token algorithm does not match key"
            );
            return Err(AuthError::DisallowedAlgorithm);
        }

        let validation = self.validation_for(header.alg);

        decode::<Claims>(token, &key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| map_decode_error(e.kind()))
    }

    fn validation_for(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.algorithms = vec![alg];
        validation.leeway = self.config.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(REQUIRED_CLAIMS.as_slice());
        validation
    }
}
