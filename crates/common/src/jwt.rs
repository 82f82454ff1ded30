//! JWT utilities shared across the BFF crates.
//!
//! This module provides the parts of token handling that do not depend on
//! any key material:
//! - Size limits for DoS prevention
//! - Leeway constants for time-based claim validation
//! - Unverified header inspection (`alg`, `kid`) for key lookup
//! - Parsing of the signing-algorithm allow-list
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - `none` and symmetric (HMAC) algorithms can never enter the allow-list
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{inspect_header, parse_allowed_algorithms};
//!
//! let allowed = parse_allowed_algorithms("RS256")?;
//! let header = inspect_header(token)?;
//! if !allowed.contains(&header.alg) {
//!     return Err("algorithm not allowed");
//! }
//! let kid = header.kid;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Identity-provider access tokens with a handful of
/// realm and client roles are typically 1-2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default leeway applied to `exp` and `nbf` checks.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);

/// Maximum configurable leeway (10 minutes).
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

/// Default signing-algorithm allow-list.
pub const DEFAULT_ALLOWED_ALGORITHMS: &str = "RS256";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before verification.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header declares an algorithm that is unknown or not permitted.
    #[error("The access token is invalid or expired")]
    DisallowedAlgorithm,
}

/// Errors from parsing an algorithm allow-list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmListError {
    #[error("algorithm allow-list is empty")]
    Empty,

    #[error("unknown signing algorithm '{0}'")]
    Unknown(String),

    #[error("signing algorithm '{0}' is not permitted for externally issued tokens")]
    NotPermitted(String),
}

// =============================================================================
// Header inspection
// =============================================================================

/// The unverified JOSE header fields needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm.
    pub alg: Algorithm,

    /// Declared key ID.
    pub kid: String,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
    kid: Option<serde_json::Value>,
}

fn decode_raw_header(token: &str) -> Result<RawHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })
}

/// Read `alg` and `kid` from a JWT header without verifying the signature.
///
/// The returned values are untrusted: `kid` may only be used as a lookup
/// key into a trusted key set, and `alg` must still be checked against the
/// allow-list before any verification.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong structure, bad base64 or invalid JSON
/// - `DisallowedAlgorithm` - `alg` is absent, `none`, or not a known algorithm
/// - `MissingKid` - `kid` is absent, empty or not a string
pub fn inspect_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    let raw = decode_raw_header(token)?;

    let alg_name = raw.alg.unwrap_or_default();
    let alg = Algorithm::from_str(&alg_name).map_err(|_| {
        tracing::debug!(target: "common.jwt", alg = %alg_name, "Token rejected: unknown algorithm");
        JwtValidationError::DisallowedAlgorithm
    })?;

    let kid = raw
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

// =============================================================================
// Algorithm allow-list
// =============================================================================

/// Whether an algorithm verifies with a public key.
#[must_use]
pub fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse a comma-separated signing-algorithm allow-list (e.g. `"RS256,EdDSA"`).
///
/// Symmetric algorithms are refused: a verifier holding only public keys
/// must never treat one of them as an HMAC secret.
///
/// # Errors
///
/// Returns `AlgorithmListError` for an empty list, an unrecognised name
/// (including `none`), or an HMAC algorithm.
pub fn parse_allowed_algorithms(value: &str) -> Result<Vec<Algorithm>, AlgorithmListError> {
    let mut algorithms = Vec::new();

    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg =
            Algorithm::from_str(name).map_err(|_| AlgorithmListError::Unknown(name.to_string()))?;
        if !is_asymmetric(alg) {
            return Err(AlgorithmListError::NotPermitted(name.to_string()));
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }

    if algorithms.is_empty() {
        return Err(AlgorithmListError::Empty);
    }

    Ok(algorithms)
}

/// Decode a base64url (unpadded) JWK component such as `n`, `e` or `x`.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_jwk_component(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_leeway_is_30_seconds() {
        assert_eq!(DEFAULT_LEEWAY, Duration::from_secs(30));
        assert!(DEFAULT_LEEWAY <= MAX_LEEWAY);
    }

    #[test]
    fn test_inspect_header_valid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"kc-key-1"}"#);

        let header = inspect_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid, "kc-key-1");
    }

    #[test]
    fn test_inspect_header_alg_none_is_rejected() {
        let token = token_with_header(r#"{"alg":"none","kid":"kc-key-1"}"#);
        assert_eq!(
            inspect_header(&token),
            Err(JwtValidationError::DisallowedAlgorithm)
        );
    }

    #[test]
    fn test_inspect_header_missing_alg_is_rejected() {
        let token = token_with_header(r#"{"kid":"kc-key-1"}"#);
        assert_eq!(
            inspect_header(&token),
            Err(JwtValidationError::DisallowedAlgorithm)
        );
    }

    #[test]
    fn test_inspect_header_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert_eq!(inspect_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_inspect_header_non_string_or_empty_kid() {
        let numeric = token_with_header(r#"{"alg":"RS256","kid":42}"#);
        assert_eq!(inspect_header(&numeric), Err(JwtValidationError::MissingKid));

        let empty = token_with_header(r#"{"alg":"RS256","kid":""}"#);
        assert_eq!(inspect_header(&empty), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_inspect_header_malformed_token() {
        assert_eq!(
            inspect_header("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(inspect_header(""), Err(JwtValidationError::MalformedToken));
        assert_eq!(
            inspect_header("a.b.c.d"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            inspect_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_inspect_header_invalid_json() {
        let token = token_with_header("not-json");
        assert_eq!(inspect_header(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_inspect_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            inspect_header(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_parse_allowed_algorithms_default() {
        let algs = parse_allowed_algorithms(DEFAULT_ALLOWED_ALGORITHMS).unwrap();
        assert_eq!(algs, vec![Algorithm::RS256]);
    }

    #[test]
    fn test_parse_allowed_algorithms_list_dedupes_and_trims() {
        let algs = parse_allowed_algorithms(" RS256, EdDSA ,RS256,").unwrap();
        assert_eq!(algs, vec![Algorithm::RS256, Algorithm::EdDSA]);
    }

    #[test]
    fn test_parse_allowed_algorithms_rejects_hmac_and_none() {
        assert_eq!(
            parse_allowed_algorithms("RS256,HS256"),
            Err(AlgorithmListError::NotPermitted("HS256".to_string()))
        );
        assert_eq!(
            parse_allowed_algorithms("none"),
            Err(AlgorithmListError::Unknown("none".to_string()))
        );
        assert_eq!(
            parse_allowed_algorithms(" , "),
            Err(AlgorithmListError::Empty)
        );
    }

    #[test]
    fn test_decode_jwk_component() {
        assert_eq!(decode_jwk_component("AQAB").unwrap(), vec![1, 0, 1]);
        assert!(decode_jwk_component("!!").is_err());
    }
}
