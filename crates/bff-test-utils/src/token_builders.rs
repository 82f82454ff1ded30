//! Builder patterns for test tokens
//!
//! Claims default to a valid, verified student token for the test issuer
//! and audience used by [`crate::server_harness::TestBffServer`].

use crate::crypto_fixtures::{TestEd25519Key, TestRsaKey};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Issuer the test server is configured with.
pub const TEST_ISSUER: &str = "http://idp.test/realms/pms";

/// Audience the test server is configured with.
pub const TEST_AUDIENCE: &str = "pms-bff";

/// Client whose `resource_access` roles the test server merges.
pub const TEST_CLIENT_ID: &str = "pms-bff";

/// Builder for signed test access tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_realm_roles(&["leader"])
///     .expires_in(3600)
///     .sign_rs256(&PRIMARY_RSA, "kc-1");
/// ```
pub struct TestTokenBuilder {
    iss: String,
    aud: Value,
    sub: String,
    username: String,
    email: String,
    email_verified: Option<bool>,
    given_name: String,
    family_name: String,
    realm_roles: Vec<String>,
    client_roles: Map<String, Value>,
    exp: i64,
    nbf: Option<i64>,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: TEST_ISSUER.to_string(),
            aud: json!(TEST_AUDIENCE),
            sub: "3f6c1f3e-0000-4000-8000-000000000001".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            email_verified: Some(true),
            given_name: "Alice".to_string(),
            family_name: "Tester".to_string(),
            realm_roles: vec!["student".to_string()],
            client_roles: Map::new(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            nbf: None,
            iat: now.timestamp(),
        }
    }

    /// Set username, email and a subject derived from the username
    pub fn for_user(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self.email = format!("{username}@example.com");
        self.sub = format!("sub-{username}");
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Replace `aud` with an arbitrary JSON value (string or array)
    pub fn with_audience(mut self, aud: Value) -> Self {
        self.aud = aud;
        self
    }

    /// `None` omits the claim entirely
    pub fn email_verified(mut self, verified: Option<bool>) -> Self {
        self.email_verified = verified;
        self
    }

    pub fn with_realm_roles(mut self, roles: &[&str]) -> Self {
        self.realm_roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    /// Roles under `resource_access.<client_id>.roles`
    pub fn with_client_roles(mut self, client_id: &str, roles: &[&str]) -> Self {
        self.client_roles
            .insert(client_id.to_string(), json!({ "roles": roles }));
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "iss": self.iss,
            "aud": self.aud,
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
            "preferred_username": self.username,
            "email": self.email,
            "given_name": self.given_name,
            "family_name": self.family_name,
            "realm_access": { "roles": self.realm_roles },
            "resource_access": self.client_roles,
        });
        if let Some(verified) = self.email_verified {
            claims["email_verified"] = json!(verified);
        }
        if let Some(nbf) = self.nbf {
            claims["nbf"] = json!(nbf);
        }
        claims
    }

    pub fn sign_rs256(self, key: &TestRsaKey, kid: &str) -> String {
        sign_claims(&self.build(), Algorithm::RS256, &key.encoding_key(), kid)
    }

    pub fn sign_eddsa(self, key: &TestEd25519Key, kid: &str) -> String {
        sign_claims(&self.build(), Algorithm::EdDSA, &key.encoding_key(), kid)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign arbitrary claims with a `kid` header.
pub fn sign_claims(claims: &Value, alg: Algorithm, key: &EncodingKey, kid: &str) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(kid.to_string());
    encode(&header, claims, key).expect("test token signing must succeed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new()
            .for_user("bob")
            .with_realm_roles(&["leader"])
            .with_client_roles(TEST_CLIENT_ID, &["admin"])
            .build();

        assert_eq!(claims["preferred_username"], "bob");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["realm_access"]["roles"][0], "leader");
        assert_eq!(claims["resource_access"][TEST_CLIENT_ID]["roles"][0], "admin");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_email_verified_can_be_omitted() {
        let claims = TestTokenBuilder::new().email_verified(None).build();
        assert!(claims.get("email_verified").is_none());
    }
}
