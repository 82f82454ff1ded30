//! Access-token claims structure.
//!
//! Registered claims plus the identity-provider specific fields the BFF
//! consumes. `sub` and `email` are redacted in Debug output to keep them
//! out of logs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// `aud` may be a single string or an array of strings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

/// A list of role names, as carried under `realm_access` and each
/// `resource_access` entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleList {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims for validated access tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    pub iss: String,

    /// Audience(s).
    pub aud: Audience,

    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default)]
    pub preferred_username: String,

    /// Email - redacted in Debug output.
    #[serde(default)]
    pub email: String,

    /// Absent is treated the same as `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub given_name: String,

    #[serde(default)]
    pub family_name: String,

    /// Realm-wide roles.
    #[serde(default)]
    pub realm_access: RoleList,

    /// Roles scoped to a client, keyed by client id.
    #[serde(default)]
    pub resource_access: HashMap<String, RoleList>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("preferred_username", &self.preferred_username)
            .field("email", &"[REDACTED]")
            .field("email_verified", &self.email_verified)
            .field("realm_access", &self.realm_access)
            .field("resource_access", &self.resource_access)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_deserialize_identity_provider_token() {
        let json = r#"{
            "iss": "http://idp/realms/pms",
            "aud": ["pms-bff", "account"],
            "sub": "5f0c1b9e",
            "exp": 1900000000,
            "iat": 1899999700,
            "preferred_username": "alice",
            "email": "alice@example.com",
            "email_verified": true,
            "given_name": "Alice",
            "family_name": "Liddell",
            "realm_access": {"roles": ["student", "offline_access"]},
            "resource_access": {"pms-bff": {"roles": ["leader"]}, "account": {"roles": ["view-profile"]}}
        }"#;

        let claims: Claims = serde_json::from_str(json).unwrap();

        assert_eq!(
            claims.aud,
            Audience::Many(vec!["pms-bff".to_string(), "account".to_string()])
        );
        assert_eq!(claims.preferred_username, "alice");
        assert_eq!(claims.email_verified, Some(true));
        assert_eq!(claims.realm_access.roles, vec!["student", "offline_access"]);
        assert_eq!(
            claims.resource_access.get("pms-bff").unwrap().roles,
            vec!["leader"]
        );
        assert!(claims.nbf.is_none());
    }

    #[test]
    fn test_claims_minimal_token_defaults() {
        let json = r#"{"iss":"i","aud":"a","sub":"s","exp":1}"#;

        let claims: Claims = serde_json::from_str(json).unwrap();

        assert_eq!(claims.aud, Audience::One("a".to_string()));
        assert!(claims.email_verified.is_none());
        assert!(claims.realm_access.roles.is_empty());
        assert!(claims.resource_access.is_empty());
    }

    #[test]
    fn test_claims_debug_redacts_sub_and_email() {
        let json = r#"{"iss":"i","aud":"a","sub":"secret-user-id","exp":1,"email":"bob@example.com"}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();

        let debug_str = format!("{:?}", claims);

        assert!(!debug_str.contains("secret-user-id"));
        assert!(!debug_str.contains("bob@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
