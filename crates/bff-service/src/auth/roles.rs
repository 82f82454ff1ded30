//! Role resolution.
//!
//! Merges realm-wide roles with the roles scoped to this service's client
//! into one canonical set.

use crate::auth::claims::Claims;
use std::collections::HashSet;

/// Resolves the canonical role set for a token.
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    client_id: String,
}

impl RoleResolver {
    /// `client_id` selects the `resource_access` entry to merge; empty
    /// means realm roles only.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn resolve(&self, claims: &Claims) -> HashSet<String> {
        resolve_roles(claims, &self.client_id)
    }
}

/// Union of realm roles and, when `client_id` is non-empty and present in
/// the token, that client's roles. Empty names are dropped.
pub fn resolve_roles(claims: &Claims, client_id: &str) -> HashSet<String> {
    let realm = claims.realm_access.roles.iter();

    let client = (!client_id.is_empty())
        .then(|| claims.resource_access.get(client_id))
        .flatten()
        .map(|list| list.roles.iter())
        .into_iter()
        .flatten();

    realm
        .chain(client)
        .filter(|role| !role.is_empty())
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::claims::{Audience, RoleList};
    use std::collections::HashMap;

    fn claims(realm: &[&str], resource: Vec<(&str, Vec<&str>)>) -> Claims {
        Claims {
            iss: "iss".to_string(),
            aud: Audience::One("aud".to_string()),
            sub: "sub".to_string(),
            exp: 0,
            nbf: None,
            iat: None,
            preferred_username: String::new(),
            email: String::new(),
            email_verified: None,
            name: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            realm_access: RoleList {
                roles: realm.iter().map(ToString::to_string).collect(),
            },
            resource_access: resource
                .into_iter()
                .map(|(client, roles)| {
                    (
                        client.to_string(),
                        RoleList {
                            roles: roles.iter().map(ToString::to_string).collect(),
                        },
                    )
                })
                .collect::<HashMap<_, _>>(),
        }
    }

    fn set(roles: &[&str]) -> HashSet<String> {
        roles.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_union_of_realm_and_client_roles() {
        let claims = claims(
            &["student", "offline_access"],
            vec![("pms-bff", vec!["leader"]), ("account", vec!["manage-account"])],
        );

        let roles = RoleResolver::new("pms-bff").resolve(&claims);

        assert_eq!(roles, set(&["student", "offline_access", "leader"]));
    }

    #[test]
    fn test_duplicates_collapse_and_empty_names_dropped() {
        let claims = claims(
            &["student", "", "student"],
            vec![("pms-bff", vec!["student", "admin", ""])],
        );

        let roles = resolve_roles(&claims, "pms-bff");

        assert_eq!(roles, set(&["student", "admin"]));
    }

    #[test]
    fn test_empty_client_id_uses_realm_roles_only() {
        let claims = claims(&["student"], vec![("", vec!["admin"])]);

        assert_eq!(resolve_roles(&claims, ""), set(&["student"]));
    }

    #[test]
    fn test_unknown_client_id_uses_realm_roles_only() {
        let claims = claims(&["student"], vec![("other-client", vec!["admin"])]);

        assert_eq!(resolve_roles(&claims, "pms-bff"), set(&["student"]));
    }

    #[test]
    fn test_no_roles_at_all() {
        let claims = claims(&[], vec![]);

        assert!(resolve_roles(&claims, "pms-bff").is_empty());
    }
}
