//! The authenticated caller.

use crate::auth::claims::Claims;
use std::collections::HashSet;
use std::fmt;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_LEADER: &str = "leader";
pub const ROLE_STUDENT: &str = "student";

/// Identity built once per request from verified claims and the resolved
/// role set. Request-scoped; never persisted.
#[derive(Clone)]
pub struct Principal {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub given_name: String,
    pub family_name: String,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn from_claims(claims: &Claims, roles: HashSet<String>) -> Self {
        Self {
            sub: claims.sub.clone(),
            username: claims.preferred_username.clone(),
            email: claims.email.clone(),
            email_verified: claims.email_verified.unwrap_or(false),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    pub fn is_leader(&self) -> bool {
        self.has_role(ROLE_LEADER)
    }

    /// Roles in a stable order for responses.
    pub fn sorted_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.roles.iter().cloned().collect();
        roles.sort();
        roles
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("sub", &"[REDACTED]")
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("email_verified", &self.email_verified)
            .field("roles", &self.sorted_roles())
            .finish_non_exhaustive()
    }
}
