//! Request authorization predicates.
//!
//! Pure checks over an already-resolved [`Principal`]: no I/O, no shared
//! state. A missing principal is always `Unauthenticated` (401), distinct
//! from a principal that fails a predicate (403).

use crate::auth::principal::Principal;
use std::collections::HashSet;
use thiserror::Error;

/// Why a gate refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateDenied {
    #[error("no authenticated principal")]
    Unauthenticated,

    #[error("insufficient role")]
    InsufficientRole,

    #[error("identity not verified")]
    IdentityNotVerified,
}

impl GateDenied {
    /// Bounded label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GateDenied::Unauthenticated => "unauthenticated",
            GateDenied::InsufficientRole => "insufficient_role",
            GateDenied::IdentityNotVerified => "identity_not_verified",
        }
    }
}

/// Allow if the principal holds at least one of `allowed`.
///
/// An empty `allowed` set denies every principal.
pub fn require_any_role(
    principal: Option<&Principal>,
    allowed: &HashSet<String>,
) -> Result<(), GateDenied> {
    let principal = principal.ok_or(GateDenied::Unauthenticated)?;

    if principal.roles.iter().any(|role| allowed.contains(role)) {
        Ok(())
    } else {
        Err(GateDenied::InsufficientRole)
    }
}

/// Allow only if the identity's verified flag is set.
pub fn require_verified_identity(principal: Option<&Principal>) -> Result<(), GateDenied> {
    let principal = principal.ok_or(GateDenied::Unauthenticated)?;

    if principal.email_verified {
        Ok(())
    } else {
        Err(GateDenied::IdentityNotVerified)
    }
}

/// Static per-route gate configuration: any-of role set plus an optional
/// verified-identity requirement. Role check runs first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGate {
    allowed_roles: HashSet<String>,
    require_verified_identity: bool,
}

impl AccessGate {
    pub fn any_of(roles: &[&str]) -> Self {
        Self {
            allowed_roles: roles.iter().map(ToString::to_string).collect(),
            require_verified_identity: false,
        }
    }

    /// Additionally require a verified identity.
    pub fn verified(mut self) -> Self {
        self.require_verified_identity = true;
        self
    }

    pub fn allowed_roles(&self) -> &HashSet<String> {
        &self.allowed_roles
    }

    pub fn requires_verified_identity(&self) -> bool {
        self.require_verified_identity
    }

    pub fn check(&self, principal: Option<&Principal>) -> Result<(), GateDenied> {
        require_any_role(principal, &self.allowed_roles)?;
        if self.require_verified_identity {
            require_verified_identity(principal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn principal(roles: &[&str], verified: bool) -> Principal {
        Principal {
            sub: "sub".to_string(),
            username: "dave".to_string(),
            email: "dave@example.com".to_string(),
            email_verified: verified,
            given_name: String::new(),
            family_name: String::new(),
            roles: roles.iter().map(ToString::to_string).collect(),
        }
    }

    fn roles(names: &[&str]) -> HashSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_require_any_role_admin_only() {
        let admin_only = roles(&["admin"]);

        assert_eq!(
            require_any_role(Some(&principal(&["student"], true)), &admin_only),
            Err(GateDenied::InsufficientRole)
        );
        assert_eq!(
            require_any_role(Some(&principal(&["student", "admin"], true)), &admin_only),
            Ok(())
        );
    }

    #[test]
    fn test_leader_against_leader_or_admin_and_admin_only() {
        let leader = principal(&["leader"], true);

        assert_eq!(
            require_any_role(Some(&leader), &roles(&["leader", "admin"])),
            Ok(())
        );
        assert_eq!(
            require_any_role(Some(&leader), &roles(&["admin"])),
            Err(GateDenied::InsufficientRole)
        );
    }

    #[test]
    fn test_missing_principal_is_unauthenticated() {
        assert_eq!(
            require_any_role(None, &roles(&["student"])),
            Err(GateDenied::Unauthenticated)
        );
        assert_eq!(
            require_verified_identity(None),
            Err(GateDenied::Unauthenticated)
        );
    }

    #[test]
    fn test_empty_allowed_set_denies() {
        assert_eq!(
            require_any_role(Some(&principal(&["admin"], true)), &HashSet::new()),
            Err(GateDenied::InsufficientRole)
        );
    }

    #[test]
    fn test_require_verified_identity() {
        assert_eq!(
            require_verified_identity(Some(&principal(&[], true))),
            Ok(())
        );
        assert_eq!(
            require_verified_identity(Some(&principal(&["admin"], false))),
            Err(GateDenied::IdentityNotVerified)
        );
    }

    #[test]
    fn test_gate_composes_role_then_verification() {
        let gate = AccessGate::any_of(&["student", "leader", "admin"]).verified();

        assert!(gate.requires_verified_identity());
        assert_eq!(gate.check(Some(&principal(&["student"], true))), Ok(()));
        assert_eq!(
            gate.check(Some(&principal(&["student"], false))),
            Err(GateDenied::IdentityNotVerified)
        );
        // Role failure wins over verification failure.
        assert_eq!(
            gate.check(Some(&principal(&["guest"], false))),
            Err(GateDenied::InsufficientRole)
        );
    }

    #[test]
    fn test_gate_without_verification_ignores_flag() {
        let gate = AccessGate::any_of(&["admin"]);

        assert_eq!(gate.check(Some(&principal(&["admin"], false))), Ok(()));
    }
}
