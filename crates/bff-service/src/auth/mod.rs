//! Authentication and authorization.
//!
//! ```text
//! token -> TokenVerifier (KeySetCache) -> RoleResolver -> Principal -> AccessGate
//! ```

pub mod claims;
pub mod gate;
pub mod jwks;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use jwt::AuthError;
