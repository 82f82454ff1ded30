//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the BFF. Bearer tokens are
//! held as `SecretString` from the moment they are pulled off the inbound
//! request until they are forwarded to a downstream service, so any
//! `Debug`-derived struct that carries one logs `[REDACTED]` instead.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Forwarded {
//!     url: String,
//!     bearer: SecretString,
//! }
//!
//! let call = Forwarded {
//!     url: "http://tasks/auth/tasks?teamid=1".to_string(),
//!     bearer: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{call:?}").contains("eyJhbGciOi"));
//! assert_eq!(call.bearer.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let token = SecretString::from("header.payload.signature");
        let debug = format!("{token:?}");
        assert!(!debug.contains("payload"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_expose_secret_returns_value() {
        let token = SecretString::from("abc");
        assert_eq!(token.expose_secret(), "abc");
    }
}
