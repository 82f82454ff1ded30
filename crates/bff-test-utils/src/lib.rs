//! # BFF Test Utilities
//!
//! Shared test utilities for the BFF service.
//!
//! This crate provides:
//! - Fixed crypto fixtures (RSA keypairs, seeded Ed25519 keypairs)
//! - Token builders (`TestTokenBuilder`)
//! - A mocked key-distribution endpoint (`MockJwks`)
//! - Server test harness (`TestBffServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bff_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let jwks = MockJwks::start(vec![PRIMARY_RSA.jwk("kc-1")]).await;
//!     let server = TestBffServer::spawn(&jwks.url(), "http://teams", "http://tasks").await?;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .sign_rs256(&PRIMARY_RSA, "kc-1");
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/auth/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_jwks;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_jwks::*;
pub use server_harness::*;
pub use token_builders::*;
