//! Background tasks for the BFF.
//!
//! # Tasks
//!
//! - `jwks_refresher` - re-fetches the verification key set on a fixed interval

pub mod jwks_refresher;

pub use jwks_refresher::start_jwks_refresher;
