//! Common utilities and types shared across the BFF crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header inspection, algorithm allow-list, constants)
pub mod jwt;
