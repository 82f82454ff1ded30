//! Observability for the BFF.
//!
//! Metrics definitions and instrumentation helpers. Tracing is configured
//! in `main.rs`.

pub mod metrics;
