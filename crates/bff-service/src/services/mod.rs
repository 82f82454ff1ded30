//! Services for the BFF.
//!
//! - `downstream` - typed JSON client for the team and task services
//! - `aggregator` - bounded-concurrency fan-out over downstream calls

pub mod aggregator;
pub mod downstream;

pub use aggregator::{AggregationError, AggregationJob, TeamTarget};
pub use downstream::{CallContext, Dependency, DownstreamClient, DownstreamError};
