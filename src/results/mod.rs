//! Flight result types and aggregation
//!
//! Defines the per-search [`FlightSet`] and the merged [`AggregatedResult`],
//! plus the aggregator that turns one into the other.

mod aggregator;
mod types;

pub use aggregator::ResultAggregator;
pub use types::*;
