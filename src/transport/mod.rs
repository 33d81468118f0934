//! Transport layer
//!
//! Strategies, the fetch collaborator traits, the per-leg retry/fallback
//! engine and an HTTP-backed fetcher.

mod engine;
mod http;
mod strategy;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{is_retryable, LegOutcome, LegState, RetryPolicy, TransportRetryEngine};
pub use http::HttpFlightFetcher;
pub use strategy::{default_strategies, Strategy};
pub use traits::{FlightFetcher, TransportSession};
