//! flightsearch-rs: concurrent flight search orchestration
//!
//! A free-form travel request is decomposed into structured searches, each
//! search is run through a probe/retry/fallback state machine over several
//! transport strategies, failures are classified into a fixed taxonomy, and
//! the per-search outcomes are merged into one deterministic result.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod network;
pub mod observability;
pub mod planner;
pub mod results;
pub mod search;
pub mod transport;
pub mod web;

pub use config::Settings;
pub use errors::{classify, ClassifiedError, ErrorKind, FetchError, SearchError};
pub use results::{AggregatedResult, FlightRecord, FlightSet, ResultAggregator};
pub use search::{Search, SearchDispatcher, SearchSpec};
pub use transport::{FlightFetcher, Strategy, TransportRetryEngine};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
