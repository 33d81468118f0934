//! Search orchestration module
//!
//! Turns a travel request into searches, runs them concurrently against the
//! transport engine, and aggregates the outcome.

mod dispatcher;
mod executor;
mod models;

pub use dispatcher::{Dispatch, SearchDispatcher, DEFAULT_MAX_CONCURRENCY};
pub use executor::{Search, DEFAULT_DEADLINE};
pub use models::*;
