//! HTTP networking module
//!
//! Provides the shared HTTP client used by the flight fetcher and the planner.

mod client;
mod request;

pub use client::HttpClient;
pub use request::{HttpMethod, HttpRequest, HttpResponse};
