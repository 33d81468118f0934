//! Flight fetch collaborator traits

use super::strategy::Strategy;
use crate::errors::FetchError;
use crate::results::FlightRecord;
use crate::search::Leg;
use async_trait::async_trait;

/// Pluggable source of flight data.
///
/// Implementations are shared across search units and must be `Send + Sync`.
/// Per-unit state lives in the [`TransportSession`] returned by [`open`].
///
/// [`open`]: FlightFetcher::open
#[async_trait]
pub trait FlightFetcher: Send + Sync {
    /// Lightweight connectivity check for `strategy`.
    async fn probe(&self, strategy: &Strategy) -> Result<(), FetchError>;

    /// Acquire an exclusive session for `strategy`.
    ///
    /// The session is released when dropped.
    async fn open(&self, strategy: &Strategy) -> Result<Box<dyn TransportSession>, FetchError>;
}

/// Exclusive connection to one strategy's executor
#[async_trait]
pub trait TransportSession: Send {
    /// Fetch flights for one leg.
    ///
    /// An empty list is a valid answer; the caller decides what it means.
    async fn fetch(&mut self, leg: &Leg) -> Result<Vec<FlightRecord>, FetchError>;
}
