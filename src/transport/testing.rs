//! Scripted fetcher for exercising the engine and dispatcher

use super::strategy::Strategy;
use super::traits::{FlightFetcher, TransportSession};
use crate::errors::FetchError;
use crate::results::FlightRecord;
use crate::search::Leg;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted fetch does
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return `n` flights (zero is an empty answer)
    Flights(usize),
    /// Wait, then return `n` flights
    Delayed(Duration, usize),
    Fail(FetchError),
    /// Sleep for the duration, then report a timeout
    Hang(Duration),
    /// Block the worker thread, ignoring cancellation, then return one flight
    Block(Duration),
    Panic,
}

type Responder = dyn Fn(&Strategy, &Leg, u32) -> Behavior + Send + Sync;

#[derive(Default)]
struct Counters {
    probes: HashMap<String, usize>,
    fetches: HashMap<String, usize>,
    sessions: HashMap<String, usize>,
}

struct Inner {
    responder: Box<Responder>,
    probe_failures: HashMap<String, FetchError>,
    probe_hangs: Vec<String>,
    counters: Mutex<Counters>,
    open_sessions: AtomicUsize,
}

/// Fetcher whose answers come from a closure of `(strategy, leg, attempt)`.
///
/// Attempt numbers start at 1 and count per session.
#[derive(Clone)]
pub struct ScriptedFetcher {
    inner: Arc<Inner>,
}

impl ScriptedFetcher {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Strategy, &Leg, u32) -> Behavior + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                responder: Box::new(responder),
                probe_failures: HashMap::new(),
                probe_hangs: Vec::new(),
                counters: Mutex::new(Counters::default()),
                open_sessions: AtomicUsize::new(0),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("configure before sharing")
    }

    pub fn probe_fails(mut self, strategy: Strategy, error: FetchError) -> Self {
        self.inner_mut()
            .probe_failures
            .insert(strategy.name().to_string(), error);
        self
    }

    pub fn probe_hangs(mut self, strategy: Strategy) -> Self {
        self.inner_mut().probe_hangs.push(strategy.name().to_string());
        self
    }

    fn count(&self, pick: impl Fn(&Counters) -> &HashMap<String, usize>, strategy: &Strategy) -> usize {
        let counters = self.inner.counters.lock().unwrap();
        pick(&counters).get(strategy.name()).copied().unwrap_or(0)
    }

    pub fn probe_calls(&self, strategy: &Strategy) -> usize {
        self.count(|c| &c.probes, strategy)
    }

    pub fn fetch_calls(&self, strategy: &Strategy) -> usize {
        self.count(|c| &c.fetches, strategy)
    }

    pub fn total_fetch_calls(&self) -> usize {
        self.inner.counters.lock().unwrap().fetches.values().sum()
    }

    pub fn sessions_opened(&self, strategy: &Strategy) -> usize {
        self.count(|c| &c.sessions, strategy)
    }

    /// Sessions opened and not yet dropped
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightFetcher for ScriptedFetcher {
    async fn probe(&self, strategy: &Strategy) -> Result<(), FetchError> {
        *self
            .inner
            .counters
            .lock()
            .unwrap()
            .probes
            .entry(strategy.name().to_string())
            .or_default() += 1;

        if self.inner.probe_hangs.iter().any(|s| s == strategy.name()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.inner.probe_failures.get(strategy.name()) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn open(&self, strategy: &Strategy) -> Result<Box<dyn TransportSession>, FetchError> {
        *self
            .inner
            .counters
            .lock()
            .unwrap()
            .sessions
            .entry(strategy.name().to_string())
            .or_default() += 1;
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSession {
            inner: self.inner.clone(),
            strategy: strategy.clone(),
            attempts: 0,
        }))
    }
}

struct ScriptedSession {
    inner: Arc<Inner>,
    strategy: Strategy,
    attempts: u32,
}

#[async_trait]
impl TransportSession for ScriptedSession {
    async fn fetch(&mut self, leg: &Leg) -> Result<Vec<FlightRecord>, FetchError> {
        self.attempts += 1;
        *self
            .inner
            .counters
            .lock()
            .unwrap()
            .fetches
            .entry(self.strategy.name().to_string())
            .or_default() += 1;

        match (self.inner.responder)(&self.strategy, leg, self.attempts) {
            Behavior::Flights(n) => Ok(sample_flights(leg, n)),
            Behavior::Delayed(wait, n) => {
                tokio::time::sleep(wait).await;
                Ok(sample_flights(leg, n))
            }
            Behavior::Fail(e) => Err(e),
            Behavior::Hang(wait) => {
                tokio::time::sleep(wait).await;
                Err(FetchError::Timeout(wait))
            }
            Behavior::Block(wait) => {
                std::thread::sleep(wait);
                Ok(sample_flights(leg, 1))
            }
            Behavior::Panic => panic!("scripted fetch panic"),
        }
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `n` distinct flights for `leg`, without route or direction tags
pub fn sample_flights(leg: &Leg, n: usize) -> Vec<FlightRecord> {
    (0..n)
        .map(|i| FlightRecord {
            airline: format!("Carrier {}", i + 1),
            departure_airport: leg.origin.clone(),
            arrival_airport: leg.destination.clone(),
            departure_time: format!("{:02}:00", 6 + i % 18),
            arrival_time: format!("{:02}:30", 8 + i % 16),
            duration: "2h 30m".to_string(),
            price: format!("{}", 100 + i * 10),
            currency: "EUR".to_string(),
            stops: 0,
            route: String::new(),
            direction: None,
            departure_date: None,
            passengers: 0,
        })
        .collect()
}
