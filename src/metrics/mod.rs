//! Metrics collection module
//!
//! Tracks strategy performance, failure kinds, and usage statistics. Fed by
//! the unit transitions the dispatcher and the retry engine report.

use crate::errors::ErrorKind;
use crate::observability::{Observer, Transition, UnitEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Response times kept per strategy
const RESPONSE_WINDOW: usize = 100;

/// Process-wide metrics collector
pub struct Metrics {
    /// Travel requests received
    total_requests: AtomicU64,
    /// Search units dispatched
    total_searches: AtomicU64,
    /// Units finalised by the global deadline
    timed_out_searches: AtomicU64,
    /// Fetch attempts per strategy
    strategy_attempts: RwLock<HashMap<String, u64>>,
    /// Strategy response times (last 100, in ms)
    strategy_response_times: RwLock<HashMap<String, Vec<u64>>>,
    strategy_errors: RwLock<HashMap<String, u64>>,
    strategy_successes: RwLock<HashMap<String, u64>>,
    /// Failed attempts and probes by kind
    error_kinds: RwLock<HashMap<ErrorKind, u64>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_searches: AtomicU64::new(0),
            timed_out_searches: AtomicU64::new(0),
            strategy_attempts: RwLock::new(HashMap::new()),
            strategy_response_times: RwLock::new(HashMap::new()),
            strategy_errors: RwLock::new(HashMap::new()),
            strategy_successes: RwLock::new(HashMap::new()),
            error_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Increment travel request count
    pub fn inc_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment dispatched search count
    pub fn inc_search(&self) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timed_out(&self) {
        self.timed_out_searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetch attempt
    pub fn record_attempt(&self, strategy: &str) {
        let mut attempts = self
            .strategy_attempts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *attempts.entry(strategy.to_string()).or_insert(0) += 1;
    }

    /// Record strategy response time
    pub fn record_response_time(&self, strategy: &str, time_ms: u64) {
        let mut times = self
            .strategy_response_times
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = times.entry(strategy.to_string()).or_default();

        if entry.len() >= RESPONSE_WINDOW {
            entry.remove(0);
        }
        entry.push(time_ms);
    }

    /// Record a failed attempt
    pub fn record_error(&self, strategy: &str, kind: ErrorKind) {
        {
            let mut errors = self
                .strategy_errors
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *errors.entry(strategy.to_string()).or_insert(0) += 1;
        }
        self.record_kind(kind);
    }

    fn record_kind(&self, kind: ErrorKind) {
        let mut kinds = self
            .error_kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *kinds.entry(kind).or_insert(0) += 1;
    }

    /// Record a successful attempt
    pub fn record_success(&self, strategy: &str) {
        let mut successes = self
            .strategy_successes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *successes.entry(strategy.to_string()).or_insert(0) += 1;
    }

    pub fn get_total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn get_total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::Relaxed)
    }

    pub fn get_timed_out_searches(&self) -> u64 {
        self.timed_out_searches.load(Ordering::Relaxed)
    }

    /// Get average response time for a strategy
    pub fn get_avg_response_time(&self, strategy: &str) -> Option<u64> {
        let times = self
            .strategy_response_times
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        times.get(strategy).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Get reliability percentage for a strategy
    pub fn get_reliability(&self, strategy: &str) -> f64 {
        let errors = self
            .strategy_errors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let successes = self
            .strategy_successes
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let error_count = *errors.get(strategy).unwrap_or(&0);
        let success_count = *successes.get(strategy).unwrap_or(&0);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    /// Get all strategy statistics
    pub fn get_strategy_stats(&self) -> BTreeMap<String, StrategyStats> {
        let attempts = self
            .strategy_attempts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        attempts
            .into_iter()
            .map(|(strategy, count)| {
                let stats = StrategyStats {
                    attempts: count,
                    avg_response_time: self.get_avg_response_time(&strategy),
                    reliability: self.get_reliability(&strategy),
                };
                (strategy, stats)
            })
            .collect()
    }

    /// Snapshot for the stats endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors_by_kind = self
            .error_kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect();

        MetricsSnapshot {
            total_requests: self.get_total_requests(),
            total_searches: self.get_total_searches(),
            timed_out_searches: self.get_timed_out_searches(),
            strategies: self.get_strategy_stats(),
            errors_by_kind,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for Metrics {
    fn on_transition(&self, event: &UnitEvent) {
        match &event.transition {
            Transition::Dispatched => self.inc_search(),
            Transition::Executing { strategy, .. } => self.record_attempt(strategy),
            Transition::AttemptFailed {
                strategy,
                kind,
                elapsed_ms,
                ..
            } => {
                self.record_error(strategy, *kind);
                self.record_response_time(strategy, *elapsed_ms);
            }
            Transition::Succeeded {
                strategy,
                elapsed_ms,
                ..
            } => {
                self.record_success(strategy);
                self.record_response_time(strategy, *elapsed_ms);
            }
            Transition::ProbeFailed { kind, .. } => self.record_kind(*kind),
            Transition::TimedOut => self.inc_timed_out(),
            Transition::Probing | Transition::Exhausted { .. } | Transition::Settled { .. } => {}
        }
    }
}

/// Statistics for a single strategy
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStats {
    pub attempts: u64,
    pub avg_response_time: Option<u64>,
    pub reliability: f64,
}

/// Serializable view of all metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_searches: u64,
    pub timed_out_searches: u64,
    pub strategies: BTreeMap<String, StrategyStats>,
    pub errors_by_kind: BTreeMap<String, u64>,
}
