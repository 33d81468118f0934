//! Per-leg probe/retry/fallback state machine
//!
//! ```text
//! INIT ──► PROBING ──► EXECUTING ──► SUCCESS
//!             │            │
//!             └────────────┴───────► EXHAUSTED
//! ```
//!
//! Probing drops strategies that fail a short connectivity check. Executing
//! walks the survivors in order, retrying retryable failures up to
//! `max_retries` times per strategy, and stops at the first strategy that
//! returns at least one flight. Every wait is bounded by the request deadline.

use super::strategy::Strategy;
use super::traits::FlightFetcher;
use crate::errors::{classify, ClassifiedError, ErrorKind, FetchError};
use crate::observability::{emit, NoopObserver, Observer, Transition, UnitEvent};
use crate::results::FlightRecord;
use crate::search::Leg;
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Whether a failure kind is worth another attempt on the same strategy
pub fn is_retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Timeout | ErrorKind::ConnectionFailure)
}

/// Timeouts and retry budget for one leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, per strategy
    pub max_retries: u32,
    pub probe_timeout: Duration,
    /// Time allowed to acquire a session
    pub session_timeout: Duration,
    /// Time allowed for a single fetch attempt
    pub execution_timeout: Duration,
    /// Delay before the first retry; doubles for each further retry
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub retry_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            probe_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(10),
            execution_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(4000),
            retry_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed per strategy
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let base = self
            .retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay);
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Coarse lifecycle state of a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    Init,
    Probing,
    Executing,
    Success,
    Exhausted,
}

/// Terminal value of a leg. The engine never fails; every outcome is one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum LegOutcome {
    Success {
        strategy: Strategy,
        flights: Vec<FlightRecord>,
    },
    Exhausted {
        error: ClassifiedError,
        /// The request deadline ended the leg
        deadline_hit: bool,
    },
}

impl LegOutcome {
    pub fn state(&self) -> LegState {
        match self {
            Self::Success { .. } => LegState::Success,
            Self::Exhausted { .. } => LegState::Exhausted,
        }
    }

    fn deadline() -> Self {
        Self::Exhausted {
            error: ClassifiedError::timeout(),
            deadline_hit: true,
        }
    }
}

enum Step {
    Init,
    Probing,
    Executing {
        survivors: Vec<Strategy>,
        index: usize,
        last_error: Option<ClassifiedError>,
    },
    Done(LegOutcome),
}

impl Step {
    fn state(&self) -> LegState {
        match self {
            Self::Init => LegState::Init,
            Self::Probing => LegState::Probing,
            Self::Executing { .. } => LegState::Executing,
            Self::Done(outcome) => outcome.state(),
        }
    }
}

/// Result of running one strategy to completion
enum StrategyRun {
    Flights(Vec<FlightRecord>),
    Failed(ClassifiedError),
    DeadlineHit,
}

/// Runs legs through the probe/retry/fallback state machine
pub struct TransportRetryEngine {
    fetcher: Arc<dyn FlightFetcher>,
    strategies: Vec<Strategy>,
    policy: RetryPolicy,
    observer: Arc<dyn Observer>,
}

impl TransportRetryEngine {
    pub fn new(fetcher: Arc<dyn FlightFetcher>, strategies: Vec<Strategy>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            strategies,
            policy,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `leg` to a terminal outcome, never past `deadline`.
    pub async fn run(&self, leg: &Leg, deadline: Instant) -> LegOutcome {
        let mut step = Step::Init;
        loop {
            let from = step.state();
            step = match step {
                Step::Init => Step::Probing,
                Step::Probing => match self.probe_all(leg, deadline).await {
                    Ok(survivors) => Step::Executing {
                        survivors,
                        index: 0,
                        last_error: None,
                    },
                    Err(outcome) => Step::Done(outcome),
                },
                Step::Executing {
                    survivors,
                    index,
                    last_error,
                } => {
                    if index >= survivors.len() {
                        let error = last_error
                            .unwrap_or_else(|| ClassifiedError::from_kind(ErrorKind::Unknown));
                        Step::Done(LegOutcome::Exhausted {
                            error,
                            deadline_hit: false,
                        })
                    } else {
                        let strategy = &survivors[index];
                        match self.execute_strategy(leg, strategy, deadline).await {
                            StrategyRun::Flights(flights) => Step::Done(LegOutcome::Success {
                                strategy: strategy.clone(),
                                flights,
                            }),
                            StrategyRun::Failed(error) => Step::Executing {
                                survivors,
                                index: index + 1,
                                last_error: Some(error),
                            },
                            StrategyRun::DeadlineHit => Step::Done(LegOutcome::deadline()),
                        }
                    }
                }
                Step::Done(outcome) => {
                    if let LegOutcome::Exhausted { error, .. } = &outcome {
                        self.emit(leg, Transition::Exhausted { kind: error.kind });
                    }
                    return outcome;
                }
            };
            if from != step.state() {
                debug!(spec_id = %leg.spec_id, route = %leg.route(), ?from, to = ?step.state(), "Leg state change");
            }
        }
    }

    /// Probe every strategy concurrently, keeping the ones that answer in order.
    async fn probe_all(&self, leg: &Leg, deadline: Instant) -> Result<Vec<Strategy>, LegOutcome> {
        self.emit(leg, Transition::Probing);

        let probes = self.strategies.iter().map(|strategy| async move {
            let limit = step_deadline(self.policy.probe_timeout, deadline);
            let result = match timeout_at(limit, self.fetcher.probe(strategy)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.policy.probe_timeout)),
            };
            (strategy, result)
        });

        let mut survivors = Vec::with_capacity(self.strategies.len());
        let mut last_kind = None;
        for (strategy, result) in join_all(probes).await {
            match result {
                Ok(()) => survivors.push(strategy.clone()),
                Err(e) => {
                    let classified = classify(&e);
                    warn!("Probe failed for {} ({}): {}", strategy, leg.route(), e);
                    self.emit(
                        leg,
                        Transition::ProbeFailed {
                            strategy: strategy.name().to_string(),
                            kind: classified.kind,
                        },
                    );
                    last_kind = Some(classified.kind);
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(LegOutcome::deadline());
        }

        if survivors.is_empty() {
            let kind = match last_kind {
                None | Some(ErrorKind::ToolingMissing) => ErrorKind::ToolingMissing,
                Some(_) => ErrorKind::ConnectionFailure,
            };
            warn!("No transport strategy is available for {}", leg.route());
            return Err(LegOutcome::Exhausted {
                error: ClassifiedError::from_kind(kind),
                deadline_hit: false,
            });
        }

        Ok(survivors)
    }

    /// Run all attempts against one strategy inside a single scoped session.
    async fn execute_strategy(&self, leg: &Leg, strategy: &Strategy, deadline: Instant) -> StrategyRun {
        let limit = step_deadline(self.policy.session_timeout, deadline);
        let mut session = match timeout_at(limit, self.fetcher.open(strategy)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!("Could not open {} session: {}", strategy, e);
                return StrategyRun::Failed(classify(&e));
            }
            Err(_) if Instant::now() >= deadline => return StrategyRun::DeadlineHit,
            Err(_) => {
                warn!("Opening {} session timed out", strategy);
                return StrategyRun::Failed(ClassifiedError::timeout());
            }
        };

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            if Instant::now() >= deadline {
                return StrategyRun::DeadlineHit;
            }

            self.emit(
                leg,
                Transition::Executing {
                    strategy: strategy.name().to_string(),
                    attempt,
                },
            );

            let started = Instant::now();
            let limit = step_deadline(self.policy.execution_timeout, deadline);
            let result = match timeout_at(limit, session.fetch(leg)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.policy.execution_timeout)),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(flights) if !flights.is_empty() => {
                    let route = leg.route();
                    let flights: Vec<FlightRecord> = flights
                        .into_iter()
                        .map(|f| f.tagged(leg))
                        .collect();
                    info!(
                        "{} returned {} flights for {} on attempt {}",
                        strategy,
                        flights.len(),
                        route,
                        attempt
                    );
                    self.emit(
                        leg,
                        Transition::Succeeded {
                            strategy: strategy.name().to_string(),
                            flights: flights.len(),
                            elapsed_ms,
                        },
                    );
                    return StrategyRun::Flights(flights);
                }
                Ok(_) => FetchError::NoResults,
                Err(e) => e,
            };

            let classified = classify(&error);
            warn!(
                "{} attempt {}/{} for {} failed ({}): {}",
                strategy,
                attempt,
                max_attempts,
                leg.route(),
                classified.kind,
                error
            );
            self.emit(
                leg,
                Transition::AttemptFailed {
                    strategy: strategy.name().to_string(),
                    attempt,
                    kind: classified.kind,
                    elapsed_ms,
                },
            );

            if Instant::now() >= deadline {
                return StrategyRun::DeadlineHit;
            }
            if !is_retryable(classified.kind) || attempt >= max_attempts {
                return StrategyRun::Failed(classified);
            }

            let wake = (Instant::now() + self.policy.backoff(attempt)).min(deadline);
            sleep_until(wake).await;
            attempt += 1;
        }
    }

    fn emit(&self, leg: &Leg, transition: Transition) {
        emit(
            self.observer.as_ref(),
            UnitEvent::leg(&leg.spec_id, leg.direction, transition),
        );
    }
}

fn step_deadline(step: Duration, deadline: Instant) -> Instant {
    (Instant::now() + step).min(deadline)
}
