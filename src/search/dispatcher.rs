//! Concurrent dispatch of search units

use super::models::{Direction, Leg, SearchSpec};
use crate::errors::{ClassifiedError, ErrorKind, SearchError};
use crate::observability::{emit, NoopObserver, Observer, Transition, UnitEvent};
use crate::results::FlightSet;
use crate::transport::{LegOutcome, TransportRetryEngine};
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Default cap on units running at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Slack given to a unit past the deadline before its task is aborted
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// Output of one dispatch
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// One set per input spec, in input order
    pub sets: Vec<FlightSet>,
    pub elapsed: Duration,
    /// Units that reached a terminal state before the deadline
    pub settled: usize,
}

/// What a unit task hands back
struct UnitOutcome {
    set: FlightSet,
    /// Every leg was cut off by the deadline
    timed_out: bool,
}

/// Fans a batch of specs out to the retry engine
pub struct SearchDispatcher {
    engine: Arc<TransportRetryEngine>,
    max_concurrency: usize,
    observer: Arc<dyn Observer>,
}

impl SearchDispatcher {
    pub fn new(engine: Arc<TransportRetryEngine>) -> Self {
        Self {
            engine,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every spec to a terminal state and return the sets in input order.
    ///
    /// Never waits past `deadline` (plus a short grace for aborted tasks).
    /// Fails only for batch-level faults such as duplicate spec ids.
    pub async fn dispatch(
        &self,
        specs: &[SearchSpec],
        deadline: Instant,
    ) -> Result<Dispatch, SearchError> {
        let mut seen = HashSet::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.id.as_str()) {
                return Err(SearchError::DuplicateSpecId(spec.id.clone()));
            }
        }

        let started = Instant::now();
        let limit = specs.len().min(self.max_concurrency).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        info!("Dispatching {} searches ({} at a time)", specs.len(), limit);

        let handles: Vec<_> = specs
            .iter()
            .map(|spec| {
                emit(
                    self.observer.as_ref(),
                    UnitEvent::unit(&spec.id, Transition::Dispatched),
                );

                let engine = self.engine.clone();
                let observer = self.observer.clone();
                let semaphore = semaphore.clone();
                let spec = spec.clone();
                let span = info_span!("search_unit", spec_id = %spec.id);

                tokio::spawn(
                    async move {
                        let _permit = match timeout_at(deadline, semaphore.acquire_owned()).await {
                            Ok(Ok(permit)) => permit,
                            _ => return None,
                        };
                        let outcome = run_unit(&engine, &spec, deadline).await;
                        let transition = if outcome.timed_out {
                            Transition::TimedOut
                        } else {
                            Transition::Settled {
                                flights: outcome.set.flights.len(),
                                failed: !outcome.set.is_success(),
                            }
                        };
                        emit(observer.as_ref(), UnitEvent::unit(&spec.id, transition));
                        Some(outcome)
                    }
                    .instrument(span),
                )
            })
            .collect();

        let backstop = deadline + DEADLINE_GRACE;
        let joined = join_all(handles.into_iter().map(|mut handle| async move {
            match timeout_at(backstop, &mut handle).await {
                Ok(result) => result.map_err(Some),
                Err(_) => {
                    handle.abort();
                    Err(None)
                }
            }
        }))
        .await;

        let mut sets = Vec::with_capacity(specs.len());
        let mut settled = 0;
        for (spec, result) in specs.iter().zip(joined) {
            match result {
                Ok(Some(outcome)) => {
                    if !outcome.timed_out {
                        settled += 1;
                    }
                    sets.push(outcome.set);
                }
                Ok(None) | Err(None) => {
                    warn!("Search {} did not start or finish before the deadline", spec.id);
                    emit(
                        self.observer.as_ref(),
                        UnitEvent::unit(&spec.id, Transition::TimedOut),
                    );
                    sets.push(FlightSet::timed_out(&spec.id));
                }
                Err(Some(join_error)) => {
                    error!("Search {} task failed: {}", spec.id, join_error);
                    settled += 1;
                    emit(
                        self.observer.as_ref(),
                        UnitEvent::unit(
                            &spec.id,
                            Transition::Settled {
                                flights: 0,
                                failed: true,
                            },
                        ),
                    );
                    sets.push(FlightSet::failed(
                        &spec.id,
                        ClassifiedError::from_kind(ErrorKind::Unknown),
                    ));
                }
            }
        }

        let elapsed = started.elapsed();
        debug!(
            settled,
            total = specs.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Dispatch finished"
        );

        Ok(Dispatch {
            sets,
            elapsed,
            settled,
        })
    }
}

/// Run every leg of `spec` concurrently and merge them into one set
async fn run_unit(engine: &TransportRetryEngine, spec: &SearchSpec, deadline: Instant) -> UnitOutcome {
    if let Err(reason) = spec.validate() {
        warn!("Search {} rejected: {}", spec.id, reason);
        return UnitOutcome {
            set: FlightSet::failed(&spec.id, ClassifiedError::from_kind(ErrorKind::InvalidInput)),
            timed_out: false,
        };
    }

    let legs = spec.legs();
    let outcomes = join_all(legs.iter().map(|leg| run_leg(engine, leg, deadline))).await;
    merge_legs(&spec.id, &legs, outcomes)
}

/// Run one leg, turning a panic into an `Unknown` failure for that leg only
async fn run_leg(engine: &TransportRetryEngine, leg: &Leg, deadline: Instant) -> LegOutcome {
    match AssertUnwindSafe(engine.run(leg, deadline)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            error!("Leg {} of search {} panicked", leg.route(), leg.spec_id);
            LegOutcome::Exhausted {
                error: ClassifiedError::from_kind(ErrorKind::Unknown),
                deadline_hit: false,
            }
        }
    }
}

/// Combine leg outcomes in leg order: outbound flights before return flights,
/// one message per failed leg.
fn merge_legs(spec_id: &str, legs: &[Leg], outcomes: Vec<LegOutcome>) -> UnitOutcome {
    let mut flights = Vec::new();
    let mut messages = Vec::new();
    let mut first_kind = None;
    let mut deadline_legs = 0;

    for (leg, outcome) in legs.iter().zip(outcomes) {
        match outcome {
            LegOutcome::Success { flights: found, .. } => flights.extend(found),
            LegOutcome::Exhausted {
                error,
                deadline_hit,
            } => {
                if deadline_hit {
                    deadline_legs += 1;
                }
                first_kind.get_or_insert(error.kind);
                messages.push(match leg.direction {
                    Some(Direction::Outbound) => format!("Outbound flight: {}", error.message),
                    Some(Direction::Return) => format!("Return flight: {}", error.message),
                    None => error.message,
                });
            }
        }
    }

    let error_message = if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    };

    UnitOutcome {
        set: FlightSet {
            spec_id: spec_id.to_string(),
            flights,
            error_message,
            error_kind: first_kind,
            searched_at: Utc::now(),
        },
        timed_out: !legs.is_empty() && deadline_legs == legs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchError;
    use crate::observability::RecordingObserver;
    use crate::transport::testing::{Behavior, ScriptedFetcher};
    use crate::transport::{RetryPolicy, Strategy};
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn spec(id: &str, origin: &str, destination: &str) -> SearchSpec {
        SearchSpec::new(id, origin, destination, date(1))
    }

    fn dispatcher(fetcher: ScriptedFetcher) -> SearchDispatcher {
        let policy = RetryPolicy {
            retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(20),
            retry_jitter: Duration::ZERO,
            ..Default::default()
        };
        let strategies = vec![
            Strategy::LocalExecutor {
                endpoint: "mock://local".to_string(),
            },
            Strategy::PackagedFallback {
                endpoint: "mock://fallback".to_string(),
            },
        ];
        let engine = TransportRetryEngine::new(Arc::new(fetcher), strategies, policy);
        SearchDispatcher::new(Arc::new(engine))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(300)
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Flights(1));
        let dispatch = dispatcher(fetcher)
            .dispatch(&[], far_deadline())
            .await
            .unwrap();
        assert!(dispatch.sets.is_empty());
        assert_eq!(dispatch.settled, 0);
    }

    #[tokio::test]
    async fn test_independence() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| {
            if leg.spec_id == "a" {
                Behavior::Fail(FetchError::Blocked("captcha".into()))
            } else {
                Behavior::Flights(2)
            }
        });
        let specs = vec![spec("a", "LHR", "CDG"), spec("b", "CDG", "FCO")];
        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        assert_eq!(dispatch.sets.len(), 2);
        assert_eq!(dispatch.settled, 2);

        let a = &dispatch.sets[0];
        assert_eq!(a.spec_id, "a");
        assert!(a.flights.is_empty());
        assert_eq!(a.error_kind, Some(ErrorKind::AntiBotBlocked));
        assert_eq!(a.error_message.as_deref(), Some(ErrorKind::AntiBotBlocked.message()));

        let b = &dispatch.sets[1];
        assert!(b.is_success());
        assert_eq!(b.flights.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_follows_input_order() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.spec_id.as_str() {
            "slow" => Behavior::Delayed(Duration::from_secs(3), 1),
            _ => Behavior::Flights(1),
        });
        let specs = vec![
            spec("slow", "LHR", "CDG"),
            spec("fast", "CDG", "FCO"),
            spec("also-fast", "FCO", "MAD"),
        ];
        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        let ids: Vec<&str> = dispatch.sets.iter().map(|s| s.spec_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast", "also-fast"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_fail_the_batch() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Flights(1));
        let specs = vec![spec("a", "LHR", "CDG"), spec("a", "CDG", "FCO")];
        let err = dispatcher(fetcher.clone())
            .dispatch(&specs, far_deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::DuplicateSpecId(id) if id == "a"));
        assert_eq!(fetcher.total_fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_spec_is_contained() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Flights(1));
        let specs = vec![
            spec("bad", "LHR", "CDG").with_passengers(0),
            spec("good", "CDG", "FCO"),
        ];
        let dispatch = dispatcher(fetcher.clone())
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        assert_eq!(dispatch.sets[0].error_kind, Some(ErrorKind::InvalidInput));
        assert!(dispatch.sets[1].is_success());
        assert_eq!(fetcher.total_fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_round_trip() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.direction {
            Some(Direction::Return) => Behavior::Fail(FetchError::ToolingMissing("gone".into())),
            _ => Behavior::Flights(2),
        });
        let specs = vec![spec("rt", "LHR", "CDG").with_return(date(8))];
        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        let set = &dispatch.sets[0];
        assert_eq!(set.flights.len(), 2);
        assert!(set
            .flights
            .iter()
            .all(|f| f.direction == Some(Direction::Outbound)));
        assert_eq!(
            set.error_message.as_deref(),
            Some(format!("Return flight: {}", ErrorKind::ToolingMissing.message()).as_str())
        );
        assert!(!set.is_success());
    }

    #[tokio::test]
    async fn test_round_trip_outbound_precedes_return() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.direction {
            Some(Direction::Outbound) => Behavior::Delayed(Duration::from_millis(30), 1),
            _ => Behavior::Flights(1),
        });
        let specs = vec![spec("rt", "LHR", "CDG").with_return(date(8))];
        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        let directions: Vec<_> = dispatch.sets[0].flights.iter().map(|f| f.direction).collect();
        assert_eq!(
            directions,
            vec![Some(Direction::Outbound), Some(Direction::Return)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_enforcement() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.spec_id.as_str() {
            "stuck" => Behavior::Hang(Duration::from_secs(10)),
            _ => Behavior::Flights(1),
        });
        let specs = vec![spec("stuck", "LHR", "CDG"), spec("quick", "CDG", "FCO")];
        let started = Instant::now();
        let deadline = started + Duration::from_secs(1);

        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, deadline)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1300));
        assert_eq!(dispatch.sets[0].error_kind, Some(ErrorKind::Timeout));
        assert_eq!(
            dispatch.sets[0].error_message.as_deref(),
            Some(ErrorKind::Timeout.message())
        );
        assert!(dispatch.sets[1].is_success());
        assert_eq!(dispatch.settled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Delayed(Duration::from_secs(1), 1));
        let specs: Vec<_> = (0..5)
            .map(|i| spec(&format!("s{i}"), "LHR", "CDG"))
            .collect();

        let dispatch = dispatcher(fetcher)
            .with_max_concurrency(2)
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        assert_eq!(dispatch.sets.len(), 5);
        assert!(dispatch.elapsed >= Duration::from_secs(3));
        assert!(dispatch.elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_unknown() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.spec_id.as_str() {
            "boom" => Behavior::Panic,
            _ => Behavior::Flights(1),
        });
        let specs = vec![spec("boom", "LHR", "CDG"), spec("fine", "CDG", "FCO")];
        let dispatch = dispatcher(fetcher.clone())
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        assert_eq!(dispatch.sets[0].error_kind, Some(ErrorKind::Unknown));
        assert!(dispatch.sets[1].is_success());
        assert_eq!(fetcher.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_panicking_return_leg_keeps_outbound_flights() {
        let fetcher = ScriptedFetcher::new(|_, leg, _| match leg.direction {
            Some(Direction::Return) => Behavior::Panic,
            _ => Behavior::Flights(2),
        });
        let specs = vec![spec("rt", "LHR", "CDG").with_return(date(8))];
        let dispatch = dispatcher(fetcher.clone())
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        let set = &dispatch.sets[0];
        assert_eq!(set.flights.len(), 2);
        assert!(set
            .flights
            .iter()
            .all(|f| f.direction == Some(Direction::Outbound)));
        assert_eq!(set.error_kind, Some(ErrorKind::Unknown));
        assert_eq!(
            set.error_message.as_deref(),
            Some(format!("Return flight: {}", ErrorKind::Unknown.message()).as_str())
        );
        assert_eq!(dispatch.settled, 1);
        assert_eq!(fetcher.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_units_time_out_at_deadline() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Hang(Duration::from_secs(60)));
        let specs = vec![
            spec("a", "LHR", "CDG"),
            spec("b", "CDG", "FCO"),
            spec("c", "FCO", "MAD"),
        ];
        let started = Instant::now();
        let deadline = started + Duration::from_secs(1);

        let dispatch = dispatcher(fetcher)
            .with_max_concurrency(1)
            .dispatch(&specs, deadline)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1300));
        assert_eq!(dispatch.sets.len(), 3);
        assert!(dispatch
            .sets
            .iter()
            .all(|s| s.error_kind == Some(ErrorKind::Timeout) && s.flights.is_empty()));
        let ids: Vec<&str> = dispatch.sets.iter().map(|s| s.spec_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(dispatch.settled, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unit_ignoring_deadline_is_aborted() {
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Block(Duration::from_millis(1500)));
        let specs = vec![spec("blocked", "LHR", "CDG")];
        let started = Instant::now();
        let deadline = started + Duration::from_millis(100);

        let dispatch = dispatcher(fetcher)
            .dispatch(&specs, deadline)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(dispatch.sets[0].error_kind, Some(ErrorKind::Timeout));
        assert!(dispatch.sets[0].flights.is_empty());
        assert_eq!(dispatch.settled, 0);
    }

    #[tokio::test]
    async fn test_unit_transitions_observed() {
        let recorder = Arc::new(RecordingObserver::new());
        let fetcher = ScriptedFetcher::new(|_, _, _| Behavior::Flights(3));
        let specs = vec![spec("a", "LHR", "CDG")];

        dispatcher(fetcher)
            .with_observer(recorder.clone())
            .dispatch(&specs, far_deadline())
            .await
            .unwrap();

        let events = recorder.events_for("a");
        assert_eq!(events.first().map(|e| &e.transition), Some(&Transition::Dispatched));
        assert_eq!(
            events.last().map(|e| &e.transition),
            Some(&Transition::Settled {
                flights: 3,
                failed: false
            })
        );
    }
}
