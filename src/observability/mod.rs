//! Observability hooks for search units
//!
//! The dispatcher and the retry engine report every state transition through
//! an [`Observer`] passed in by the caller. Observers are best-effort: a
//! panicking observer is contained and never affects a search.

use crate::errors::ErrorKind;
use crate::search::Direction;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// A state transition of one search unit or one of its legs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// Unit handed to the scheduler
    Dispatched,
    /// Leg started probing its strategies
    Probing,
    ProbeFailed { strategy: String, kind: ErrorKind },
    /// One fetch attempt started (attempt numbers start at 1)
    Executing { strategy: String, attempt: u32 },
    AttemptFailed {
        strategy: String,
        attempt: u32,
        kind: ErrorKind,
        elapsed_ms: u64,
    },
    Succeeded {
        strategy: String,
        flights: usize,
        elapsed_ms: u64,
    },
    /// Leg ran out of strategies
    Exhausted { kind: ErrorKind },
    /// Unit produced its final result
    Settled { flights: usize, failed: bool },
    /// Unit finalised by the global deadline
    TimedOut,
}

/// One transition event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitEvent {
    pub spec_id: String,
    /// Leg direction, `None` for one-way legs and unit-level events
    pub direction: Option<Direction>,
    #[serde(flatten)]
    pub transition: Transition,
}

impl UnitEvent {
    pub fn unit(spec_id: &str, transition: Transition) -> Self {
        Self {
            spec_id: spec_id.to_string(),
            direction: None,
            transition,
        }
    }

    pub fn leg(spec_id: &str, direction: Option<Direction>, transition: Transition) -> Self {
        Self {
            spec_id: spec_id.to_string(),
            direction,
            transition,
        }
    }
}

/// Receives unit transitions
pub trait Observer: Send + Sync {
    fn on_transition(&self, event: &UnitEvent);
}

/// Deliver an event, containing any panic raised by the observer.
pub fn emit(observer: &dyn Observer, event: UnitEvent) {
    let result = catch_unwind(AssertUnwindSafe(|| observer.on_transition(&event)));
    if result.is_err() {
        warn!(spec_id = %event.spec_id, "Observer panicked; event dropped");
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_transition(&self, _event: &UnitEvent) {}
}

/// Emits events as `tracing` records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_transition(&self, event: &UnitEvent) {
        let direction = event.direction.map(|d| d.to_string()).unwrap_or_default();
        match &event.transition {
            Transition::Exhausted { kind } => {
                warn!(spec_id = %event.spec_id, %direction, %kind, "Leg exhausted all strategies")
            }
            Transition::TimedOut => {
                warn!(spec_id = %event.spec_id, "Search unit hit the global deadline")
            }
            Transition::Settled { flights, failed } => info!(
                spec_id = %event.spec_id,
                flights,
                failed,
                "Search unit settled"
            ),
            other => debug!(spec_id = %event.spec_id, %direction, transition = ?other, "Unit transition"),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UnitEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events recorded so far
    pub fn events(&self) -> Vec<UnitEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events for one search, in arrival order
    pub fn events_for(&self, spec_id: &str) -> Vec<UnitEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.spec_id == spec_id)
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_transition(&self, event: &UnitEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Forwards each event to several observers
#[derive(Clone, Default)]
pub struct Observers {
    inner: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.inner.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Observer for Observers {
    fn on_transition(&self, event: &UnitEvent) {
        for observer in &self.inner {
            emit(observer.as_ref(), event.clone());
        }
    }
}
