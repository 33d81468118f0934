//! Request pipeline: decompose, dispatch, aggregate

use super::dispatcher::SearchDispatcher;
use super::models::SearchSpec;
use crate::planner::QueryPlanner;
use crate::results::{AggregatedResult, ResultAggregator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default global deadline for one request
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(90);

const DECOMPOSITION_MESSAGE: &str =
    "Could not understand the travel request. Please include origins, destinations and dates.";
const DEADLINE_MESSAGE: &str =
    "The search deadline elapsed before any flight search completed.";

/// Search executor that runs one travel request end to end
pub struct Search {
    planner: Arc<dyn QueryPlanner>,
    dispatcher: SearchDispatcher,
    aggregator: ResultAggregator,
    deadline: Duration,
}

impl Search {
    /// Create a new search executor
    pub fn new(planner: Arc<dyn QueryPlanner>, dispatcher: SearchDispatcher) -> Self {
        Self {
            planner,
            dispatcher,
            aggregator: ResultAggregator::new(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Set the global deadline, counted from the end of decomposition
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run a free-form travel request. Always produces a result.
    pub async fn execute(&self, query: &str) -> AggregatedResult {
        let request_id = Uuid::new_v4();
        let span = info_span!("search_request", %request_id);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &str) -> AggregatedResult {
        let started = Instant::now();
        info!("Decomposing travel request ({} chars)", query.len());

        let specs = match self.planner.breakdown(query).await {
            Ok(specs) => specs,
            Err(e) => {
                warn!("{}", e);
                return self
                    .aggregator
                    .aggregate(&[], &[], started.elapsed())
                    .with_error(DECOMPOSITION_MESSAGE);
            }
        };

        self.run_specs(&specs, started).await
    }

    /// Dispatch already decomposed searches
    pub async fn execute_specs(&self, specs: &[SearchSpec]) -> AggregatedResult {
        let request_id = Uuid::new_v4();
        let span = info_span!("search_request", %request_id);
        self.run_specs(specs, Instant::now()).instrument(span).await
    }

    async fn run_specs(&self, specs: &[SearchSpec], started: Instant) -> AggregatedResult {
        let deadline = Instant::now() + self.deadline;

        let dispatch = match self.dispatcher.dispatch(specs, deadline).await {
            Ok(dispatch) => dispatch,
            Err(e) => {
                error!(class = ?e.failure_class(), "Dispatch failed: {}", e);
                return self
                    .aggregator
                    .aggregate(specs, &[], started.elapsed())
                    .with_error(DECOMPOSITION_MESSAGE);
            }
        };

        // Summary reports search time; the envelope reports the whole request.
        let mut result = self
            .aggregator
            .aggregate(specs, &dispatch.sets, dispatch.elapsed);
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "{} ({}/{} searches succeeded)",
            result.summary, result.successful_searches, result.total_searches
        );

        if !specs.is_empty() && dispatch.settled == 0 {
            warn!("No search settled before the deadline");
            return result.with_error(DEADLINE_MESSAGE);
        }
        result
    }
}
