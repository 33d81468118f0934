//! Merging per-search outcomes into a single response

use super::types::{AggregatedResult, FlightRecord, FlightSet};
use crate::search::SearchSpec;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const NO_FLIGHTS_SUMMARY: &str = "No flights found for your search criteria";
const PARTIAL_SUFFIX: &str = " (some routes had no available flights)";

/// Builds the [`AggregatedResult`] for a request. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge `sets` into one result, in `specs` order.
    ///
    /// Sets naming an unknown or already-seen spec are ignored. Specs without
    /// a set count towards `total_searches` but not `successful_searches`.
    pub fn aggregate(
        &self,
        specs: &[SearchSpec],
        sets: &[FlightSet],
        elapsed: Duration,
    ) -> AggregatedResult {
        let mut by_id: HashMap<&str, &FlightSet> = HashMap::with_capacity(sets.len());
        for set in sets {
            let known = specs.iter().any(|s| s.id == set.spec_id);
            if !known {
                warn!("Ignoring result for unknown search {}", set.spec_id);
                continue;
            }
            if by_id.contains_key(set.spec_id.as_str()) {
                warn!("Ignoring duplicate result for search {}", set.spec_id);
                continue;
            }
            by_id.insert(set.spec_id.as_str(), set);
        }

        let mut flights: Vec<FlightRecord> = Vec::new();
        let mut successful_searches = 0;
        for spec in specs {
            let Some(set) = by_id.get(spec.id.as_str()) else {
                continue;
            };
            if set.is_success() {
                successful_searches += 1;
            }
            flights.extend(set.flights.iter().cloned());
        }

        let unique_routes: BTreeSet<String> = flights
            .iter()
            .filter(|f| !f.route.is_empty())
            .map(|f| f.route.clone())
            .collect();

        let total_searches = specs.len();
        let summary = Self::summary(
            flights.len(),
            &unique_routes,
            successful_searches,
            total_searches,
            elapsed,
        );

        debug!(
            total_searches,
            successful_searches,
            total_flights = flights.len(),
            "Aggregated search results"
        );

        AggregatedResult {
            flights,
            total_searches,
            successful_searches,
            unique_routes,
            summary,
            duration_ms: elapsed.as_millis() as u64,
            success: true,
            top_level_error: None,
        }
    }

    /// Render the fixed summary template
    pub fn summary(
        total_flights: usize,
        routes: &BTreeSet<String>,
        successful_searches: usize,
        total_searches: usize,
        elapsed: Duration,
    ) -> String {
        let mut summary = if total_flights > 0 {
            let mut s = format!(
                "Found {} flight options in {:.2} seconds",
                total_flights,
                elapsed.as_secs_f64()
            );
            if !routes.is_empty() {
                let joined = routes.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
                s.push_str(" for ");
                s.push_str(&joined);
            }
            s
        } else {
            NO_FLIGHTS_SUMMARY.to_string()
        };

        if successful_searches < total_searches {
            summary.push_str(PARTIAL_SUFFIX);
        }
        summary
    }
}
