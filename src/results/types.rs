//! Result type definitions

use crate::errors::{ClassifiedError, ErrorKind};
use crate::search::{Direction, Leg};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single flight option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub airline: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure_time: String,
    pub arrival_time: String,
    /// Total duration as reported by the source (e.g. "4h 15m")
    pub duration: String,
    /// Price as reported by the source
    pub price: String,
    pub currency: String,
    #[serde(default)]
    pub stops: u32,
    /// `origin→destination`
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    #[serde(default)]
    pub passengers: u32,
}

impl FlightRecord {
    /// Stamp the leg's route, direction, date and party size onto this
    /// flight. Whatever the source put there is overwritten.
    pub fn tagged(mut self, leg: &Leg) -> Self {
        self.route = leg.route();
        self.direction = leg.direction;
        self.departure_date = Some(leg.date);
        self.passengers = leg.passengers;
        self
    }
}

/// Outcome of one search after all its legs settle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightSet {
    pub spec_id: String,
    /// Outbound flights precede return flights
    pub flights: Vec<FlightRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Kind of the first failed leg, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub searched_at: DateTime<Utc>,
}

impl FlightSet {
    pub fn success(spec_id: impl Into<String>, flights: Vec<FlightRecord>) -> Self {
        Self {
            spec_id: spec_id.into(),
            flights,
            error_message: None,
            error_kind: None,
            searched_at: Utc::now(),
        }
    }

    pub fn failed(spec_id: impl Into<String>, error: ClassifiedError) -> Self {
        Self {
            spec_id: spec_id.into(),
            flights: Vec::new(),
            error_message: Some(error.message),
            error_kind: Some(error.kind),
            searched_at: Utc::now(),
        }
    }

    /// Set finalised by the global deadline before it settled
    pub fn timed_out(spec_id: impl Into<String>) -> Self {
        Self::failed(spec_id, ClassifiedError::timeout())
    }

    pub fn is_success(&self) -> bool {
        self.error_message
            .as_deref()
            .map_or(true, |message| message.is_empty())
    }
}

/// Merged outcome of a whole travel request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub flights: Vec<FlightRecord>,
    pub total_searches: usize,
    pub successful_searches: usize,
    pub unique_routes: BTreeSet<String>,
    pub summary: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_error: Option<String>,
}

impl AggregatedResult {
    pub fn total_flights(&self) -> usize {
        self.flights.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Mark the whole request as failed with a user-facing message
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.top_level_error = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchSpec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn round_trip_legs() -> Vec<Leg> {
        SearchSpec::new("rt", "LHR", "CDG", date(1))
            .with_return(date(8))
            .with_passengers(2)
            .legs()
    }

    fn flight() -> FlightRecord {
        FlightRecord {
            airline: "British Airways".to_string(),
            departure_airport: "LHR".to_string(),
            arrival_airport: "CDG".to_string(),
            departure_time: "08:10".to_string(),
            arrival_time: "10:25".to_string(),
            duration: "1h 15m".to_string(),
            price: "120".to_string(),
            currency: "GBP".to_string(),
            stops: 0,
            route: String::new(),
            direction: None,
            departure_date: None,
            passengers: 0,
        }
    }

    #[test]
    fn test_tagging_fills_leg_fields() {
        let legs = round_trip_legs();
        let outbound = flight().tagged(&legs[0]);
        assert_eq!(outbound.route, "LHR→CDG");
        assert_eq!(outbound.direction, Some(Direction::Outbound));
        assert_eq!(outbound.departure_date, Some(date(1)));
        assert_eq!(outbound.passengers, 2);

        let inbound = flight().tagged(&legs[1]);
        assert_eq!(inbound.route, "CDG→LHR");
        assert_eq!(inbound.departure_date, Some(date(8)));
    }

    #[test]
    fn test_tagging_overwrites_source_route() {
        let mut f = flight();
        f.route = "LHR -> CDG".to_string();
        let tagged = f.tagged(&round_trip_legs()[0]);
        assert_eq!(tagged.route, "LHR→CDG");
    }

    #[test]
    fn test_flight_set_success_flags() {
        assert!(FlightSet::success("a", vec![flight()]).is_success());

        let failed = FlightSet::timed_out("b");
        assert!(!failed.is_success());
        assert_eq!(failed.error_kind, Some(ErrorKind::Timeout));
        assert!(failed.flights.is_empty());
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let f = flight().tagged(&round_trip_legs()[1]);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["direction"], "return");
        assert_eq!(json["departure_date"], "2025-06-08");

        let one_way = serde_json::to_value(flight()).unwrap();
        assert!(one_way["direction"].is_null());
    }
}
