//! Search and leg data models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a search covers one direction or both
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    #[default]
    OneWay,
    RoundTrip,
}

/// Cabin class requested for a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FareType {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

/// Direction of a leg within a round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Return,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => write!(f, "outbound"),
            Self::Return => write!(f, "return"),
        }
    }
}

fn default_passengers() -> u32 {
    1
}

/// One structured flight search produced by decomposition.
///
/// Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Unique within a batch
    pub id: String,
    /// Origin airport code
    pub origin: String,
    /// Destination airport code
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
    #[serde(default)]
    pub trip_type: TripType,
    #[serde(default)]
    pub max_stops: u32,
    #[serde(default)]
    pub fare_type: FareType,
    #[serde(default)]
    pub direct_only: bool,
}

impl SearchSpec {
    /// Create a one-way economy search for a single passenger
    pub fn new(
        id: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            departure_date,
            return_date: None,
            passengers: 1,
            trip_type: TripType::OneWay,
            max_stops: 0,
            fare_type: FareType::Economy,
            direct_only: false,
        }
    }

    /// Turn this into a round trip returning on `date`
    pub fn with_return(mut self, date: NaiveDate) -> Self {
        self.return_date = Some(date);
        self.trip_type = TripType::RoundTrip;
        self
    }

    pub fn with_passengers(mut self, passengers: u32) -> Self {
        self.passengers = passengers;
        self
    }

    pub fn with_max_stops(mut self, max_stops: u32) -> Self {
        self.max_stops = max_stops;
        self
    }

    pub fn with_fare_type(mut self, fare_type: FareType) -> Self {
        self.fare_type = fare_type;
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }

    /// `origin→destination` label for the outbound direction
    pub fn route(&self) -> String {
        format!("{}→{}", self.origin, self.destination)
    }

    /// Check the search can be run at all.
    ///
    /// Returns the reason when it cannot. These defects are contained to the
    /// spec itself and never fail the batch.
    pub fn validate(&self) -> Result<(), String> {
        if self.origin.trim().is_empty() || self.destination.trim().is_empty() {
            return Err("origin and destination are required".to_string());
        }
        if self.origin.eq_ignore_ascii_case(&self.destination) {
            return Err(format!("origin and destination are both {}", self.origin));
        }
        if self.passengers == 0 {
            return Err("at least one passenger is required".to_string());
        }
        if self.trip_type == TripType::RoundTrip {
            match self.return_date {
                None => return Err("round trip requires a return date".to_string()),
                Some(ret) if ret < self.departure_date => {
                    return Err("return date is before departure date".to_string())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Split into directional legs.
    ///
    /// One leg for one-way, outbound then return for round trips.
    pub fn legs(&self) -> Vec<Leg> {
        let max_stops = if self.direct_only { 0 } else { self.max_stops };
        let leg = |origin: &str, destination: &str, date, direction| Leg {
            spec_id: self.id.clone(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            date,
            passengers: self.passengers,
            max_stops,
            fare_type: self.fare_type,
            direction,
        };

        match (self.trip_type, self.return_date) {
            (TripType::RoundTrip, Some(return_date)) => vec![
                leg(
                    &self.origin,
                    &self.destination,
                    self.departure_date,
                    Some(Direction::Outbound),
                ),
                leg(
                    &self.destination,
                    &self.origin,
                    return_date,
                    Some(Direction::Return),
                ),
            ],
            _ => vec![leg(&self.origin, &self.destination, self.departure_date, None)],
        }
    }
}

/// One directional flight request derived from a [`SearchSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub spec_id: String,
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub passengers: u32,
    pub max_stops: u32,
    pub fare_type: FareType,
    /// `None` for one-way searches
    pub direction: Option<Direction>,
}

impl Leg {
    pub fn route(&self) -> String {
        format!("{}→{}", self.origin, self.destination)
    }
}
