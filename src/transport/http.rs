//! Flight fetcher backed by HTTP executors
//!
//! Each strategy's endpoint serves `GET /health` and `POST /flights`. The
//! flights endpoint takes one leg and answers `{"flights": [...]}`.

use super::engine::RetryPolicy;
use super::strategy::Strategy;
use super::traits::{FlightFetcher, TransportSession};
use crate::config::OutgoingSettings;
use crate::errors::FetchError;
use crate::network::{HttpClient, HttpResponse};
use crate::results::FlightRecord;
use crate::search::{FareType, Leg};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SNIPPET_LEN: usize = 200;

/// Body of `POST /flights`
#[derive(Debug, Serialize)]
struct FlightQuery<'a> {
    origin: &'a str,
    destination: &'a str,
    date: NaiveDate,
    passengers: u32,
    max_stops: u32,
    fare_type: FareType,
}

impl<'a> From<&'a Leg> for FlightQuery<'a> {
    fn from(leg: &'a Leg) -> Self {
        Self {
            origin: &leg.origin,
            destination: &leg.destination,
            date: leg.date,
            passengers: leg.passengers,
            max_stops: leg.max_stops,
            fare_type: leg.fare_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlightList {
    flights: Vec<FlightRecord>,
}

/// Fetches flights from HTTP executors, one fresh client per session
pub struct HttpFlightFetcher {
    probe_client: HttpClient,
    outgoing: OutgoingSettings,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpFlightFetcher {
    pub fn new(outgoing: &OutgoingSettings, policy: &RetryPolicy) -> anyhow::Result<Self> {
        Ok(Self {
            probe_client: HttpClient::with_settings(outgoing)?,
            outgoing: outgoing.clone(),
            probe_timeout: policy.probe_timeout,
            fetch_timeout: policy.execution_timeout,
        })
    }
}

#[async_trait]
impl FlightFetcher for HttpFlightFetcher {
    async fn probe(&self, strategy: &Strategy) -> Result<(), FetchError> {
        let url = strategy.url("health");
        let response = self
            .probe_client
            .get(&url, self.probe_timeout)
            .await
            .map_err(|e| request_error(e, self.probe_timeout))?;

        if response.is_success() {
            return Ok(());
        }
        Err(status_error(&response).unwrap_or_else(|| {
            FetchError::Connection(format!("health check returned HTTP {}", response.status))
        }))
    }

    async fn open(&self, strategy: &Strategy) -> Result<Box<dyn TransportSession>, FetchError> {
        let client = HttpClient::with_settings(&self.outgoing)
            .map_err(|e| FetchError::Other(format!("could not build HTTP client: {e}")))?;
        Ok(Box::new(HttpSession {
            client,
            url: strategy.url("flights"),
            timeout: self.fetch_timeout,
        }))
    }
}

struct HttpSession {
    client: HttpClient,
    url: String,
    timeout: Duration,
}

#[async_trait]
impl TransportSession for HttpSession {
    async fn fetch(&mut self, leg: &Leg) -> Result<Vec<FlightRecord>, FetchError> {
        let body = serde_json::to_value(FlightQuery::from(leg))
            .map_err(|e| FetchError::InvalidInput(e.to_string()))?;

        debug!("POST {} for {}", self.url, leg.route());
        let response = self
            .client
            .post_json(&self.url, body, self.timeout)
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        if let Some(error) = status_error(&response) {
            return Err(error);
        }

        match response.json::<FlightList>() {
            Ok(list) => Ok(list.flights),
            Err(_) if response.is_captcha() => Err(FetchError::Blocked(snippet(&response.text))),
            Err(e) => Err(FetchError::MalformedResponse(e.to_string())),
        }
    }
}

/// Map a transport-level failure onto a typed error
fn request_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_connect() {
        FetchError::Connection(error.to_string())
    } else {
        FetchError::Other(error.to_string())
    }
}

/// Map a non-2xx response onto a typed error; `None` for success
fn status_error(response: &HttpResponse) -> Option<FetchError> {
    if response.is_success() {
        return None;
    }
    let body = snippet(&response.text);
    let error = match response.status {
        _ if response.is_rate_limited() => FetchError::Blocked("rate limited".to_string()),
        403 => FetchError::Blocked(format!("HTTP {}", response.status)),
        404 => FetchError::ToolingMissing(format!("no flight executor at {}", response.url)),
        400 | 422 => FetchError::InvalidInput(body),
        408 | 504 => FetchError::Timeout(Duration::ZERO),
        502 | 503 => FetchError::Connection(format!("HTTP {}", response.status)),
        _ if response.is_captcha() => FetchError::Blocked(body),
        status => FetchError::Other(format!("HTTP {status}: {body}")),
    };
    Some(error)
}

fn snippet(text: &str) -> String {
    text.trim().chars().take(SNIPPET_LEN).collect()
}
