//! Planner backed by an OpenAI-compatible chat-completions API

use super::QueryPlanner;
use crate::config::PlannerSettings;
use crate::errors::SearchError;
use crate::network::{HttpClient, HttpRequest};
use crate::search::{FareType, SearchSpec, TripType};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"You are a travel query analyzer. Break the user's travel request into the individual flight searches it needs.

Rules:
- One search per origin/destination/date combination. A round trip is ONE search with a return_date.
- Multi-city itineraries are several one-way searches.
- Use IATA airport codes. For international flights prefer the main international hub.
- Dates are ISO 8601 (YYYY-MM-DD).

Answer with a JSON object only:
{"searches": [{"origin": "JFK", "destination": "CDG", "departure_date": "2025-12-15",
  "return_date": null, "passengers": 1, "trip_type": "one_way" | "round_trip",
  "max_stops": 0, "fare_type": "economy" | "premium-economy" | "business" | "first",
  "direct_only": false}]}"#;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Breakdown {
    searches: Vec<PlannedSearch>,
}

/// A search as the model writes it; the id is optional
#[derive(Debug, Deserialize)]
struct PlannedSearch {
    #[serde(default)]
    id: Option<String>,
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    #[serde(default)]
    return_date: Option<NaiveDate>,
    #[serde(default)]
    passengers: Option<u32>,
    #[serde(default, alias = "search_type")]
    trip_type: TripType,
    #[serde(default)]
    max_stops: u32,
    #[serde(default)]
    fare_type: FareType,
    #[serde(default)]
    direct_only: bool,
}

impl PlannedSearch {
    fn into_spec(self, position: usize) -> SearchSpec {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("search-{}", position + 1));
        SearchSpec {
            id,
            origin: self.origin.trim().to_uppercase(),
            destination: self.destination.trim().to_uppercase(),
            departure_date: self.departure_date,
            return_date: self.return_date,
            passengers: self.passengers.unwrap_or(1),
            trip_type: self.trip_type,
            max_stops: self.max_stops,
            fare_type: self.fare_type,
            direct_only: self.direct_only,
        }
    }
}

/// Decomposes requests with a chat-completions model
pub struct OpenAiPlanner {
    client: HttpClient,
    settings: PlannerSettings,
}

impl OpenAiPlanner {
    pub fn new(client: HttpClient, settings: PlannerSettings) -> Self {
        Self { client, settings }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl QueryPlanner for OpenAiPlanner {
    async fn breakdown(&self, query: &str) -> Result<Vec<SearchSpec>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Decomposition("query is empty".to_string()));
        }

        let body = json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
        });

        let mut request = HttpRequest::post(self.endpoint())
            .json(body)
            .timeout(self.settings.timeout());
        if let Some(ref key) = self.settings.api_key {
            request = request.bearer(key);
        }

        debug!("Requesting breakdown from {}", self.settings.model);
        let response = self.client.execute(request).await.map_err(|e| {
            warn!("Planner request failed: {}", e);
            SearchError::Decomposition(if e.is_timeout() {
                "planner timed out".to_string()
            } else {
                format!("planner request failed: {e}")
            })
        })?;

        if !response.is_success() {
            warn!("Planner returned HTTP {}", response.status);
            return Err(SearchError::Decomposition(format!(
                "planner returned HTTP {}",
                response.status
            )));
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| SearchError::Decomposition(format!("unexpected planner response: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SearchError::Decomposition("planner returned no content".to_string()))?;

        let breakdown = parse_breakdown(&content)?;
        let specs: Vec<SearchSpec> = breakdown
            .searches
            .into_iter()
            .enumerate()
            .map(|(i, planned)| planned.into_spec(i))
            .collect();

        info!("Planner produced {} searches", specs.len());
        Ok(specs)
    }
}

/// Parse the model's answer, tolerating a fenced code block around it
fn parse_breakdown(content: &str) -> Result<Breakdown, SearchError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| SearchError::Decomposition(format!("could not parse planner output: {e}")))
}
