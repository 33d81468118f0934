//! HTTP request handlers

use super::state::AppState;
use crate::results::FlightRecord;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of `POST /search`
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

/// Response envelope for a travel request
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<FlightRecord>,
    pub success: bool,
    pub summary: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Root handler
pub async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Flight search API is running"
    }))
}

/// Search handler
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> impl IntoResponse {
    state.metrics.inc_request();
    info!("Searching flights for query: {}", request.query);

    let result = state.search.execute(&request.query).await;
    let duration_seconds = result.duration_seconds();

    Json(SearchResponse {
        results: result.flights,
        success: result.success,
        summary: result.summary,
        duration_seconds,
        error: result.top_level_error,
    })
}

/// Stats handler
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings.general.enable_metrics {
        return (StatusCode::NOT_FOUND, "Metrics are disabled").into_response();
    }
    Json(state.metrics.snapshot()).into_response()
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.instance_name(),
        "version": crate::VERSION
    }))
}
