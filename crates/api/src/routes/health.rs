//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use circuit_breaker::BreakerSnapshot;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub restaurant_breaker: BreakerSnapshot,
    pub in_flight_events: usize,
    pub dead_letters: u64,
}

/// GET /health — returns system health status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let saga = &state.saga;
    Json(HealthResponse {
        status: "ok",
        restaurant_breaker: saga.restaurant_breaker().snapshot().await,
        in_flight_events: saga.bus().in_flight(),
        dead_letters: saga.dead_letter_count().await,
    })
}
