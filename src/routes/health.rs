// src/routes/health.rs
//! API health check endpoint for the sensorflow quality service.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the service is up. Following the Explicit
//! Module Boundary Pattern (EMBP), it exports only a subrouter to the gateway
//! (`mod.rs`).

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Reading types with bounds or calibration configured
    reading_types: usize,
}

/// Handle `GET /health`.
///
/// Reports how many reading types the loaded sensor config covers, so a
/// deployment that silently fell back to the empty config is visible. Does
/// not touch the database.
async fn health(State((_, _, sensors)): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        reading_types: sensors.len(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
