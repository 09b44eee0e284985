//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    analysis_enabled: bool,
    timestamp: i64,
}

/// Liveness only; does not touch the database
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        analysis_enabled: state.analysis.is_enabled(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
