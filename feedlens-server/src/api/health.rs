//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response with build identification
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    /// `model` when a language model is configured, else `fallback`
    pub analysis_mode: String,
    pub uptime_seconds: i64,
}

/// GET /health
///
/// Does NOT require authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let analysis_mode = if state.analyzer.has_model() {
        "model"
    } else {
        "fallback"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "feedlens-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        analysis_mode: analysis_mode.to_string(),
        uptime_seconds: (feedlens_common::time::now() - state.startup_time).num_seconds(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
