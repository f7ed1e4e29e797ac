//! feedlens-server library
//!
//! Customer feedback ingestion and analysis service. Exposes the router and
//! building blocks for integration testing.

pub mod analysis;
pub mod api;
pub mod clustering;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod pagination;
pub mod pipeline;
pub mod waitlist;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use feedlens_common::config::LimitsConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::analysis::AnalysisService;
use crate::waitlist::FallbackWaitlist;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Model-backed analysis with keyword fallback
    pub analyzer: Arc<AnalysisService>,
    pub waitlist: Arc<FallbackWaitlist>,
    /// Ingestion, search and clustering bounds
    pub limits: Arc<LimitsConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        analyzer: AnalysisService,
        waitlist: FallbackWaitlist,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            db,
            analyzer: Arc::new(analyzer),
            waitlist: Arc::new(waitlist),
            limits: Arc::new(limits),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Feedback, search and cluster routes require a bearer API token. Health,
/// the waitlist and the webhook (which checks its own token) are public.
/// CORS is permissive so a browser dashboard on another origin can call in.
pub fn build_router(state: AppState) -> Router {
    use axum::extract::DefaultBodyLimit;
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let protected = Router::new()
        .route(
            "/api/feedback",
            post(api::create_feedback).get(api::list_feedback),
        )
        .route("/api/feedback/stats", get(api::feedback_stats))
        .route(
            "/api/feedback/upload",
            post(api::upload_csv).layer(DefaultBodyLimit::max(state.limits.csv_max_bytes)),
        )
        .route(
            "/api/feedback/:id",
            get(api::get_feedback)
                .put(api::update_feedback)
                .delete(api::delete_feedback),
        )
        .route("/api/search", post(api::search_feedback))
        .route("/api/clusters", get(api::list_clusters))
        .route("/api/clusters/rebuild", post(api::rebuild_clusters))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/waitlist", post(api::join_waitlist))
        .route("/api/webhook/feedback", post(api::receive_webhook))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
