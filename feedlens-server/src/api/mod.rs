//! HTTP API handlers for feedlens-server

pub mod auth;
pub mod clusters;
pub mod feedback;
pub mod health;
pub mod search;
pub mod upload;
pub mod waitlist;
pub mod webhook;

pub use auth::{auth_middleware, Owner};
pub use clusters::{list_clusters, rebuild_clusters};
pub use feedback::{
    create_feedback, delete_feedback, feedback_stats, get_feedback, list_feedback, update_feedback,
};
pub use health::health_routes;
pub use search::search_feedback;
pub use upload::upload_csv;
pub use waitlist::join_waitlist;
pub use webhook::receive_webhook;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Unwrap a JSON body, reporting rejections in the API error format
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Unwrap query parameters, reporting rejections in the API error format
pub(crate) fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Parse a path id; anything unparseable cannot exist
pub(crate) fn path_id(path: Result<Path<String>, PathRejection>) -> ApiResult<Uuid> {
    let Path(raw) = path.map_err(|_| ApiError::NotFound("Feedback".to_string()))?;
    Uuid::parse_str(&raw).map_err(|_| ApiError::NotFound(format!("Feedback {}", raw)))
}
