//! Webhook push endpoint
//!
//! Authenticated by its own bearer token rule: the token is checked for
//! shape before it is looked up, and nothing is read or written for a token
//! that fails either check.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use feedlens_common::models::FeedbackItem;
use feedlens_common::time;
use tracing::warn;

use super::auth::resolve_owner;
use super::json_body;
use crate::error::ApiResult;
use crate::ingest::{normalize_feedback, validate_webhook_token, FeedbackInput, SOURCE_WEBHOOK};
use crate::pipeline;
use crate::AppState;

/// POST /api/webhook/feedback
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<FeedbackInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedbackItem>)> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = validate_webhook_token(header, state.limits.webhook_min_token_len).map_err(|e| {
        warn!("Webhook rejected: {}", e);
        e
    })?;
    let owner = resolve_owner(&state.db, token).await?;

    let input = json_body(payload)?;
    let candidate = normalize_feedback(
        input,
        SOURCE_WEBHOOK,
        state.limits.max_text_chars,
        time::now(),
    )?;

    let item = pipeline::ingest_one(&state.db, &state.analyzer, owner.as_str(), candidate).await?;
    Ok((StatusCode::CREATED, Json(item)))
}
