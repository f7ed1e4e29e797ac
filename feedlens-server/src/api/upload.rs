//! CSV batch upload
//!
//! The request body is the CSV file itself. Oversized bodies are refused
//! with 413, malformed files and invalid rows with 400; nothing is written
//! unless the whole batch validates.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    Extension, Json,
};
use feedlens_common::models::FeedbackItem;
use feedlens_common::time;
use serde::Serialize;

use super::Owner;
use crate::error::{ApiError, ApiResult};
use crate::ingest::parse_csv_batch;
use crate::pipeline;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub imported: usize,
    /// Rows dropped because the batch cap was reached
    pub truncated: usize,
    pub items: Vec<FeedbackItem>,
}

/// POST /api/feedback/upload
pub async fn upload_csv(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let max_bytes = state.limits.csv_max_bytes;
    let too_large = || {
        ApiError::PayloadTooLarge(format!("CSV uploads are limited to {} bytes", max_bytes))
    };

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if body.len() > max_bytes {
        return Err(too_large());
    }

    let batch = parse_csv_batch(
        &body,
        state.limits.csv_max_rows,
        state.limits.max_text_chars,
        time::now(),
    )?;

    let items = pipeline::ingest_batch(
        &state.db,
        &state.analyzer,
        owner.as_str(),
        batch.rows,
        state.limits.analysis_concurrency,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            imported: items.len(),
            truncated: batch.truncated,
            items,
        }),
    ))
}
