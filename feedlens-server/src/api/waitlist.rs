//! Public waitlist signup

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::json_body;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WaitlistRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    pub joined: bool,
    /// False when the signup is only held in memory
    pub durable: bool,
}

/// POST /api/waitlist
pub async fn join_waitlist(
    State(state): State<AppState>,
    payload: Result<Json<WaitlistRequest>, JsonRejection>,
) -> ApiResult<Json<WaitlistResponse>> {
    let request = json_body(payload)?;
    let outcome = state.waitlist.join(&request.email).await?;
    Ok(Json(WaitlistResponse {
        joined: true,
        durable: outcome.durable,
    }))
}
