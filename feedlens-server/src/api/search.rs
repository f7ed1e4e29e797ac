//! Similarity search

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use feedlens_common::models::Priority;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{json_body, Owner};
use crate::db::feedback::{self as store, FeedbackFilter, ScoredFeedback};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
    pub source: Option<String>,
    #[serde(alias = "userSegment")]
    pub user_segment: Option<String>,
    #[serde(alias = "productArea")]
    pub product_area: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Ranked by embedding similarity
    Semantic,
    /// Substring match; no query embedding was available
    Keyword,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub results: Vec<ScoredFeedback>,
}

/// POST /api/search
pub async fn search_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let request = json_body(payload)?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query is required".to_string()));
    }

    let threshold = request.threshold.unwrap_or(state.limits.search_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::BadRequest(
            "threshold must be between 0 and 1".to_string(),
        ));
    }

    let limit = request
        .limit
        .unwrap_or(state.limits.search_limit)
        .clamp(1, state.limits.search_max_limit);

    let priority = request
        .priority
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Priority>)
        .transpose()?;

    let filter = FeedbackFilter {
        source: request.source.filter(|s| !s.trim().is_empty()),
        user_segment: request.user_segment.filter(|s| !s.trim().is_empty()),
        product_area: request.product_area.filter(|s| !s.trim().is_empty()),
        priority,
        ..Default::default()
    };

    let (mode, results) = match state.analyzer.embed_query(query).await {
        Some(vector) => {
            let hits = store::search_similar(
                &state.db,
                owner.as_str(),
                &vector,
                threshold,
                limit,
                &filter,
            )
            .await?;
            (SearchMode::Semantic, hits)
        }
        None => {
            let hits = store::keyword_search(&state.db, owner.as_str(), query, limit, &filter).await?;
            (SearchMode::Keyword, hits)
        }
    };

    debug!(
        owner_id = %owner.as_str(),
        mode = ?mode,
        results = results.len(),
        "Search completed"
    );

    Ok(Json(SearchResponse { mode, results }))
}
