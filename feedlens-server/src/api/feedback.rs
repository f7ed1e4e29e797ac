//! Feedback CRUD, listing and dashboard statistics

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use feedlens_common::models::{AnalysisState, FeedbackItem, Priority};
use feedlens_common::time;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{json_body, path_id, query_params, Owner};
use crate::db::feedback::{self as store, FeedbackFilter, FeedbackStats, SortField, SortOrder};
use crate::error::{ApiError, ApiResult};
use crate::ingest::{normalize_feedback, FeedbackInput, SOURCE_MANUAL};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::pipeline;
use crate::AppState;

/// POST /api/feedback
///
/// Manual entry: validate, store pending, analyze, complete.
pub async fn create_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    payload: Result<Json<FeedbackInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedbackItem>)> {
    let input = json_body(payload)?;
    let candidate = normalize_feedback(
        input,
        SOURCE_MANUAL,
        state.limits.max_text_chars,
        time::now(),
    )?;

    let item = pipeline::ingest_one(&state.db, &state.analyzer, owner.as_str(), candidate).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Query parameters for listings
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Page number (1-indexed)
    pub page: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub source: Option<String>,
    pub user_segment: Option<String>,
    pub product_area: Option<String>,
    pub priority: Option<String>,
    #[serde(alias = "status")]
    pub analysis_state: Option<String>,
    pub q: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ListQuery {
    fn filter(&self) -> ApiResult<FeedbackFilter> {
        let priority = non_blank(self.priority.clone())
            .map(|p| p.parse::<Priority>())
            .transpose()?;

        let analysis_state = non_blank(self.analysis_state.clone())
            .map(|s| s.trim().to_ascii_lowercase());
        if let Some(state) = &analysis_state {
            if !AnalysisState::is_valid_label(state) {
                return Err(ApiError::BadRequest(format!(
                    "Unknown analysis_state '{}' (expected pending, analyzed or failed)",
                    state
                )));
            }
        }

        Ok(FeedbackFilter {
            source: non_blank(self.source.clone()),
            user_segment: non_blank(self.user_segment.clone()),
            product_area: non_blank(self.product_area.clone()),
            priority,
            analysis_state,
            q: non_blank(self.q.clone()),
        })
    }
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct FeedbackPage {
    pub items: Vec<FeedbackItem>,
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// GET /api/feedback
pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<FeedbackPage>> {
    let query = query_params(query)?;
    let filter = query.filter()?;
    let sort: SortField = match non_blank(query.sort.clone()) {
        Some(s) => s.parse()?,
        None => SortField::default(),
    };
    let order: SortOrder = match non_blank(query.order.clone()) {
        Some(o) => o.parse()?,
        None => SortOrder::default(),
    };

    let total_results = store::count_feedback(&state.db, owner.as_str(), &filter).await?;
    let p = calculate_pagination(total_results, query.page.unwrap_or(1));

    let items = store::list_feedback(
        &state.db,
        owner.as_str(),
        &filter,
        sort,
        order,
        PAGE_SIZE,
        p.offset,
    )
    .await?;

    Ok(Json(FeedbackPage {
        items,
        total_results,
        page: p.page,
        page_size: PAGE_SIZE,
        total_pages: p.total_pages,
    }))
}

/// GET /api/feedback/stats
pub async fn feedback_stats(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> ApiResult<Json<FeedbackStats>> {
    let stats = store::feedback_stats(&state.db, owner.as_str()).await?;
    Ok(Json(stats))
}

/// GET /api/feedback/:id
pub async fn get_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<FeedbackItem>> {
    let id = path_id(id)?;
    store::get_feedback(&state.db, owner.as_str(), id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Feedback {}", id)))
}

/// Edit request: text is replaced, source is replaced when given
#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// PUT /api/feedback/:id
///
/// Replaces text and source and recomputes the embedding. The existing
/// annotation is left as it is.
pub async fn update_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateFeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<FeedbackItem>> {
    let id = path_id(id)?;
    let request = json_body(payload)?;

    let existing = store::get_feedback(&state.db, owner.as_str(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feedback {}", id)))?;

    let candidate = normalize_feedback(
        FeedbackInput {
            text: request.text,
            source: request.source,
            ..Default::default()
        },
        &existing.source,
        state.limits.max_text_chars,
        existing.created_at,
    )?;

    let embedding = state.analyzer.embed_query(&candidate.text).await;

    let updated = store::update_feedback(
        &state.db,
        owner.as_str(),
        id,
        &candidate.text,
        &candidate.source,
        embedding.as_deref(),
        time::now(),
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("Feedback {}", id)));
    }

    info!(feedback_id = %id, owner_id = %owner.as_str(), "Feedback edited");

    store::get_feedback(&state.db, owner.as_str(), id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Feedback {}", id)))
}

/// DELETE /api/feedback/:id
pub async fn delete_feedback(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = path_id(id)?;
    if store::delete_feedback(&state.db, owner.as_str(), id).await? {
        info!(feedback_id = %id, owner_id = %owner.as_str(), "Feedback deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Feedback {}", id)))
    }
}
