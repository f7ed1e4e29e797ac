//! Ingestion pipeline: gateway output → analysis → store
//!
//! Every item is written `pending` before analysis starts and completed
//! afterwards. When completion fails the row is marked `failed` (best
//! effort) and the request reports a server error.

use feedlens_common::models::{AnalysisState, FeedbackItem};
use feedlens_common::time;
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisService;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::ingest::NormalizedFeedback;

fn pending_item(owner_id: &str, candidate: NormalizedFeedback) -> FeedbackItem {
    FeedbackItem {
        id: Uuid::new_v4(),
        owner_id: owner_id.to_string(),
        text: candidate.text,
        source: candidate.source,
        user_segment: candidate.user_segment,
        product_area: candidate.product_area,
        priority: candidate.priority,
        created_at: candidate.created_at,
        updated_at: None,
        analysis: AnalysisState::Pending,
        embedding: None,
    }
}

/// Analyze a stored pending item and record the result
async fn analyze_and_complete(
    pool: &SqlitePool,
    analyzer: &AnalysisService,
    mut item: FeedbackItem,
) -> ApiResult<FeedbackItem> {
    let outcome = analyzer.analyze(&item.text).await;

    match db::feedback::complete_analysis(
        pool,
        item.id,
        &outcome.analysis,
        outcome.embedding.as_deref(),
    )
    .await
    {
        Ok(updated) => {
            if !updated {
                warn!(feedback_id = %item.id, "Item no longer pending; analysis not stored");
            }
            item.analysis = AnalysisState::Analyzed(outcome.analysis);
            item.embedding = outcome.embedding;
            Ok(item)
        }
        Err(e) => {
            error!(feedback_id = %item.id, "Storing analysis failed: {}", e);
            if let Err(mark_err) =
                db::feedback::mark_analysis_failed(pool, item.id, "analysis could not be stored").await
            {
                error!(feedback_id = %item.id, "Marking item failed also failed: {}", mark_err);
            }
            Err(ApiError::Common(e))
        }
    }
}

/// Ingest one candidate for `owner_id`
pub async fn ingest_one(
    pool: &SqlitePool,
    analyzer: &AnalysisService,
    owner_id: &str,
    candidate: NormalizedFeedback,
) -> ApiResult<FeedbackItem> {
    let item = pending_item(owner_id, candidate);
    db::feedback::insert_pending(pool, &item).await?;

    let item = analyze_and_complete(pool, analyzer, item).await?;

    info!(
        feedback_id = %item.id,
        owner_id = %owner_id,
        source = %item.source,
        "Feedback ingested"
    );

    Ok(item)
}

/// Ingest a validated batch for `owner_id`
///
/// Rows are inserted in one transaction, then analyzed with at most
/// `concurrency` analyses in flight. Results keep the input order.
pub async fn ingest_batch(
    pool: &SqlitePool,
    analyzer: &AnalysisService,
    owner_id: &str,
    candidates: Vec<NormalizedFeedback>,
    concurrency: usize,
) -> ApiResult<Vec<FeedbackItem>> {
    let started = time::now();
    let items: Vec<FeedbackItem> = candidates
        .into_iter()
        .map(|c| pending_item(owner_id, c))
        .collect();

    db::feedback::insert_pending_batch(pool, &items).await?;

    let results: Vec<ApiResult<FeedbackItem>> = stream::iter(items)
        .map(|item| analyze_and_complete(pool, analyzer, item))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let total = results.len();
    let mut stored = Vec::with_capacity(total);
    let mut failures = 0usize;
    for result in results {
        match result {
            Ok(item) => stored.push(item),
            Err(_) => failures += 1,
        }
    }

    if failures > 0 {
        return Err(ApiError::Internal(format!(
            "{} of {} batch items could not be completed",
            failures, total
        )));
    }

    info!(
        owner_id = %owner_id,
        rows = total,
        elapsed_ms = (time::now() - started).num_milliseconds(),
        "Feedback batch ingested"
    );

    Ok(stored)
}
