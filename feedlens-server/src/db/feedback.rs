//! Feedback persistence
//!
//! Two-phase write: rows are inserted `pending` and later completed with an
//! analysis (or marked failed). Every read and write is scoped by owner.

use chrono::{DateTime, Utc};
use feedlens_common::models::{
    Analysis, AnalysisOrigin, AnalysisState, FeedbackItem, Priority, UrgencyLevel,
};
use feedlens_common::{embedding, time, Error, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Columns returned by listings (no embedding)
const LIST_COLUMNS: &str = "id, owner_id, text, source, user_segment, product_area, priority, \
     created_at, updated_at, analysis_state, sentiment, urgency, business_impact, theme, \
     insights, analysis_origin, analyzed_at, failure_reason";

/// Categorical filters shared by listing, keyword search and similarity search
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub source: Option<String>,
    pub user_segment: Option<String>,
    pub product_area: Option<String>,
    pub priority: Option<Priority>,
    pub analysis_state: Option<String>,
    /// Case-insensitive substring of the text
    pub q: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Priority,
    Sentiment,
    Urgency,
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_at" | "date" => Ok(SortField::CreatedAt),
            "priority" => Ok(SortField::Priority),
            "sentiment" => Ok(SortField::Sentiment),
            "urgency" => Ok(SortField::Urgency),
            other => Err(Error::InvalidInput(format!(
                "Unknown sort field '{}' (expected created_at, priority, sentiment or urgency)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidInput(format!(
                "Unknown sort order '{}' (expected asc or desc)",
                other
            ))),
        }
    }
}

/// A search hit; `similarity` is absent for keyword matches
#[derive(Debug, Clone, Serialize)]
pub struct ScoredFeedback {
    #[serde(flatten)]
    pub item: FeedbackItem,
    pub similarity: Option<f32>,
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid id '{}' in store: {}", raw, e)))
}

fn parse_optional_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(time::from_db_string).transpose()
}

fn row_to_analysis_state(row: &SqliteRow) -> Result<AnalysisState> {
    let state: String = row.try_get("analysis_state")?;
    match state.as_str() {
        "pending" => Ok(AnalysisState::Pending),
        "failed" => Ok(AnalysisState::Failed {
            reason: row
                .try_get::<Option<String>, _>("failure_reason")?
                .unwrap_or_default(),
        }),
        "analyzed" => {
            let insights_json: Option<String> = row.try_get("insights")?;
            let insights: Vec<String> = match insights_json {
                Some(json) => serde_json::from_str(&json)
                    .map_err(|e| Error::Internal(format!("Invalid insights in store: {}", e)))?,
                None => Vec::new(),
            };
            let origin: Option<String> = row.try_get("analysis_origin")?;
            let analyzed_at: Option<String> = row.try_get("analyzed_at")?;

            Ok(AnalysisState::Analyzed(Analysis {
                sentiment: row.try_get::<Option<f64>, _>("sentiment")?.unwrap_or(0.5) as f32,
                urgency: row.try_get::<Option<f64>, _>("urgency")?.unwrap_or(0.5) as f32,
                business_impact: row
                    .try_get::<Option<i64>, _>("business_impact")?
                    .unwrap_or(1)
                    .clamp(1, 5) as u8,
                theme: row.try_get::<Option<String>, _>("theme")?.unwrap_or_default(),
                insights,
                origin: origin
                    .as_deref()
                    .map(AnalysisOrigin::from_str)
                    .transpose()
                    .map_err(|e| Error::Internal(format!("Invalid origin in store: {}", e)))?
                    .unwrap_or(AnalysisOrigin::Fallback),
                analyzed_at: parse_optional_ts(analyzed_at)?.unwrap_or_else(time::now),
            }))
        }
        other => Err(Error::Internal(format!("Unknown analysis state '{}' in store", other))),
    }
}

fn row_to_item(row: &SqliteRow) -> Result<FeedbackItem> {
    let id: String = row.try_get("id")?;
    let priority: String = row.try_get("priority")?;
    let created_at: String = row.try_get("created_at")?;

    // Listing queries do not select the vector
    let embedding = match row.try_get::<Option<Vec<u8>>, _>("embedding") {
        Ok(Some(bytes)) => match embedding::decode(&bytes) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(feedback_id = %id, "Ignoring unreadable embedding: {}", e);
                None
            }
        },
        _ => None,
    };

    Ok(FeedbackItem {
        id: parse_uuid(&id)?,
        owner_id: row.try_get("owner_id")?,
        text: row.try_get("text")?,
        source: row.try_get("source")?,
        user_segment: row.try_get("user_segment")?,
        product_area: row.try_get("product_area")?,
        priority: priority
            .parse()
            .map_err(|_| Error::Internal(format!("Invalid priority '{}' in store", priority)))?,
        created_at: time::from_db_string(&created_at)?,
        updated_at: parse_optional_ts(row.try_get("updated_at")?)?,
        analysis: row_to_analysis_state(row)?,
        embedding,
    })
}

fn push_filters(qb: &mut QueryBuilder<'static, Sqlite>, owner_id: &str, filter: &FeedbackFilter) {
    qb.push(" WHERE owner_id = ").push_bind(owner_id.to_string());

    if let Some(source) = &filter.source {
        qb.push(" AND source = ").push_bind(source.trim().to_lowercase());
    }
    if let Some(segment) = &filter.user_segment {
        qb.push(" AND user_segment = ")
            .push_bind(segment.trim().to_string())
            .push(" COLLATE NOCASE");
    }
    if let Some(area) = &filter.product_area {
        qb.push(" AND product_area = ")
            .push_bind(area.trim().to_string())
            .push(" COLLATE NOCASE");
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(state) = &filter.analysis_state {
        qb.push(" AND analysis_state = ").push_bind(state.clone());
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        qb.push(" AND instr(lower(text), lower(")
            .push_bind(q.to_string())
            .push(")) > 0");
    }
}

fn order_clause(sort: SortField, order: SortOrder) -> String {
    let dir = order.sql();
    match sort {
        SortField::CreatedAt => format!(" ORDER BY created_at {dir}, id {dir}"),
        SortField::Priority => format!(" ORDER BY priority_rank {dir}, created_at DESC, id DESC"),
        // Pending and failed rows have no score and sort last either way
        SortField::Sentiment => {
            format!(" ORDER BY sentiment IS NULL, sentiment {dir}, created_at DESC, id DESC")
        }
        SortField::Urgency => {
            format!(" ORDER BY urgency IS NULL, urgency {dir}, created_at DESC, id DESC")
        }
    }
}

// ============================================================================
// Writes
// ============================================================================

fn insert_query(item: &FeedbackItem) -> sqlx::query::Query<'static, Sqlite, SqliteArguments<'static>> {
    sqlx::query(
        r#"
        INSERT INTO feedback (
            id, owner_id, text, source, user_segment, product_area,
            priority, priority_rank, created_at, analysis_state
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.owner_id.clone())
    .bind(item.text.clone())
    .bind(item.source.clone())
    .bind(item.user_segment.clone())
    .bind(item.product_area.clone())
    .bind(item.priority.as_str())
    .bind(item.priority.rank())
    .bind(time::to_db_string(&item.created_at))
}

/// Phase one: insert a single item in the `pending` state
pub async fn insert_pending(pool: &SqlitePool, item: &FeedbackItem) -> Result<()> {
    insert_query(item).execute(pool).await?;
    Ok(())
}

/// Phase one for a batch: all rows or none
pub async fn insert_pending_batch(pool: &SqlitePool, items: &[FeedbackItem]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for item in items {
        insert_query(item).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Phase two: attach the analysis and embedding
///
/// Only rows still `pending` are updated. Returns whether a row changed.
pub async fn complete_analysis(
    pool: &SqlitePool,
    id: Uuid,
    analysis: &Analysis,
    embedding: Option<&[f32]>,
) -> Result<bool> {
    let insights = serde_json::to_string(&analysis.insights)
        .map_err(|e| Error::Internal(format!("Serialize insights failed: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE feedback SET
            analysis_state = 'analyzed',
            sentiment = ?,
            urgency = ?,
            business_impact = ?,
            theme = ?,
            insights = ?,
            analysis_origin = ?,
            analyzed_at = ?,
            embedding = ?,
            failure_reason = NULL
        WHERE id = ? AND analysis_state = 'pending'
        "#,
    )
    .bind(analysis.sentiment as f64)
    .bind(analysis.urgency as f64)
    .bind(analysis.business_impact as i64)
    .bind(&analysis.theme)
    .bind(insights)
    .bind(analysis.origin.as_str())
    .bind(time::to_db_string(&analysis.analyzed_at))
    .bind(embedding.map(embedding::encode))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record that phase two could not be completed
pub async fn mark_analysis_failed(pool: &SqlitePool, id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        "UPDATE feedback SET analysis_state = 'failed', failure_reason = ? \
         WHERE id = ? AND analysis_state = 'pending'",
    )
    .bind(reason)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace text, source and embedding of an item; the annotation is kept
///
/// Returns false when the item does not exist for this owner.
pub async fn update_feedback(
    pool: &SqlitePool,
    owner_id: &str,
    id: Uuid,
    text: &str,
    source: &str,
    embedding: Option<&[f32]>,
    updated_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE feedback SET text = ?, source = ?, embedding = ?, updated_at = ? \
         WHERE id = ? AND owner_id = ?",
    )
    .bind(text)
    .bind(source)
    .bind(embedding.map(embedding::encode))
    .bind(time::to_db_string(&updated_at))
    .bind(id.to_string())
    .bind(owner_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an item; returns false when it does not exist for this owner
pub async fn delete_feedback(pool: &SqlitePool, owner_id: &str, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM feedback WHERE id = ? AND owner_id = ?")
        .bind(id.to_string())
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Reads
// ============================================================================

/// Load one item (with its embedding)
pub async fn get_feedback(
    pool: &SqlitePool,
    owner_id: &str,
    id: Uuid,
) -> Result<Option<FeedbackItem>> {
    let sql = format!(
        "SELECT {}, embedding FROM feedback WHERE id = ? AND owner_id = ?",
        LIST_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_item).transpose()
}

/// Number of items matching the filter
pub async fn count_feedback(
    pool: &SqlitePool,
    owner_id: &str,
    filter: &FeedbackFilter,
) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM feedback");
    push_filters(&mut qb, owner_id, filter);
    let count = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(count)
}

/// One page of items matching the filter
pub async fn list_feedback(
    pool: &SqlitePool,
    owner_id: &str,
    filter: &FeedbackFilter,
    sort: SortField,
    order: SortOrder,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeedbackItem>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM feedback", LIST_COLUMNS));
    push_filters(&mut qb, owner_id, filter);
    qb.push(order_clause(sort, order));
    qb.push(" LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(row_to_item).collect()
}

/// Cosine-similarity search over the owner's embedded items
///
/// Rows whose vector has a different dimension than the query are skipped.
/// Hits at or above `threshold` are ranked by descending similarity and
/// capped at `limit`.
pub async fn search_similar(
    pool: &SqlitePool,
    owner_id: &str,
    query: &[f32],
    threshold: f32,
    limit: usize,
    filter: &FeedbackFilter,
) -> Result<Vec<ScoredFeedback>> {
    let mut qb = QueryBuilder::new(format!("SELECT {}, embedding FROM feedback", LIST_COLUMNS));
    push_filters(&mut qb, owner_id, filter);
    qb.push(" AND embedding IS NOT NULL");

    let rows = qb.build().fetch_all(pool).await?;

    let mut hits = Vec::new();
    for row in &rows {
        let mut item = row_to_item(row)?;
        let Some(vector) = item.embedding.take() else {
            continue;
        };
        if vector.len() != query.len() {
            continue;
        }
        let similarity = embedding::cosine_similarity(query, &vector);
        if similarity >= threshold {
            hits.push(ScoredFeedback {
                item,
                similarity: Some(similarity),
            });
        }
    }

    hits.sort_by(|a, b| {
        let (sa, sb) = (a.similarity.unwrap_or(0.0), b.similarity.unwrap_or(0.0));
        sb.total_cmp(&sa)
    });
    hits.truncate(limit);

    Ok(hits)
}

/// Substring search used when no query embedding is available
pub async fn keyword_search(
    pool: &SqlitePool,
    owner_id: &str,
    query: &str,
    limit: usize,
    filter: &FeedbackFilter,
) -> Result<Vec<ScoredFeedback>> {
    let filter = FeedbackFilter {
        q: Some(query.to_string()),
        ..filter.clone()
    };
    let items = list_feedback(
        pool,
        owner_id,
        &filter,
        SortField::CreatedAt,
        SortOrder::Desc,
        limit as i64,
        0,
    )
    .await?;

    Ok(items
        .into_iter()
        .map(|item| ScoredFeedback {
            item,
            similarity: None,
        })
        .collect())
}

/// The owner's most recent items as `(id, text)`, newest first
pub async fn recent_texts(
    pool: &SqlitePool,
    owner_id: &str,
    limit: usize,
) -> Result<Vec<(Uuid, String)>> {
    let rows = sqlx::query(
        "SELECT id, text FROM feedback WHERE owner_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(owner_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            Ok((parse_uuid(&id)?, row.try_get("text")?))
        })
        .collect()
}

// ============================================================================
// Dashboard statistics
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThemeCount {
    pub theme: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedbackStats {
    pub total: i64,
    pub by_state: BTreeMap<String, i64>,
    pub by_source: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub by_urgency: BTreeMap<String, i64>,
    /// Averages over analyzed items only
    pub average_sentiment: Option<f64>,
    pub average_urgency: Option<f64>,
    pub top_themes: Vec<ThemeCount>,
}

async fn grouped_counts(
    pool: &SqlitePool,
    sql: &str,
    owner_id: &str,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(sql).bind(owner_id).fetch_all(pool).await?;
    rows.iter()
        .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
        .collect()
}

/// Aggregate counts for the dashboard
pub async fn feedback_stats(pool: &SqlitePool, owner_id: &str) -> Result<FeedbackStats> {
    let mut by_state: BTreeMap<String, i64> = ["pending", "analyzed", "failed"]
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    for (state, count) in grouped_counts(
        pool,
        "SELECT analysis_state, COUNT(*) FROM feedback WHERE owner_id = ? GROUP BY analysis_state",
        owner_id,
    )
    .await?
    {
        by_state.insert(state, count);
    }
    let total = by_state.values().sum();

    let by_source: BTreeMap<String, i64> = grouped_counts(
        pool,
        "SELECT source, COUNT(*) FROM feedback WHERE owner_id = ? GROUP BY source",
        owner_id,
    )
    .await?
    .into_iter()
    .collect();

    let mut by_priority: BTreeMap<String, i64> = Priority::all()
        .iter()
        .map(|p| (p.as_str().to_string(), 0))
        .collect();
    for (priority, count) in grouped_counts(
        pool,
        "SELECT priority, COUNT(*) FROM feedback WHERE owner_id = ? GROUP BY priority",
        owner_id,
    )
    .await?
    {
        by_priority.insert(priority, count);
    }

    let mut by_urgency: BTreeMap<String, i64> = ["low", "medium", "high"]
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    // Levels are derived with the same f32 comparison used everywhere else
    let urgencies: Vec<f64> = sqlx::query_scalar(
        "SELECT urgency FROM feedback \
         WHERE owner_id = ? AND analysis_state = 'analyzed' AND urgency IS NOT NULL",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    for urgency in urgencies {
        let level = UrgencyLevel::from_score(urgency as f32);
        *by_urgency.entry(level.as_str().to_string()).or_insert(0) += 1;
    }

    let averages = sqlx::query(
        "SELECT AVG(sentiment), AVG(urgency) FROM feedback \
         WHERE owner_id = ? AND analysis_state = 'analyzed'",
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await?;
    let average_sentiment: Option<f64> = averages.try_get(0)?;
    let average_urgency: Option<f64> = averages.try_get(1)?;

    let top_themes = grouped_counts(
        pool,
        "SELECT theme, COUNT(*) AS n FROM feedback \
         WHERE owner_id = ? AND analysis_state = 'analyzed' AND theme IS NOT NULL \
         GROUP BY theme ORDER BY n DESC, theme ASC LIMIT 5",
        owner_id,
    )
    .await?
    .into_iter()
    .map(|(theme, count)| ThemeCount { theme, count })
    .collect();

    Ok(FeedbackStats {
        total,
        by_state,
        by_source,
        by_priority,
        by_urgency,
        average_sentiment,
        average_urgency,
        top_themes,
    })
}
