//! Ingestion gateway
//!
//! Turns the accepted entry shapes (manual JSON, CSV batch, webhook push) into
//! `NormalizedFeedback` candidates. Nothing here touches the store; the
//! pipeline persists what the gateway returns.

pub mod csv_batch;
pub mod webhook;

pub use csv_batch::{parse_csv_batch, CsvBatch, CsvError};
pub use webhook::{validate_webhook_token, WebhookTokenError};

use chrono::{DateTime, Utc};
use feedlens_common::models::{MAX_LABEL_CHARS, MAX_SOURCE_CHARS};
use feedlens_common::Priority;
use serde::Deserialize;
use thiserror::Error;

use crate::error::ApiError;

/// Default source tags per entry point
pub const SOURCE_MANUAL: &str = "manual";
pub const SOURCE_CSV: &str = "csv";
pub const SOURCE_WEBHOOK: &str = "webhook";

/// Raw feedback fields as submitted (manual form or webhook body)
///
/// `text` is optional here so that a missing field is reported with the same
/// message as an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "userSegment")]
    pub user_segment: Option<String>,
    #[serde(default, alias = "productArea")]
    pub product_area: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

/// A validated candidate ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeedback {
    pub text: String,
    pub source: String,
    pub user_segment: Option<String>,
    pub product_area: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Per-field validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("text is required")]
    MissingText,

    #[error("text is {len} characters; the maximum is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("{field} is longer than {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("unknown priority '{0}' (expected low, medium, high or critical)")]
    InvalidPriority(String),

    #[error("unrecognized created_at '{0}' (expected an ISO date or date-time)")]
    InvalidTimestamp(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Normalize one submission
///
/// - `text` trimmed; empty or missing → `MissingText`; longer than
///   `max_text_chars` characters → `TextTooLong`
/// - `source` trimmed and lowercased, `default_source` when absent or blank
/// - segment / product area trimmed, blank → absent
/// - `priority` parsed case-insensitively, default medium
/// - `created_at` parsed when supplied, otherwise `now`
pub fn normalize_feedback(
    input: FeedbackInput,
    default_source: &str,
    max_text_chars: usize,
    now: DateTime<Utc>,
) -> Result<NormalizedFeedback, IngestError> {
    let text = input
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(IngestError::MissingText)?;

    let len = text.chars().count();
    if len > max_text_chars {
        return Err(IngestError::TextTooLong {
            len,
            max: max_text_chars,
        });
    }

    let source = match clean_optional(input.source.as_deref()) {
        Some(source) => {
            if source.chars().count() > MAX_SOURCE_CHARS {
                return Err(IngestError::FieldTooLong {
                    field: "source",
                    max: MAX_SOURCE_CHARS,
                });
            }
            source.to_lowercase()
        }
        None => default_source.to_string(),
    };

    let user_segment = clean_label(input.user_segment.as_deref(), "user_segment")?;
    let product_area = clean_label(input.product_area.as_deref(), "product_area")?;

    let priority = match clean_optional(input.priority.as_deref()) {
        Some(p) => p
            .parse::<Priority>()
            .map_err(|_| IngestError::InvalidPriority(p.to_string()))?,
        None => Priority::default(),
    };

    let created_at = match clean_optional(input.created_at.as_deref()) {
        Some(raw) => feedlens_common::time::parse_user_timestamp(raw)
            .ok_or_else(|| IngestError::InvalidTimestamp(raw.to_string()))?,
        None => now,
    };

    Ok(NormalizedFeedback {
        text: text.to_string(),
        source,
        user_segment,
        product_area,
        priority,
        created_at,
    })
}

fn clean_optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn clean_label(value: Option<&str>, field: &'static str) -> Result<Option<String>, IngestError> {
    match clean_optional(value) {
        Some(v) if v.chars().count() > MAX_LABEL_CHARS => Err(IngestError::FieldTooLong {
            field,
            max: MAX_LABEL_CHARS,
        }),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}
