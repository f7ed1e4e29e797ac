//! CSV batch ingestion
//!
//! Rules:
//! - A header row is mandatory and must name a text column (`text`, then
//!   `feedback`, then `comment`, case-insensitive)
//! - Ragged rows or invalid UTF-8 reject the whole file
//! - Rows past the cap are dropped and counted, not rejected
//! - Row validation is all-or-nothing: one bad row rejects the batch, and the
//!   error lists every bad row

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{normalize_feedback, FeedbackInput, NormalizedFeedback, SOURCE_CSV};
use crate::error::ApiError;

/// Header names accepted for the text-bearing column, in preference order
const TEXT_COLUMNS: [&str; 3] = ["text", "feedback", "comment"];

/// Result of parsing an accepted batch
#[derive(Debug, Clone)]
pub struct CsvBatch {
    pub rows: Vec<NormalizedFeedback>,
    /// Data rows dropped because the cap was reached
    pub truncated: usize,
}

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("CSV is empty or has no header row")]
    MissingHeader,

    #[error("CSV header needs a text, feedback or comment column (found: {0})")]
    MissingTextColumn(String),

    #[error("CSV contains no feedback rows")]
    NoRows,

    #[error("Malformed CSV: {0}")]
    Malformed(String),

    #[error("{} CSV row(s) failed validation", .0.len())]
    InvalidRows(Vec<String>),
}

impl From<CsvError> for ApiError {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::InvalidRows(details) => ApiError::Validation {
                message: format!("{} CSV row(s) failed validation; nothing was imported", details.len()),
                details,
            },
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/// Column positions resolved from the header row
#[derive(Debug)]
struct Columns {
    text: usize,
    source: Option<usize>,
    user_segment: Option<usize>,
    product_area: Option<usize>,
    priority: Option<usize>,
    created_at: Option<usize>,
}

impl Columns {
    fn resolve(headers: &[String]) -> Result<Self, CsvError> {
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| headers.iter().position(|h| h == name))
        };

        let text = find(&TEXT_COLUMNS)
            .ok_or_else(|| CsvError::MissingTextColumn(headers.join(", ")))?;

        Ok(Self {
            text,
            source: find(&["source"]),
            user_segment: find(&["user_segment", "usersegment", "segment"]),
            product_area: find(&["product_area", "productarea", "area"]),
            priority: find(&["priority"]),
            created_at: find(&["created_at", "createdat", "date"]),
        })
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Parse and validate a CSV upload
pub fn parse_csv_batch(
    body: &[u8],
    max_rows: usize,
    max_text_chars: usize,
    now: DateTime<Utc>,
) -> Result<CsvBatch, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::Malformed(e.to_string()))?
        .iter()
        .map(normalize_header)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::MissingHeader);
    }

    let columns = Columns::resolve(&headers)?;

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut truncated = 0usize;
    let mut row_number = 0usize;

    for record in reader.records() {
        let record = record.map_err(|e| CsvError::Malformed(e.to_string()))?;

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        row_number += 1;
        if row_number > max_rows {
            truncated += 1;
            continue;
        }

        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::to_string);
        let input = FeedbackInput {
            text: field(Some(columns.text)),
            source: field(columns.source),
            user_segment: field(columns.user_segment),
            product_area: field(columns.product_area),
            priority: field(columns.priority),
            created_at: field(columns.created_at),
        };

        match normalize_feedback(input, SOURCE_CSV, max_text_chars, now) {
            Ok(row) => rows.push(row),
            Err(e) => errors.push(format!("row {}: {}", row_number, e)),
        }
    }

    if !errors.is_empty() {
        return Err(CsvError::InvalidRows(errors));
    }

    if rows.is_empty() {
        return Err(CsvError::NoRows);
    }

    if truncated > 0 {
        tracing::info!(
            accepted = rows.len(),
            truncated,
            "CSV batch exceeded row cap; extra rows dropped"
        );
    }

    Ok(CsvBatch { rows, truncated })
}
