//! Model output parsing
//!
//! Chat replies are free text that should contain JSON. The JSON is located
//! (code fences and surrounding prose are tolerated), deserialized against a
//! fixed schema and validated. Anything that does not fit is an error; there
//! is no partial acceptance.

use feedlens_common::models::{Analysis, AnalysisOrigin, UrgencyLevel};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no JSON found in model reply")]
    NoJson,

    #[error("model reply does not match the expected schema: {0}")]
    Schema(String),

    #[error("{0} is not a finite number")]
    NonFinite(&'static str),

    #[error("unknown urgency category '{0}'")]
    UnknownUrgency(String),
}

/// Locate the outermost JSON value delimited by `open` / `close`
///
/// Takes the first `open` and the last `close`, so prose before and after
/// (including markdown fences) is dropped.
pub fn extract_json(reply: &str, open: char, close: char) -> Option<&str> {
    let start = reply.find(open)?;
    let end = reply.rfind(close)?;
    (end > start).then(|| &reply[start..=end])
}

/// `urgency` may be a score or a category name
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UrgencyValue {
    Score(f64),
    Level(String),
}

#[derive(Debug, Deserialize)]
struct ModelAnalysis {
    sentiment: f64,
    urgency: UrgencyValue,
    #[serde(default)]
    business_impact: Option<f64>,
    theme: String,
    #[serde(default)]
    insights: Vec<String>,
}

fn finite(value: f64, field: &'static str) -> Result<f64, ParseError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::NonFinite(field))
    }
}

/// Parse a chat reply into a normalized `Analysis`
///
/// Required: `sentiment` (number), `urgency` (number or low/medium/high),
/// `theme` (string). Optional: `business_impact` (number, derived from
/// urgency when absent), `insights` (array of strings). Unknown fields are
/// ignored. Values are clamped into range afterwards.
pub fn parse_model_analysis(reply: &str) -> Result<Analysis, ParseError> {
    let json = extract_json(reply, '{', '}').ok_or(ParseError::NoJson)?;
    let raw: ModelAnalysis =
        serde_json::from_str(json).map_err(|e| ParseError::Schema(e.to_string()))?;

    let sentiment = finite(raw.sentiment, "sentiment")? as f32;

    let urgency = match raw.urgency {
        UrgencyValue::Score(score) => finite(score, "urgency")? as f32,
        UrgencyValue::Level(level) => level
            .parse::<UrgencyLevel>()
            .map_err(|_| ParseError::UnknownUrgency(level.clone()))?
            .score(),
    };

    let business_impact = match raw.business_impact {
        Some(impact) => finite(impact, "business_impact")?.round() as i64,
        None => impact_from_urgency(urgency),
    };

    Ok(Analysis::normalized(
        sentiment,
        urgency,
        business_impact,
        &raw.theme,
        raw.insights,
        AnalysisOrigin::Model,
    ))
}

/// Business impact implied by an urgency score: `1 + round(urgency * 4)`
pub fn impact_from_urgency(urgency: f32) -> i64 {
    1 + (feedlens_common::models::clamp_unit(urgency) * 4.0).round() as i64
}
