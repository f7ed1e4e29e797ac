//! Feedback domain model
//!
//! Shared between the ingestion pipeline, the store and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum feedback text length in characters (after trimming)
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Maximum length of a source tag
pub const MAX_SOURCE_CHARS: usize = 50;

/// Maximum length of segment / product area labels
pub const MAX_LABEL_CHARS: usize = 100;

/// Maximum number of insights kept on an analysis
pub const MAX_INSIGHTS: usize = 3;

/// Maximum number of words in a theme label
pub const MAX_THEME_WORDS: usize = 3;

/// Theme used when nothing more specific is known
pub const DEFAULT_THEME: &str = "General";

// ============================================================================
// Priority
// ============================================================================

/// Submitter-assigned priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Ordinal used for sorting (low = 0 .. critical = 3)
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    pub fn all() -> [Priority; 4] {
        [Priority::Low, Priority::Medium, Priority::High, Priority::Critical]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown priority '{}' (expected low, medium, high or critical)",
                other
            ))),
        }
    }
}

// ============================================================================
// Urgency
// ============================================================================

/// Categorical view of the continuous urgency score
///
/// Urgency is stored as a score in [0,1]; the level is derived from it and
/// never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    /// Derive the level from a score (`< 0.4` low, `< 0.7` medium, else high)
    pub fn from_score(score: f32) -> Self {
        if score < 0.4 {
            UrgencyLevel::Low
        } else if score < 0.7 {
            UrgencyLevel::Medium
        } else {
            UrgencyLevel::High
        }
    }

    /// Representative score for a level, used when a category must be
    /// converted back to the continuous scale
    pub fn score(&self) -> f32 {
        match self {
            UrgencyLevel::Low => 0.2,
            UrgencyLevel::Medium => 0.5,
            UrgencyLevel::High => 0.85,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
        }
    }
}

impl FromStr for UrgencyLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(UrgencyLevel::Low),
            "medium" => Ok(UrgencyLevel::Medium),
            "high" => Ok(UrgencyLevel::High),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown urgency level '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Which path of the analysis adapter produced an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisOrigin {
    Model,
    Fallback,
}

impl AnalysisOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisOrigin::Model => "model",
            AnalysisOrigin::Fallback => "fallback",
        }
    }
}

impl FromStr for AnalysisOrigin {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(AnalysisOrigin::Model),
            "fallback" => Ok(AnalysisOrigin::Fallback),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown analysis origin '{}'",
                other
            ))),
        }
    }
}

/// Structured annotation attached to a feedback item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// 0.0 = very negative, 1.0 = very positive
    pub sentiment: f32,
    /// 0.0 = not urgent, 1.0 = drop everything
    pub urgency: f32,
    /// 1..=5
    pub business_impact: u8,
    pub theme: String,
    pub insights: Vec<String>,
    pub origin: AnalysisOrigin,
    pub analyzed_at: DateTime<Utc>,
}

impl Analysis {
    /// Build an analysis with every field forced into its valid range
    pub fn normalized(
        sentiment: f32,
        urgency: f32,
        business_impact: i64,
        theme: &str,
        insights: Vec<String>,
        origin: AnalysisOrigin,
    ) -> Self {
        Self {
            sentiment: clamp_unit(sentiment),
            urgency: clamp_unit(urgency),
            business_impact: business_impact.clamp(1, 5) as u8,
            theme: normalize_theme(theme),
            insights: insights
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(MAX_INSIGHTS)
                .collect(),
            origin,
            analyzed_at: crate::time::now(),
        }
    }

    pub fn urgency_level(&self) -> UrgencyLevel {
        UrgencyLevel::from_score(self.urgency)
    }
}

/// Clamp into [0,1]; NaN becomes the neutral 0.5
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Trim a theme to at most three words, defaulting to `General`
pub fn normalize_theme(theme: &str) -> String {
    let words: Vec<&str> = theme.split_whitespace().take(MAX_THEME_WORDS).collect();
    if words.is_empty() {
        DEFAULT_THEME.to_string()
    } else {
        words.join(" ")
    }
}

/// Analysis lifecycle of a stored item
///
/// Items are written `Pending` first and move exactly once to `Analyzed` or
/// `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisState {
    Pending,
    Analyzed(Analysis),
    Failed { reason: String },
}

impl AnalysisState {
    /// Value stored in the `analysis_state` column
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisState::Pending => "pending",
            AnalysisState::Analyzed(_) => "analyzed",
            AnalysisState::Failed { .. } => "failed",
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            AnalysisState::Analyzed(analysis) => Some(analysis),
            _ => None,
        }
    }

    pub fn is_valid_label(label: &str) -> bool {
        matches!(label, "pending" | "analyzed" | "failed")
    }
}

// ============================================================================
// Feedback items and clusters
// ============================================================================

/// A stored piece of customer feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: Uuid,
    pub owner_id: String,
    pub text: String,
    pub source: String,
    pub user_segment: Option<String>,
    pub product_area: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub analysis: AnalysisState,
    /// Not part of the JSON representation; vectors are large
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A group of related feedback produced by a clustering rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
