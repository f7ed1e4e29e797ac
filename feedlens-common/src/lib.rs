//! # Feedlens Common Library
//!
//! Shared code for the Feedlens services including:
//! - Feedback domain types (items, analyses, clusters)
//! - Common error type
//! - TOML bootstrap configuration and resolution
//! - Embedding vector helpers
//! - Timestamp utilities

pub mod config;
pub mod embedding;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{
    Analysis, AnalysisOrigin, AnalysisState, Cluster, FeedbackItem, Priority, UrgencyLevel,
};
