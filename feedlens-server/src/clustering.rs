//! Prompt-driven clustering of recent feedback
//!
//! The model sees the owner's most recent items as numbered lines and
//! proposes groups of line numbers. Its answer is treated as untrusted:
//! out-of-range and repeated numbers are dropped, empty groups vanish and
//! each item lands in at most one group. Any failure yields zero clusters.

use feedlens_common::models::Cluster;
use feedlens_common::time;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::parse::{extract_json, ParseError};
use crate::analysis::{AnalysisService, ChatRequest};
use crate::db;
use crate::error::ApiResult;

/// Characters of each text shown to the model
pub const CLUSTER_TEXT_CHARS: usize = 500;
pub const MAX_CLUSTERS: usize = 7;
const MAX_TITLE_CHARS: usize = 100;
const UNTITLED: &str = "Untitled";
const CLUSTER_MAX_TOKENS: u32 = 2000;

const CLUSTERING_SYSTEM_PROMPT: &str = "You group customer feedback by topic. \
The user message lists feedback items as numbered lines. Reply with a JSON array only, \
where each element is {\"title\": \"short topic name\", \"indices\": [line numbers]}. \
Use between 3 and 7 groups and put each line number in at most one group.";

#[derive(Debug, Clone, Deserialize)]
pub struct RawCluster {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub indices: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    List(Vec<RawCluster>),
    Wrapped { clusters: Vec<RawCluster> },
}

/// A validated group of positions into the input window (0-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedCluster {
    pub title: String,
    pub positions: Vec<usize>,
}

/// Numbered `N. text` lines, 1-based, each text cut to 500 characters
pub fn build_cluster_prompt(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let line: String = text
                .chars()
                .take(CLUSTER_TEXT_CHARS)
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                .collect();
            format!("{}. {}", i + 1, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the model's grouping reply
///
/// Accepts a bare array or an object with a `clusters` array, optionally
/// wrapped in prose or code fences.
pub fn parse_cluster_reply(reply: &str) -> Result<Vec<RawCluster>, ParseError> {
    let array_first = match (reply.find('['), reply.find('{')) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };

    let json = if array_first {
        extract_json(reply, '[', ']')
    } else {
        extract_json(reply, '{', '}')
    }
    .ok_or(ParseError::NoJson)?;

    match serde_json::from_str::<RawReply>(json) {
        Ok(RawReply::List(clusters)) | Ok(RawReply::Wrapped { clusters }) => Ok(clusters),
        Err(e) => Err(ParseError::Schema(e.to_string())),
    }
}

/// Enforce range, disjointness and non-empty titles
pub fn validate_clusters(raw: Vec<RawCluster>, window_len: usize) -> Vec<ProposedCluster> {
    let mut claimed = HashSet::new();
    let mut clusters = Vec::new();

    for group in raw {
        let positions: Vec<usize> = group
            .indices
            .iter()
            .filter(|&&n| n >= 1 && (n as u64) <= window_len as u64)
            .map(|&n| (n - 1) as usize)
            .filter(|&pos| claimed.insert(pos))
            .collect();

        if positions.is_empty() {
            continue;
        }

        let title = group
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(MAX_TITLE_CHARS).collect::<String>())
            .unwrap_or_else(|| UNTITLED.to_string());

        clusters.push(ProposedCluster { title, positions });

        if clusters.len() == MAX_CLUSTERS {
            break;
        }
    }

    clusters
}

/// Ask the model for groups; `None` on any failure
async fn propose_clusters(analyzer: &AnalysisService, texts: &[String]) -> Option<Vec<ProposedCluster>> {
    let model = analyzer.model()?;

    let request = ChatRequest {
        system: CLUSTERING_SYSTEM_PROMPT.to_string(),
        user: build_cluster_prompt(texts),
        temperature: analyzer.temperature(),
        max_tokens: CLUSTER_MAX_TOKENS,
    };

    let reply = match model.chat(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Clustering request failed: {}", e);
            return None;
        }
    };

    match parse_cluster_reply(&reply) {
        Ok(raw) => Some(validate_clusters(raw, texts.len())),
        Err(e) => {
            warn!("Clustering reply rejected: {}", e);
            None
        }
    }
}

/// Recompute and store the owner's clusters
///
/// The stored set is replaced in full, with nothing when the model is
/// unavailable or answers badly.
pub async fn rebuild_clusters(
    pool: &SqlitePool,
    analyzer: &AnalysisService,
    owner_id: &str,
    window: usize,
) -> ApiResult<Vec<Cluster>> {
    let recent = db::feedback::recent_texts(pool, owner_id, window).await?;
    let (ids, texts): (Vec<Uuid>, Vec<String>) = recent.into_iter().unzip();

    let proposed = if texts.is_empty() {
        Vec::new()
    } else {
        propose_clusters(analyzer, &texts).await.unwrap_or_default()
    };

    let created_at = time::now();
    let clusters: Vec<Cluster> = proposed
        .into_iter()
        .map(|p| Cluster {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: p.title,
            member_ids: p.positions.iter().map(|&pos| ids[pos]).collect(),
            created_at,
        })
        .collect();

    db::clusters::replace_clusters(pool, owner_id, &clusters).await?;

    info!(
        owner_id = %owner_id,
        window = ids.len(),
        clusters = clusters.len(),
        "Clusters rebuilt"
    );

    Ok(clusters)
}
