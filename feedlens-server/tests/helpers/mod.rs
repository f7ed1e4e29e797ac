//! Shared utilities for feedlens-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use feedlens_common::config::{LimitsConfig, LlmConfig};
use feedlens_server::analysis::{AnalysisService, ChatRequest, LanguageModel, LlmError};
use feedlens_server::waitlist::{EphemeralWaitlist, FallbackWaitlist, SqliteWaitlist};
use feedlens_server::{build_router, db, AppState};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Token for the primary test account
pub const TOKEN_ACME: &str = "acme-test-token-0123456789abcdef0123";
/// Token for a second account, used to check owner scoping
pub const TOKEN_GLOBEX: &str = "globex-test-token-0123456789abcdef012";

pub const TEST_EMBEDDING_DIMENSION: usize = 6;

/// Keyword axes of the test embedding; the last axis is a constant bias
const AXES: [&[&str]; 5] = [
    &["dashboard"],
    &["slow", "performance", "lag", "load"],
    &["billing", "invoice", "charged", "price"],
    &["crash", "error", "bug", "broken"],
    &["export", "csv", "report"],
];

/// Deterministic stand-in for a hosted model
///
/// Embeddings count keyword hits per axis, so related phrasings land close
/// together. Chat replies a fixed analysis, or a grouping of lines 1-2 and 3
/// when asked to cluster.
pub struct MockModel;

pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = AXES
        .iter()
        .map(|words| words.iter().filter(|w| lower.contains(*w)).count() as f32)
        .collect();
    vector.push(1.0);
    vector
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if request.system.contains("group customer feedback") {
            return Ok(r#"Here you go:
[{"title": "Performance", "indices": [1, 2, 2, 40]},
 {"title": "", "indices": [3, 1]},
 {"title": "Empty", "indices": []}]"#
                .to_string());
        }

        Ok(r#"{"sentiment": 0.2, "urgency": "high", "business_impact": 4,
               "theme": "Performance", "insights": ["Profile the dashboard queries"]}"#
            .to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(keyword_embedding(text))
    }
}

pub fn test_llm_config() -> LlmConfig {
    LlmConfig {
        embedding_dimension: TEST_EMBEDDING_DIMENSION,
        ..Default::default()
    }
}

/// Test application with its database and temp directory
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestApp {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub router: Router,
}

pub async fn create_test_app(model: Option<Arc<dyn LanguageModel>>, limits: LimitsConfig) -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = db::init_database_pool(&dir.path().join("feedlens_test.db"))
        .await
        .expect("Failed to initialize test database");

    db::tokens::insert_token(&pool, TOKEN_ACME, "acme", Some("test"))
        .await
        .expect("Failed to seed token");
    db::tokens::insert_token(&pool, TOKEN_GLOBEX, "globex", Some("test"))
        .await
        .expect("Failed to seed token");

    let analyzer = AnalysisService::new(model, &test_llm_config());
    let waitlist = FallbackWaitlist::new(
        Arc::new(SqliteWaitlist::new(pool.clone())),
        EphemeralWaitlist::default(),
    );
    let state = AppState::new(pool.clone(), analyzer, waitlist, limits);

    TestApp {
        dir,
        pool,
        router: build_router(state),
    }
}

/// Keyword-fallback app with default limits
pub async fn fallback_app() -> TestApp {
    create_test_app(None, LimitsConfig::default()).await
}

/// App backed by `MockModel` with default limits
pub async fn model_app() -> TestApp {
    create_test_app(Some(Arc::new(MockModel)), LimitsConfig::default()).await
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn csv_request(token: &str, csv: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/feedback/upload")
        .header(header::CONTENT_TYPE, "text/csv")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(csv.into()))
        .unwrap()
}

pub async fn extract_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub async fn count_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// CSV with a `text` column and `n` numbered rows
pub fn csv_with_rows(n: usize) -> String {
    let mut csv = String::from("text,source,priority\n");
    for i in 1..=n {
        csv.push_str(&format!("Feedback row {},import,medium\n", i));
    }
    csv
}
