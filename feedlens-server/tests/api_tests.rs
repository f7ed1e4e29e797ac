//! Integration tests for feedlens-server HTTP API

mod helpers;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use feedlens_common::config::LimitsConfig;
use feedlens_common::models::Priority;
use feedlens_common::time;
use feedlens_server::ingest::{normalize_feedback, FeedbackInput, SOURCE_MANUAL};
use helpers::*;
use serde_json::json;
use std::collections::HashSet;
use tower::util::ServiceExt;

fn approx(value: &serde_json::Value, expected: f64) -> bool {
    value
        .as_f64()
        .map(|v| (v - expected).abs() < 1e-4)
        .unwrap_or(false)
}

async fn create(app: &TestApp, token: &str, body: serde_json::Value) -> serde_json::Value {
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/feedback", Some(token), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    extract_json(response).await
}

// ============================================================================
// Health and authentication
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = fallback_app().await;

    let response = app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "feedlens-server");
    assert_eq!(json["analysis_mode"], "fallback");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_model_mode() {
    let app = model_app().await;
    let json = extract_json(app.router.clone().oneshot(get("/health", None)).await.unwrap()).await;
    assert_eq!(json["analysis_mode"], "model");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = fallback_app().await;

    let response = app.router.clone().oneshot(get("/api/feedback", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = extract_json(response).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback", Some("not-a-known-token-aaaaaaaaaaaaaaaaaaaa")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/feedback",
            None,
            &json!({"text": "should not be stored"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(count_rows(&app.pool).await, 0);
}

// ============================================================================
// Manual entry
// ============================================================================

#[tokio::test]
async fn test_manual_entry_uses_keyword_fallback() {
    let app = fallback_app().await;

    let item = create(
        &app,
        TOKEN_ACME,
        json!({"text": "This crashes constantly, very urgent"}),
    )
    .await;

    assert_eq!(item["source"], "manual");
    assert_eq!(item["priority"], "medium");
    assert_eq!(item["analysis"]["status"], "analyzed");
    assert_eq!(item["analysis"]["origin"], "fallback");
    assert_eq!(item["analysis"]["theme"], "Bug Fix");
    assert_eq!(item["analysis"]["business_impact"], 4);
    assert!(approx(&item["analysis"]["sentiment"], 0.3));
    assert!(approx(&item["analysis"]["urgency"], 0.8));
    assert!(item.get("embedding").is_none());
}

#[tokio::test]
async fn test_manual_entry_with_model() {
    let app = model_app().await;

    let item = create(
        &app,
        TOKEN_ACME,
        json!({"text": "Dashboard takes ages", "userSegment": "enterprise", "priority": "HIGH"}),
    )
    .await;

    assert_eq!(item["user_segment"], "enterprise");
    assert_eq!(item["priority"], "high");
    assert_eq!(item["analysis"]["origin"], "model");
    assert_eq!(item["analysis"]["theme"], "Performance");
    assert_eq!(item["analysis"]["insights"][0], "Profile the dashboard queries");
}

#[tokio::test]
async fn test_manual_entry_validation() {
    let app = fallback_app().await;

    for body in [
        json!({}),
        json!({"text": "   "}),
        json!({"text": "fine", "priority": "urgent"}),
        json!({"text": "fine", "created_at": "yesterday"}),
        json!({"text": "x".repeat(10_001)}),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/feedback", Some(TOKEN_ACME), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }

    assert_eq!(count_rows(&app.pool).await, 0);
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let app = fallback_app().await;

    create(&app, TOKEN_ACME, json!({"text": "Checkout is broken", "priority": "high"})).await;
    create(&app, TOKEN_ACME, json!({"text": "Love the new theme", "source": "Survey"})).await;
    create(&app, TOKEN_GLOBEX, json!({"text": "Someone else's feedback", "priority": "high"})).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = extract_json(response).await;
    assert_eq!(page["total_results"], 2);
    assert_eq!(page["page"], 1);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let page = extract_json(
        app.router
            .clone()
            .oneshot(get("/api/feedback?priority=high", Some(TOKEN_ACME)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total_results"], 1);
    assert_eq!(page["items"][0]["text"], "Checkout is broken");

    let page = extract_json(
        app.router
            .clone()
            .oneshot(get("/api/feedback?source=survey&q=THEME", Some(TOKEN_ACME)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total_results"], 1);

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback?sort=loudness", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filtered_listing_returns_normalized_fields() {
    let app = fallback_app().await;

    let input = FeedbackInput {
        text: Some("  Invoices are duplicated every month  ".into()),
        source: Some(" Support ".into()),
        user_segment: Some(" Enterprise ".into()),
        product_area: Some("Billing".into()),
        priority: Some("CRITICAL".into()),
        created_at: Some("2024-03-01 12:30:00".into()),
    };
    let expected = normalize_feedback(input.clone(), SOURCE_MANUAL, 10_000, time::now()).unwrap();

    let created = create(
        &app,
        TOKEN_ACME,
        json!({
            "text": input.text,
            "source": input.source,
            "userSegment": input.user_segment,
            "productArea": input.product_area,
            "priority": input.priority,
            "createdAt": input.created_at,
        }),
    )
    .await;

    // A non-matching item that the filters must exclude
    create(&app, TOKEN_ACME, json!({"text": "Unrelated", "source": "support"})).await;

    let page = extract_json(
        app.router
            .clone()
            .oneshot(get(
                "/api/feedback?source=support&user_segment=enterprise&product_area=billing&priority=critical",
                Some(TOKEN_ACME),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total_results"], 1);
    let listed = &page["items"][0];

    assert_eq!(listed["id"], created["id"]);
    assert_eq!(listed["owner_id"], "acme");
    assert_eq!(listed["text"], expected.text.as_str());
    assert_eq!(listed["source"], expected.source.as_str());
    assert_eq!(listed["user_segment"].as_str(), expected.user_segment.as_deref());
    assert_eq!(listed["product_area"].as_str(), expected.product_area.as_deref());
    assert_eq!(expected.priority, Priority::Critical);
    assert_eq!(listed["priority"], "critical");
    let listed_at: DateTime<Utc> = serde_json::from_value(listed["created_at"].clone()).unwrap();
    assert_eq!(listed_at, expected.created_at);
    assert_eq!(listed["analysis"]["status"], "analyzed");
}

#[tokio::test]
async fn test_malformed_query_and_path_use_error_format() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback?page=abc", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"), "{}", content_type);
    let json = extract_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert!(json["error"]["message"].is_string());

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback/%FF%FE", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = extract_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_stats() {
    let app = fallback_app().await;

    create(&app, TOKEN_ACME, json!({"text": "This crashes constantly, very urgent"})).await;
    create(&app, TOKEN_ACME, json!({"text": "The app is slow", "source": "email"})).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback/stats", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = extract_json(response).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_state"]["analyzed"], 2);
    assert_eq!(stats["by_source"]["manual"], 1);
    assert_eq!(stats["by_source"]["email"], 1);
    assert_eq!(stats["top_themes"].as_array().unwrap().len(), 2);
}

// ============================================================================
// Single item operations
// ============================================================================

#[tokio::test]
async fn test_get_update_delete_are_owner_scoped() {
    let app = fallback_app().await;
    let item = create(&app, TOKEN_ACME, json!({"text": "Original text"})).await;
    let uri = format!("/api/feedback/{}", item["id"].as_str().unwrap());

    let response = app.router.clone().oneshot(get(&uri, Some(TOKEN_ACME))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.router.clone().oneshot(get(&uri, Some(TOKEN_GLOBEX))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", &uri, Some(TOKEN_GLOBEX), &json!({"text": "hijacked"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.router.clone().oneshot(delete(&uri, TOKEN_GLOBEX)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(json_request("PUT", &uri, Some(TOKEN_ACME), &json!({"text": "  Edited text "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let edited = extract_json(response).await;
    assert_eq!(edited["text"], "Edited text");
    assert_eq!(edited["source"], "manual");
    assert!(edited["updated_at"].is_string());

    let response = app.router.clone().oneshot(delete(&uri, TOKEN_ACME)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.router.clone().oneshot(get(&uri, Some(TOKEN_ACME))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unparseable_id_is_not_found() {
    let app = fallback_app().await;
    let response = app
        .router
        .clone()
        .oneshot(get("/api/feedback/not-a-uuid", Some(TOKEN_ACME)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// CSV upload
// ============================================================================

#[tokio::test]
async fn test_csv_at_cap_imports_everything() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(csv_request(TOKEN_ACME, csv_with_rows(100)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = extract_json(response).await;
    assert_eq!(json["imported"], 100);
    assert_eq!(json["truncated"], 0);
    assert_eq!(json["items"][0]["text"], "Feedback row 1");
    assert_eq!(json["items"][0]["source"], "import");
    assert_eq!(count_rows(&app.pool).await, 100);
}

#[tokio::test]
async fn test_csv_over_cap_is_truncated() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(csv_request(TOKEN_ACME, csv_with_rows(101)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = extract_json(response).await;
    assert_eq!(json["imported"], 100);
    assert_eq!(json["truncated"], 1);
    assert_eq!(count_rows(&app.pool).await, 100);
}

#[tokio::test]
async fn test_csv_with_invalid_rows_writes_nothing() {
    let app = fallback_app().await;

    let csv = "text,priority\nGood row,low\n,high\nAnother,sometime\n";
    let response = app.router.clone().oneshot(csv_request(TOKEN_ACME, csv)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = extract_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
    let details = json["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(count_rows(&app.pool).await, 0);
}

#[tokio::test]
async fn test_csv_without_text_column() {
    let app = fallback_app().await;
    let response = app
        .router
        .clone()
        .oneshot(csv_request(TOKEN_ACME, "title,body\nA,B\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(count_rows(&app.pool).await, 0);
}

#[tokio::test]
async fn test_csv_oversized_body_rejected() {
    let limits = LimitsConfig {
        csv_max_bytes: 1024,
        ..Default::default()
    };
    let app = create_test_app(None, limits).await;

    let response = app
        .router
        .clone()
        .oneshot(csv_request(TOKEN_ACME, csv_with_rows(80)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(count_rows(&app.pool).await, 0);
}

// ============================================================================
// Webhook
// ============================================================================

#[tokio::test]
async fn test_webhook_rejects_short_token_without_writing() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/webhook/feedback",
            Some("short"),
            &json!({"text": "pushed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/webhook/feedback", None, &json!({"text": "pushed"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/webhook/feedback",
            Some("unknown-but-long-enough-token-0123456789"),
            &json!({"text": "pushed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(count_rows(&app.pool).await, 0);
}

#[tokio::test]
async fn test_webhook_ingests_for_token_owner() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/webhook/feedback",
            Some(TOKEN_GLOBEX),
            &json!({"text": "Invoice totals look wrong", "productArea": "billing"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let item = extract_json(response).await;
    assert_eq!(item["owner_id"], "globex");
    assert_eq!(item["source"], "webhook");
    assert_eq!(item["product_area"], "billing");
    assert_eq!(count_rows(&app.pool).await, 1);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_semantic_search_finds_related_phrasing() {
    let app = model_app().await;

    let slow = create(&app, TOKEN_ACME, json!({"text": "The dashboard is slow to load"})).await;
    create(&app, TOKEN_ACME, json!({"text": "Billing charged me twice"})).await;
    create(&app, TOKEN_GLOBEX, json!({"text": "Our dashboard is slow too"})).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/search",
            Some(TOKEN_ACME),
            &json!({"query": "dashboard performance"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response).await;
    assert_eq!(json["mode"], "semantic");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], slow["id"]);
    assert!(results[0]["similarity"].as_f64().unwrap() >= 0.75);
}

#[tokio::test]
async fn test_search_without_model_uses_keywords() {
    let app = fallback_app().await;

    create(&app, TOKEN_ACME, json!({"text": "Export to CSV fails silently"})).await;
    create(&app, TOKEN_ACME, json!({"text": "Love it"})).await;

    let json = extract_json(
        app.router
            .clone()
            .oneshot(json_request("POST", "/api/search", Some(TOKEN_ACME), &json!({"query": "CSV"})))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(json["mode"], "keyword");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["similarity"].is_null());
}

#[tokio::test]
async fn test_search_rejects_bad_parameters() {
    let app = fallback_app().await;

    for body in [json!({"query": ""}), json!({"query": "x", "threshold": 1.5})] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/search", Some(TOKEN_ACME), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

// ============================================================================
// Clustering
// ============================================================================

#[tokio::test]
async fn test_cluster_rebuild_produces_valid_groups() {
    let app = model_app().await;

    let mut ids = HashSet::new();
    for text in ["Dashboard is slow", "Reports lag", "Billing is confusing"] {
        let item = create(&app, TOKEN_ACME, json!({ "text": text })).await;
        ids.insert(item["id"].as_str().unwrap().to_string());
    }

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/clusters/rebuild", Some(TOKEN_ACME), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response).await;
    let clusters = json["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[0]["title"], "Performance");
    assert_eq!(clusters[0]["member_ids"].as_array().unwrap().len(), 2);
    assert_eq!(clusters[1]["title"], "Untitled");

    let mut seen = HashSet::new();
    for cluster in clusters {
        for member in cluster["member_ids"].as_array().unwrap() {
            let member = member.as_str().unwrap().to_string();
            assert!(ids.contains(&member));
            assert!(seen.insert(member), "item in two clusters");
        }
    }

    let listed = extract_json(
        app.router
            .clone()
            .oneshot(get("/api/clusters", Some(TOKEN_ACME)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(listed["clusters"], json["clusters"]);

    let other = extract_json(
        app.router
            .clone()
            .oneshot(get("/api/clusters", Some(TOKEN_GLOBEX)))
            .await
            .unwrap(),
    )
    .await;
    assert!(other["clusters"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_rebuild_without_model_is_empty() {
    let app = fallback_app().await;
    create(&app, TOKEN_ACME, json!({"text": "Dashboard is slow"})).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/clusters/rebuild", Some(TOKEN_ACME), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response).await;
    assert!(json["clusters"].as_array().unwrap().is_empty());
}

// ============================================================================
// Waitlist
// ============================================================================

#[tokio::test]
async fn test_waitlist_signup() {
    let app = fallback_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/waitlist", None, &json!({"email": "Jo@Example.com"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response).await;
    assert_eq!(json["joined"], true);
    assert_eq!(json["durable"], true);

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/waitlist", None, &json!({"email": "not-an-email"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM waitlist")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
