//! End-to-end tests of the gateway pipeline over HTTP
//!
//! These tests verify:
//! - Window credentials, including the one-window grace period
//! - Allowlist rejections never reach the backing store
//! - Rate limiting of excess requests
//! - Envelope validation and response shapes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Duration;
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{app, app_with, config};

const GATEWAY: &str = "/api/v1/gateway";

#[tokio::test]
async fn test_credential_window_grace() {
    let app = app();
    let credential = app.credential();
    let read = json!({"operation": "read", "table": "hierarchy_nodes", "columns": ["id"]});

    let (response, _) = app.post_as(GATEWAY, read.clone(), Some(&credential), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.clock.advance(Duration::hours(1));
    let (response, _) = app.post_as(GATEWAY, read.clone(), Some(&credential), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.clock.advance(Duration::hours(1));
    let (response, body) = app.post_as(GATEWAY, read, Some(&credential), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "Unauthorized");
}

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let app = app();
    let (response, body) = app
        .post_as(GATEWAY, json!({"operation": "read", "table": "assignments"}), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(app.backend.read_count(), 0);
}

#[tokio::test]
async fn test_unlisted_table_is_denied_before_the_store() {
    let app = app();
    let (response, body) = app
        .post(GATEWAY, json!({"operation": "read", "table": "audit_records"}))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "PermissionDenied");
    assert_eq!(app.backend.read_count(), 0);
}

#[tokio::test]
async fn test_disallowed_column_is_enumerated() {
    let app = app();
    let (response, body) = app
        .post(
            GATEWAY,
            json!({
                "operation": "read",
                "table": "assignments",
                "columns": ["entity_id", "node_id", "salary"]
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["details"]["columns"], json!(["salary"]));
    assert_eq!(app.backend.read_count(), 0);
}

#[tokio::test]
async fn test_invalid_column_name_is_malformed() {
    let app = app();
    let (response, body) = app
        .post(
            GATEWAY,
            json!({"operation": "read", "table": "assignments", "columns": ["id; DROP TABLE x"]}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "Malformed");
    assert_eq!(app.backend.read_count(), 0);
}

#[tokio::test]
async fn test_read_envelope_shape() {
    let app = app();
    let (response, body) = app
        .post(
            GATEWAY,
            json!({
                "operation": "read",
                "table": "hierarchy_nodes",
                "columns": ["id", "level"],
                "filter": {"parent_id": "root"}
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["table"], "hierarchy_nodes");
    assert_eq!(body["totalRecords"], 3);
    assert_eq!(body["truncated"], false);
    assert!(body["timestamp"].as_str().unwrap().starts_with("2026-10-17T12:00:10"));
    for row in body["data"].as_array().unwrap() {
        assert_eq!(row["level"], 1);
        assert!(row.get("parent_id").is_none());
    }
}

#[tokio::test]
async fn test_read_without_columns_stays_within_the_allowlist() {
    let app = app();
    let (response, body) = app
        .post(GATEWAY, json!({"operation": "read", "table": "hierarchy_nodes"}))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["totalRecords"], 4);
    for row in body["data"].as_array().unwrap() {
        let mut keys: Vec<_> = row.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["disabled", "id", "level", "parent_id"]);
    }
}

#[tokio::test]
async fn test_procedure_read() {
    let app = app();
    app.post(
        GATEWAY,
        json!({
            "operation": "sync",
            "entityId": "E1",
            "assignments": [{"nodeId": "N1", "proficiencyLevel": 4}]
        }),
    )
    .await;

    let (response, body) = app
        .post(
            GATEWAY,
            json!({"operation": "read", "table": "entity_skill_matrix", "filter": {"entity_id": "E1"}}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["totalRecords"], 1);
    assert_eq!(body["data"][0]["node_id"], "N1");
    assert_eq!(body["data"][0]["proficiency_level"], 4);
    assert_eq!(body["data"][0]["node_level"], 1);
}

#[tokio::test]
async fn test_rate_limit_rejects_only_the_excess() {
    let app = app_with(config(3));
    let read = json!({"operation": "read", "table": "hierarchy_nodes", "columns": ["id"]});

    for _ in 0..3 {
        let (response, _) = app.post(GATEWAY, read.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (response, body) = app.post(GATEWAY, read.clone()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["kind"], "RateLimited");
    assert_eq!(response.headers()[header::RETRY_AFTER], "20");
    assert_eq!(app.backend.read_count(), 3);

    app.clock.advance(Duration::seconds(20));
    let (response, _) = app.post(GATEWAY, read.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let (response, _) = app.post(GATEWAY, read).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rotating_client_ids_share_one_limit() {
    let app = app_with(config(2));
    let read = json!({"operation": "read", "table": "hierarchy_nodes", "columns": ["id"]});
    let credential = app.credential();

    let mut admitted = 0;
    for i in 0..10 {
        let client_id = format!("client-{i}");
        let (response, _) = app
            .post_as(GATEWAY, read.clone(), Some(&credential), Some(&client_id))
            .await;
        if response.status() == StatusCode::OK {
            admitted += 1;
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(app.gateway.tracked_rate_limit_keys(), 1);
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let app = app();
    for body in [
        json!({"operation": "delete", "table": "assignments"}),
        json!({"operation": "read"}),
        json!({"operation": "sync", "entityId": "E1"}),
        json!({"operation": "sync", "entityId": "E1", "assignments": [{"nodeId": "N1", "proficiencyLevel": 7}]}),
        json!({"operation": "read", "table": "assignments", "limit": 0}),
    ] {
        let (response, error) = app.post(GATEWAY, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["kind"], "Malformed");
    }
}

#[tokio::test]
async fn test_correlation_id_is_echoed_or_generated() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri(GATEWAY)
        .header(header::AUTHORIZATION, format!("Bearer {}", app.credential()))
        .header("x-correlation-id", "req-42")
        .body(Body::from(r#"{"operation": "read", "table": "assignments"}"#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "req-42");

    let (response, _) = app
        .post(GATEWAY, json!({"operation": "read", "table": "assignments"}))
        .await;
    let generated = response.headers()["x-correlation-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn test_hierarchy_administration() {
    let app = app();
    let (response, body) = app
        .post(
            "/api/v1/hierarchy/nodes",
            json!({"id": "N1-a", "parentId": "N1", "attributes": {"label": "Async"}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["data"]["level"], 2);

    let (response, _) = app
        .post("/api/v1/hierarchy/nodes", json!({"parentId": "missing"}))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (response, body) = app
        .post("/api/v1/hierarchy/nodes/N1-a/disable", json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"]["disabled"], true);

    let (response, body) = app
        .post(
            GATEWAY,
            json!({
                "operation": "sync",
                "entityId": "E1",
                "assignments": [{"nodeId": "N1-a", "proficiencyLevel": 1}]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body["applied"], 0);
    assert_eq!(body["conflicts"][0]["reason"], "NotFound");
}

#[tokio::test]
async fn test_health_is_open() {
    let app = app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.gateway.ping().await.is_ok());
}
