mod support;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use support::{Harness, SECRET, get, signed, unsigned_post};

const SEEDED: [&str; 3] = ["footer:cs", "homepage:en", "page:cs:ordinace"];

#[tokio::test]
async fn post_clear_empties_the_namespace_and_spares_foreign_keys() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;
    harness
        .backend
        .insert_raw("other-app:session", "{}", Duration::from_secs(60));

    let (status, body) = harness
        .send(signed(Method::POST, "/api/cache/clear", SECRET, ""))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    let timestamp = body["timestamp"].as_str().expect("timestamp");
    OffsetDateTime::parse(timestamp, &Rfc3339).expect("timestamp should be RFC 3339");

    assert!(harness.keys().await.is_empty());
    assert_eq!(
        harness.backend.raw_keys(),
        vec!["other-app:session".to_string()]
    );
}

#[tokio::test]
async fn post_clear_ignores_the_query_secret() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;

    let (status, body) = harness
        .send(unsigned_post(&format!("/api/cache/clear?secret={SECRET}"), ""))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized"}));
    assert_eq!(harness.keys().await.len(), SEEDED.len());
}

#[tokio::test]
async fn get_clear_accepts_the_query_secret() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;

    let (status, body) = harness
        .send(get(&format!("/api/cache/clear?secret={SECRET}")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert!(harness.keys().await.is_empty());
}

#[tokio::test]
async fn get_clear_with_wrong_secret_keeps_entries() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;

    let (status, _) = harness.send(get("/api/cache/clear?secret=nope")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.keys().await.len(), SEEDED.len());
}

#[tokio::test]
async fn clear_reports_failure_when_the_store_is_unreachable() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;
    harness.backend.set_offline(true);

    let (status, body) = harness
        .send(signed(Method::POST, "/api/cache/clear", SECRET, ""))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn status_lists_logical_keys() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;

    let (status, body) = harness
        .send(signed(Method::GET, "/api/debug/cache", SECRET, ""))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "available": true,
            "keyCount": 3,
            "keys": ["footer:cs", "homepage:en", "page:cs:ordinace"],
        })
    );
}

#[tokio::test]
async fn status_accepts_the_query_secret() {
    let harness = Harness::new();

    let (status, body) = harness
        .send(get(&format!("/api/debug/cache?secret={SECRET}")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keyCount"], json!(0));
}

#[tokio::test]
async fn status_requires_the_secret() {
    let harness = Harness::new();
    harness.seed(&SEEDED).await;

    let (status, body) = harness.send(get("/api/debug/cache")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn status_reports_an_unreachable_store() {
    let harness = Harness::new();
    harness.backend.set_offline(true);

    let (status, body) = harness
        .send(signed(Method::GET, "/api/debug/cache", SECRET, ""))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"available": false, "keyCount": 0, "keys": []})
    );
}
