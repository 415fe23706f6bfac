mod support;

use std::collections::HashSet;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

use cachet::cache::InvalidationEvent;
use support::{Harness, SECRET, get, signed};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let harness = Harness::new();

    // miss, then hit
    assert!(harness.store.get::<serde_json::Value>("footer:cs").await.is_none());
    assert!(
        harness
            .store
            .set("footer:cs", &json!({"phone": "1"}), Duration::from_secs(60))
            .await
    );
    assert!(harness.store.get::<serde_json::Value>("footer:cs").await.is_some());

    // invalidation through the dispatcher and the webhook route
    cachet::cache::Invalidator::new(harness.store.clone())
        .invalidate(&InvalidationEvent::new("footer", None, None))
        .await;
    let (status, _) = harness
        .send(signed(
            Method::POST,
            "/api/webhook",
            SECRET,
            r#"{"event":"entry.update","model":"homepage","entry":{"locale":"cs"}}"#,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = harness
        .send(signed(Method::POST, "/api/webhook", "wrong", "{}"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // write failure
    harness.backend.set_offline(true);
    assert!(
        !harness
            .store
            .set("nav:cs", &json!([]), Duration::from_secs(60))
            .await
    );
    harness.backend.set_offline(false);

    let (status, _) = harness.send(get("/api/content/cs/homepage")).await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "cachet_cache_hit_total",
        "cachet_cache_miss_total",
        "cachet_cache_write_failed_total",
        "cachet_cache_invalidated_keys_total",
        "cachet_cache_op_ms",
        "cachet_webhook_received_total",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == "cachet_webhook_received_total"
        })
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .filter(|label| label.key() == "outcome")
                .map(|label| label.value().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(outcomes.contains("dispatched"), "{outcomes:?}");
    assert!(outcomes.contains("unauthorized"), "{outcomes:?}");
}
