#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use cachet::application::content::ContentService;
use cachet::application::source::{ContentSource, SourceError};
use cachet::cache::{CacheConfig, CacheStore, ContentCache, Invalidator, MemoryBackend};
use cachet::infra::http::{AppState, SIGNATURE_HEADER, SharedSecret, build_router};

pub const SECRET: &str = "s3cret";

/// In-memory CMS: pages keyed by `{locale}/{slug}`, every other resource
/// synthesized from the locale.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeSource {
    pub fn insert_page(&self, locale: &str, slug: &str, body: Value) {
        self.pages
            .lock()
            .expect("pages lock")
            .insert(format!("{locale}/{slug}"), body);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn hit(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::transport("connection refused"));
        }
        Ok(())
    }

    fn lookup(&self, locale: &str, slug: &str) -> Option<Value> {
        self.pages
            .lock()
            .expect("pages lock")
            .get(&format!("{locale}/{slug}"))
            .cloned()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn page(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.hit()?;
        Ok(self.lookup(locale, slug))
    }

    async fn breadcrumbs(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.hit()?;
        Ok(self
            .lookup(locale, slug)
            .map(|page| json!([{"title": page["title"], "slug": slug}])))
    }

    async fn homepage(&self, locale: &str) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!({"title": "Home", "locale": locale}))
    }

    async fn navigation(&self, locale: &str) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!([{"label": "Ordinace", "locale": locale}]))
    }

    async fn footer(&self, _locale: &str) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!({"phone": "+420 123 456 789"}))
    }

    async fn news_article(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.hit()?;
        Ok((slug == "open-day").then(|| json!({"title": "Open day", "locale": locale})))
    }

    async fn news_list(&self, locale: &str, page: u32) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!({
            "items": [{"slug": "open-day", "locale": locale}],
            "pagination": {"page": page, "pageCount": 1},
        }))
    }

    async fn intranet_page(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.hit()?;
        Ok(self.lookup(locale, slug))
    }

    async fn intranet_tree(&self, _locale: &str) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!([]))
    }

    async fn search_index(&self, locale: &str) -> Result<Value, SourceError> {
        self.hit()?;
        Ok(json!([{"kind": "page", "slug": "ordinace", "locale": locale}]))
    }
}

/// Router wired to a memory backend and a [`FakeSource`].
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: Arc<CacheStore>,
    pub source: Arc<FakeSource>,
    pub router: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_secret(Some(SECRET))
    }

    pub fn with_secret(secret: Option<&str>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(CacheStore::with_backend(
            CacheConfig {
                max_attempts: 1,
                ..Default::default()
            },
            backend.clone(),
        ));
        let source = Arc::new(FakeSource::default());
        source.insert_page("cs", "ordinace", json!({"title": "Ordinace"}));
        source.insert_page("en", "ordinace", json!({"title": "Surgery"}));

        let content = ContentService::new(
            source.clone(),
            ContentCache::new(store.clone()),
            vec!["cs".to_string(), "en".to_string()],
        );
        let state = AppState {
            store: store.clone(),
            invalidator: Invalidator::new(store.clone()),
            content,
            secret: SharedSecret::new(secret.map(str::to_string)),
        };

        Self {
            backend,
            store,
            source,
            router: build_router(state),
        }
    }

    pub async fn seed(&self, keys: &[&str]) {
        for key in keys {
            assert!(
                self.store
                    .set(key, &json!({"seeded": key}), Duration::from_secs(60))
                    .await,
                "seeding {key} should succeed"
            );
        }
    }

    /// Logical keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.store.stats().await.keys
    }

    /// Poll until the background population of `key` lands.
    pub async fn wait_for_key(&self, key: &str) -> bool {
        for _ in 0..100 {
            if self.store.get_raw(key).await.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub fn signed(method: Method, uri: &str, secret: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(SIGNATURE_HEADER, secret)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn unsigned_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}
