//! Store adapter.
//!
//! [`CacheStore`] is the only component that talks to the backing store. It
//! connects lazily, namespaces every key, bounds each command with a timeout
//! and retry budget, and turns every failure into "cache absent".

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::backend::{KvBackend, RedisBackend, StoreError};
use super::config::CacheConfig;
use super::keys::{namespaced, strip_namespace};

const METRIC_CACHE_HIT: &str = "cachet_cache_hit_total";
const METRIC_CACHE_MISS: &str = "cachet_cache_miss_total";
const METRIC_CACHE_WRITE_FAILED: &str = "cachet_cache_write_failed_total";
const METRIC_CACHE_OP_MS: &str = "cachet_cache_op_ms";

/// Keys removed per `DEL` when deleting by pattern.
const DELETE_BATCH: usize = 500;

/// Snapshot of the namespace for operational visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub available: bool,
    pub key_count: usize,
    pub keys: Vec<String>,
}

impl CacheStats {
    fn unavailable() -> Self {
        Self {
            available: false,
            key_count: 0,
            keys: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct PatternDeletion {
    removed: u64,
    failed_batches: usize,
}

/// Fail-soft adapter over a [`KvBackend`].
///
/// The backend is resolved once. A missing URL or a failed connection leaves
/// the adapter disabled until the process restarts.
pub struct CacheStore {
    config: CacheConfig,
    backend: OnceCell<Option<Arc<dyn KvBackend>>>,
}

impl CacheStore {
    /// Adapter that connects to `config.redis_url` on first use.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            backend: OnceCell::new(),
        }
    }

    /// Adapter over an already-connected backend.
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn KvBackend>) -> Self {
        Self {
            config,
            backend: OnceCell::new_with(Some(Some(backend))),
        }
    }

    /// Adapter that never caches.
    pub fn disabled() -> Self {
        Self {
            config: CacheConfig::default(),
            backend: OnceCell::new_with(Some(None)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve the backend, connecting if this is the first call.
    pub async fn is_available(&self) -> bool {
        self.backend().await.is_some()
    }

    /// True once a connection attempt has failed or was never possible.
    pub fn is_disabled(&self) -> bool {
        matches!(self.backend.get(), Some(None))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(raw) = self.get_raw(key).await else {
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(value)
            }
            Err(err) => {
                warn!(key, error = %err, "Discarding malformed cache entry");
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Stored JSON text for `key`.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        let backend = self.backend().await?;
        let physical = namespaced(key);
        let physical = physical.as_str();
        match self.run("get", move || backend.get(physical)).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed; treating as miss");
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, &json, ttl).await,
            Err(err) => {
                warn!(key, error = %err, "Cache value could not be serialized");
                counter!(METRIC_CACHE_WRITE_FAILED).increment(1);
                false
            }
        }
    }

    /// Store pre-serialized JSON text.
    pub async fn set_raw(&self, key: &str, json: &str, ttl: Duration) -> bool {
        let Some(backend) = self.backend().await else {
            return false;
        };
        let physical = namespaced(key);
        let physical = physical.as_str();
        match self.run("set", move || backend.set(physical, json, ttl)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "Cache write failed");
                counter!(METRIC_CACHE_WRITE_FAILED).increment(1);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend().await else {
            return false;
        };
        let physical = [namespaced(key)];
        let physical = &physical[..];
        match self.run("delete", move || backend.delete(physical)).await {
            Ok(_) => true,
            Err(err) => {
                warn!(key, error = %err, "Cache delete failed");
                false
            }
        }
    }

    /// Delete exact keys in one batch, returning how many existed.
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let Some(backend) = self.backend().await else {
            return 0;
        };
        let physical: Vec<String> = keys.iter().map(|key| namespaced(key)).collect();
        let physical = &physical[..];
        match self.run("delete", move || backend.delete(physical)).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(keys = ?keys, error = %err, "Cache batch delete failed");
                0
            }
        }
    }

    /// Delete every key matching the glob `pattern` within the namespace.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        match self.try_delete_pattern(pattern).await {
            Ok(deletion) => deletion.removed,
            Err(err) => {
                warn!(pattern, error = %err, "Cache pattern delete failed");
                0
            }
        }
    }

    /// Delete every key in the namespace.
    pub async fn clear_all(&self) -> bool {
        match self.try_delete_pattern("*").await {
            Ok(PatternDeletion {
                removed,
                failed_batches: 0,
            }) => {
                info!(removed, "Cache namespace cleared");
                true
            }
            Ok(PatternDeletion {
                removed,
                failed_batches,
            }) => {
                warn!(removed, failed_batches, "Cache namespace partially cleared");
                false
            }
            Err(err) => {
                warn!(error = %err, "Cache clear failed");
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let Some(backend) = self.backend().await else {
            return CacheStats::unavailable();
        };
        let pattern = namespaced("*");
        let pattern = pattern.as_str();
        match self.run("scan", move || backend.scan(pattern)).await {
            Ok(physical) => {
                let mut keys: Vec<String> = physical
                    .iter()
                    .map(|key| strip_namespace(key).to_string())
                    .collect();
                keys.sort();
                CacheStats {
                    available: true,
                    key_count: keys.len(),
                    keys,
                }
            }
            Err(err) => {
                warn!(error = %err, "Cache stats unavailable");
                CacheStats::unavailable()
            }
        }
    }

    async fn try_delete_pattern(&self, pattern: &str) -> Result<PatternDeletion, StoreError> {
        let Some(backend) = self.backend().await else {
            return Err(StoreError::Unavailable("cache store disabled".to_string()));
        };
        let physical_pattern = namespaced(pattern);
        let physical_pattern = physical_pattern.as_str();
        let keys = self
            .run("scan", move || backend.scan(physical_pattern))
            .await?;

        let mut deletion = PatternDeletion::default();
        for chunk in keys.chunks(DELETE_BATCH) {
            match self.run("delete", move || backend.delete(chunk)).await {
                Ok(removed) => deletion.removed += removed,
                Err(err) => {
                    warn!(pattern, batch = chunk.len(), error = %err, "Cache delete batch failed");
                    deletion.failed_batches += 1;
                }
            }
        }
        debug!(
            pattern,
            matched = keys.len(),
            removed = deletion.removed,
            failed_batches = deletion.failed_batches,
            "Cache pattern deleted"
        );
        Ok(deletion)
    }

    async fn backend(&self) -> Option<&Arc<dyn KvBackend>> {
        self.backend
            .get_or_init(|| self.connect())
            .await
            .as_ref()
    }

    async fn connect(&self) -> Option<Arc<dyn KvBackend>> {
        let Some(url) = self.config.redis_url.as_deref() else {
            info!("Cache store not configured; caching disabled");
            return None;
        };

        match timeout(
            self.config.connect_timeout,
            RedisBackend::connect(url, self.config.scan_count),
        )
        .await
        {
            Ok(Ok(backend)) => {
                info!("Cache store connected");
                Some(Arc::new(backend))
            }
            Ok(Err(err)) => {
                warn!(
                    error = %err,
                    "Cache store connection failed; caching disabled until restart"
                );
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "Cache store connection timed out; caching disabled until restart"
                );
                None
            }
        }
    }

    /// Run one store command with per-attempt timeout and exponential backoff.
    async fn run<'a, T, F>(&self, op: &'static str, mut command: F) -> Result<T, StoreError>
    where
        F: FnMut() -> BoxFuture<'a, Result<T, StoreError>>,
    {
        let started_at = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        let result = loop {
            let outcome = match timeout(self.config.operation_timeout, command()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Timeout(self.config.operation_timeout)),
            };
            match outcome {
                Err(err) if attempt < max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    debug!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying cache store command"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        histogram!(METRIC_CACHE_OP_MS, "op" => op)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::*;
    use crate::cache::memory::MemoryBackend;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NavItem {
        title: String,
        href: String,
    }

    fn memory_store() -> (Arc<MemoryBackend>, CacheStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::with_backend(CacheConfig::default(), backend.clone());
        (backend, store)
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let (_, store) = memory_store();
        let nav = vec![NavItem {
            title: "Ordinace".to_string(),
            href: "/cs/ordinace".to_string(),
        }];

        assert!(store.set("nav:cs", &nav, Duration::from_secs(60)).await);
        let cached: Option<Vec<NavItem>> = store.get("nav:cs").await;
        assert_eq!(cached, Some(nav));
    }

    #[tokio::test]
    async fn get_unset_key_is_none() {
        let (_, store) = memory_store();
        let cached: Option<serde_json::Value> = store.get("page:cs:missing").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn cached_null_is_distinct_from_miss() {
        let (_, store) = memory_store();
        assert!(store.set("page:cs:empty", &None::<String>, Duration::from_secs(60)).await);

        let cached: Option<Option<String>> = store.get("page:cs:empty").await;
        assert_eq!(cached, Some(None));
    }

    #[tokio::test]
    async fn keys_are_written_under_namespace() {
        let (backend, store) = memory_store();
        store.set("nav:cs", &1, Duration::from_secs(60)).await;
        assert_eq!(backend.raw_keys(), vec!["cachet:nav:cs".to_string()]);
    }

    #[tokio::test]
    async fn malformed_entry_is_a_miss() {
        let (backend, store) = memory_store();
        backend.insert_raw("cachet:page:cs:broken", "{not json", Duration::from_secs(60));

        let cached: Option<HashMap<String, String>> = store.get("page:cs:broken").await;
        assert!(cached.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let (_, store) = memory_store();
        assert!(store.set("nav:cs", &"menu", Duration::from_secs(1)).await);

        tokio::time::advance(Duration::from_millis(1100)).await;

        let cached: Option<String> = store.get("nav:cs").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn delete_pattern_is_scoped_to_namespace() {
        let (backend, store) = memory_store();
        store.set("page:cs:ordinace", &1, Duration::from_secs(60)).await;
        store.set("page:en:ordinace", &2, Duration::from_secs(60)).await;
        store.set("nav:cs", &3, Duration::from_secs(60)).await;
        backend.insert_raw("page:cs:foreign", "4", Duration::from_secs(60));

        assert_eq!(store.delete_pattern("page:*").await, 2);
        assert_eq!(store.stats().await.keys, vec!["nav:cs".to_string()]);
        assert!(backend.raw_keys().contains(&"page:cs:foreign".to_string()));
    }

    #[tokio::test]
    async fn clear_all_leaves_foreign_keys() {
        let (backend, store) = memory_store();
        store.set("page:cs:ordinace", &1, Duration::from_secs(60)).await;
        store.set("nav:en", &2, Duration::from_secs(60)).await;
        backend.insert_raw("sessions:abc", "{}", Duration::from_secs(60));

        assert!(store.clear_all().await);

        let stats = store.stats().await;
        assert!(stats.available);
        assert_eq!(stats.key_count, 0);
        assert_eq!(backend.raw_keys(), vec!["sessions:abc".to_string()]);
    }

    #[tokio::test]
    async fn delete_many_reports_existing_keys() {
        let (_, store) = memory_store();
        store.set("page:cs:a", &1, Duration::from_secs(60)).await;

        let removed = store
            .delete_many(&["page:cs:a".to_string(), "page:cs:b".to_string()])
            .await;
        assert_eq!(removed, 1);
        assert!(store.delete("page:cs:a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_backend_degrades_after_bounded_retries() {
        let (backend, store) = memory_store();
        backend.set_offline(true);

        let cached: Option<String> = store.get("nav:cs").await;
        assert!(cached.is_none());
        assert_eq!(backend.calls(), 3);

        assert!(!store.set("nav:cs", &"menu", Duration::from_secs(60)).await);
        assert_eq!(store.delete_pattern("*").await, 0);
        assert!(!store.clear_all().await);
        assert!(!store.stats().await.available);
    }

    #[tokio::test]
    async fn missing_url_disables_store() {
        let store = CacheStore::new(CacheConfig::default());

        assert!(!store.is_disabled());
        assert!(!store.set("nav:cs", &"menu", Duration::from_secs(60)).await);
        assert!(store.is_disabled());

        let cached: Option<String> = store.get("nav:cs").await;
        assert!(cached.is_none());
        assert!(!store.stats().await.available);
    }

    #[tokio::test]
    async fn unreachable_store_disables_itself() {
        let store = CacheStore::new(CacheConfig {
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        });

        let cached: Option<String> = store.get("nav:cs").await;
        assert!(cached.is_none());
        assert!(!store.set("nav:cs", &"menu", Duration::from_secs(60)).await);
        assert!(!store.delete("nav:cs").await);
        assert_eq!(store.delete_pattern("nav:*").await, 0);

        let stats = store.stats().await;
        assert!(!stats.available);
        assert_eq!(stats.key_count, 0);
        assert!(store.is_disabled());
    }

    #[tokio::test]
    async fn connection_is_deferred_until_first_command() {
        let store = CacheStore::new(CacheConfig {
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        });
        assert!(store.config().is_configured());
        assert!(store.backend.get().is_none());

        let cached: Option<String> = store.get("nav:cs").await;
        assert!(cached.is_none());
        assert!(store.is_disabled());
    }

    /// Memory backend whose `DEL` commands fail after the first one.
    struct FirstDeleteOnly {
        inner: MemoryBackend,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl KvBackend for FirstDeleteOnly {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
            if self.deletes.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.delete(keys).await
        }

        async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            self.inner.scan(pattern).await
        }
    }

    #[tokio::test]
    async fn failed_delete_batch_keeps_partial_count() {
        let backend = Arc::new(FirstDeleteOnly {
            inner: MemoryBackend::new(),
            deletes: AtomicUsize::new(0),
        });
        for index in 0..DELETE_BATCH + 100 {
            backend.inner.insert_raw(
                &format!("cachet:news-list:cs:{index}"),
                "[]",
                Duration::from_secs(60),
            );
        }
        let store = CacheStore::with_backend(
            CacheConfig {
                max_attempts: 1,
                ..Default::default()
            },
            backend.clone(),
        );

        assert_eq!(store.delete_pattern("news-list:*").await, DELETE_BATCH as u64);
        assert_eq!(backend.inner.raw_keys().len(), 100);
        assert!(!store.clear_all().await);
    }

    #[test]
    fn stats_serialize_in_camel_case() {
        let stats = CacheStats {
            available: true,
            key_count: 1,
            keys: vec!["nav:cs".to_string()],
        };
        let json = serde_json::to_value(&stats).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"available": true, "keyCount": 1, "keys": ["nav:cs"]})
        );
    }
}
