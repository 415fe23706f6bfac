//! Read-through façade over the store adapter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::keys::DEFAULT_TTL;
use super::store::CacheStore;

/// Turns "fetch fresh data" futures into cached ones.
///
/// A hit returns the stored value without running the fetch. A miss runs the
/// fetch, hands the value back immediately and writes it to the store from a
/// detached task. Concurrent misses on the same key each run their own fetch.
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<CacheStore>,
    default_ttl: Duration,
}

impl ContentCache {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_set_with_ttl(key, self.default_ttl, fetch)
            .await
    }

    /// Errors from `fetch` are returned as-is and nothing is cached.
    pub async fn get_or_set_with_ttl<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.store.get::<T>(key).await {
            debug!(key, outcome = "hit", "serving cached content");
            return Ok(cached);
        }

        debug!(key, outcome = "miss", "fetching fresh content");
        let value = fetch().await?;
        self.populate(key, &value, ttl);
        Ok(value)
    }

    fn populate<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if self.store.is_disabled() {
            return;
        }

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key, error = %err, "Fresh content could not be serialized for caching");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let key = key.to_string();
        tokio::spawn(async move {
            if !store.set_raw(&key, &json, ttl).await {
                debug!(key = %key, "Background cache population skipped");
            }
        });
    }
}
