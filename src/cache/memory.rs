//! In-process backend with Redis-compatible expiry and glob semantics.
//!
//! Test support: stands in for Redis in unit and integration tests. Hidden
//! from the documented API.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::backend::{KvBackend, StoreError};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::memory";

struct Entry {
    value: String,
    expires_at: Instant,
}

#[doc(hidden)]
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent command fail as if the server went away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of commands received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Write a key verbatim, bypassing any namespace.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        mutex_lock(&self.entries, SOURCE, "insert_raw").insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Live physical keys, sorted.
    pub fn raw_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = mutex_lock(&self.entries, SOURCE, "raw_keys")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_online(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_online()?;
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "delete");
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key)
                && entry.expires_at > now
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let pattern: Vec<char> = pattern.chars().collect();
        Ok(self
            .raw_keys()
            .into_iter()
            .filter(|key| {
                let key: Vec<char> = key.chars().collect();
                glob_match(&pattern, &key)
            })
            .collect())
    }
}

/// Redis `MATCH` semantics: `*`, `?`, `[...]` with `^` negation and ranges,
/// and `\` escapes.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            let rest = &pattern[1..];
            (0..=text.len()).any(|skip| glob_match(rest, &text[skip..]))
        }
        Some('?') => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        Some('[') => {
            let Some((&ch, remaining)) = text.split_first() else {
                return false;
            };
            let (matched, consumed) = match_class(&pattern[1..], ch);
            matched && glob_match(&pattern[1 + consumed..], remaining)
        }
        Some('\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && glob_match(&pattern[2..], &text[1..])
        }
        Some(&literal) => text.first() == Some(&literal) && glob_match(&pattern[1..], &text[1..]),
    }
}

/// Match `ch` against a class body (after `[`). Returns the outcome and how
/// many pattern chars were consumed, closing `]` included.
fn match_class(body: &[char], ch: char) -> (bool, usize) {
    let mut idx = 0;
    let negated = body.first() == Some(&'^');
    if negated {
        idx += 1;
    }
    let mut matched = false;
    while idx < body.len() && body[idx] != ']' {
        let mut start = body[idx];
        if start == '\\' && idx + 1 < body.len() {
            idx += 1;
            start = body[idx];
        }
        if idx + 2 < body.len() && body[idx + 1] == '-' && body[idx + 2] != ']' {
            let end = body[idx + 2];
            let (low, high) = if start <= end { (start, end) } else { (end, start) };
            if (low..=high).contains(&ch) {
                matched = true;
            }
            idx += 3;
        } else {
            if start == ch {
                matched = true;
            }
            idx += 1;
        }
    }
    // An unterminated class swallows the rest of the pattern, as in Redis.
    let consumed = (idx + 1).min(body.len());
    (matched != negated, consumed)
}
