//! Cachet cache system
//!
//! Sits between content callers and the CMS:
//!
//! - **Store adapter** ([`CacheStore`]): lazily connected, namespaced, fail-soft
//!   access to Redis.
//! - **Façade** ([`ContentCache`]): get-or-populate with a background write.
//! - **Dispatcher** ([`Invalidator`]): maps a CMS change to key deletions via
//!   the static [`RULES`] table.
//!
//! ## Configuration
//!
//! Connection behavior is controlled via `cachet.toml`:
//!
//! ```toml
//! [cache]
//! redis_url = "redis://127.0.0.1:6379/"
//! operation_timeout_ms = 500
//! max_attempts = 3
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
mod content;
mod invalidation;
pub mod keys;
mod lock;
mod memory;
mod store;

pub use backend::{KvBackend, RedisBackend, StoreError};
pub use config::CacheConfig;
pub use content::ContentCache;
pub use invalidation::{
    InvalidationEvent, InvalidationPlan, InvalidationReport, Invalidator, RULES, Rule, Target,
};
#[doc(hidden)]
pub use memory::MemoryBackend;
pub use store::{CacheStats, CacheStore};
