//! Store connection configuration.
//!
//! Controls how the adapter reaches Redis via the `[cache]` table of
//! `cachet.toml`.

use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 50;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;
const DEFAULT_SCAN_COUNT: usize = 200;

/// Runtime options for the store adapter.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL. `None` disables caching for the process.
    pub redis_url: Option<String>,
    /// Upper bound for the one-time connection attempt.
    pub connect_timeout: Duration,
    /// Upper bound for a single attempt of a store command.
    pub operation_timeout: Duration,
    /// Attempts per store command before the call is reported as failed.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub retry_base_delay: Duration,
    /// Ceiling for the backoff delay.
    pub retry_max_delay: Duration,
    /// `COUNT` hint passed to `SCAN`.
    pub scan_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            redis_url: settings.redis_url.clone(),
            connect_timeout: settings.connect_timeout,
            operation_timeout: settings.operation_timeout,
            max_attempts: settings.max_attempts.get(),
            retry_base_delay: settings.retry_base_delay,
            retry_max_delay: settings.retry_max_delay,
            scan_count: settings.scan_count.get() as usize,
        }
    }
}

impl CacheConfig {
    /// Returns true when a store URL is configured.
    pub fn is_configured(&self) -> bool {
        self.redis_url.is_some()
    }

    /// Backoff delay to wait after the given failed attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}
