//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ConnectionOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachet";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 50;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1_000;
const DEFAULT_SCAN_COUNT: u64 = 200;
const DEFAULT_CMS_URL: &str = "http://127.0.0.1:1337";
const DEFAULT_CMS_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NEWS_PAGE_SIZE: u64 = 10;
const DEFAULT_LOCALES: [&str; 2] = ["cs", "en"];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub webhook: WebhookSettings,
    pub cms: CmsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub max_attempts: NonZeroU32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub scan_count: NonZeroU32,
}

#[derive(Clone, Default)]
pub struct WebhookSettings {
    pub secret: Option<String>,
}

impl fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct CmsSettings {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub locales: Vec<String>,
    pub news_page_size: NonZeroU32,
}

impl fmt::Debug for CmsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsSettings")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("locales", &self.locales)
            .field("news_page_size", &self.news_page_size)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CACHET").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_connection_overrides(&cli.connections);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Clear) | Some(Command::Stats) | None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    webhook: RawWebhookSettings,
    cms: RawCmsSettings,
}

impl RawSettings {
    fn apply_connection_overrides(&mut self, overrides: &ConnectionOverrides) {
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(secret) = overrides.webhook_secret.as_ref() {
            self.webhook.secret = Some(secret.clone());
        }
        if let Some(url) = overrides.cms_url.as_ref() {
            self.cms.url = Some(url.clone());
        }
        if let Some(token) = overrides.cms_api_token.as_ref() {
            self.cms.api_token = Some(token.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ms) = overrides.cache_operation_timeout_ms {
            self.cache.operation_timeout_ms = Some(ms);
        }
        if let Some(attempts) = overrides.cache_max_attempts {
            self.cache.max_attempts = Some(attempts);
        }
        if let Some(ms) = overrides.cms_timeout_ms {
            self.cms.timeout_ms = Some(ms);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            webhook,
            cms,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let webhook = build_webhook_settings(webhook);
        let cms = build_cms_settings(cms)?;

        Ok(Self {
            server,
            logging,
            cache,
            webhook,
            cms,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let redis_url = non_empty(cache.redis_url);
    if let Some(url) = redis_url.as_deref() {
        Url::parse(url)
            .map_err(|err| LoadError::invalid("cache.redis_url", format!("invalid URL: {err}")))?;
    }

    let connect_timeout = positive_millis(
        cache.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        "cache.connect_timeout_ms",
    )?;
    let operation_timeout = positive_millis(
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS),
        "cache.operation_timeout_ms",
    )?;
    let max_attempts = non_zero_u32(
        cache.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        "cache.max_attempts",
    )?;
    let retry_base_delay = positive_millis(
        cache
            .retry_base_delay_ms
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
        "cache.retry_base_delay_ms",
    )?;
    let retry_max_delay = positive_millis(
        cache.retry_max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
        "cache.retry_max_delay_ms",
    )?;
    if retry_max_delay < retry_base_delay {
        return Err(LoadError::invalid(
            "cache.retry_max_delay_ms",
            "must not be smaller than cache.retry_base_delay_ms",
        ));
    }
    let scan_count = non_zero_u32(
        cache.scan_count.unwrap_or(DEFAULT_SCAN_COUNT),
        "cache.scan_count",
    )?;

    Ok(CacheSettings {
        redis_url,
        connect_timeout,
        operation_timeout,
        max_attempts,
        retry_base_delay,
        retry_max_delay,
        scan_count,
    })
}

fn build_webhook_settings(webhook: RawWebhookSettings) -> WebhookSettings {
    WebhookSettings {
        secret: non_empty(webhook.secret),
    }
}

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let raw_url = non_empty(cms.url).unwrap_or_else(|| DEFAULT_CMS_URL.to_string());
    let base_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("cms.url", format!("invalid URL: {err}")))?;
    if base_url.cannot_be_a_base() {
        return Err(LoadError::invalid("cms.url", "must be an absolute base URL"));
    }

    let timeout = positive_millis(
        cms.timeout_ms.unwrap_or(DEFAULT_CMS_TIMEOUT_MS),
        "cms.timeout_ms",
    )?;

    let locales: Vec<String> = match cms.locales {
        Some(locales) => locales
            .into_iter()
            .map(|locale| locale.trim().to_string())
            .filter(|locale| !locale.is_empty())
            .collect(),
        None => DEFAULT_LOCALES.iter().map(|locale| locale.to_string()).collect(),
    };
    if locales.is_empty() {
        return Err(LoadError::invalid(
            "cms.locales",
            "at least one locale is required",
        ));
    }

    let news_page_size = non_zero_u32(
        cms.news_page_size.unwrap_or(DEFAULT_NEWS_PAGE_SIZE),
        "cms.news_page_size",
    )?;

    Ok(CmsSettings {
        base_url,
        api_token: non_empty(cms.api_token),
        timeout,
        locales,
        news_page_size,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    redis_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
    max_attempts: Option<u64>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    scan_count: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebhookSettings {
    secret: Option<String>,
}

impl fmt::Debug for RawWebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawWebhookSettings").finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    url: Option<String>,
    api_token: Option<String>,
    timeout_ms: Option<u64>,
    locales: Option<Vec<String>>,
    news_page_size: Option<u64>,
}

impl fmt::Debug for RawCmsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCmsSettings")
            .field("url", &self.url)
            .field("timeout_ms", &self.timeout_ms)
            .field("locales", &self.locales)
            .field("news_page_size", &self.news_page_size)
            .finish_non_exhaustive()
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
