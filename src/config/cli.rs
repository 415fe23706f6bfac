use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Cachet binary.
#[derive(Debug, Parser)]
#[command(
    name = "cachet",
    version,
    about = "CMS content cache with webhook-driven invalidation"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHET_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub connections: ConnectionOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Cachet HTTP service.
    Serve(Box<ServeArgs>),
    /// Delete every cached entry and exit.
    Clear,
    /// Print the cached key set as JSON and exit.
    Stats,
}

/// Deployment values conventionally supplied through the environment.
#[derive(Debug, Args, Default, Clone)]
pub struct ConnectionOverrides {
    /// Redis connection URL; caching is disabled when absent.
    #[arg(long = "redis-url", env = "REDIS_URL", value_name = "URL", global = true)]
    pub redis_url: Option<String>,

    /// Shared secret required by the webhook and cache administration routes.
    #[arg(
        long = "webhook-secret",
        env = "WEBHOOK_SECRET",
        value_name = "SECRET",
        hide_env_values = true,
        global = true
    )]
    pub webhook_secret: Option<String>,

    /// Base URL of the CMS.
    #[arg(long = "cms-url", env = "CMS_URL", value_name = "URL", global = true)]
    pub cms_url: Option<String>,

    /// Bearer token for the CMS API.
    #[arg(
        long = "cms-api-token",
        env = "CMS_API_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub cms_api_token: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the per-attempt store operation timeout in milliseconds.
    #[arg(long = "cache-operation-timeout-ms", value_name = "MS")]
    pub cache_operation_timeout_ms: Option<u64>,

    /// Override the number of attempts per store operation.
    #[arg(long = "cache-max-attempts", value_name = "COUNT")]
    pub cache_max_attempts: Option<u64>,

    /// Override the CMS request timeout in milliseconds.
    #[arg(long = "cms-timeout-ms", value_name = "MS")]
    pub cms_timeout_ms: Option<u64>,
}
