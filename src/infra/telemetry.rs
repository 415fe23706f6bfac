use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Directives applied when `RUST_LOG` is unset; connection chatter from the
/// HTTP and Redis clients stays out of the service log.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,redis=warn";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber for the configured level and format.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .parse_lossy(filter_spec(std::env::var(EnvFilter::DEFAULT_ENV).ok()));

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn filter_spec(from_env: Option<String>) -> String {
    from_env
        .filter(|spec| !spec.trim().is_empty())
        .unwrap_or_else(|| QUIET_DEPENDENCIES.to_string())
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cachet_cache_hit_total",
            Unit::Count,
            "Total number of cache reads answered from the store."
        );
        describe_counter!(
            "cachet_cache_miss_total",
            Unit::Count,
            "Total number of cache reads that found nothing usable."
        );
        describe_counter!(
            "cachet_cache_write_failed_total",
            Unit::Count,
            "Total number of cache writes that could not be stored."
        );
        describe_counter!(
            "cachet_cache_invalidated_keys_total",
            Unit::Count,
            "Total number of keys removed by change notifications."
        );
        describe_histogram!(
            "cachet_cache_op_ms",
            Unit::Milliseconds,
            "Store command latency in milliseconds, retries included."
        );
        describe_counter!(
            "cachet_webhook_received_total",
            Unit::Count,
            "Total number of webhook deliveries, labelled by outcome."
        );
    });
}
