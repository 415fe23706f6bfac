use std::{future::IntoFuture, process, sync::Arc};

use cachet::{
    application::{content::ContentService, error::AppError, source::ContentSource},
    cache::{CacheConfig, CacheStore, ContentCache, Invalidator},
    config,
    infra::{
        cms::CmsClient,
        error::InfraError,
        http::{self, AppState, SharedSecret},
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Clear => run_clear(settings).await,
        config::Command::Stats => run_stats(settings).await,
    }
}

fn build_store(settings: &config::Settings) -> Arc<CacheStore> {
    let cache_config = CacheConfig::from(&settings.cache);
    if !cache_config.is_configured() {
        warn!(
            target = "cachet::startup",
            "No Redis URL configured; content is served uncached"
        );
    }
    Arc::new(CacheStore::new(cache_config))
}

fn build_state(settings: &config::Settings) -> Result<AppState, AppError> {
    let store = build_store(settings);
    let cms: Arc<dyn ContentSource> = Arc::new(CmsClient::new(&settings.cms)?);
    let content = ContentService::new(
        cms,
        ContentCache::new(store.clone()),
        settings.cms.locales.clone(),
    );

    let secret = SharedSecret::new(settings.webhook.secret.clone());
    if !secret.is_configured() {
        warn!(
            target = "cachet::startup",
            "No webhook secret configured; webhook and cache administration routes reject every request"
        );
    }

    Ok(AppState {
        invalidator: Invalidator::new(store.clone()),
        store,
        content,
        secret,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_state(&settings)?;
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "cachet::startup",
        addr = %settings.server.addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut drain_rx = shutdown_rx.clone();
    let mut serve_rx = shutdown_rx;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = serve_rx.wait_for(|stop| *stop).await;
            info!(target = "cachet::shutdown", "Shutdown signal received; draining");
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        let _ = drain_rx.wait_for(|stop| *stop).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target = "cachet::shutdown",
                grace_secs = grace.as_secs(),
                "Graceful shutdown window elapsed; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn run_clear(settings: config::Settings) -> Result<(), AppError> {
    let store = build_store(&settings);
    if !store.is_available().await {
        return Err(AppError::from(InfraError::configuration(
            "cache store is not reachable",
        )));
    }
    if !store.clear_all().await {
        return Err(AppError::unexpected("cache clear failed"));
    }
    info!(target = "cachet::clear", "Cache cleared");
    Ok(())
}

async fn run_stats(settings: config::Settings) -> Result<(), AppError> {
    let store = build_store(&settings);
    let stats = store.stats().await;
    let rendered = serde_json::to_string_pretty(&stats)
        .map_err(|err| AppError::unexpected(format!("failed to render stats: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "cachet::shutdown", error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "cachet::shutdown", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
