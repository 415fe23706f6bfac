//! HTTP surface: change webhook, cache administration and cached content reads.

mod auth;
mod cache;
mod content;
mod middleware;
mod webhook;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::content::ContentService;
use crate::cache::{CacheStore, Invalidator};

pub use auth::{SIGNATURE_HEADER, SharedSecret};
pub use cache::ClearResponse;
pub use middleware::REQUEST_ID_HEADER;
pub use webhook::{WebhookAck, WebhookEntry, WebhookPayload};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CacheStore>,
    pub invalidator: Invalidator,
    pub content: ContentService,
    pub secret: SharedSecret,
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/webhook", post(webhook::receive))
        .route(
            "/api/cache/clear",
            post(cache::clear_post).get(cache::clear_get),
        )
        .route("/api/debug/cache", get(cache::status));

    let content_routes = Router::new()
        .route("/api/content/{locale}/pages/{slug}", get(content::page))
        .route(
            "/api/content/{locale}/breadcrumbs/{slug}",
            get(content::breadcrumbs),
        )
        .route("/api/content/{locale}/homepage", get(content::homepage))
        .route("/api/content/{locale}/navigation", get(content::navigation))
        .route("/api/content/{locale}/footer", get(content::footer))
        .route("/api/content/{locale}/news", get(content::news_list))
        .route("/api/content/{locale}/news/{slug}", get(content::news_article))
        .route(
            "/api/content/{locale}/search-index",
            get(content::search_index),
        );

    admin_routes
        .merge(content_routes)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
