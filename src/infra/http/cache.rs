use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;

use crate::application::error::HttpError;
use crate::cache::CacheStats;

use super::AppState;
use super::auth::SecretQuery;

const SOURCE_CLEAR: &str = "infra::http::cache::clear";
const SOURCE_STATUS: &str = "infra::http::cache::status";

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

/// `POST /api/cache/clear`; secret in the signature header only.
pub(super) async fn clear_post(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, HttpError> {
    state.secret.authorize(SOURCE_CLEAR, &headers, None)?;
    Ok(Json(clear(&state).await))
}

/// `GET /api/cache/clear`; secret in the header or `?secret=`.
pub(super) async fn clear_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<ClearResponse>, HttpError> {
    state
        .secret
        .authorize(SOURCE_CLEAR, &headers, query.secret.as_deref())?;
    Ok(Json(clear(&state).await))
}

pub(super) async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<CacheStats>, HttpError> {
    state
        .secret
        .authorize(SOURCE_STATUS, &headers, query.secret.as_deref())?;
    Ok(Json(state.store.stats().await))
}

async fn clear(state: &AppState) -> ClearResponse {
    let success = state.store.clear_all().await;
    let message = if success {
        "All cache entries cleared"
    } else {
        "Cache store unavailable; nothing was cleared"
    };
    info!(success, "Cache clear requested");

    let now = OffsetDateTime::now_utc();
    ClearResponse {
        success,
        message: message.to_string(),
        timestamp: now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string()),
    }
}
