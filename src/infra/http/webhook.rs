use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::application::error::HttpError;
use crate::cache::InvalidationEvent;

use super::AppState;

const SOURCE: &str = "infra::http::webhook";
const METRIC_WEBHOOK_RECEIVED: &str = "cachet_webhook_received_total";

/// Body of a CMS entry lifecycle notification.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub entry: Option<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

impl WebhookPayload {
    /// `None` for notifications that carry no content model (media library,
    /// trigger tests).
    pub fn invalidation_event(&self) -> Option<InvalidationEvent> {
        let model = self.model.as_deref()?.trim();
        if model.is_empty() {
            return None;
        }
        let entry = self.entry.as_ref();
        Some(InvalidationEvent::new(
            model,
            entry.and_then(|entry| entry.slug.as_deref()),
            entry.and_then(|entry| entry.locale.as_deref()),
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

pub(super) async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, HttpError> {
    if let Err(err) = state.secret.authorize(SOURCE, &headers, None) {
        counter!(METRIC_WEBHOOK_RECEIVED, "outcome" => "unauthorized").increment(1);
        return Err(err);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|err| {
        counter!(METRIC_WEBHOOK_RECEIVED, "outcome" => "invalid").increment(1);
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid payload", &err)
    })?;

    let Some(event) = payload.invalidation_event() else {
        counter!(METRIC_WEBHOOK_RECEIVED, "outcome" => "ignored").increment(1);
        debug!(event = %payload.event, "Webhook carries no content model; nothing to invalidate");
        return Ok(Json(WebhookAck { received: true }));
    };

    let report = state.invalidator.invalidate(&event).await;
    counter!(METRIC_WEBHOOK_RECEIVED, "outcome" => "dispatched").increment(1);
    info!(
        event = %payload.event,
        model = %event.content_type,
        deleted = report.deleted,
        "Webhook processed"
    );

    Ok(Json(WebhookAck { received: true }))
}
