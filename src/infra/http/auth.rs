//! Shared-secret gate for the webhook and cache administration routes.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::application::error::HttpError;

/// Header the CMS sends the configured secret in.
pub const SIGNATURE_HEADER: &str = "x-strapi-webhook-signature";

/// Process-wide secret. When none is configured every gated request is
/// rejected.
#[derive(Clone, Default)]
pub struct SharedSecret(Option<Arc<str>>);

impl SharedSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.filter(|value| !value.is_empty()).map(Arc::from))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    pub fn verify(&self, candidate: Option<&str>) -> bool {
        match (self.0.as_deref(), candidate) {
            (Some(expected), Some(candidate)) => {
                expected.as_bytes().ct_eq(candidate.as_bytes()).unwrap_u8() == 1
            }
            _ => false,
        }
    }

    /// Accept the secret from [`SIGNATURE_HEADER`], falling back to `query`.
    pub fn authorize(
        &self,
        source: &'static str,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<(), HttpError> {
        let provided = signature(headers).or(query);
        if self.verify(provided) {
            return Ok(());
        }

        let detail = match (self.is_configured(), provided.is_some()) {
            (false, _) => "no shared secret configured",
            (true, false) => "secret missing",
            (true, true) => "secret mismatch",
        };
        Err(HttpError::new(
            source,
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            detail,
        ))
    }
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn verify_requires_exact_match() {
        let secret = SharedSecret::new(Some("s3cret".to_string()));
        assert!(secret.verify(Some("s3cret")));
        assert!(!secret.verify(Some("s3cre")));
        assert!(!secret.verify(Some("s3cret ")));
        assert!(!secret.verify(None));
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let secret = SharedSecret::new(None);
        assert!(!secret.verify(Some("")));
        assert!(!SharedSecret::new(Some(String::new())).verify(Some("")));
        assert!(secret.authorize("test", &headers("anything"), None).is_err());
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let secret = SharedSecret::new(Some("s3cret".to_string()));
        assert!(secret.authorize("test", &headers("s3cret"), Some("wrong")).is_ok());
        assert!(secret.authorize("test", &headers("wrong"), Some("s3cret")).is_err());
        assert!(secret.authorize("test", &HeaderMap::new(), Some("s3cret")).is_ok());
    }
}
