//! Origin of fresh content.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content source request failed: {0}")]
    Transport(String),
    #[error("content source responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("content source returned an unexpected payload: {0}")]
    Payload(String),
}

impl SourceError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload(message.into())
    }
}

/// Read access to CMS content, already flattened into plain JSON documents.
///
/// Slug lookups return `Ok(None)` when no entry with that slug exists in the
/// requested locale.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn page(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError>;

    /// Ancestor chain of a page, root first, ending with the page itself.
    async fn breadcrumbs(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError>;

    async fn homepage(&self, locale: &str) -> Result<Value, SourceError>;

    async fn navigation(&self, locale: &str) -> Result<Value, SourceError>;

    async fn footer(&self, locale: &str) -> Result<Value, SourceError>;

    async fn news_article(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError>;

    /// One listing page (1-based) of news summaries, newest first.
    async fn news_list(&self, locale: &str, page: u32) -> Result<Value, SourceError>;

    async fn intranet_page(&self, locale: &str, slug: &str)
    -> Result<Option<Value>, SourceError>;

    async fn intranet_tree(&self, locale: &str) -> Result<Value, SourceError>;

    /// Flat list of searchable documents for client-side filtering.
    async fn search_index(&self, locale: &str) -> Result<Value, SourceError>;
}
