//! Cached read access to CMS content.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::application::source::{ContentSource, SourceError};
use crate::cache::{ContentCache, keys};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("locale `{0}` is not served")]
    UnknownLocale(String),
    #[error("listing page must be 1 or greater")]
    InvalidPage,
    #[error("content not found")]
    NotFound,
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Every read goes through the façade under a key from [`keys`], so the
/// invalidation rules can reach it. Missing entries are not cached.
#[derive(Clone)]
pub struct ContentService {
    source: Arc<dyn ContentSource>,
    cache: ContentCache,
    locales: Arc<[String]>,
}

impl ContentService {
    pub fn new(source: Arc<dyn ContentSource>, cache: ContentCache, locales: Vec<String>) -> Self {
        Self {
            source,
            cache,
            locales: locales.into(),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub async fn page(&self, locale: &str, slug: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::page(locale, slug), || async move {
                source.page(locale, slug).await?.ok_or(ContentError::NotFound)
            })
            .await
    }

    pub async fn breadcrumbs(&self, locale: &str, slug: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::breadcrumb(locale, slug), || async move {
                source
                    .breadcrumbs(locale, slug)
                    .await?
                    .ok_or(ContentError::NotFound)
            })
            .await
    }

    pub async fn homepage(&self, locale: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::homepage(locale), || async move {
                Ok::<_, ContentError>(source.homepage(locale).await?)
            })
            .await
    }

    pub async fn navigation(&self, locale: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::navigation(locale), || async move {
                Ok::<_, ContentError>(source.navigation(locale).await?)
            })
            .await
    }

    pub async fn footer(&self, locale: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::footer(locale), || async move {
                Ok::<_, ContentError>(source.footer(locale).await?)
            })
            .await
    }

    pub async fn news_article(&self, locale: &str, slug: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::news_article(locale, slug), || async move {
                source
                    .news_article(locale, slug)
                    .await?
                    .ok_or(ContentError::NotFound)
            })
            .await
    }

    pub async fn news_list(&self, locale: &str, page: u32) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        if page == 0 {
            return Err(ContentError::InvalidPage);
        }
        let source = &self.source;
        self.cache
            .get_or_set(&keys::news_list(locale, page), || async move {
                Ok::<_, ContentError>(source.news_list(locale, page).await?)
            })
            .await
    }

    pub async fn intranet_page(&self, locale: &str, slug: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::intranet_page(locale, slug), || async move {
                source
                    .intranet_page(locale, slug)
                    .await?
                    .ok_or(ContentError::NotFound)
            })
            .await
    }

    pub async fn intranet_tree(&self, locale: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::intranet_tree(locale), || async move {
                Ok::<_, ContentError>(source.intranet_tree(locale).await?)
            })
            .await
    }

    pub async fn search_index(&self, locale: &str) -> Result<Value, ContentError> {
        self.check_locale(locale)?;
        let source = &self.source;
        self.cache
            .get_or_set(&keys::search_index(locale), || async move {
                Ok::<_, ContentError>(source.search_index(locale).await?)
            })
            .await
    }

    fn check_locale(&self, locale: &str) -> Result<(), ContentError> {
        if self.locales.iter().any(|served| served == locale) {
            Ok(())
        } else {
            Err(ContentError::UnknownLocale(locale.to_string()))
        }
    }
}
