//! Strapi REST client.
//!
//! Responses are flattened before they leave this module: Strapi v4 wraps
//! entries as `{id, attributes}` and relations as `{data: ...}`, v5 returns
//! plain objects. Callers see the plain shape either way.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::application::source::{ContentSource, SourceError};
use crate::config::CmsSettings;

use super::error::InfraError;

const PAGES: &str = "pages";
const NEWS_ARTICLES: &str = "news-articles";
const INTRANET_PAGES: &str = "intranet-pages";
const HOMEPAGE: &str = "homepage";
const NAVIGATION: &str = "navigation";
const FOOTER: &str = "footer";

/// Deepest parent chain followed when building breadcrumbs.
const MAX_BREADCRUMB_DEPTH: usize = 8;
/// Page size used when a listing needs every entry of a collection.
const FULL_LISTING_PAGE_SIZE: &str = "250";

#[derive(Clone)]
pub struct CmsClient {
    client: Client,
    base: Url,
    token: Option<String>,
    news_page_size: u32,
}

impl CmsClient {
    pub fn new(settings: &CmsSettings) -> Result<Self, InfraError> {
        let mut base = settings.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::cms(err.to_string()))?;
        Ok(Self {
            client,
            base,
            token: settings.api_token.clone(),
            news_page_size: settings.news_page_size.get(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("cachet/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, resource: &str, query: &[(&str, String)]) -> Result<Url, SourceError> {
        let mut url = self
            .base
            .join(&format!("api/{resource}"))
            .map_err(|err| SourceError::transport(format!("invalid URL: {err}")))?;
        if !query.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// GET `api/{resource}` and return the flattened `data` member, or `None`
    /// on 404.
    async fn fetch(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<Option<(Value, Value)>, SourceError> {
        let url = self.url(resource, query)?;
        debug!(resource, "Fetching from CMS");

        let mut request = self.client.get(url);
        if let Some(token) = self.token.as_deref() {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::transport(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SourceError::transport(err.to_string()))?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let mut body: Value = serde_json::from_slice(&bytes)
            .map_err(|err| SourceError::payload(format!("failed to parse body: {err}")))?;
        let data = body
            .get_mut("data")
            .map(Value::take)
            .ok_or_else(|| SourceError::payload(format!("`{resource}` response has no data")))?;
        let meta = body.get_mut("meta").map(Value::take).unwrap_or(Value::Null);
        Ok(Some((flatten(data), meta)))
    }

    async fn single(&self, resource: &str, locale: &str) -> Result<Value, SourceError> {
        let query = [("locale", locale.to_string()), ("populate", "*".to_string())];
        match self.fetch(resource, &query).await? {
            Some((data, _)) => Ok(data),
            None => Err(SourceError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("single type `{resource}` has no `{locale}` entry"),
            }),
        }
    }

    async fn find_by_slug(
        &self,
        collection: &str,
        locale: &str,
        slug: &str,
    ) -> Result<Option<Value>, SourceError> {
        let query = [
            ("filters[slug][$eq]", slug.to_string()),
            ("locale", locale.to_string()),
            ("populate", "*".to_string()),
        ];
        let Some((data, _)) = self.fetch(collection, &query).await? else {
            return Ok(None);
        };
        match data {
            Value::Array(mut entries) if !entries.is_empty() => Ok(Some(entries.swap_remove(0))),
            Value::Array(_) | Value::Null => Ok(None),
            other => Err(SourceError::payload(format!(
                "`{collection}` lookup returned {other}"
            ))),
        }
    }

    async fn list(
        &self,
        collection: &str,
        locale: &str,
        fields: &[&str],
        extra: &[(&str, String)],
    ) -> Result<(Vec<Value>, Value), SourceError> {
        let field_keys: Vec<String> = (0..fields.len()).map(|i| format!("fields[{i}]")).collect();
        let mut query: Vec<(&str, String)> = vec![("locale", locale.to_string())];
        query.extend(
            field_keys
                .iter()
                .zip(fields)
                .map(|(key, field)| (key.as_str(), field.to_string())),
        );
        query.extend(extra.iter().cloned());

        match self.fetch(collection, &query).await? {
            Some((Value::Array(entries), meta)) => Ok((entries, meta)),
            Some((other, _)) => Err(SourceError::payload(format!(
                "`{collection}` listing returned {other}"
            ))),
            None => Ok((Vec::new(), Value::Null)),
        }
    }
}

#[async_trait]
impl ContentSource for CmsClient {
    async fn page(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.find_by_slug(PAGES, locale, slug).await
    }

    async fn breadcrumbs(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(slug.to_string());

        while let Some(current) = next.take() {
            if chain.len() >= MAX_BREADCRUMB_DEPTH || !seen.insert(current.clone()) {
                break;
            }
            let Some(page) = self.find_by_slug(PAGES, locale, &current).await? else {
                if chain.is_empty() {
                    return Ok(None);
                }
                break;
            };
            chain.push(json!({
                "title": page.get("title").cloned().unwrap_or(Value::Null),
                "slug": current,
            }));
            next = page
                .get("parent")
                .and_then(|parent| parent.get("slug"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        chain.reverse();
        Ok(Some(Value::Array(chain)))
    }

    async fn homepage(&self, locale: &str) -> Result<Value, SourceError> {
        self.single(HOMEPAGE, locale).await
    }

    async fn navigation(&self, locale: &str) -> Result<Value, SourceError> {
        self.single(NAVIGATION, locale).await
    }

    async fn footer(&self, locale: &str) -> Result<Value, SourceError> {
        self.single(FOOTER, locale).await
    }

    async fn news_article(&self, locale: &str, slug: &str) -> Result<Option<Value>, SourceError> {
        self.find_by_slug(NEWS_ARTICLES, locale, slug).await
    }

    async fn news_list(&self, locale: &str, page: u32) -> Result<Value, SourceError> {
        let extra = [
            ("sort", "publishedAt:desc".to_string()),
            ("pagination[page]", page.to_string()),
            ("pagination[pageSize]", self.news_page_size.to_string()),
            ("populate", "image".to_string()),
        ];
        let (items, meta) = self
            .list(
                NEWS_ARTICLES,
                locale,
                &["title", "slug", "perex", "publishedAt"],
                &extra,
            )
            .await?;
        Ok(json!({
            "items": items,
            "pagination": meta.get("pagination").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn intranet_page(
        &self,
        locale: &str,
        slug: &str,
    ) -> Result<Option<Value>, SourceError> {
        self.find_by_slug(INTRANET_PAGES, locale, slug).await
    }

    async fn intranet_tree(&self, locale: &str) -> Result<Value, SourceError> {
        let extra = [
            ("populate[parent][fields][0]", "slug".to_string()),
            ("sort", "title:asc".to_string()),
            ("pagination[pageSize]", FULL_LISTING_PAGE_SIZE.to_string()),
        ];
        let (entries, _) = self
            .list(INTRANET_PAGES, locale, &["title", "slug"], &extra)
            .await?;
        Ok(build_tree(&entries))
    }

    async fn search_index(&self, locale: &str) -> Result<Value, SourceError> {
        let extra = [("pagination[pageSize]", FULL_LISTING_PAGE_SIZE.to_string())];
        let ((pages, _), (articles, _)) = futures::try_join!(
            self.list(PAGES, locale, &["title", "slug", "description"], &extra),
            self.list(NEWS_ARTICLES, locale, &["title", "slug", "perex"], &extra),
        )?;

        let documents = pages
            .iter()
            .map(|page| search_document("page", page, "description"))
            .chain(
                articles
                    .iter()
                    .map(|article| search_document("news", article, "perex")),
            )
            .collect();
        Ok(Value::Array(documents))
    }
}

fn search_document(kind: &str, entry: &Value, excerpt_field: &str) -> Value {
    json!({
        "kind": kind,
        "title": entry.get("title").cloned().unwrap_or(Value::Null),
        "slug": entry.get("slug").cloned().unwrap_or(Value::Null),
        "excerpt": entry.get(excerpt_field).cloned().unwrap_or(Value::Null),
    })
}

/// Nest flat `{title, slug, parent: {slug}}` entries into `{title, slug, children}`.
/// Entries whose parent is missing from the listing become roots.
fn build_tree(entries: &[Value]) -> Value {
    let slug_of = |entry: &Value| entry.get("slug").and_then(Value::as_str).map(str::to_string);
    let known: HashSet<String> = entries.iter().filter_map(slug_of).collect();
    let parent_of = |entry: &Value| {
        entry
            .get("parent")
            .and_then(|parent| parent.get("slug"))
            .and_then(Value::as_str)
            .filter(|parent| known.contains(*parent))
            .map(str::to_string)
    };

    fn children(
        parent: Option<&str>,
        entries: &[Value],
        parent_of: &dyn Fn(&Value) -> Option<String>,
        depth: usize,
    ) -> Vec<Value> {
        if depth > MAX_BREADCRUMB_DEPTH {
            return Vec::new();
        }
        entries
            .iter()
            .filter(|entry| parent_of(entry).as_deref() == parent)
            .map(|entry| {
                let slug = entry.get("slug").and_then(Value::as_str);
                json!({
                    "title": entry.get("title").cloned().unwrap_or(Value::Null),
                    "slug": slug,
                    "children": children(slug, entries, parent_of, depth + 1),
                })
            })
            .collect()
    }

    Value::Array(children(None, entries, &parent_of, 0))
}

/// Strip Strapi v4 envelopes recursively.
fn flatten(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(flatten).collect()),
        Value::Object(mut object) => {
            if is_relation_envelope(&object) {
                return object.remove("data").map(flatten).unwrap_or(Value::Null);
            }
            if let Some(Value::Object(attributes)) = object.remove("attributes") {
                for (key, value) in attributes {
                    object.insert(key, value);
                }
            }
            Value::Object(
                object
                    .into_iter()
                    .map(|(key, value)| (key, flatten(value)))
                    .collect(),
            )
        }
        other => other,
    }
}

fn is_relation_envelope(object: &Map<String, Value>) -> bool {
    object.contains_key("data") && object.keys().all(|key| key == "data" || key == "meta")
}
