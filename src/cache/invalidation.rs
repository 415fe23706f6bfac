//! Change-notification driven invalidation.
//!
//! A CMS change names a model and optionally the entry's slug and locale.
//! [`RULES`] maps each model to the key families derived from it; the
//! [`Invalidator`] expands those into exact keys and glob patterns and deletes
//! them through the store adapter.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tracing::info;

use super::keys::{glob_escape, tags};
use super::store::CacheStore;

const METRIC_INVALIDATED_KEYS: &str = "cachet_cache_invalidated_keys_total";

/// A single content change. Transient; lives for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub content_type: String,
    pub slug: Option<String>,
    pub locale: Option<String>,
}

impl InvalidationEvent {
    /// Blank values are treated as absent; the model name is lowercased.
    pub fn new(content_type: &str, slug: Option<&str>, locale: Option<&str>) -> Self {
        Self {
            content_type: content_type.trim().to_ascii_lowercase(),
            slug: non_blank(slug),
            locale: non_blank(locale),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Key family affected by a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Per-entry keys shaped `{tag}:{locale}:{slug}`.
    Item(&'static str),
    /// Per-locale aggregates shaped `{tag}:{locale}` or `{tag}:{locale}:{n}`.
    Locale(&'static str),
    /// Everything under the tag.
    All(&'static str),
}

#[derive(Debug)]
pub struct Rule {
    pub model: &'static str,
    pub targets: &'static [Target],
}

pub static RULES: &[Rule] = &[
    Rule {
        model: "page",
        targets: &[
            Target::Item(tags::PAGE),
            Target::Item(tags::BREADCRUMB),
            Target::Locale(tags::SEARCH_INDEX),
        ],
    },
    Rule {
        model: "homepage",
        targets: &[Target::Locale(tags::HOMEPAGE)],
    },
    Rule {
        model: "navigation",
        targets: &[Target::All(tags::NAV)],
    },
    Rule {
        model: "footer",
        targets: &[Target::All(tags::FOOTER)],
    },
    Rule {
        model: "news-article",
        targets: &[
            Target::Item(tags::NEWS_ARTICLE),
            Target::Locale(tags::NEWS_LIST),
            Target::Locale(tags::SEARCH_INDEX),
        ],
    },
    Rule {
        model: "intranet-page",
        targets: &[
            Target::Item(tags::INTRANET_PAGE),
            Target::Locale(tags::INTRANET_TREE),
        ],
    },
];

/// Exact keys and glob patterns to delete for one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub keys: Vec<String>,
    pub patterns: Vec<String>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ keys: [{}], patterns: [{}] }}",
            self.keys.join(", "),
            self.patterns.join(", "),
        )
    }
}

impl InvalidationPlan {
    pub fn for_event(event: &InvalidationEvent) -> Self {
        let mut plan = Self::default();
        let slug = event.slug.as_deref().map(glob_escape);
        let locale = event.locale.as_deref().map(glob_escape);

        match RULES.iter().find(|rule| rule.model == event.content_type) {
            Some(rule) => {
                for target in rule.targets {
                    plan.add_target(*target, slug.as_deref(), locale.as_deref());
                }
            }
            None => {
                let tag = glob_escape(&event.content_type);
                plan.add_item(&tag, slug.as_deref(), locale.as_deref());
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.patterns.is_empty()
    }

    fn add_target(&mut self, target: Target, slug: Option<&str>, locale: Option<&str>) {
        match target {
            Target::Item(tag) => self.add_item(tag, slug, locale),
            Target::Locale(tag) => match locale {
                Some(locale) => {
                    self.push_key(format!("{tag}:{locale}"));
                    self.push_pattern(format!("{tag}:{locale}:*"));
                }
                None => self.push_pattern(format!("{tag}:*")),
            },
            Target::All(tag) => self.push_pattern(format!("{tag}:*")),
        }
    }

    fn add_item(&mut self, tag: &str, slug: Option<&str>, locale: Option<&str>) {
        match (slug, locale) {
            (Some(slug), Some(locale)) => self.push_key(format!("{tag}:{locale}:{slug}")),
            (Some(slug), None) => self.push_pattern(format!("{tag}:*:{slug}")),
            (None, Some(locale)) => self.push_pattern(format!("{tag}:{locale}:*")),
            (None, None) => self.push_pattern(format!("{tag}:*")),
        }
    }

    // Exact keys hold escaped segments too; undo that before they hit DEL.
    fn push_key(&mut self, key: String) {
        let key = unescape(&key);
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    fn push_pattern(&mut self, pattern: String) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(next) = chars.next()
        {
            out.push(next);
        } else {
            out.push(ch);
        }
    }
    out
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys: Vec<String>,
    pub patterns: Vec<String>,
    pub deleted: u64,
}

/// Stateless dispatcher over the shared store adapter.
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<CacheStore>,
}

impl Invalidator {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Delete every key derived from `event`.
    ///
    /// Deletions run concurrently. A failing target contributes zero and does
    /// not stop the others. Repeating an event is a no-op.
    pub async fn invalidate(&self, event: &InvalidationEvent) -> InvalidationReport {
        let plan = InvalidationPlan::for_event(event);

        let exact = self.store.delete_many(&plan.keys);
        let by_pattern = join_all(
            plan.patterns
                .iter()
                .map(|pattern| self.store.delete_pattern(pattern)),
        );
        let (exact, by_pattern) = futures::join!(exact, by_pattern);
        let deleted = exact + by_pattern.into_iter().sum::<u64>();

        counter!(METRIC_INVALIDATED_KEYS).increment(deleted);
        info!(
            content_type = %event.content_type,
            slug = event.slug.as_deref().unwrap_or("-"),
            locale = event.locale.as_deref().unwrap_or("-"),
            deleted,
            plan = %plan,
            "Cache invalidated"
        );

        InvalidationReport {
            keys: plan.keys,
            patterns: plan.patterns,
            deleted,
        }
    }
}
