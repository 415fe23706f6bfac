//! Cache key definitions.
//!
//! Every key follows `{tag}[:{locale}[:{qualifier}...]]`. The store adds
//! [`KEY_PREFIX`] on the way in and strips it on the way out, so callers and
//! the invalidation rules only ever see the logical key.

use std::time::Duration;

/// Namespace under which every physical key is written.
///
/// Changing it orphans every existing entry.
pub const KEY_PREFIX: &str = "cachet:";

/// Time-to-live applied when a caller does not pick one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Content-type tags used as the first key segment.
pub mod tags {
    pub const PAGE: &str = "page";
    pub const BREADCRUMB: &str = "breadcrumb";
    pub const HOMEPAGE: &str = "homepage";
    pub const NAV: &str = "nav";
    pub const FOOTER: &str = "footer";
    pub const NEWS_ARTICLE: &str = "news-article";
    pub const NEWS_LIST: &str = "news-list";
    pub const INTRANET_PAGE: &str = "intranet-page";
    pub const INTRANET_TREE: &str = "intranet-tree";
    pub const SEARCH_INDEX: &str = "search-index";
}

pub fn page(locale: &str, slug: &str) -> String {
    item(tags::PAGE, locale, slug)
}

pub fn breadcrumb(locale: &str, slug: &str) -> String {
    item(tags::BREADCRUMB, locale, slug)
}

pub fn homepage(locale: &str) -> String {
    localized(tags::HOMEPAGE, locale)
}

pub fn navigation(locale: &str) -> String {
    localized(tags::NAV, locale)
}

pub fn footer(locale: &str) -> String {
    localized(tags::FOOTER, locale)
}

pub fn news_article(locale: &str, slug: &str) -> String {
    item(tags::NEWS_ARTICLE, locale, slug)
}

/// Listing page `page` (1-based) of news summaries.
pub fn news_list(locale: &str, page: u32) -> String {
    format!("{}:{locale}:{page}", tags::NEWS_LIST)
}

pub fn intranet_page(locale: &str, slug: &str) -> String {
    item(tags::INTRANET_PAGE, locale, slug)
}

pub fn intranet_tree(locale: &str) -> String {
    localized(tags::INTRANET_TREE, locale)
}

pub fn search_index(locale: &str) -> String {
    localized(tags::SEARCH_INDEX, locale)
}

fn localized(tag: &str, locale: &str) -> String {
    format!("{tag}:{locale}")
}

fn item(tag: &str, locale: &str, slug: &str) -> String {
    format!("{tag}:{locale}:{slug}")
}

/// Escape Redis glob metacharacters so a slug or locale matches only itself.
pub fn glob_escape(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Physical key as written to the backing store.
pub(crate) fn namespaced(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// Logical key with the namespace prefix removed.
pub(crate) fn strip_namespace(key: &str) -> &str {
    key.strip_prefix(KEY_PREFIX).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_keys_are_tag_locale_slug() {
        assert_eq!(page("cs", "ordinace"), "page:cs:ordinace");
        assert_eq!(breadcrumb("en", "ordinace"), "breadcrumb:en:ordinace");
        assert_eq!(news_article("cs", "nove-ordinacni-hodiny"), "news-article:cs:nove-ordinacni-hodiny");
        assert_eq!(intranet_page("cs", "smernice"), "intranet-page:cs:smernice");
    }

    #[test]
    fn localized_keys_have_no_slug() {
        assert_eq!(navigation("cs"), "nav:cs");
        assert_eq!(footer("en"), "footer:en");
        assert_eq!(homepage("cs"), "homepage:cs");
        assert_eq!(search_index("en"), "search-index:en");
        assert_eq!(news_list("cs", 2), "news-list:cs:2");
    }

    #[test]
    fn glob_escape_neutralises_metacharacters() {
        assert_eq!(glob_escape("plain-slug"), "plain-slug");
        assert_eq!(glob_escape("a*b?"), "a\\*b\\?");
        assert_eq!(glob_escape("[x]\\"), "\\[x\\]\\\\");
    }

    #[test]
    fn namespace_roundtrip() {
        let physical = namespaced("nav:cs");
        assert_eq!(physical, "cachet:nav:cs");
        assert_eq!(strip_namespace(&physical), "nav:cs");
        assert_eq!(strip_namespace("foreign:key"), "foreign:key");
    }
}
