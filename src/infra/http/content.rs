use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;

use crate::application::content::ContentError;
use crate::application::error::HttpError;

use super::AppState;

const SOURCE: &str = "infra::http::content";

impl From<ContentError> for HttpError {
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::UnknownLocale(locale) => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Unknown locale",
                format!("locale `{locale}` is not served"),
            ),
            ContentError::InvalidPage => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid page",
                "listing page must be 1 or greater",
            ),
            ContentError::NotFound => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Not found",
                "no entry with that slug",
            ),
            ContentError::Source(err) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Content source unavailable",
                &err,
            ),
        }
    }
}

type ContentResult = Result<Json<Value>, HttpError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NewsQuery {
    page: Option<u32>,
}

pub(super) async fn page(
    State(state): State<AppState>,
    Path((locale, slug)): Path<(String, String)>,
) -> ContentResult {
    Ok(Json(state.content.page(&locale, &slug).await?))
}

pub(super) async fn breadcrumbs(
    State(state): State<AppState>,
    Path((locale, slug)): Path<(String, String)>,
) -> ContentResult {
    Ok(Json(state.content.breadcrumbs(&locale, &slug).await?))
}

pub(super) async fn homepage(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> ContentResult {
    Ok(Json(state.content.homepage(&locale).await?))
}

pub(super) async fn navigation(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> ContentResult {
    Ok(Json(state.content.navigation(&locale).await?))
}

pub(super) async fn footer(State(state): State<AppState>, Path(locale): Path<String>) -> ContentResult {
    Ok(Json(state.content.footer(&locale).await?))
}

pub(super) async fn news_list(
    State(state): State<AppState>,
    Path(locale): Path<String>,
    Query(query): Query<NewsQuery>,
) -> ContentResult {
    let page = query.page.unwrap_or(1);
    Ok(Json(state.content.news_list(&locale, page).await?))
}

pub(super) async fn news_article(
    State(state): State<AppState>,
    Path((locale, slug)): Path<(String, String)>,
) -> ContentResult {
    Ok(Json(state.content.news_article(&locale, &slug).await?))
}

pub(super) async fn search_index(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> ContentResult {
    Ok(Json(state.content.search_index(&locale).await?))
}
