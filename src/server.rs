use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::config::AdminConfig;
use crate::error::GenerationError;
use crate::models::{ArticleRow, GenerationRequest};
use crate::pipeline::Services;
use crate::store;

const FEED_ENTRIES: i64 = 50;
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub services: Arc<Services>,
    pub admins: Arc<Vec<AdminConfig>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/generate", post(generate_handler))
        .route("/admin/articles", get(list_handler))
        .route("/admin/articles/{id}", get(article_handler))
        .route("/feed.atom", get(feed_handler))
        .with_state(state)
}

/// Result object handed back to the admin UI.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn ok(article_id: String) -> Self {
        Self {
            success: true,
            article_id: Some(article_id),
            error: None,
        }
    }

    fn failed(message: &str) -> Self {
        Self {
            success: false,
            article_id: None,
            error: Some(message.to_string()),
        }
    }
}

fn unauthenticated_result() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ActionResult::failed("Unauthorized"))).into_response()
}

/// The body is parsed only after the caller is known, so every rejection is an `ActionResult`.
async fn generate_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(admin) = identify_caller(&state.admins, &headers) else {
        warn!("generation rejected, caller not authenticated");
        return unauthenticated_result();
    };

    let request: GenerationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(admin = %admin.name, error = %e, "malformed generation request");
            return (StatusCode::BAD_REQUEST, Json(ActionResult::failed("Invalid request"))).into_response();
        }
    };
    info!(admin = %admin.name, category = %request.category, "generation requested");

    match state.services.run(Some(&admin.user_id), &request).await {
        Ok(id) => (StatusCode::OK, Json(ActionResult::ok(id))).into_response(),
        Err(e) => {
            if let Some(GenerationError::Unauthenticated) = e.downcast_ref::<GenerationError>() {
                return unauthenticated_result();
            }
            error!(error = format!("{e:#}"), "blog post generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResult::failed("Failed to generate blog post")),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    if identify_caller(&state.admins, &headers).is_none() {
        return unauthorized();
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    match store::list_articles(&state.pool, query.status.as_deref(), limit).await {
        Ok(articles) => Json(articles).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list articles");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

async fn article_handler(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if identify_caller(&state.admins, &headers).is_none() {
        return unauthorized();
    }

    match store::get_article(&state.pool, &id).await {
        Ok(Some(article)) => Json(article).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("No article '{id}'")).into_response(),
        Err(e) => {
            warn!(error = %e, id = %id, "failed to load article");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

async fn feed_handler(State(state): State<AppState>) -> Response {
    let articles = match store::list_articles(&state.pool, Some("published"), FEED_ENTRIES).await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "failed to query articles");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    let xml = build_atom_feed(&articles).to_string();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/atom+xml; charset=utf-8")],
        xml,
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"blogsmith\"")],
        "Unauthorized",
    )
        .into_response()
}

/// Match the request's bearer token or Basic password against the admin list.
fn identify_caller<'a>(admins: &'a [AdminConfig], headers: &HeaderMap) -> Option<&'a AdminConfig> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

    let presented = if let Some(token) = auth.strip_prefix("Bearer ") {
        debug!("bearer credentials presented");
        token.trim().to_string()
    } else if let Some(encoded) = auth.strip_prefix("Basic ") {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;
        let (_user, password) = credentials.split_once(':')?;
        debug!("basic credentials presented");
        password.to_string()
    } else {
        return None;
    };

    // Compare against every admin so timing does not reveal which entry matched
    let mut found = None;
    for admin in admins {
        if constant_time_eq(&presented, &admin.token) && found.is_none() {
            found = Some(admin);
        }
    }
    found
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn build_atom_feed(articles: &[ArticleRow]) -> atom_syndication::Feed {
    use atom_syndication::{Category, Content, Entry, Feed, Person, Text};
    use chrono::{DateTime, FixedOffset, Utc};

    let to_fixed = |dt: &DateTime<Utc>| -> DateTime<FixedOffset> { dt.fixed_offset() };

    let feed_updated = articles
        .first()
        .map(|a| to_fixed(&a.published_at.unwrap_or(a.created_at)))
        .unwrap_or_else(|| to_fixed(&Utc::now()));

    let entries: Vec<Entry> = articles
        .iter()
        .map(|article| {
            let published = article.published_at.unwrap_or(article.created_at);
            let categories: Vec<Category> = article
                .tag_list()
                .into_iter()
                .map(|t| Category {
                    term: t,
                    ..Default::default()
                })
                .collect();

            let content = Content {
                content_type: Some("html".to_string()),
                value: Some(article.content_html.clone()),
                ..Default::default()
            };

            Entry {
                id: format!("urn:uuid:{}", article.id),
                title: Text::plain(&article.title),
                updated: to_fixed(&published),
                authors: vec![Person {
                    name: article.author_id.clone(),
                    ..Default::default()
                }],
                content: Some(content),
                categories,
                published: Some(to_fixed(&published)),
                ..Default::default()
            }
        })
        .collect();

    Feed {
        id: "urn:blogsmith:feed".to_string(),
        title: Text::plain("blogsmith"),
        updated: feed_updated,
        entries,
        ..Default::default()
    }
}
