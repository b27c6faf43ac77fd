use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use scour_core::{
    BuildError, BuildStatus, Document, DocumentStore, IndexStats, Operator, QueryEngine,
    QueryError, RebuildCoordinator, SearchHit, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub engine: Arc<QueryEngine>,
    pub coordinator: Arc<RebuildCoordinator>,
    pub admin_token: Option<String>,
}

/// API error mapped to an HTTP status with an `{"error": msg}` body.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::IndexNotBuilt => ApiError::ServiceUnavailable("index not built".into()),
        }
    }
}

impl From<BuildError> for ApiError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::InProgress => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/suggest", get(suggest_handler))
        .route("/index/stats", get(stats_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .route("/index/status", get(status_handler))
        .route("/index/status/:build_id", get(status_of_handler))
        .route("/documents", get(list_documents_handler).post(upsert_document_handler))
        .route("/documents/:doc_id", delete(delete_document_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub op: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub highlight: bool,
}
fn default_limit() -> usize {
    10
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub op: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let op = params.op.as_deref().map(Operator::parse).unwrap_or_default();
    let mut found = state.engine.search(&params.q, op, params.limit)?;

    if params.highlight {
        let words: Vec<String> = params.q.split_whitespace().map(str::to_string).collect();
        for hit in &mut found.hits {
            hit.snippet = highlight_terms(&hit.snippet, &words);
        }
    }

    Ok(Json(SearchResponse {
        query: params.q,
        op: op.to_string(),
        took_s: start.elapsed().as_secs_f64(),
        total_hits: found.total_matched,
        results: found.hits,
    }))
}

#[derive(Deserialize)]
pub struct SuggestParams {
    pub q: String,
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
}
fn default_suggest_limit() -> usize {
    5
}

pub async fn suggest_handler(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let suggestions = state.engine.suggest(&params.q, params.limit)?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    Ok(Json(state.engine.stats()?))
}

pub async fn rebuild_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let build_id = state.coordinator.trigger()?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "build_id": build_id }))))
}

pub async fn status_handler(State(state): State<AppState>) -> Json<BuildStatus> {
    Json(state.coordinator.status())
}

pub async fn status_of_handler(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> Result<Json<BuildStatus>, ApiError> {
    state
        .coordinator
        .status_of(&build_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no build {build_id}")))
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}
fn default_list_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub url: String,
    pub title: String,
    pub fetched_at: String,
}

pub async fn list_documents_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let docs = state.store.list(params.limit.min(500), params.offset)?;
    let total = state.store.count()?;
    let documents: Vec<DocumentSummary> = docs
        .into_iter()
        .map(|d| DocumentSummary {
            id: d.id,
            url: d.url,
            title: d.title,
            fetched_at: d.fetched_at,
        })
        .collect();
    Ok(Json(json!({ "total": total, "documents": documents })))
}

#[derive(Deserialize)]
pub struct UpsertDocument {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "body", alias = "text")]
    pub content: String,
    #[serde(default, alias = "html_content")]
    pub html: Option<String>,
}

pub async fn upsert_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpsertDocument>,
) -> Result<Json<Document>, ApiError> {
    authorize(&state, &headers)?;
    if payload.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".into()));
    }
    let doc = state.store.upsert(Document::new(
        &payload.url,
        &payload.title,
        &payload.content,
        payload.html,
    ))?;
    Ok(Json(doc))
}

pub async fn delete_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    if !state.store.delete(&doc_id)? {
        return Err(ApiError::NotFound(format!("no document {doc_id}")));
    }
    Ok(Json(json!({ "deleted": doc_id })))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    match state.store.get(&doc_id)? {
        Some(doc) => Ok(Json(doc)),
        None => Err(ApiError::NotFound(format!("no document {doc_id}"))),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers
        .get("X-ADMIN-TOKEN")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

/// Wrap every occurrence of the raw query words in `<em>` tags.
fn highlight_terms(snippet: &str, words: &[String]) -> String {
    let mut s = snippet.to_string();
    for word in words {
        if word.trim().is_empty() {
            continue;
        }
        if let Ok(pat) = regex::RegexBuilder::new(&regex::escape(word))
            .case_insensitive(true)
            .build()
        {
            s = pat
                .replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0]))
                .to_string();
        }
    }
    s
}
