use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use scour_core::{
    doc_id, Document, DocumentStore, IndexHandle, IndexStorage, QueryEngine, RebuildCoordinator,
    SledStore,
};
use scour_server::{build_app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN: &str = "test-admin-token";

struct TestApp {
    app: Router,
    _dir: TempDir,
}

/// Stand up a server over a seeded sled store; optionally build and publish
/// an index first.
fn test_app(docs: &[(&str, &str, &str)], prebuild: bool) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn DocumentStore> =
        Arc::new(SledStore::open(dir.path().join("store")).unwrap());
    for (url, title, content) in docs {
        store
            .upsert(Document::new(url, title, content, None))
            .unwrap();
    }
    let handle = Arc::new(IndexHandle::new());
    let coordinator = Arc::new(RebuildCoordinator::new(
        Arc::clone(&store),
        IndexStorage::new(dir.path().join("index")),
        Arc::clone(&handle),
    ));
    if prebuild {
        coordinator.rebuild().unwrap();
    }
    let engine = Arc::new(QueryEngine::new(handle, Arc::clone(&store)));
    let state = AppState {
        store,
        engine,
        coordinator,
        admin_token: Some(ADMIN.to_string()),
    };
    TestApp {
        app: build_app(state),
        _dir: dir,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(t) = token {
        builder = builder.header("X-ADMIN-TOKEN", t);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn delete(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::delete(uri);
    if let Some(t) = token {
        builder = builder.header("X-ADMIN-TOKEN", t);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

const CORPUS: &[(&str, &str, &str)] = &[
    (
        "https://rust.test/book",
        "The Book",
        "Rust is great. Rust makes systems programming approachable.",
    ),
    (
        "https://rust.test/start",
        "Getting Started",
        "Learning rust, one borrow at a time.",
    ),
    (
        "https://birds.test/heron",
        "Herons",
        "Wading birds of rivers and shores.",
    ),
];

#[tokio::test]
async fn search_returns_ranked_results() {
    let t = test_app(CORPUS, true);

    let (status, body) = get(&t.app, "/search?q=rust&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["op"], "AND");
    assert_eq!(body["total_hits"], 2);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    // Two "rust" occurrences outrank one.
    assert_eq!(results[0]["id"], doc_id("https://rust.test/book"));
    assert_eq!(results[1]["id"], doc_id("https://rust.test/start"));
    assert!(results[0]["score"].as_f64().unwrap() > results[1]["score"].as_f64().unwrap());
    assert!(results[0]["snippet"].as_str().unwrap().contains("Rust"));
}

#[tokio::test]
async fn search_highlight_wraps_query_words() {
    let t = test_app(CORPUS, true);
    let (status, body) = get(&t.app, "/search?q=rust&highlight=true").await;
    assert_eq!(status, StatusCode::OK);
    let snippet = body["results"][0]["snippet"].as_str().unwrap();
    assert!(snippet.contains("<em>Rust</em>"));
}

#[tokio::test]
async fn search_before_any_build_is_503() {
    let t = test_app(CORPUS, false);
    let (status, body) = get(&t.app, "/search?q=rust").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "index not built");

    let (status, _) = get(&t.app, "/index/stats").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn rebuild_is_admin_gated_and_publishes_an_index() {
    let t = test_app(CORPUS, false);

    let (status, _) = post_json(&t.app, "/index/rebuild", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post_json(&t.app, "/index/rebuild", Some(ADMIN), json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let build_id = body["build_id"].as_str().unwrap().to_string();

    // The build runs in the background; poll until it lands.
    let mut state = String::new();
    for _ in 0..200 {
        let (_, status_body) = get(&t.app, "/index/status").await;
        state = status_body["state"].as_str().unwrap_or_default().to_string();
        if state != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, "succeeded");

    let (status, status_body) = get(&t.app, &format!("/index/status/{build_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["summary"]["documents_indexed"], 3);

    let (status, _) = get(&t.app, "/index/status/not-a-build").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&t.app, "/search?q=birds").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_hits"], 1);
}

#[tokio::test]
async fn suggest_and_stats_read_the_published_index() {
    let t = test_app(CORPUS, true);

    let (status, body) = get(&t.app, "/suggest?q=ru").await;
    assert_eq!(status, StatusCode::OK);
    let suggestions = body["suggestions"].as_array().unwrap();
    assert!(suggestions.iter().any(|s| s["term"] == "rust"));

    let (status, body) = get(&t.app, "/index/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_documents"], 3);
    assert!(body["total_terms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn document_crud_roundtrip() {
    let t = test_app(&[], false);

    // Writes need the admin token.
    let payload = json!({
        "url": "https://rust.test/new",
        "title": "Fresh",
        "content": "newly added page"
    });
    let (status, _) = post_json(&t.app, "/documents", None, payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = post_json(&t.app, "/documents", Some(ADMIN), payload).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(id, doc_id("https://rust.test/new"));

    let (status, body) = get(&t.app, &format!("/doc/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "newly added page");

    let (status, body) = get(&t.app, "/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["documents"][0]["id"], id);

    let (status, body) = delete(&t.app, &format!("/documents/{id}"), Some(ADMIN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], id);

    let (status, _) = delete(&t.app, &format!("/documents/{id}"), Some(ADMIN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&t.app, &format!("/doc/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_url_is_rejected() {
    let t = test_app(&[], false);
    let payload = json!({ "url": "  ", "content": "body" });
    let (status, body) = post_json(&t.app, "/documents", Some(ADMIN), payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn health_answers_ok() {
    let t = test_app(&[], false);
    let resp = t
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}
