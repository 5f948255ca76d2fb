//! Integration Tests for API Endpoints
//!
//! Tests the full request/response cycle for each endpoint. Fetch-through
//! tests run against a local upstream bound to 127.0.0.1.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    routing::get,
    Json, Router,
};
use pastpeek_cache::{create_router, AppState, CacheConfig, HttpFetcher, TieredCache};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    let fetcher = HttpFetcher::new(Duration::from_secs(5), vec!["127.0.0.1".to_string()])
        .unwrap();
    let state = AppState::new(TieredCache::in_memory(CacheConfig::default()), fetcher);
    create_router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Serves canned upstream responses and counts summary requests.
async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    async fn summary(
        State(hits): State<Arc<AtomicUsize>>,
        Path(title): Path<String>,
    ) -> Json<Value> {
        hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Json(json!({"title": title, "extract": format!("{} is a city", title)}))
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let upstream = Router::new()
        .route("/summary/:title", get(summary))
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/empty", get(|| async { Json(json!([])) }))
        .route("/text", get(|| async { "not json" }))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    (addr, hits)
}

fn fetch_body(addr: SocketAddr, base_key: &str, path: &str) -> Value {
    json!({
        "base_key": base_key,
        "params": {"path": path},
        "url": format!("http://{}{}", addr, path),
    })
}

// == Health & Stats ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_stats_tracks_hits_and_misses() {
    let app = create_test_app();

    send(
        &app,
        json_request("PUT", "/cache/geonames", json!({"params": {"q": "Rome"}, "data": [1]})),
    )
    .await;
    send(&app, get_request("/cache/geonames?q=Rome")).await;
    send(&app, get_request("/cache/geonames?q=Oslo")).await;

    let (status, json) = send(&app, get_request("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["memory_hits"], 1);
    // Oslo misses in memory, then again in the persistent tier
    assert_eq!(json["misses"], 2);
    assert_eq!(json["memory_entries"], 1);
    assert_eq!(json["persisted_entries"], 1);
    assert_eq!(json["config"]["max_entries"], 500);
    assert_eq!(json["config"]["default_ttl_ms"], 1_800_000);
}

// == Entry Endpoints ==

#[tokio::test]
async fn test_put_and_get_entry() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/cache/weather",
            json!({"params": {"lat": 10, "lng": 20, "year": 1900}, "data": {"temp": 20}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["persisted"], true);
    assert_eq!(json["key"], r#"weather:{"lat":10,"lng":20,"year":1900}"#);

    let (status, json) = send(&app, get_request("/cache/weather?year=1900&lng=20&lat=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"], "memory");
    assert_eq!(json["data"]["temp"], 20);
}

#[tokio::test]
async fn test_get_entry_not_found() {
    let app = create_test_app();

    let (status, json) = send(&app, get_request("/cache/city_data?city=Atlantis")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("city_data"));
}

#[tokio::test]
async fn test_entry_expires() {
    let app = create_test_app();

    send(
        &app,
        json_request("PUT", "/cache/weather", json!({"data": {"temp": 1}, "ttl_ms": 5})),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (status, _) = send(&app, get_request("/cache/weather")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_base_key() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        json_request("PUT", "/cache/bad%20key", json!({"data": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_invalidate_entry() {
    let app = create_test_app();
    send(
        &app,
        json_request("PUT", "/cache/city_data", json!({"params": {"city": "Rome"}, "data": 1})),
    )
    .await;

    let (status, json) = send(&app, delete_request("/cache/city_data?city=Rome")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], true);

    let (status, _) = send(&app, get_request("/cache/city_data?city=Rome")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(&app, delete_request("/cache/city_data?city=Rome")).await;
    assert_eq!(json["removed"], false);
}

#[tokio::test]
async fn test_clear_cache() {
    let app = create_test_app();
    send(&app, json_request("PUT", "/cache/a", json!({"data": 1}))).await;
    send(&app, json_request("PUT", "/cache/b", json!({"data": 2}))).await;

    let (status, json) = send(&app, delete_request("/cache")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 4);

    let (_, stats) = send(&app, get_request("/stats")).await;
    assert_eq!(stats["memory_entries"], 0);
    assert_eq!(stats["persisted_entries"], 0);
}

// == Fetch Endpoint ==

#[tokio::test]
async fn test_fetch_caches_upstream_response() {
    let (addr, hits) = spawn_upstream().await;
    let app = create_test_app();
    let body = fetch_body(addr, "wikipedia_summary", "/summary/Rome");

    let (status, first) = send(&app, json_request("POST", "/fetch", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["title"], "Rome");

    let (status, second) = send(&app, json_request("POST", "/fetch", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"], first["data"]);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_fetches_hit_upstream_once() {
    let (addr, hits) = spawn_upstream().await;
    let app = create_test_app();
    let body = fetch_body(addr, "wikipedia_summary", "/summary/Oslo");

    let (a, b, c) = tokio::join!(
        send(&app, json_request("POST", "/fetch", body.clone())),
        send(&app, json_request("POST", "/fetch", body.clone())),
        send(&app, json_request("POST", "/fetch", body)),
    );
    for (status, json) in [a, b, c] {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["title"], "Oslo");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let (_, stats) = send(&app, get_request("/stats")).await;
    assert_eq!(stats["fetches"], 1);
    assert_eq!(stats["joined_fetches"], 2);
}

#[tokio::test]
async fn test_fetch_upstream_failures_are_bad_gateway() {
    let (addr, _) = spawn_upstream().await;
    let app = create_test_app();

    for path in ["/broken", "/empty", "/text"] {
        let (status, json) =
            send(&app, json_request("POST", "/fetch", fetch_body(addr, "geonames", path))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY, "path {}", path);
        assert!(json.get("error").is_some());
    }

    let (_, stats) = send(&app, get_request("/stats")).await;
    assert_eq!(stats["fetch_failures"], 3);
    assert_eq!(stats["memory_entries"], 0);
}

#[tokio::test]
async fn test_fetch_disallowed_host() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/fetch",
            json!({"base_key": "geonames", "url": "https://example.com/search"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("example.com"));
}

// == Saved Searches & Usage ==

#[tokio::test]
async fn test_saved_search_cycle() {
    let app = create_test_app();

    let (status, saved) = send(
        &app,
        json_request(
            "POST",
            "/searches",
            json!({"city": "Kyoto", "yearRange": {"start": 1600, "end": 1700}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["name"], "Kyoto (1600-1700)");
    assert!(saved["savedAt"].is_string());

    send(
        &app,
        json_request(
            "POST",
            "/searches",
            json!({"city": "Lima", "yearRange": {"start": 1900, "end": 2000}, "name": "Lima"}),
        ),
    )
    .await;

    let (_, list) = send(&app, get_request("/searches")).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (status, removed) = send(&app, delete_request("/searches/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["city"], "Kyoto");

    let (_, list) = send(&app, get_request("/searches")).await;
    assert_eq!(list[0]["name"], "Lima");

    // Clearing the cache leaves saved searches alone
    send(&app, delete_request("/cache")).await;
    let (_, list) = send(&app, get_request("/searches")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_usage_log_is_capped() {
    let app = create_test_app();

    for i in 0..105 {
        let (status, json) = send(
            &app,
            json_request("POST", "/usage", json!({"event": "city_viewed", "data": {"n": i}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["retained"], (i + 1).min(100));
    }

    let (_, events) = send(&app, get_request("/usage")).await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 100);
    assert_eq!(events[0]["data"]["n"], 5);
    assert_eq!(events[99]["data"]["n"], 104);
}

#[tokio::test]
async fn test_usage_rejects_blank_event() {
    let app = create_test_app();

    let (status, json) = send(&app, json_request("POST", "/usage", json!({"event": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}
