//! API Routes
//!
//! Configures the Axum router with all cache service endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_search_handler, fetch_handler, get_entry_handler, health_handler,
    invalidate_handler, list_searches_handler, put_entry_handler, save_search_handler,
    stats_handler, track_usage_handler, usage_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /cache/:base_key` - Look up an entry (query string is the parameter bag)
/// - `PUT /cache/:base_key` - Store an entry
/// - `DELETE /cache/:base_key` - Invalidate an entry in both tiers
/// - `DELETE /cache` - Clear both tiers
/// - `POST /fetch` - Cached fetch-through of an allow-listed upstream URL
/// - `GET|POST /searches` - List or save searches
/// - `DELETE /searches/:index` - Delete a saved search by position
/// - `GET|POST /usage` - Read or append the usage log
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/cache/:base_key",
            get(get_entry_handler)
                .put(put_entry_handler)
                .delete(invalidate_handler),
        )
        .route("/cache", delete(clear_handler))
        .route("/fetch", post(fetch_handler))
        .route("/searches", get(list_searches_handler).post(save_search_handler))
        .route("/searches/:index", delete(delete_search_handler))
        .route("/usage", get(usage_handler).post(track_usage_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TieredCache;
    use crate::config::CacheConfig;
    use crate::upstream::HttpFetcher;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), Vec::new()).unwrap();
        let state = AppState::new(TieredCache::in_memory(CacheConfig::default()), fetcher);
        create_router(state)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/cache/weather")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"params":{"year":1900},"data":{"temp":18}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/cache/geonames?q=Rome")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_save_search_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/searches")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"city":"Rome","yearRange":{"start":1800,"end":1900}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_missing_search_is_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/searches/3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_disallowed_host_is_bad_request() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fetch")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"base_key":"geonames","url":"https://example.com/"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
