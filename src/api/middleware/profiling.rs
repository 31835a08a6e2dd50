use crate::core::error::ErrorType;
use crate::core::profiler::{is_excluded_path, ApiProfiler};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

pub const UNMATCHED_ENDPOINT: &str = "UNMATCHED";

/// Times every request and reports it to the profiler
///
/// Endpoints are keyed by their route template (`/api/v1/books/:id`) so that
/// requests for different ids aggregate. Requests no route matched share the
/// single [`UNMATCHED_ENDPOINT`] key, so arbitrary paths cannot grow the
/// endpoint table.
pub async fn profiling_middleware(
    State(profiler): State<Arc<ApiProfiler>>,
    request: Request,
    next: Next,
) -> Response {
    if !profiler.is_enabled() || is_excluded_path(request.uri().path()) {
        return next.run(request).await;
    }

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let method = request.method().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let error_type = response.extensions().get::<ErrorType>().map(|e| e.0);
    profiler
        .track_endpoint(&path, &method, elapsed, response.status().as_u16(), error_type)
        .await;

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProfilerConfig;
    use crate::core::error::AppError;
    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use tower::util::ServiceExt;

    fn profiler() -> Arc<ApiProfiler> {
        Arc::new(ApiProfiler::new(ProfilerConfig {
            enabled: true,
            sample_rate: 1.0,
            slow_endpoint_threshold: 1.0,
            slow_dependency_threshold: 0.1,
            analysis_interval: 900,
            output_dir: None,
        }))
    }

    async fn missing() -> Result<&'static str, AppError> {
        Err(AppError::NotFound("book".to_string()))
    }

    fn app(profiler: Arc<ApiProfiler>) -> Router {
        Router::new()
            .route("/items/:id", get(|| async { "OK" }))
            .route("/missing/:id", get(missing))
            .route("/health", get(|| async { "OK" }))
            .fallback(|| async { axum::http::StatusCode::NOT_FOUND })
            .layer(middleware::from_fn_with_state(profiler, profiling_middleware))
    }

    async fn send(app: &Router, path: &str) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_aggregate_by_route_template() {
        let profiler = profiler();
        let app = app(profiler.clone());
        send(&app, "/items/1").await;
        send(&app, "/items/2").await;
        send(&app, "/health").await;

        assert_eq!(profiler.sampled_requests().await, 2);
        let report = profiler.report().await;
        assert_eq!(report.slowest_endpoints.len(), 1);
        assert_eq!(report.slowest_endpoints[0].name, "GET /items/:id");
        assert_eq!(report.slowest_endpoints[0].count, 2);
    }

    #[tokio::test]
    async fn test_unmatched_paths_share_one_key() {
        let profiler = profiler();
        let app = app(profiler.clone());
        for i in 0..20 {
            send(&app, &format!("/nowhere/{}", i)).await;
        }
        send(&app, "/static/app.js").await;

        let report = profiler.report().await;
        assert_eq!(report.slowest_endpoints.len(), 1);
        assert_eq!(report.slowest_endpoints[0].name, format!("GET {}", UNMATCHED_ENDPOINT));
        assert_eq!(report.slowest_endpoints[0].count, 20);
    }

    #[tokio::test]
    async fn test_typed_errors_are_recorded_by_type() {
        let profiler = profiler();
        let app = app(profiler.clone());
        send(&app, "/missing/7").await;

        let metrics = profiler.render_prometheus("test").await;
        assert!(metrics.contains("error_type=\"NotFound\""));
    }
}
