use crate::core::error::TRACE_ID;
use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// HTTP header name for trace ID
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Middleware that assigns a trace ID to each request and propagates it
/// through the request lifecycle.
///
/// A well-formed UUID in an incoming `X-Trace-Id` header is reused, otherwise
/// a fresh UUID v4 is generated. The ID is:
/// - Added to the request extensions for access by handlers
/// - Scoped into the task so error bodies carry it
/// - Included in all log entries via tracing spans
/// - Added to the response headers
pub async fn trace_id_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
        .to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
    );
    tracing::debug!(parent: &span, "Request started");

    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let response = TRACE_ID
        .scope(
            trace_id.clone(),
            async move {
                let response = next.run(request).await;
                tracing::debug!(status = %response.status(), "Request completed");
                response
            }
            .instrument(span),
        )
        .await;

    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        parts.headers.insert(TRACE_ID_HEADER, value);
    }
    Response::from_parts(parts, body)
}

/// Extension type for storing trace ID in request extensions
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    async fn echo_trace_id(request: Request<Body>) -> impl IntoResponse {
        let trace_id = request
            .extensions()
            .get::<TraceId>()
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| "no-trace-id".to_string());
        (StatusCode::OK, trace_id)
    }

    async fn failing() -> Result<&'static str, AppError> {
        Err(AppError::NotFound("missing".to_string()))
    }

    fn app() -> Router {
        Router::new()
            .route("/test", get(echo_trace_id))
            .route("/fail", get(failing))
            .layer(middleware::from_fn(trace_id_middleware))
    }

    fn header_of(response: &Response) -> String {
        response
            .headers()
            .get(TRACE_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_trace_id_generated_and_visible_to_handler() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        let header_trace_id = header_of(&response);
        assert!(Uuid::parse_str(&header_trace_id).is_ok());

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(body_bytes.to_vec()).unwrap(), header_trace_id);
    }

    #[tokio::test]
    async fn test_incoming_trace_id_is_reused() {
        let incoming = Uuid::new_v4().to_string();
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, &incoming)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(header_of(&response), incoming);

        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_ne!(header_of(&response), "not-a-uuid");
    }

    #[tokio::test]
    async fn test_error_body_carries_request_trace_id() {
        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let header_trace_id = header_of(&response);
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["trace_id"], header_trace_id);
        assert_eq!(body["error"], "NotFound");
    }
}
