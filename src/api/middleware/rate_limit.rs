use super::client::client_ip;
use crate::core::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-IP rate limiter using a sliding window
///
/// Every IP keeps the instants of its requests inside the window. A request
/// is rejected once the window already holds `max_requests` entries.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

/// Rejection carrying how long the client should wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitExceeded {
    pub limit: usize,
    pub window_seconds: u64,
    pub retry_after: u64,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    pub fn from_config(config: &crate::core::config::SecurityConfig) -> Self {
        Self::new(config.rate_limit_requests, config.rate_limit_window)
    }

    /// Record a request from `ip`, or reject it when the window is full
    pub async fn check(&self, ip: IpAddr) -> Result<(), LimitExceeded> {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let history = requests.entry(ip).or_default();

        while history
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            history.pop_front();
        }

        if history.len() >= self.max_requests {
            // the oldest entry leaves the window first
            let retry_after = history
                .front()
                .map(|&oldest| (self.window - now.duration_since(oldest)).as_secs().max(1))
                .unwrap_or(1);
            return Err(LimitExceeded {
                limit: self.max_requests,
                window_seconds: self.window.as_secs(),
                retry_after,
            });
        }

        history.push_back(now);
        Ok(())
    }

    /// Forget IPs with no request inside the window
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, history| {
            history.retain(|&t| now.duration_since(t) < self.window);
            !history.is_empty()
        });
        before - requests.len()
    }

    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = limiter.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "Rate limiter entries expired");
                }
            }
        })
    }
}

impl IntoResponse for LimitExceeded {
    fn into_response(self) -> Response {
        let mut response = AppError::ResourceLimitExceeded(format!(
            "Rate limit exceeded. Maximum {} requests per {} seconds allowed.",
            self.limit, self.window_seconds
        ))
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&self.retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Rate limiting middleware, installed with `from_fn_with_state`
///
/// Requests whose client IP cannot be resolved share the loopback bucket.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), request.extensions())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    match limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(exceeded) => {
            tracing::warn!(client_ip = %ip, retry_after = exceeded.retry_after, "Rate limit exceeded");
            exceeded.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_blocks_requests_over_the_limit() {
        let limiter = RateLimiter::new(3, 60);
        let ip = IpAddr::from([10, 0, 0, 1]);

        for _ in 0..3 {
            assert!(limiter.check(ip).await.is_ok());
        }
        let exceeded = limiter.check(ip).await.unwrap_err();
        assert_eq!(exceeded.limit, 3);
        assert_eq!(exceeded.window_seconds, 60);
        assert!(exceeded.retry_after >= 1 && exceeded.retry_after <= 60);
    }

    #[tokio::test]
    async fn test_ips_are_counted_separately() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check(IpAddr::from([10, 0, 0, 1])).await.is_ok());
        assert!(limiter.check(IpAddr::from([10, 0, 0, 1])).await.is_err());
        assert!(limiter.check(IpAddr::from([10, 0, 0, 2])).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, 1);
        let ip = IpAddr::from([10, 0, 0, 1]);
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_err());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check(ip).await.is_ok());
        assert_eq!(limiter.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn test_middleware_returns_429_with_retry_after() {
        let app = Router::new()
            .route("/test", get(|| async { "OK" }))
            .layer(middleware::from_fn_with_state(RateLimiter::new(2, 60), rate_limit_middleware));

        let request = || {
            Request::builder()
                .uri("/test")
                .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
                .body(Body::empty())
                .unwrap()
        };
        for _ in 0..2 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "ResourceLimitExceeded");
    }
}
