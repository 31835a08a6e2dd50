use crate::core::config::SecurityConfig;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

/// The API serves JSON only, so nothing may be loaded or framed
const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; frame-ancestors 'none'";

/// Security headers settings
#[derive(Clone, Debug)]
pub struct SecurityHeadersConfig {
    pub enable_hsts: bool,
    /// HSTS max-age in seconds
    pub hsts_max_age: u64,
}

impl SecurityHeadersConfig {
    pub fn new(enable_hsts: bool, hsts_max_age: u64) -> Self {
        Self {
            enable_hsts,
            hsts_max_age,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.enable_hsts, config.hsts_max_age)
    }

    fn hsts_value(&self) -> Option<HeaderValue> {
        if !self.enable_hsts {
            return None;
        }
        HeaderValue::from_str(&format!("max-age={}; includeSubDomains", self.hsts_max_age)).ok()
    }
}

/// Security headers middleware, installed with `from_fn_with_state`
///
/// Adds to every response:
/// - X-Content-Type-Options: nosniff
/// - X-Frame-Options: DENY
/// - Referrer-Policy: no-referrer
/// - Content-Security-Policy
/// - Strict-Transport-Security, when HSTS is enabled
///
/// Admin responses are additionally marked `Cache-Control: no-store`.
pub async fn security_headers_middleware(
    State(config): State<SecurityHeadersConfig>,
    request: Request,
    next: Next,
) -> Response {
    let is_admin = request.uri().path().starts_with("/api/v1/admin");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    if let Some(hsts) = config.hsts_value() {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, hsts);
    }
    if is_admin {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}
