//! Client identity of a request
//!
//! The client IP is resolved from proxy headers first (`X-Forwarded-For`,
//! then `X-Real-IP`) and falls back to the socket address when the server
//! was started with connect info.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Resolve the client IP address of a request
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    // X-Forwarded-For is a comma-separated list, the first entry is the client
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
        {
            return Some(ip);
        }
    }

    if let Some(ip) = headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// IP address and user agent recorded in audit logs
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        Self {
            ip_address: client_ip(headers, extensions).map(|ip| ip.to_string()),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("192.168.1.100, 10.0.0.1"));
        headers.insert("X-Real-IP", HeaderValue::from_static("192.168.1.200"));

        let ip = client_ip(&headers, &Extensions::new());
        assert_eq!(ip, Some(IpAddr::from([192, 168, 1, 100])));
    }

    #[test]
    fn test_real_ip_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("192.168.1.200"));
        assert_eq!(
            client_ip(&headers, &Extensions::new()),
            Some(IpAddr::from([192, 168, 1, 200]))
        );

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4000))));
        assert_eq!(
            client_ip(&HeaderMap::new(), &extensions),
            Some(IpAddr::from([10, 1, 2, 3]))
        );
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }

    #[test]
    fn test_client_info_reads_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let info = ClientInfo::from_parts(&headers, &Extensions::new());
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(info.ip_address, None);
    }
}
