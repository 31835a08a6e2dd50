//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - Configurable host/port binding
//! - Graceful shutdown handling
//! - Connection limits and request timeouts
//! - Per-IP rate limiting, security headers and CORS
//! - Request profiling and background maintenance tasks

use crate::api::handlers::AppState;
use crate::api::middleware::{
    profiling_middleware, rate_limit_middleware, security_headers_middleware, trace_id_middleware,
    RateLimiter, SecurityHeadersConfig,
};
use crate::api::routes::build_api_routes;
use crate::core::config::ServerConfig;
use crate::core::profiler::ApiProfiler;
use crate::core::Config;
use crate::db::manager::DatabaseManager;
use axum::{http::Method, middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
    state: AppState,
    limiter: RateLimiter,
}

impl ApiServer {
    /// Create a new API server with the given configuration, database manager and profiler
    pub fn new(config: Config, db: Arc<DatabaseManager>, profiler: Arc<ApiProfiler>) -> anyhow::Result<Self> {
        let server_config = config.server.clone();
        let limiter = RateLimiter::from_config(&config.security);
        let state = AppState::new(config, db, profiler);

        let router = Self::build_router(state.clone(), limiter.clone());

        Ok(Self {
            router,
            config: server_config,
            state,
            limiter,
        })
    }

    /// Build the Axum router with all routes and middleware
    pub fn build_router(state: AppState, limiter: RateLimiter) -> Router {
        let config = state.config.clone();
        let security_headers_config = SecurityHeadersConfig::from_config(&config.security);

        build_api_routes(state.clone()).layer(
            ServiceBuilder::new()
                // Trace ID first so every response, including rejections, carries it
                .layer(middleware::from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(Self::build_cors_layer(&config.security.allowed_origins))
                .layer(middleware::from_fn_with_state(
                    security_headers_config,
                    security_headers_middleware,
                ))
                .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
                .layer(GlobalConcurrencyLimitLayer::new(config.server.max_connections))
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout)))
                .layer(middleware::from_fn_with_state(
                    state.profiler.clone(),
                    profiling_middleware,
                )),
        )
    }

    /// Build CORS layer from allowed origins configuration
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(Any);

        // "*" allows any origin
        if allowed_origins.iter().any(|origin| origin == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<_> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    }

    /// Start the HTTP server and listen for requests
    ///
    /// Background tasks (cache purge, rate limiter cleanup, profiler analysis)
    /// run for the lifetime of the server. This method blocks until the
    /// server is shut down gracefully, then writes the final profiler report.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr: SocketAddr = addr.parse()?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            max_connections = self.config.max_connections,
            request_timeout = self.config.request_timeout,
            "Starting HTTP server"
        );

        let mut tasks = vec![self.limiter.spawn_cleanup(), self.state.login_guard.spawn_cleanup()];
        if self.state.config.cache.enabled {
            let period = Duration::from_secs(self.state.config.cache.cleanup_interval);
            tasks.push(self.state.cache.spawn_cleanup(period));
        }
        if self.state.profiler.is_enabled() {
            tasks.push(self.state.profiler.spawn_periodic_analysis());
        }

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;
        info!(addr = %socket_addr, "HTTP server listening");

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        for task in tasks {
            task.abort();
        }
        if let Err(e) = self.state.profiler.save_report().await {
            tracing::error!(error = %e, "Failed to save profiler report");
        }

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    /// Get a reference to the router
    pub fn router(&self) -> &Router {
        &self.router
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::TRACE_ID_HEADER;
    use crate::auth::ensure_bootstrap_admin;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn test_app() -> (Router, Config) {
        let config = Config::defaults().unwrap();
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let profiler = Arc::new(ApiProfiler::new(config.profiler.clone()));
        let server = ApiServer::new(config.clone(), db, profiler).unwrap();
        ensure_bootstrap_admin(&server.state.admin_repo, &config.security)
            .await
            .unwrap();
        (server.router, config)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn admin_token(app: &Router, username: &str, password: &str) -> String {
        let response = send(
            app,
            "POST",
            "/api/v1/admin/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn superadmin_token(app: &Router, config: &Config) -> String {
        admin_token(
            app,
            &config.security.bootstrap_admin_username,
            &config.security.bootstrap_admin_password,
        )
        .await
    }

    #[tokio::test]
    async fn test_liveness_carries_trace_and_security_headers() {
        let (app, _) = test_app().await;
        let response = send(&app, "GET", "/health", None, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(TRACE_ID_HEADER));
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_component_health() {
        let (app, _) = test_app().await;
        let response = send(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert!(body["components"]["database"].is_object());
        assert!(body["components"]["cache"].is_object());
    }

    #[tokio::test]
    async fn test_register_login_and_profile() {
        let (app, _) = test_app().await;
        let credentials = json!({
            "username": "reader",
            "email": "reader@example.com",
            "password": "correct-horse",
        });

        let response = send(&app, "POST", "/api/v1/auth/register", None, Some(credentials.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, "POST", "/api/v1/auth/register", None, Some(credentials)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "reader@example.com", "password": "correct-horse" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let response = send(&app, "GET", "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["username"], "reader");

        let response = send(&app, "GET", "/api/v1/users/me", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tokens_are_bound_to_their_site() {
        let (app, config) = test_app().await;
        let admin = superadmin_token(&app, &config).await;

        // an admin token is not a user token
        let response = send(&app, "GET", "/api/v1/users/me", Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "reader", "email": "r@example.com", "password": "password123" })),
        )
        .await;
        let response = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "reader", "password": "password123" })),
        )
        .await;
        let user = json_body(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = send(&app, "GET", "/api/v1/admin/books", Some(&user), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "AuthenticationError");
    }

    #[tokio::test]
    async fn test_admin_without_role_gets_missing_permissions() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/admins",
            Some(&root),
            Some(json!({
                "username": "editor",
                "email": "editor@example.com",
                "password": "editor-pass-1",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let editor = admin_token(&app, "editor", "editor-pass-1").await;
        let response = send(&app, "GET", "/api/v1/admin/books", Some(&editor), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json_body(response).await;
        assert_eq!(body["error"], "PermissionDenied");
        assert_eq!(body["details"]["missing_permissions"], json!(["book:read"]));
    }

    #[tokio::test]
    async fn test_admin_publishes_book_then_logs_out() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/books",
            Some(&root),
            Some(json!({ "title": "The Rust Book", "is_published": true })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let book_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = send(&app, "GET", "/api/v1/books", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["items"][0]["id"], book_id.as_str());

        let response = send(
            &app,
            "GET",
            "/api/v1/admin/logs/admin-activity",
            Some(&root),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let items = body["items"].as_array().unwrap();
        assert!(items.iter().any(|log| log["resource_id"] == book_id.as_str()));

        let response = send(&app, "POST", "/api/v1/admin/auth/logout", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/api/v1/admin/auth/me", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_with_trace_id() {
        let (app, _) = test_app().await;
        let response = send(&app, "GET", "/api/v1/nowhere", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(TRACE_ID_HEADER));
    }

    async fn register_reader(app: &Router, username: &str) -> (String, String) {
        let password = "reader-pass-1";
        let response = send(
            app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": password,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = send(
            app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await;
        let token = json_body(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();
        (id, token)
    }

    async fn create_book(app: &Router, root: &str, title: &str, published: bool) -> String {
        let response = send(
            app,
            "POST",
            "/api/v1/admin/books",
            Some(root),
            Some(json!({ "title": title, "is_published": published })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_superadmin_cannot_be_managed_by_plain_admins() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let root_id = json_body(send(&app, "GET", "/api/v1/admin/auth/me", Some(&root), None).await)
            .await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = send(&app, "GET", "/api/v1/admin/permissions?search=admin:", Some(&root), None).await;
        let permission_ids: Vec<Value> = json_body(response).await["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].clone())
            .collect();
        assert_eq!(permission_ids.len(), 4);

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/roles",
            Some(&root),
            Some(json!({ "name": "Account managers", "permission_ids": permission_ids })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let role_id = json_body(response).await["id"].as_str().unwrap().to_string();

        for username in ["manager", "helper"] {
            let response = send(
                &app,
                "POST",
                "/api/v1/admin/admins",
                Some(&root),
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "manager-pass-1",
                    "role_id": role_id,
                })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        let manager = admin_token(&app, "manager", "manager-pass-1").await;
        let manager_id = json_body(send(&app, "GET", "/api/v1/admin/auth/me", Some(&manager), None).await)
            .await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let root_uri = format!("/api/v1/admin/admins/{}", root_id);
        let response = send(&app, "PUT", &root_uri, Some(&manager), Some(json!({ "password": "taken-over-1" }))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&app, "DELETE", &root_uri, Some(&manager), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // root is untouched and can still sign in
        superadmin_token(&app, &config).await;

        let own_uri = format!("/api/v1/admin/admins/{}", manager_id);
        let response = send(&app, "DELETE", &own_uri, Some(&manager), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "GET", "/api/v1/admin/admins?search=helper", Some(&manager), None).await;
        let helper_id = json_body(response).await["items"][0]["id"].as_str().unwrap().to_string();
        let helper_uri = format!("/api/v1/admin/admins/{}", helper_id);
        let response = send(&app, "PUT", &helper_uri, Some(&manager), Some(json!({ "full_name": "Helper" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "DELETE", &helper_uri, Some(&manager), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_paid_chapters_require_premium_or_subscription() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let book_id = create_book(&app, &root, "Paid Book", true).await;
        for (number, is_free) in [(1, true), (2, false)] {
            let response = send(
                &app,
                "POST",
                &format!("/api/v1/admin/books/{}/chapters", book_id),
                Some(&root),
                Some(json!({
                    "number": number,
                    "title": format!("Chapter {}", number),
                    "content": "words on a page",
                    "is_free": is_free,
                    "is_published": true,
                })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        let free = format!("/api/v1/books/{}/chapters/1", book_id);
        let paid = format!("/api/v1/books/{}/chapters/2", book_id);

        let (_, reader) = register_reader(&app, "reader").await;
        assert_eq!(send(&app, "GET", &free, Some(&reader), None).await.status(), StatusCode::OK);
        let response = send(&app, "GET", &paid, Some(&reader), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "PermissionDenied");

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/subscription-plans",
            Some(&root),
            Some(json!({
                "name": "Monthly",
                "price": 4.5,
                "billing_cycle": "monthly",
                "duration_days": 30,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let plan_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = send(&app, "POST", "/api/v1/subscriptions", Some(&reader), Some(json!({ "plan_id": plan_id }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(send(&app, "GET", &paid, Some(&reader), None).await.status(), StatusCode::OK);

        // premium readers need no subscription
        let (patron_id, patron) = register_reader(&app, "patron").await;
        assert_eq!(send(&app, "GET", &paid, Some(&patron), None).await.status(), StatusCode::FORBIDDEN);
        let response = send(
            &app,
            "PUT",
            &format!("/api/v1/admin/users/{}", patron_id),
            Some(&root),
            Some(json!({ "is_premium": true })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(send(&app, "GET", &paid, Some(&patron), None).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_broadcast_notification_reaches_every_reader() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let (_, alice) = register_reader(&app, "alice").await;
        let (_, bob) = register_reader(&app, "bob").await;

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/notifications",
            Some(&root),
            Some(json!({ "title": "Maintenance", "message": "Back in an hour" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["updated"], 2);

        for token in [&alice, &bob] {
            let response = send(&app, "GET", "/api/v1/notifications/unread-count", Some(token), None).await;
            assert_eq!(json_body(response).await["count"], 1);
        }

        let response = send(
            &app,
            "POST",
            "/api/v1/admin/notifications",
            Some(&root),
            Some(json!({ "user_id": "missing", "title": "Hi", "message": "there" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_negotiate_prometheus_text() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;

        let request = Request::builder()
            .uri("/api/v1/admin/system/metrics")
            .header(header::AUTHORIZATION, format!("Bearer {}", root))
            .header(header::ACCEPT, "text/plain")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("# TYPE bookhub_uptime_seconds gauge"));

        let response = send(&app, "GET", "/api/v1/admin/system/metrics", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_a_validation_error() {
        let (app, _) = test_app().await;
        let response = send(&app, "GET", "/api/v1/authors?page=4294967295&size=100", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "ValidationError");

        let response = send(&app, "GET", "/api/v1/authors?skip=4294967295&limit=1", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_threads_of_hidden_books_are_not_found() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let draft = create_book(&app, &root, "Draft", false).await;

        for id in [draft.as_str(), "missing"] {
            for list in ["reviews", "discussions"] {
                let uri = format!("/api/v1/books/{}/{}", id, list);
                let response = send(&app, "GET", &uri, None, None).await;
                assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
            }
        }

        let published = create_book(&app, &root, "Out Now", true).await;
        let uri = format!("/api/v1/books/{}/discussions", published);
        let response = send(&app, "GET", &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_backup_snapshots_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::defaults().unwrap();
        let db = Arc::new(
            DatabaseManager::new(&dir.path().join("bookhub.db"), 2, std::time::Duration::from_secs(5)).unwrap(),
        );
        let profiler = Arc::new(ApiProfiler::new(config.profiler.clone()));
        let server = ApiServer::new(config.clone(), db, profiler).unwrap();
        ensure_bootstrap_admin(&server.state.admin_repo, &config.security)
            .await
            .unwrap();
        let app = server.router;
        let root = superadmin_token(&app, &config).await;

        let response = send(&app, "POST", "/api/v1/admin/system/backup", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let snapshots: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("bookhub_"))
            .collect();
        assert_eq!(snapshots.len(), 1);

        let (memory_app, memory_config) = test_app().await;
        let root = superadmin_token(&memory_app, &memory_config).await;
        let response = send(&memory_app, "POST", "/api/v1/admin/system/backup", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_repeated_bad_passwords_lock_the_account() {
        let (app, _) = test_app().await;
        register_reader(&app, "forgetful").await;

        for _ in 0..5 {
            let response = send(
                &app,
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": "forgetful", "password": "wrong-pass-1" })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        // the email login shares the account's counter
        let response = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "forgetful@example.com", "password": "reader-pass-1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["error"], "ResourceLimitExceeded");
    }

    #[tokio::test]
    async fn test_reading_progress_accumulates_per_book() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let book_id = create_book(&app, &root, "Long Read", true).await;
        let draft_id = create_book(&app, &root, "Unfinished", false).await;
        let (_, reader) = register_reader(&app, "bookworm").await;

        let uri = format!("/api/v1/reading-progress/books/{}", book_id);
        let response = send(&app, "GET", &uri, Some(&reader), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &app,
            "PUT",
            &uri,
            Some(&reader),
            Some(json!({ "progress_percentage": 40.0, "time_spent_seconds": 300, "last_position": "p.40" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        assert_eq!(first["is_completed"], false);

        let response = send(
            &app,
            "PUT",
            &uri,
            Some(&reader),
            Some(json!({ "progress_percentage": 100.0, "time_spent_seconds": 120 })),
        )
        .await;
        let second = json_body(response).await;
        assert_eq!(second["id"], first["id"]);
        assert_eq!(second["time_spent_seconds"], 420);
        assert_eq!(second["is_completed"], true);
        assert_eq!(second["last_position"], "p.40");

        let response = send(&app, "PUT", &uri, Some(&reader), Some(json!({ "progress_percentage": 140.0 }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let draft_uri = format!("/api/v1/reading-progress/books/{}", draft_id);
        let response = send(&app, "PUT", &draft_uri, Some(&reader), Some(json!({ "progress_percentage": 5.0 }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let stats = json_body(send(&app, "GET", "/api/v1/reading-progress/stats", Some(&reader), None).await).await;
        assert_eq!(stats["books_started"], 1);
        assert_eq!(stats["books_completed"], 1);
        assert_eq!(stats["total_time_spent_seconds"], 420);

        let response = send(&app, "GET", "/api/v1/reading-progress?is_completed=true", Some(&reader), None).await;
        assert_eq!(json_body(response).await["pagination"]["total"], 1);

        assert_eq!(send(&app, "DELETE", &uri, Some(&reader), None).await.status(), StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "DELETE", &uri, Some(&reader), None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bookmarks_belong_to_their_reader() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let book_id = create_book(&app, &root, "Marked Up", true).await;
        let (_, alice) = register_reader(&app, "alice").await;
        let (_, bob) = register_reader(&app, "bob").await;

        let response = send(
            &app,
            "POST",
            "/api/v1/bookmarks",
            Some(&alice),
            Some(json!({ "book_id": book_id, "position": "page 12", "note": "good line" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let bookmark_id = json_body(response).await["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/bookmarks/{}", bookmark_id);

        let response = send(&app, "GET", "/api/v1/bookmarks", Some(&bob), None).await;
        assert_eq!(json_body(response).await["pagination"]["total"], 0);
        assert_eq!(send(&app, "GET", &uri, Some(&bob), None).await.status(), StatusCode::NOT_FOUND);
        let response = send(&app, "PUT", &uri, Some(&bob), Some(json!({ "note": "mine now" }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&app, "DELETE", &uri, Some(&bob), None).await.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "PUT", &uri, Some(&alice), Some(json!({ "position": "page 14" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["position"], "page 14");
        assert_eq!(updated["note"], "good line");

        let list_uri = format!("/api/v1/bookmarks?book_id={}", book_id);
        let response = send(&app, "GET", &list_uri, Some(&alice), None).await;
        assert_eq!(json_body(response).await["pagination"]["total"], 1);

        let response = send(
            &app,
            "POST",
            "/api/v1/bookmarks",
            Some(&alice),
            Some(json!({ "book_id": "missing" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(send(&app, "DELETE", &uri, Some(&alice), None).await.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_admin_sessions_can_be_listed_and_revoked() {
        let (app, config) = test_app().await;
        let root = superadmin_token(&app, &config).await;
        let spare = superadmin_token(&app, &config).await;

        let response = send(&app, "GET", "/api/v1/admin/sessions?is_active=true", Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let sessions = json_body(response).await;
        assert_eq!(sessions["pagination"]["total"], 2);
        let session_id = sessions["items"][0]["id"].as_str().unwrap().to_string();

        let response = send(&app, "GET", "/api/v1/admin/permissions?search=session:", Some(&root), None).await;
        let permission_ids: Vec<Value> = json_body(response).await["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].clone())
            .collect();
        assert_eq!(permission_ids.len(), 2);
        let response = send(
            &app,
            "POST",
            "/api/v1/admin/roles",
            Some(&root),
            Some(json!({ "name": "Session auditors", "permission_ids": permission_ids })),
        )
        .await;
        let role_id = json_body(response).await["id"].as_str().unwrap().to_string();
        let response = send(
            &app,
            "POST",
            "/api/v1/admin/admins",
            Some(&root),
            Some(json!({
                "username": "auditor",
                "email": "auditor@example.com",
                "password": "auditor-pass-1",
                "role_id": role_id,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let root_id = json_body(send(&app, "GET", "/api/v1/admin/auth/me", Some(&root), None).await)
            .await["id"]
            .as_str()
            .unwrap()
            .to_string();
        let auditor = admin_token(&app, "auditor", "auditor-pass-1").await;

        // a plain admin only sees their own sessions
        let response = send(&app, "GET", "/api/v1/admin/sessions", Some(&auditor), None).await;
        assert_eq!(json_body(response).await["pagination"]["total"], 1);
        let response = send(
            &app,
            "GET",
            &format!("/api/v1/admin/sessions?admin_id={}", root_id),
            Some(&auditor),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let root_session = format!("/api/v1/admin/sessions/{}", session_id);
        assert_eq!(send(&app, "GET", &root_session, Some(&auditor), None).await.status(), StatusCode::FORBIDDEN);
        let response = send(&app, "POST", &format!("{}/revoke", root_session), Some(&auditor), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&app, "POST", "/api/v1/admin/sessions/cleanup", Some(&auditor), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // revoking the newest session logs that token out
        let response = send(&app, "POST", &format!("{}/revoke", root_session), Some(&root), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let (revoked, survivor) = if send(&app, "GET", "/api/v1/admin/auth/me", Some(&spare), None).await.status()
            == StatusCode::UNAUTHORIZED
        {
            (spare, root)
        } else {
            (root, spare)
        };
        let response = send(&app, "GET", "/api/v1/admin/auth/me", Some(&revoked), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = send(&app, "GET", "/api/v1/admin/auth/me", Some(&survivor), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "POST", "/api/v1/admin/sessions/cleanup?days=0", Some(&survivor), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(&app, "POST", "/api/v1/admin/sessions/cleanup?days=1", Some(&survivor), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["updated"], 0);

        let auditor_id = json_body(send(&app, "GET", "/api/v1/admin/auth/me", Some(&auditor), None).await)
            .await["id"]
            .as_str()
            .unwrap()
            .to_string();
        let response = send(
            &app,
            "POST",
            &format!("/api/v1/admin/admins/{}/sessions/revoke", auditor_id),
            Some(&survivor),
            None,
        )
        .await;
        assert_eq!(json_body(response).await["updated"], 1);
        let response = send(&app, "GET", "/api/v1/admin/auth/me", Some(&auditor), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
