use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    ComponentHealth, ComponentsHealth, DatabaseMetrics, HealthResponse,
    HealthStatus, MessageResponse, MetricsResponse, UpdatedResponse,
};
use crate::auth::AdminUser;
use crate::cache::CacheStats;
use crate::core::audit::ActivityType;
use crate::core::error::{AppError, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::fmt::Write as _;

const METRICS_PREFIX: &str = "bookhub";

/// Handler for GET /health - Liveness check
pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for GET /api/v1/health - Component health
///
/// Responds 503 when any component is unhealthy.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database_health(&state).await;
    let cache = check_cache_health(&state).await;

    let status = if database.status == HealthStatus::Healthy && cache.status == HealthStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let code = if status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        components: ComponentsHealth { database, cache },
        timestamp: Utc::now().to_rfc3339(),
    };
    (code, Json(response))
}

async fn check_database_health(state: &AppState) -> ComponentHealth {
    match state.db.ping().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            message: Some("Database is operational".to_string()),
            details: Some(serde_json::json!({
                "pool_size": state.db.pool_size(),
                "idle_connections": state.db.idle_connections(),
            })),
        },
        Err(e) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            message: Some(format!("Database error: {}", e)),
            details: None,
        },
    }
}

async fn check_cache_health(state: &AppState) -> ComponentHealth {
    let stats = state.cache.stats().await;
    ComponentHealth {
        status: HealthStatus::Healthy,
        message: Some(if stats.enabled {
            "Cache is operational".to_string()
        } else {
            "Cache is disabled".to_string()
        }),
        details: Some(serde_json::json!({
            "entries": stats.entries,
            "hit_rate": stats.hit_rate,
        })),
    }
}

/// Handler for GET /api/v1/admin/system/profiler
pub async fn profiler_report(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:read"]).await?;
    Ok(Json(state.profiler.report().await))
}

/// Handler for DELETE /api/v1/admin/system/profiler
pub async fn clear_profiler(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:manage"]).await?;
    state.profiler.clear().await;

    state
        .log_activity(&admin, &client, ActivityType::Clear, "profiler", None, "Cleared profiler data")
        .await;
    Ok(Json(MessageResponse::new("Profiler data cleared")))
}

/// Handler for GET /api/v1/admin/system/metrics
///
/// JSON by default; Prometheus text when the client accepts `text/plain`.
pub async fn get_metrics(
    State(state): State<AppState>,
    admin: AdminUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:read"]).await?;

    let accept_header = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    let is_prometheus =
        accept_header.contains("text/plain") || accept_header.contains("application/openmetrics-text");

    let database = DatabaseMetrics {
        pool_size: state.db.pool_size(),
        active_connections: state.db.active_connections(),
        idle_connections: state.db.idle_connections(),
    };
    let cache = state.cache.stats().await;
    let uptime_seconds = state.started_at.elapsed().as_secs();

    if is_prometheus {
        let mut output = state.profiler.render_prometheus(METRICS_PREFIX).await;
        output.push('\n');
        output.push_str(&format_runtime_metrics(uptime_seconds, &database, &cache));
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response());
    }

    let response = MetricsResponse {
        uptime_seconds,
        sampled_requests: state.profiler.sampled_requests().await,
        database,
        cache,
        timestamp: Utc::now().to_rfc3339(),
    };
    Ok(Json(response).into_response())
}

/// Gauges and counters that live outside the profiler
fn format_runtime_metrics(uptime_seconds: u64, database: &DatabaseMetrics, cache: &CacheStats) -> String {
    let mut out = String::new();
    let mut gauge = |name: &str, help: &str, kind: &str, value: String| {
        let metric = format!("{}_{}", METRICS_PREFIX, name);
        let _ = writeln!(out, "# HELP {} {}", metric, help);
        let _ = writeln!(out, "# TYPE {} {}", metric, kind);
        let _ = writeln!(out, "{} {}", metric, value);
    };

    gauge("uptime_seconds", "Seconds since the server started", "gauge", uptime_seconds.to_string());
    gauge("db_pool_size", "Maximum database connections", "gauge", database.pool_size.to_string());
    gauge(
        "db_connections_active",
        "Database connections in use",
        "gauge",
        database.active_connections.to_string(),
    );
    gauge(
        "db_connections_idle",
        "Idle database connections",
        "gauge",
        database.idle_connections.to_string(),
    );
    gauge("cache_entries", "Entries held in the cache", "gauge", cache.entries.to_string());
    gauge("cache_hits_total", "Cache hits", "counter", cache.hits.to_string());
    gauge("cache_misses_total", "Cache misses", "counter", cache.misses.to_string());
    gauge("cache_evictions_total", "Cache evictions", "counter", cache.evictions.to_string());
    out
}

/// Handler for GET /api/v1/admin/system/cache
pub async fn cache_stats(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:read"]).await?;
    Ok(Json(state.cache.stats().await))
}

/// Handler for DELETE /api/v1/admin/system/cache
pub async fn clear_cache(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:manage"]).await?;
    state.cache.clear().await;

    state
        .log_activity(&admin, &client, ActivityType::Clear, "cache", None, "Cleared cache")
        .await;
    Ok(Json(MessageResponse::new("Cache cleared")))
}

/// Handler for POST /api/v1/admin/system/backup - Online snapshot of the database
pub async fn backup_database(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:manage"]).await?;
    let dir = state.db.backup_dir().ok_or_else(|| {
        AppError::InvalidRequest("An in-memory database cannot be backed up".to_string())
    })?;
    let path = dir.join(format!("bookhub_{}.db", Utc::now().format("%Y%m%d_%H%M%S")));
    state.db.backup_async(path.clone()).await?;
    tracing::info!(path = %path.display(), "Database backed up");

    let message = format!("Database backed up to {}", path.display());
    state
        .log_activity(&admin, &client, ActivityType::Backup, "database", None, message.clone())
        .await;
    Ok((StatusCode::CREATED, Json(MessageResponse::new(message))))
}

/// Handler for DELETE /api/v1/admin/system/cache/tags/:tag
pub async fn invalidate_cache_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["system:manage"]).await?;
    let updated = state.cache.invalidate_tag(&tag).await;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Clear,
            "cache",
            Some(&tag),
            format!("Invalidated cache tag '{}'", tag),
        )
        .await;
    Ok(Json(UpdatedResponse { updated }))
}
