use crate::cache::CacheStats;
use serde::Serialize;

/// Body of GET /api/v1/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub components: ComponentsHealth,
    pub timestamp: String,
}

/// Status of the service or one of its components
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentsHealth {
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Response for GET /api/v1/admin/system/metrics in JSON form
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub sampled_requests: usize,
    pub database: DatabaseMetrics,
    pub cache: CacheStats,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct DatabaseMetrics {
    pub pool_size: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
