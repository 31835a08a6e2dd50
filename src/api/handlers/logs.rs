use super::AppState;
use crate::auth::AdminUser;
use crate::core::error::Result;
use crate::core::pagination::PageParams;
use crate::db::repository::{ActivityLogFilter, AuthLogFilter};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

/// Handler for GET /api/v1/admin/logs/admin-activity
pub async fn list_activity_logs(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<ActivityLogFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["logs:read"]).await?;
    Ok(Json(state.audit.activity_page(&filter, page.resolve()?).await?))
}

/// Handler for GET /api/v1/admin/logs/authentication
pub async fn list_auth_logs(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<AuthLogFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["logs:read"]).await?;
    Ok(Json(state.audit.auth_page(&filter, page.resolve()?).await?))
}
