use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{MessageResponse, SessionCleanupQuery, UpdatedResponse};
use crate::auth::AdminUser;
use crate::core::audit::ActivityType;
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, PageParams};
use crate::db::models::AdminSession;
use crate::db::repository::{now, Repository, SessionFilter};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, SecondsFormat, Utc};

// Admin login sessions (admin site)

fn require_superadmin(admin: &AdminUser, action: &str) -> Result<()> {
    if !admin.is_superadmin {
        return Err(AppError::PermissionDenied(format!("Only a superadmin can {}", action)));
    }
    Ok(())
}

/// Plain admins only see their own sessions
async fn find_visible_session(state: &AppState, admin: &AdminUser, id: &str) -> Result<AdminSession> {
    let session = state
        .session_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))?;
    if session.admin_id != admin.id && !admin.is_superadmin {
        return Err(AppError::PermissionDenied(
            "You can only manage your own sessions".to_string(),
        ));
    }
    Ok(session)
}

/// Handler for GET /api/v1/admin/sessions
///
/// Defaults to the caller's own sessions. Only a superadmin may list
/// another admin's sessions, or every session with `?admin_id=` omitted.
pub async fn list_sessions(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(mut filter): Query<SessionFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["session:read"]).await?;
    if !admin.is_superadmin {
        if filter.admin_id.as_ref().is_some_and(|other| *other != admin.id) {
            return Err(AppError::PermissionDenied(
                "You can only list your own sessions".to_string(),
            ));
        }
        filter.admin_id = Some(admin.id.clone());
    }

    let window = page.resolve()?;
    let (items, total) = state.session_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/admin/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["session:read"]).await?;
    Ok(Json(find_visible_session(&state, &admin, &id).await?))
}

/// Handler for POST /api/v1/admin/sessions/:id/revoke
///
/// Tokens bound to the session stop authenticating immediately.
pub async fn revoke_session(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["session:revoke"]).await?;
    let session = find_visible_session(&state, &admin, &id).await?;

    if !state.session_repo.end(&session.id, &now()).await? {
        return Ok(Json(MessageResponse::new("Session already ended")));
    }

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "admin_session",
            Some(&session.id),
            format!("Revoked session of admin {}", session.admin_id),
        )
        .await;
    Ok(Json(MessageResponse::new("Session revoked")))
}

/// Handler for POST /api/v1/admin/admins/:id/sessions/revoke
pub async fn revoke_admin_sessions(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    require_superadmin(&admin, "revoke another admin's sessions")?;
    let target = state
        .admin_repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", id)))?;

    let updated = state.session_repo.end_all_for_admin(&target.id, &now()).await?;
    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "admin_session",
            None,
            format!("Revoked {} session(s) of admin '{}'", updated, target.username),
        )
        .await;
    Ok(Json(UpdatedResponse { updated }))
}

/// Handler for POST /api/v1/admin/sessions/cleanup - Drop sessions finished more than `days` ago
pub async fn cleanup_sessions(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Query(query): Query<SessionCleanupQuery>,
) -> Result<impl IntoResponse> {
    require_superadmin(&admin, "clean up sessions")?;
    if query.days < 1 {
        return Err(AppError::ValidationError("days must be at least 1".to_string()));
    }

    let before = Duration::try_days(i64::from(query.days))
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| AppError::ValidationError("days is out of range".to_string()))?
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let updated = state.session_repo.delete_finished_before(&before).await?;
    tracing::info!(removed = updated, days = query.days, "Old admin sessions removed");

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Delete,
            "admin_session",
            None,
            format!("Removed {} session(s) finished before {}", updated, before),
        )
        .await;
    Ok(Json(UpdatedResponse { updated }))
}
