use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::AdminUpdateUserRequest;
use crate::auth::AdminUser;
use crate::core::audit::ActivityType;
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, PageParams};
use crate::core::utils::validate_email;
use crate::db::models::User;
use crate::db::repository::{now, Repository, UserFilter};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

// Reader account management (admin site)

async fn find_user(state: &AppState, id: &str) -> Result<User> {
    state
        .user_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

/// Handler for GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<UserFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["user:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.user_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/admin/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["user:read"]).await?;
    Ok(Json(find_user(&state, &id).await?))
}

/// Handler for PUT /api/v1/admin/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["user:update"]).await?;
    let mut user = find_user(&state, &id).await?;

    if let Some(email) = req.email {
        validate_email(&email)?;
        user.email = email.trim().to_lowercase();
    }
    if let Some(full_name) = req.full_name {
        user.full_name = Some(full_name);
    }
    if let Some(bio) = req.bio {
        user.bio = Some(bio);
    }
    if let Some(avatar_url) = req.avatar_url {
        user.avatar_url = Some(avatar_url);
    }
    if let Some(is_active) = req.is_active {
        user.is_active = is_active;
    }
    if let Some(is_premium) = req.is_premium {
        user.is_premium = is_premium;
    }
    user.updated_at = now();

    state.user_repo.update(&user).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "user",
            Some(&id),
            format!("Updated user '{}'", user.username),
        )
        .await;
    Ok(Json(user))
}

/// Handler for DELETE /api/v1/admin/users/:id - Soft delete
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["user:delete"]).await?;
    let user = find_user(&state, &id).await?;
    state.user_repo.delete(&id).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Delete,
            "user",
            Some(&id),
            format!("Deleted user '{}'", user.username),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}
