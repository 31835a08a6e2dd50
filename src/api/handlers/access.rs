use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    CreateAdminRequest, CreatePermissionRequest, CreateRoleRequest, RolePermissionsRequest,
    RoleResponse, SearchQuery, UpdateAdminRequest, UpdateRoleRequest,
};
use crate::auth::password::hash_password_async;
use crate::auth::AdminUser;
use crate::core::audit::{Activity, ActivityType};
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, PageParams};
use crate::core::utils::{require_non_empty, validate_email, validate_password, validate_permission_name};
use crate::db::models::{Admin, Permission, Role};
use crate::db::repository::{new_id, now, AdminFilter, Repository};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

// Admin accounts, roles and permissions (admin site)

async fn find_admin(state: &AppState, id: &str) -> Result<Admin> {
    state
        .admin_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", id)))
}

async fn find_role(state: &AppState, id: &str) -> Result<Role> {
    state
        .role_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))
}

async fn ensure_role_exists(state: &AppState, role_id: Option<&str>) -> Result<()> {
    if let Some(role_id) = role_id {
        find_role(state, role_id).await?;
    }
    Ok(())
}

async fn ensure_permissions_exist(state: &AppState, ids: &[String]) -> Result<()> {
    for id in ids {
        if state.permission_repo.find_by_id(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Permission {} not found", id)));
        }
    }
    Ok(())
}

/// Handler for GET /api/v1/admin/admins
pub async fn list_admins(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<AdminFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["admin:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.admin_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for POST /api/v1/admin/admins
pub async fn create_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["admin:create"]).await?;
    require_non_empty("username", &req.username)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    ensure_role_exists(&state, req.role_id.as_deref()).await?;
    if req.is_superadmin && !admin.is_superadmin {
        return Err(AppError::PermissionDenied(
            "Only a superadmin can create another superadmin".to_string(),
        ));
    }

    let ts = now();
    let created = Admin {
        id: new_id(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash: hash_password_async(req.password).await?,
        full_name: req.full_name,
        role_id: req.role_id,
        is_superadmin: req.is_superadmin,
        is_active: true,
        last_login: None,
        login_count: 0,
        failed_login_attempts: 0,
        created_at: ts.clone(),
        updated_at: ts,
    };
    state.admin_repo.create(&created).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "admin",
            Some(&created.id),
            format!("Created admin '{}'", created.username),
        )
        .await;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for GET /api/v1/admin/admins/:id
pub async fn get_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["admin:read"]).await?;
    Ok(Json(find_admin(&state, &id).await?))
}

/// Superadmin accounts are only managed by superadmins
fn guard_superadmin(admin: &AdminUser, target: &Admin, action: &str) -> Result<()> {
    if target.is_superadmin && !admin.is_superadmin {
        return Err(AppError::PermissionDenied(format!(
            "Only a superadmin can {} a superadmin",
            action
        )));
    }
    Ok(())
}

/// Handler for PUT /api/v1/admin/admins/:id
pub async fn update_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateAdminRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["admin:update"]).await?;
    let mut target = find_admin(&state, &id).await?;
    guard_superadmin(&admin, &target, "update")?;

    if let Some(email) = req.email {
        validate_email(&email)?;
        target.email = email.trim().to_lowercase();
    }
    if let Some(full_name) = req.full_name {
        target.full_name = Some(full_name);
    }
    if let Some(password) = req.password {
        validate_password(&password)?;
        target.password_hash = hash_password_async(password).await?;
    }
    let role_changed = req.role_id.as_ref().is_some_and(|r| Some(r) != target.role_id.as_ref());
    if let Some(role_id) = req.role_id {
        ensure_role_exists(&state, Some(&role_id)).await?;
        target.role_id = Some(role_id);
    }
    if let Some(is_superadmin) = req.is_superadmin {
        if is_superadmin != target.is_superadmin && !admin.is_superadmin {
            return Err(AppError::PermissionDenied(
                "Only a superadmin can change superadmin status".to_string(),
            ));
        }
        target.is_superadmin = is_superadmin;
    }
    let deactivated = req.is_active == Some(false) && target.is_active;
    if let Some(is_active) = req.is_active {
        if !is_active && target.id == admin.id {
            return Err(AppError::InvalidRequest(
                "You cannot deactivate your own account".to_string(),
            ));
        }
        target.is_active = is_active;
    }
    target.updated_at = now();

    state.admin_repo.update(&target).await?;
    if role_changed {
        state.permissions.invalidate(&target.id).await;
    }
    if deactivated {
        let ended = state.session_repo.end_all_for_admin(&target.id, &target.updated_at).await?;
        tracing::info!(admin_id = %target.id, sessions = ended, "Ended sessions of deactivated admin");
    }

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "admin",
            Some(&id),
            format!("Updated admin '{}'", target.username),
        )
        .await;
    Ok(Json(target))
}

/// Handler for DELETE /api/v1/admin/admins/:id
pub async fn delete_admin(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["admin:delete"]).await?;
    if id == admin.id {
        return Err(AppError::InvalidRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    let target = find_admin(&state, &id).await?;
    guard_superadmin(&admin, &target, "delete")?;

    state.admin_repo.delete(&id).await?;
    state.permissions.invalidate(&id).await;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Delete,
            "admin",
            Some(&id),
            format!("Deleted admin '{}'", target.username),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.role_repo.list(query.search, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for POST /api/v1/admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:create"]).await?;
    require_non_empty("name", &req.name)?;
    ensure_permissions_exist(&state, &req.permission_ids).await?;

    let ts = now();
    let role = Role {
        id: new_id(),
        name: req.name.trim().to_string(),
        description: req.description,
        created_at: ts.clone(),
        updated_at: ts,
    };
    state.role_repo.create(&role).await?;
    let permissions = state
        .role_repo
        .replace_permissions(&role.id, req.permission_ids)
        .await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "role",
            Some(&role.id),
            format!("Created role '{}'", role.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(RoleResponse { role, permissions })))
}

/// Handler for GET /api/v1/admin/roles/:id
pub async fn get_role(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:read"]).await?;
    let role = find_role(&state, &id).await?;
    let permissions = state.role_repo.permissions(&id).await?;
    Ok(Json(RoleResponse { role, permissions }))
}

/// Handler for PUT /api/v1/admin/roles/:id
pub async fn update_role(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:update"]).await?;
    let mut role = find_role(&state, &id).await?;

    if let Some(name) = req.name {
        require_non_empty("name", &name)?;
        role.name = name.trim().to_string();
    }
    if let Some(description) = req.description {
        role.description = Some(description);
    }
    role.updated_at = now();
    state.role_repo.update(&role).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "role",
            Some(&id),
            format!("Updated role '{}'", role.name),
        )
        .await;
    let permissions = state.role_repo.permissions(&id).await?;
    Ok(Json(RoleResponse { role, permissions }))
}

/// Handler for DELETE /api/v1/admin/roles/:id
pub async fn delete_role(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:delete"]).await?;
    let role = find_role(&state, &id).await?;

    state.role_repo.delete(&id).await?;
    state.permissions.invalidate_all().await;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Delete,
            "role",
            Some(&id),
            format!("Deleted role '{}'", role.name),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /api/v1/admin/roles/:id/permissions - Replace the role's grants
pub async fn set_role_permissions(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<RolePermissionsRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["role:update"]).await?;
    let role = find_role(&state, &id).await?;

    let permissions = state
        .role_repo
        .replace_permissions(&id, req.permission_ids)
        .await?;
    let dropped = state.permissions.invalidate_all().await;
    tracing::debug!(role_id = %id, dropped, "Admin permission cache invalidated");

    let names: Vec<&str> = permissions.iter().map(|p| p.name.as_str()).collect();
    state
        .audit
        .record_activity(
            Activity::new(
                &admin.id,
                ActivityType::Update,
                "role",
                Some(&id),
                format!("Replaced permissions of role '{}'", role.name),
            )
            .with_metadata(json!({ "permissions": names })),
            &client,
        )
        .await;
    Ok(Json(RoleResponse { role, permissions }))
}

/// Handler for GET /api/v1/admin/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["permission:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.permission_repo.list(query.search, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for POST /api/v1/admin/permissions
pub async fn create_permission(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["permission:create"]).await?;
    let name = req.name.trim().to_string();
    validate_permission_name(&name)?;

    let permission = Permission {
        id: new_id(),
        name,
        description: req.description,
        created_at: now(),
    };
    state.permission_repo.create(&permission).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "permission",
            Some(&permission.id),
            format!("Created permission '{}'", permission.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// Handler for DELETE /api/v1/admin/permissions/:id
pub async fn delete_permission(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["permission:delete"]).await?;
    state.permission_repo.delete(&id).await?;
    state.permissions.invalidate_all().await;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "permission", Some(&id), "Deleted permission")
        .await;
    Ok(StatusCode::NO_CONTENT)
}
