//! Authentication API handlers for both sites

use crate::api::handlers::AppState;
use crate::api::middleware::ClientInfo;
use crate::auth::jwt::{generate_token, Claims, TokenKind};
use crate::auth::middleware::{AdminUser, AuthUser};
use crate::auth::models::{
    AdminProfile, AdminTokenResponse, LoginRequest, RegisterRequest, SuccessResponse,
    UpdateProfileRequest, UserTokenResponse,
};
use crate::auth::password::{hash_password_async, verify_password_async};
use crate::core::audit::{Activity, ActivityType, AuthAttempt};
use crate::core::error::{AppError, Result};
use crate::core::utils::{require_non_empty, validate_email, validate_password};
use crate::db::models::{AdminSession, SubjectKind, User};
use crate::db::repository::{new_id, now, Repository};
use axum::{extract::State, http::StatusCode, Json};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

impl AppState {
    /// bcrypt verification, timed as a dependency
    async fn check_password(&self, password: &str, hash: &str) -> Result<bool> {
        self.profiler
            .time_dependency(
                "bcrypt.verify",
                verify_password_async(password.to_string(), hash.to_string()),
            )
            .await
    }

    async fn auth_failure(
        &self,
        kind: SubjectKind,
        subject_id: Option<&str>,
        username: &str,
        reason: &str,
        client: &ClientInfo,
    ) {
        self.audit
            .record_auth(
                AuthAttempt {
                    subject_kind: kind,
                    subject_id,
                    username,
                    event: "login",
                    success: false,
                    failure_reason: Some(reason),
                },
                client,
            )
            .await;
    }
}

/// Handler for POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    tracing::info!(username = %req.username, "User registration attempt");

    require_non_empty("username", &req.username)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let password_hash = hash_password_async(req.password.clone()).await?;
    let ts = now();
    let user = User {
        id: new_id(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash,
        full_name: req.full_name,
        bio: None,
        avatar_url: None,
        is_active: true,
        is_premium: false,
        is_deleted: false,
        last_login: None,
        created_at: ts.clone(),
        updated_at: ts,
    };

    // UNIQUE constraints on username and email surface as 409
    state.user_repo.create(&user).await?;

    state
        .audit
        .record_auth(
            AuthAttempt {
                subject_kind: SubjectKind::User,
                subject_id: Some(&user.id),
                username: &user.username,
                event: "register",
                success: true,
                failure_reason: None,
            },
            &client,
        )
        .await;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserTokenResponse>> {
    tracing::info!(login = %req.username, "Login attempt");

    let Some(mut user) = state.user_repo.find_by_login(&req.username).await? else {
        state.login_guard.check(SubjectKind::User, &req.username).await?;
        state.login_guard.record_failure(SubjectKind::User, &req.username).await;
        state
            .auth_failure(SubjectKind::User, None, &req.username, "Unknown user", &client)
            .await;
        return Err(AppError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
    };

    // keyed by account id so username and email logins share one counter
    if let Err(locked) = state.login_guard.check(SubjectKind::User, &user.id).await {
        state
            .auth_failure(SubjectKind::User, Some(&user.id), &user.username, "Account locked", &client)
            .await;
        return Err(locked.into());
    }

    if !state.check_password(&req.password, &user.password_hash).await? {
        state.login_guard.record_failure(SubjectKind::User, &user.id).await;
        state
            .auth_failure(SubjectKind::User, Some(&user.id), &user.username, INVALID_CREDENTIALS, &client)
            .await;
        return Err(AppError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
    }
    state.login_guard.record_success(SubjectKind::User, &user.id).await;

    if !user.is_active {
        state
            .auth_failure(SubjectKind::User, Some(&user.id), &user.username, "Account disabled", &client)
            .await;
        return Err(AppError::PermissionDenied("User account is disabled".to_string()));
    }

    let logged_in_at = now();
    state.user_repo.touch_last_login(&user.id, &logged_in_at).await?;
    user.last_login = Some(logged_in_at);

    let claims = Claims::new(
        &user.id,
        TokenKind::User,
        None,
        state.config.security.access_token_expire_minutes,
    )?;
    let token = generate_token(&claims, &state.jwt_secret)?;

    state
        .audit
        .record_auth(
            AuthAttempt {
                subject_kind: SubjectKind::User,
                subject_id: Some(&user.id),
                username: &user.username,
                event: "login",
                success: true,
                failure_reason: None,
            },
            &client,
        )
        .await;

    Ok(Json(UserTokenResponse::bearer(token, claims.lifetime_secs(), user)))
}

/// Handler for GET /api/v1/users/me
pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    let user = state
        .user_repo
        .find_by_id(&user.id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("User not found".to_string()))?;
    Ok(Json(user))
}

/// Handler for PUT /api/v1/users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    tracing::info!(user_id = %user.id, "Updating own profile");

    let mut db_user = state
        .user_repo
        .find_by_id(&user.id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("User not found".to_string()))?;

    if let Some(new_password) = req.password {
        let current = req.current_password.ok_or_else(|| {
            AppError::ValidationError("current_password is required to change the password".to_string())
        })?;
        if !state.check_password(&current, &db_user.password_hash).await? {
            return Err(AppError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(&new_password)?;
        db_user.password_hash = hash_password_async(new_password).await?;
    }

    if let Some(email) = req.email {
        validate_email(&email)?;
        db_user.email = email.trim().to_lowercase();
    }
    if let Some(full_name) = req.full_name {
        db_user.full_name = Some(full_name);
    }
    if let Some(bio) = req.bio {
        db_user.bio = Some(bio);
    }
    if let Some(avatar_url) = req.avatar_url {
        db_user.avatar_url = Some(avatar_url);
    }
    db_user.updated_at = now();

    state.user_repo.update(&db_user).await?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(db_user))
}

/// Handler for POST /api/v1/admin/auth/login
pub async fn admin_login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AdminTokenResponse>> {
    tracing::info!(username = %req.username, "Admin login attempt");

    let Some(admin) = state.admin_repo.find_by_username(&req.username).await? else {
        state.login_guard.check(SubjectKind::Admin, &req.username).await?;
        state.login_guard.record_failure(SubjectKind::Admin, &req.username).await;
        state
            .auth_failure(SubjectKind::Admin, None, &req.username, "Unknown admin", &client)
            .await;
        return Err(AppError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
    };

    if let Err(locked) = state.login_guard.check(SubjectKind::Admin, &admin.id).await {
        state
            .auth_failure(SubjectKind::Admin, Some(&admin.id), &admin.username, "Account locked", &client)
            .await;
        return Err(locked.into());
    }

    if !state.check_password(&req.password, &admin.password_hash).await? {
        state.admin_repo.record_login_failure(&admin.id).await?;
        state.login_guard.record_failure(SubjectKind::Admin, &admin.id).await;
        state
            .auth_failure(SubjectKind::Admin, Some(&admin.id), &admin.username, INVALID_CREDENTIALS, &client)
            .await;
        return Err(AppError::AuthenticationError(INVALID_CREDENTIALS.to_string()));
    }
    state.login_guard.record_success(SubjectKind::Admin, &admin.id).await;

    if !admin.is_active {
        state
            .auth_failure(SubjectKind::Admin, Some(&admin.id), &admin.username, "Account disabled", &client)
            .await;
        return Err(AppError::PermissionDenied("Admin account is disabled".to_string()));
    }

    let session_id = new_id();
    let claims = Claims::new(
        &admin.id,
        TokenKind::Admin,
        Some(&session_id),
        state.config.security.admin_token_expire_minutes,
    )?;
    let logged_in_at = now();
    state
        .session_repo
        .create(&AdminSession {
            id: session_id.clone(),
            admin_id: admin.id.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            is_active: true,
            created_at: logged_in_at.clone(),
            expires_at: claims.expires_at(),
            ended_at: None,
        })
        .await?;
    state.admin_repo.record_login_success(&admin.id, &logged_in_at).await?;
    let token = generate_token(&claims, &state.jwt_secret)?;

    state
        .audit
        .record_auth(
            AuthAttempt {
                subject_kind: SubjectKind::Admin,
                subject_id: Some(&admin.id),
                username: &admin.username,
                event: "login",
                success: true,
                failure_reason: None,
            },
            &client,
        )
        .await;
    state
        .audit
        .record_activity(
            Activity::new(
                &admin.id,
                ActivityType::Login,
                "admin_session",
                Some(&session_id),
                format!("Admin {} logged in", admin.username),
            ),
            &client,
        )
        .await;

    let admin = state
        .admin_repo
        .find_by_id(&admin.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", admin.id)))?;
    Ok(Json(AdminTokenResponse::bearer(token, claims.lifetime_secs(), admin)))
}

/// Handler for POST /api/v1/admin/auth/logout
pub async fn admin_logout(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
) -> Result<Json<SuccessResponse>> {
    let ended = state.session_repo.end(&admin.session_id, &now()).await?;

    state
        .audit
        .record_auth(
            AuthAttempt {
                subject_kind: SubjectKind::Admin,
                subject_id: Some(&admin.id),
                username: &admin.username,
                event: "logout",
                success: true,
                failure_reason: None,
            },
            &client,
        )
        .await;
    state
        .audit
        .record_activity(
            Activity::new(
                &admin.id,
                ActivityType::Logout,
                "admin_session",
                Some(&admin.session_id),
                format!("Admin {} logged out", admin.username),
            ),
            &client,
        )
        .await;

    Ok(Json(SuccessResponse { success: ended }))
}

/// Handler for GET /api/v1/admin/auth/me
pub async fn admin_me(State(state): State<AppState>, admin: AdminUser) -> Result<Json<AdminProfile>> {
    let record = state
        .admin_repo
        .find_by_id(&admin.id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Admin not found".to_string()))?;
    let role = match &record.role_id {
        Some(role_id) => state.role_repo.find_by_id(role_id).await?,
        None => None,
    };
    let permissions = state.permissions.effective(&admin).await?;

    Ok(Json(AdminProfile {
        admin: record,
        role,
        permissions,
    }))
}
