//! Authentication middleware
//!
//! `authenticate_user` guards the user site and `authenticate_admin` the
//! admin site. Each accepts only tokens of its own kind. Admin tokens must
//! also reference an open, unexpired admin session.

use crate::api::handlers::AppState;
use crate::auth::jwt::{validate_token, Claims, TokenKind};
use crate::core::error::{AppError, Result};
use crate::db::repository::{now, Repository};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Authenticated user stored in request extensions
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub is_premium: bool,
}

/// Authenticated admin stored in request extensions
#[derive(Clone, Debug)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub role_id: Option<String>,
    pub is_superadmin: bool,
    pub session_id: String,
}

/// Bearer token from the Authorization header, or the `token` query parameter
fn extract_token(request: &Request) -> Option<String> {
    let token_from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").map(|t| t.trim().to_string()));

    token_from_header.or_else(|| {
        request.uri().query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "token")
                .map(|(_, v)| v.to_string())
        })
    })
}

fn claims_of_kind(request: &Request, secret: &str, kind: TokenKind) -> Result<Claims> {
    let token = extract_token(request)
        .ok_or_else(|| AppError::AuthenticationError("Missing authentication token".to_string()))?;
    let claims = validate_token(&token, secret)?;
    if claims.kind != kind {
        return Err(AppError::AuthenticationError(
            "Token is not valid for this site".to_string(),
        ));
    }
    Ok(claims)
}

async fn resolve_user(state: &AppState, claims: Claims) -> Result<AuthUser> {
    let user = state
        .user_repo
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("User not found".to_string()))?;
    if !user.is_active {
        return Err(AppError::PermissionDenied("User account is disabled".to_string()));
    }

    Ok(AuthUser {
        id: user.id,
        username: user.username,
        is_premium: user.is_premium,
    })
}

async fn resolve_admin(state: &AppState, claims: Claims) -> Result<AdminUser> {
    let session_id = claims
        .sid
        .ok_or_else(|| AppError::AuthenticationError("Token has no session".to_string()))?;

    state
        .session_repo
        .find_active(&session_id, &claims.sub, &now())
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Session has ended or expired".to_string()))?;

    let admin = state
        .admin_repo
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Admin not found".to_string()))?;
    if !admin.is_active {
        return Err(AppError::AuthenticationError("Admin account is disabled".to_string()));
    }

    Ok(AdminUser {
        id: admin.id,
        username: admin.username,
        role_id: admin.role_id,
        is_superadmin: admin.is_superadmin,
        session_id,
    })
}

/// Authentication middleware for the user site
pub async fn authenticate_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // the request body is not Sync, so no borrow of the request may live across an await
    let claims = match claims_of_kind(&request, &state.jwt_secret, TokenKind::User) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    match resolve_user(&state, claims).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Authentication middleware for the admin site
pub async fn authenticate_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match claims_of_kind(&request, &state.jwt_secret, TokenKind::Admin) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    match resolve_admin(&state, claims).await {
        Ok(admin) => {
            request.extensions_mut().insert(admin);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::AuthenticationError("User not authenticated".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AdminUser>()
            .cloned()
            .ok_or_else(|| AppError::AuthenticationError("Admin not authenticated".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_token;
    use axum::body::Body;

    const SECRET: &str = "middleware-test-secret";

    fn request_with(uri: &str, bearer: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_from_header_or_query() {
        assert_eq!(
            extract_token(&request_with("/x", Some("abc"))).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_token(&request_with("/x?token=q%2Bw", None)).as_deref(),
            Some("q+w")
        );
        assert!(extract_token(&request_with("/x", None)).is_none());
    }

    #[test]
    fn test_token_kind_must_match_site() {
        let claims = Claims::new("u1", TokenKind::User, None, 10).unwrap();
        let token = generate_token(&claims, SECRET).unwrap();
        let request = request_with("/api/v1/admin/auth/me", Some(&token));

        let err = claims_of_kind(&request, SECRET, TokenKind::Admin).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert!(claims_of_kind(&request, SECRET, TokenKind::User).is_ok());
    }
}
