//! Authentication request/response models

use crate::db::models::{Admin, Role, User};
use serde::{Deserialize, Serialize};

/// Register request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Login request; `username` also accepts an email address
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "login")]
    pub username: String,
    pub password: String,
}

/// Issued access token together with the authenticated account
#[derive(Debug, Serialize)]
pub struct TokenResponse<T> {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: T,
}

impl<T> TokenResponse<T> {
    pub fn bearer(access_token: String, expires_in: i64, user: T) -> Self {
        Self {
            access_token,
            token_type: "bearer",
            expires_in,
            user,
        }
    }
}

/// Self-service profile update
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Required when changing the password
    pub current_password: Option<String>,
}

/// Admin profile with role and effective permissions
#[derive(Debug, Serialize)]
pub struct AdminProfile {
    #[serde(flatten)]
    pub admin: Admin,
    pub role: Option<Role>,
    pub permissions: Vec<String>,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub type UserTokenResponse = TokenResponse<User>;
pub type AdminTokenResponse = TokenResponse<Admin>;
