use crate::db::models::{Permission, Role};
use serde::{Deserialize, Serialize};

// Admin, role and permission API models

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role_id: Option<String>,
    #[serde(default)]
    pub is_superadmin: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAdminRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<String>,
    pub is_superadmin: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RolePermissionsRequest {
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Role together with the permissions it grants
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}
