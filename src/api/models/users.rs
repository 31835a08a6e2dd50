use serde::Deserialize;

// Reader management API models (admin site)

/// Request body for PUT /api/v1/admin/users/:id
#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_premium: Option<bool>,
}
