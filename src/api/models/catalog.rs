use serde::Deserialize;

// Category, tag, author and publisher API models. A missing slug is derived
// from the name.

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuthorRequest {
    pub name: String,
    pub slug: Option<String>,
    pub biography: Option<String>,
    pub nationality: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAuthorRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub biography: Option<String>,
    pub nationality: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePublisherRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePublisherRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

fn default_true() -> bool {
    true
}
