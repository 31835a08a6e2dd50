use serde::Deserialize;

// Book API models

/// Request body for POST /api/v1/admin/books
#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub isbn: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub publisher_id: Option<String>,
    /// ISO language code (default: "en")
    #[serde(default = "default_language")]
    pub language: String,
    pub page_count: Option<i64>,
    pub publication_date: Option<String>,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub author_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Request body for PUT /api/v1/admin/books/:id
///
/// Absent fields keep their current value; relation lists, when present,
/// replace the existing links.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub publisher_id: Option<String>,
    pub language: Option<String>,
    pub page_count: Option<i64>,
    pub publication_date: Option<String>,
    pub cover_url: Option<String>,
    pub is_featured: Option<bool>,
    pub is_published: Option<bool>,
    pub author_ids: Option<Vec<String>>,
    pub category_ids: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub is_published: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub is_featured: bool,
}

/// Query parameters for GET /api/v1/books/featured
#[derive(Debug, Deserialize)]
pub struct FeaturedQuery {
    #[serde(default = "default_featured_limit")]
    pub limit: u32,
}

fn default_featured_limit() -> u32 {
    10
}

// Chapter API models

#[derive(Debug, Deserialize)]
pub struct CreateChapterRequest {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateChapterRequest {
    pub number: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_free: Option<bool>,
    pub is_published: Option<bool>,
}
