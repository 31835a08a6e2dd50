use serde::Deserialize;

// Reading progress, bookmark and admin session API models

/// Body of PUT /api/v1/reading-progress/books/:id; absent fields keep their value
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProgressRequest {
    pub chapter_id: Option<String>,
    /// 0 to 100; reaching 100 marks the book completed
    pub progress_percentage: Option<f64>,
    pub last_position: Option<String>,
    /// Seconds read since the last update, added to the running total
    pub time_spent_seconds: Option<i64>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProgressQuery {
    pub is_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookmarkRequest {
    pub book_id: String,
    pub chapter_id: Option<String>,
    pub position: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookmarkRequest {
    pub position: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookmarkQuery {
    pub book_id: Option<String>,
}

/// Query parameters for POST /api/v1/admin/sessions/cleanup
#[derive(Debug, Deserialize)]
pub struct SessionCleanupQuery {
    #[serde(default = "default_cleanup_days")]
    pub days: u32,
}

fn default_cleanup_days() -> u32 {
    30
}
