use crate::db::models::ReviewStatus;
use serde::Deserialize;

// Review, discussion and notification API models

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    /// 1 to 5
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub is_spoiler: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_spoiler: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewStatusRequest {
    pub status: ReviewStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscussionRequest {
    pub content: String,
    pub title: Option<String>,
    pub chapter_id: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_spoiler: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDiscussionRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_spoiler: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub is_pinned: bool,
}

#[derive(Debug, Deserialize)]
pub struct HideRequest {
    pub is_hidden: bool,
}

/// Query parameters for GET /api/v1/notifications
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// Request body for POST /api/v1/admin/notifications
///
/// Without `user_id` the notification is broadcast to every active user.
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

fn default_kind() -> String {
    "system".to_string()
}
