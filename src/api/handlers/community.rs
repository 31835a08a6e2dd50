use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    CountResponse, CreateDiscussionRequest, CreateReviewRequest, HideRequest, NotificationQuery,
    PinRequest, ReviewStatusRequest, SendNotificationRequest, UpdateDiscussionRequest,
    UpdateReviewRequest, UpdatedResponse,
};
use crate::auth::{AdminUser, AuthUser};
use crate::core::audit::{Activity, ActivityType};
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, PageParams};
use crate::core::utils::require_non_empty;
use crate::db::models::{Discussion, Notification};
use crate::db::repository::{new_id, now, DiscussionFilter, Repository, ReviewFilter};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

// Reviews, discussions and notifications

/// Handler for GET /api/v1/books/:id/reviews - Approved reviews of a book
pub async fn list_book_reviews(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let reviews = state
        .review_service
        .book_reviews(&book_id, page.resolve()?)
        .await?;
    Ok(Json(reviews))
}

/// Handler for POST /api/v1/books/:id/reviews
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse> {
    let review = state.review_service.create(&user.id, &book_id, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Handler for PUT /api/v1/reviews/:id
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.review_service.update_own(&user.id, &id, req).await?))
}

/// Handler for DELETE /api/v1/reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.review_service.delete_own(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/books/:id/discussions - Visible threads, pinned first
pub async fn list_book_discussions(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    require_published_book(&state, &book_id).await?;
    let (items, total) = state.discussion_repo.list_threads(&book_id, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/discussions/:id/replies
pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let parent = find_discussion(&state, &id).await?;
    if parent.is_hidden {
        return Err(AppError::NotFound(format!("Discussion {} not found", id)));
    }
    Ok(Json(state.discussion_repo.replies(&id).await?))
}

/// Threads only exist for books readers can see
async fn require_published_book(state: &AppState, book_id: &str) -> Result<()> {
    match state.book_repo.find_by_id(book_id).await? {
        Some(book) if book.is_published => Ok(()),
        _ => Err(AppError::NotFound(format!("Book {} not found", book_id))),
    }
}

async fn find_discussion(state: &AppState, id: &str) -> Result<Discussion> {
    state
        .discussion_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Discussion {} not found", id)))
}

/// Load a discussion the user wrote
async fn owned_discussion(state: &AppState, user: &AuthUser, id: &str) -> Result<Discussion> {
    let discussion = find_discussion(state, id).await?;
    if discussion.user_id != user.id {
        return Err(AppError::PermissionDenied(
            "You can only modify your own discussions".to_string(),
        ));
    }
    Ok(discussion)
}

/// Handler for POST /api/v1/books/:id/discussions
///
/// A chapter or parent discussion, when given, must belong to the same book.
pub async fn create_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<String>,
    Json(req): Json<CreateDiscussionRequest>,
) -> Result<impl IntoResponse> {
    require_non_empty("content", &req.content)?;
    require_published_book(&state, &book_id).await?;

    let ts = now();
    let discussion = Discussion {
        id: new_id(),
        user_id: user.id,
        book_id,
        chapter_id: req.chapter_id,
        parent_id: req.parent_id,
        title: req.title,
        content: req.content,
        is_pinned: false,
        is_spoiler: req.is_spoiler,
        is_hidden: false,
        created_at: ts.clone(),
        updated_at: ts,
    };
    state.discussion_repo.create(&discussion).await?;
    Ok((StatusCode::CREATED, Json(discussion)))
}

/// Handler for PUT /api/v1/discussions/:id
pub async fn update_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateDiscussionRequest>,
) -> Result<impl IntoResponse> {
    let mut discussion = owned_discussion(&state, &user, &id).await?;

    if let Some(title) = req.title {
        discussion.title = Some(title);
    }
    if let Some(content) = req.content {
        require_non_empty("content", &content)?;
        discussion.content = content;
    }
    if let Some(is_spoiler) = req.is_spoiler {
        discussion.is_spoiler = is_spoiler;
    }
    discussion.updated_at = now();

    state.discussion_repo.update(&discussion).await?;
    Ok(Json(discussion))
}

/// Handler for DELETE /api/v1/discussions/:id
pub async fn delete_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    owned_discussion(&state, &user, &id).await?;
    state.discussion_repo.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<NotificationQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    let (items, total) = state
        .notification_repo
        .list_for_user(&user.id, query.unread_only, window)
        .await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/notifications/unread-count
pub async fn unread_notification_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let count = state.notification_repo.unread_count(&user.id).await?;
    Ok(Json(CountResponse { count }))
}

/// Handler for POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.notification_repo.mark_read(&id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/notifications/read-all
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let updated = state.notification_repo.mark_all_read(&user.id).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// Handler for DELETE /api/v1/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.notification_repo.delete(&id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/reviews
pub async fn admin_list_reviews(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<ReviewFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["review:read"]).await?;
    Ok(Json(state.review_service.list(&filter, page.resolve()?).await?))
}

/// Handler for PUT /api/v1/admin/reviews/:id/status
pub async fn moderate_review(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<ReviewStatusRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["review:moderate"]).await?;
    let review = state.review_service.moderate(&id, req.status).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Moderate,
            "review",
            Some(&id),
            format!("Set review status to {}", req.status),
        )
        .await;
    Ok(Json(review))
}

/// Handler for DELETE /api/v1/admin/reviews/:id
pub async fn admin_delete_review(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["review:delete"]).await?;
    state.review_service.delete(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "review", Some(&id), "Deleted review")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/discussions
pub async fn admin_list_discussions(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<DiscussionFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["discussion:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.discussion_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for PUT /api/v1/admin/discussions/:id/pin
pub async fn pin_discussion(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<PinRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["discussion:moderate"]).await?;
    let discussion = state.discussion_repo.set_pinned(&id, req.is_pinned, &now()).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Moderate,
            "discussion",
            Some(&id),
            format!("Set pinned={} on discussion", req.is_pinned),
        )
        .await;
    Ok(Json(discussion))
}

/// Handler for PUT /api/v1/admin/discussions/:id/hide
pub async fn hide_discussion(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<HideRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["discussion:moderate"]).await?;
    let discussion = state.discussion_repo.set_hidden(&id, req.is_hidden, &now()).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Moderate,
            "discussion",
            Some(&id),
            format!("Set hidden={} on discussion", req.is_hidden),
        )
        .await;
    Ok(Json(discussion))
}

/// Handler for DELETE /api/v1/admin/discussions/:id
pub async fn admin_delete_discussion(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["discussion:delete"]).await?;
    state.discussion_repo.delete(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "discussion", Some(&id), "Deleted discussion")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/admin/notifications
///
/// Sends to `user_id` when present, otherwise to every active user.
pub async fn send_notification(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["notification:create"]).await?;
    require_non_empty("title", &req.title)?;
    require_non_empty("message", &req.message)?;

    let recipients = match &req.user_id {
        Some(user_id) => {
            if state.user_repo.find_by_id(user_id).await?.is_none() {
                return Err(AppError::NotFound(format!("User {} not found", user_id)));
            }
            vec![user_id.clone()]
        }
        None => state.user_repo.active_ids().await?,
    };

    let ts = now();
    let notifications: Vec<Notification> = recipients
        .into_iter()
        .map(|user_id| Notification {
            id: new_id(),
            user_id,
            kind: req.kind.clone(),
            title: req.title.clone(),
            message: req.message.clone(),
            link: req.link.clone(),
            is_read: false,
            created_at: ts.clone(),
        })
        .collect();
    let sent = state.notification_repo.create_many(notifications).await?;

    let audience = if req.user_id.is_some() { "user" } else { "broadcast" };
    state
        .audit
        .record_activity(
            Activity::new(
                &admin.id,
                ActivityType::Send,
                "notification",
                req.user_id.as_deref(),
                format!("Sent notification '{}' to {} recipient(s)", req.title, sent),
            )
            .with_metadata(json!({ "audience": audience, "kind": req.kind })),
            &client,
        )
        .await;
    Ok((StatusCode::CREATED, Json(UpdatedResponse { updated: sent })))
}
