use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    CreateBookRequest, CreateChapterRequest, FeatureRequest, PublishRequest, UpdateBookRequest,
    UpdateChapterRequest,
};
use crate::auth::AdminUser;
use crate::core::audit::ActivityType;
use crate::core::error::Result;
use crate::core::pagination::PageParams;
use crate::db::repository::BookFilter;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

// Book and chapter management (admin site)

/// Handler for GET /api/v1/admin/books - All books including drafts
pub async fn admin_list_books(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<BookFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:read"]).await?;
    let books = state.book_service.list_all(&filter, page.resolve()?).await?;
    Ok(Json(books))
}

/// Handler for GET /api/v1/admin/books/statistics
pub async fn book_statistics(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:read"]).await?;
    Ok(Json(state.book_service.statistics().await?))
}

/// Handler for POST /api/v1/admin/books
pub async fn admin_create_book(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreateBookRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:create"]).await?;
    let detail = state.book_service.create_book(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "book",
            Some(&detail.book.id),
            format!("Created book '{}'", detail.book.title),
        )
        .await;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Handler for GET /api/v1/admin/books/:id
pub async fn admin_get_book(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:read"]).await?;
    Ok(Json(state.book_service.get_book(&id).await?))
}

/// Handler for PUT /api/v1/admin/books/:id
pub async fn admin_update_book(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:update"]).await?;
    let detail = state.book_service.update_book(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "book",
            Some(&id),
            format!("Updated book '{}'", detail.book.title),
        )
        .await;
    Ok(Json(detail))
}

/// Handler for DELETE /api/v1/admin/books/:id - Soft delete
pub async fn admin_delete_book(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:delete"]).await?;
    state.book_service.delete_book(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "book", Some(&id), "Deleted book")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /api/v1/admin/books/:id/publish
pub async fn publish_book(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:update"]).await?;
    let detail = state.book_service.set_published(&id, req.is_published).await?;

    let verb = if req.is_published { "Published" } else { "Unpublished" };
    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "book",
            Some(&id),
            format!("{} book '{}'", verb, detail.book.title),
        )
        .await;
    Ok(Json(detail))
}

/// Handler for PUT /api/v1/admin/books/:id/feature
pub async fn feature_book(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<FeatureRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["book:update"]).await?;
    let detail = state.book_service.set_featured(&id, req.is_featured).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "book",
            Some(&id),
            format!("Set featured={} on book '{}'", req.is_featured, detail.book.title),
        )
        .await;
    Ok(Json(detail))
}

/// Handler for GET /api/v1/admin/books/:id/chapters
pub async fn admin_list_chapters(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(book_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["chapter:read"]).await?;
    Ok(Json(state.book_service.list_chapters(&book_id).await?))
}

/// Handler for POST /api/v1/admin/books/:id/chapters
pub async fn admin_create_chapter(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(book_id): Path<String>,
    Json(req): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["chapter:create"]).await?;
    let chapter = state.book_service.create_chapter(&book_id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "chapter",
            Some(&chapter.id),
            format!("Created chapter {} of book {}", chapter.number, book_id),
        )
        .await;
    Ok((StatusCode::CREATED, Json(chapter)))
}

/// Handler for GET /api/v1/admin/chapters/:id
pub async fn admin_get_chapter(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["chapter:read"]).await?;
    Ok(Json(state.book_service.get_chapter(&id).await?))
}

/// Handler for PUT /api/v1/admin/chapters/:id
pub async fn admin_update_chapter(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateChapterRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["chapter:update"]).await?;
    let chapter = state.book_service.update_chapter(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "chapter",
            Some(&id),
            format!("Updated chapter '{}'", chapter.title),
        )
        .await;
    Ok(Json(chapter))
}

/// Handler for DELETE /api/v1/admin/chapters/:id
pub async fn admin_delete_chapter(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["chapter:delete"]).await?;
    state.book_service.delete_chapter(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "chapter", Some(&id), "Deleted chapter")
        .await;
    Ok(StatusCode::NO_CONTENT)
}
