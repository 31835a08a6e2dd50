use super::AppState;
use crate::api::models::{FeaturedQuery, SearchQuery};
use crate::auth::middleware::AuthUser;
use crate::core::error::{AppError, Result};
use crate::core::pagination::PageParams;
use crate::db::repository::BookFilter;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

// Public catalog handlers for the user site

/// Handler for GET /api/v1/books - List published books
pub async fn list_books(
    State(state): State<AppState>,
    Query(filter): Query<BookFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    let books = state.book_service.list_published(filter, window).await?;
    Ok(Json(books))
}

/// Handler for GET /api/v1/books/featured
pub async fn featured_books(
    State(state): State<AppState>,
    Query(query): Query<FeaturedQuery>,
) -> Result<impl IntoResponse> {
    let books = state.book_service.featured(query.limit).await?;
    Ok(Json(books))
}

/// Handler for GET /api/v1/books/:id - Published book with its relations
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let detail = state.book_service.published_detail(&id).await?;
    Ok(Json(detail))
}

/// Handler for GET /api/v1/books/:id/chapters - Table of contents
pub async fn list_book_chapters(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let chapters = state.book_service.published_chapters(&id).await?;
    Ok(Json(chapters))
}

/// Handler for GET /api/v1/books/:id/chapters/:number - Read a chapter
///
/// Free chapters are open to every signed-in reader. Other chapters need a
/// premium account or an active subscription.
pub async fn read_chapter(
    State(state): State<AppState>,
    Path((book_id, number)): Path<(String, i64)>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let chapter = state.book_service.published_chapter(&book_id, number).await?;

    let entitled = chapter.is_free
        || user.is_premium
        || state.subscription_service.has_active(&user.id).await?;
    if !entitled {
        return Err(AppError::PermissionDenied(
            "An active subscription is required to read this chapter".to_string(),
        ));
    }

    Ok(Json(chapter))
}

/// Handler for GET /api/v1/categories - Active categories
pub async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let categories = state.catalog_service.active_categories().await?;
    Ok(Json(categories))
}

/// Handler for GET /api/v1/categories/:id
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let category = state.catalog_service.active_category(&id).await?;
    Ok(Json(category))
}

/// Handler for GET /api/v1/tags
pub async fn list_tags(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let tags = state.catalog_service.all_tags().await?;
    Ok(Json(tags))
}

/// Handler for GET /api/v1/authors
pub async fn list_authors(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let authors = state
        .catalog_service
        .list_authors(query.search, page.resolve()?)
        .await?;
    Ok(Json(authors))
}

/// Handler for GET /api/v1/authors/:id
pub async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.catalog_service.get_author(&id).await?))
}

/// Handler for GET /api/v1/publishers
pub async fn list_publishers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let publishers = state
        .catalog_service
        .list_publishers(query.search, page.resolve()?)
        .await?;
    Ok(Json(publishers))
}

/// Handler for GET /api/v1/publishers/:id
pub async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.catalog_service.get_publisher(&id).await?))
}
