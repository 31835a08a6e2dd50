use super::AppState;
use crate::api::models::{
    BookmarkQuery, CreateBookmarkRequest, ProgressQuery, UpdateBookmarkRequest, UpdateProgressRequest,
};
use crate::auth::AuthUser;
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, PageParams};
use crate::db::models::{Bookmark, ReadingProgress};
use crate::db::repository::{new_id, now, Repository};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

// Reading progress and bookmarks (user site)

/// A published book and, when given, one of its published chapters
async fn require_reading_target(state: &AppState, book_id: &str, chapter_id: Option<&str>) -> Result<()> {
    match state.book_repo.find_by_id(book_id).await? {
        Some(book) if book.is_published => {}
        _ => return Err(AppError::NotFound(format!("Book {} not found", book_id))),
    }
    if let Some(chapter_id) = chapter_id {
        match state.chapter_repo.find_by_id(chapter_id).await? {
            Some(chapter) if chapter.book_id == book_id && chapter.is_published => {}
            _ => {
                return Err(AppError::NotFound(format!(
                    "Chapter {} not found in book {}",
                    chapter_id, book_id
                )))
            }
        }
    }
    Ok(())
}

fn validate_progress(req: &UpdateProgressRequest) -> Result<()> {
    if let Some(percentage) = req.progress_percentage {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(AppError::ValidationError(
                "progress_percentage must be between 0 and 100".to_string(),
            ));
        }
    }
    if req.time_spent_seconds.is_some_and(|t| t < 0) {
        return Err(AppError::ValidationError(
            "time_spent_seconds cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Handler for PUT /api/v1/reading-progress/books/:id
///
/// Creates the reader's progress row on first use. Time spent accumulates
/// across updates; 100 percent marks the book completed.
pub async fn update_reading_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<String>,
    Json(req): Json<UpdateProgressRequest>,
) -> Result<impl IntoResponse> {
    validate_progress(&req)?;
    require_reading_target(&state, &book_id, req.chapter_id.as_deref()).await?;

    let ts = now();
    let mut progress = match state.reading_repo.find(&user.id, &book_id).await? {
        Some(existing) => existing,
        None => ReadingProgress {
            id: new_id(),
            user_id: user.id.clone(),
            book_id: book_id.clone(),
            chapter_id: None,
            progress_percentage: 0.0,
            last_position: None,
            time_spent_seconds: 0,
            is_completed: false,
            last_read_at: ts.clone(),
            created_at: ts.clone(),
            updated_at: ts.clone(),
        },
    };

    if let Some(chapter_id) = req.chapter_id {
        progress.chapter_id = Some(chapter_id);
    }
    if let Some(last_position) = req.last_position {
        progress.last_position = Some(last_position);
    }
    if let Some(seconds) = req.time_spent_seconds {
        progress.time_spent_seconds = progress.time_spent_seconds.saturating_add(seconds);
    }
    if let Some(percentage) = req.progress_percentage {
        progress.progress_percentage = percentage;
        if percentage >= 100.0 {
            progress.is_completed = true;
        }
    }
    if let Some(is_completed) = req.is_completed {
        progress.is_completed = is_completed;
        if is_completed {
            progress.progress_percentage = 100.0;
        }
    }
    progress.last_read_at = ts.clone();
    progress.updated_at = ts;

    state.reading_repo.upsert(&progress).await?;
    tracing::debug!(
        user_id = %user.id,
        book_id = %book_id,
        progress = progress.progress_percentage,
        "Reading progress saved"
    );

    let stored = state
        .reading_repo
        .find(&user.id, &book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No reading progress for book {}", book_id)))?;
    Ok(Json(stored))
}

/// Handler for GET /api/v1/reading-progress - Most recently read first
pub async fn list_reading_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProgressQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    let (items, total) = state
        .reading_repo
        .list_for_user(&user.id, query.is_completed, window)
        .await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/reading-progress/books/:id
pub async fn get_book_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<String>,
) -> Result<impl IntoResponse> {
    let progress = state
        .reading_repo
        .find(&user.id, &book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No reading progress for book {}", book_id)))?;
    Ok(Json(progress))
}

/// Handler for DELETE /api/v1/reading-progress/books/:id
pub async fn delete_book_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.reading_repo.delete(&user.id, &book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/reading-progress/stats
pub async fn reading_stats(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    Ok(Json(state.reading_repo.stats(&user.id).await?))
}

async fn owned_bookmark(state: &AppState, user: &AuthUser, id: &str) -> Result<Bookmark> {
    state
        .bookmark_repo
        .find_owned(id, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bookmark {} not found", id)))
}

/// Handler for POST /api/v1/bookmarks
pub async fn create_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateBookmarkRequest>,
) -> Result<impl IntoResponse> {
    require_reading_target(&state, &req.book_id, req.chapter_id.as_deref()).await?;

    let ts = now();
    let bookmark = Bookmark {
        id: new_id(),
        user_id: user.id,
        book_id: req.book_id,
        chapter_id: req.chapter_id,
        position: req.position,
        note: req.note,
        created_at: ts.clone(),
        updated_at: ts,
    };
    state.bookmark_repo.create(&bookmark).await?;
    Ok((StatusCode::CREATED, Json(bookmark)))
}

/// Handler for GET /api/v1/bookmarks
pub async fn list_bookmarks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<BookmarkQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    let (items, total) = state
        .bookmark_repo
        .list_for_user(&user.id, query.book_id, window)
        .await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/bookmarks/:id
pub async fn get_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(owned_bookmark(&state, &user, &id).await?))
}

/// Handler for PUT /api/v1/bookmarks/:id
pub async fn update_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookmarkRequest>,
) -> Result<impl IntoResponse> {
    let mut bookmark = owned_bookmark(&state, &user, &id).await?;
    if let Some(position) = req.position {
        bookmark.position = Some(position);
    }
    if let Some(note) = req.note {
        bookmark.note = Some(note);
    }
    bookmark.updated_at = now();

    state.bookmark_repo.update(&bookmark).await?;
    Ok(Json(bookmark))
}

/// Handler for DELETE /api/v1/bookmarks/:id
pub async fn delete_bookmark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.bookmark_repo.delete(&id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
