//! API routes
//!
//! User site under `/api/v1`, admin site under `/api/v1/admin`. Routes that
//! need a signed-in caller sit behind `authenticate_user` or
//! `authenticate_admin`; the matching extractor then reads the caller from
//! the request extensions.

use crate::api::handlers::*;
use crate::auth::handlers::{admin_login, admin_logout, admin_me, get_me, login, register, update_me};
use crate::auth::middleware::{authenticate_admin, authenticate_user};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

/// Build the complete router with state attached
pub fn build_api_routes(state: AppState) -> Router {
    let v1 = Router::new()
        .merge(public_routes())
        .merge(user_routes(state.clone()))
        .route("/health", get(health_check))
        .nest("/admin", admin_routes(state.clone()));

    Router::new()
        .route("/health", get(liveness))
        .nest("/api/v1", v1)
        .with_state(state)
}

/// Catalog and community reads open to everyone
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        // Books
        .route("/books", get(list_books))
        .route("/books/featured", get(featured_books))
        .route("/books/:id", get(get_book))
        .route("/books/:id/chapters", get(list_book_chapters))
        .route("/books/:id/reviews", get(list_book_reviews))
        .route("/books/:id/discussions", get(list_book_discussions))
        .route("/discussions/:id/replies", get(list_replies))
        // Catalog
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
        .route("/tags", get(list_tags))
        .route("/authors", get(list_authors))
        .route("/authors/:id", get(get_author))
        .route("/publishers", get(list_publishers))
        .route("/publishers/:id", get(get_publisher))
        .route("/subscriptions/plans", get(list_active_plans))
}

/// Routes that require a user token
fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).put(update_me))
        .route("/books/:id/chapters/:number", get(read_chapter))
        // Reviews
        .route("/books/:id/reviews", post(create_review))
        .route("/reviews/:id", put(update_review).delete(delete_review))
        // Discussions
        .route("/books/:id/discussions", post(create_discussion))
        .route("/discussions/:id", put(update_discussion).delete(delete_discussion))
        // Subscriptions and payments
        .route("/subscriptions", post(subscribe))
        .route("/subscriptions/me", get(my_subscription))
        .route("/subscriptions/me/cancel", post(cancel_subscription))
        .route("/payments", get(my_payments))
        // Notifications
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_notification_count))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/:id", delete(delete_notification))
        .route("/notifications/:id/read", post(mark_notification_read))
        // Reading progress and bookmarks
        .route("/reading-progress", get(list_reading_progress))
        .route("/reading-progress/stats", get(reading_stats))
        .route(
            "/reading-progress/books/:id",
            get(get_book_progress).put(update_reading_progress).delete(delete_book_progress),
        )
        .route("/bookmarks", get(list_bookmarks).post(create_bookmark))
        .route("/bookmarks/:id", get(get_bookmark).put(update_bookmark).delete(delete_bookmark))
        .route_layer(middleware::from_fn_with_state(state, authenticate_user))
}

/// Admin site; everything except login requires an admin token
fn admin_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/logout", post(admin_logout))
        .route("/auth/me", get(admin_me))
        // Access control
        .route("/admins", get(list_admins).post(create_admin))
        .route("/admins/:id", get(get_admin).put(update_admin).delete(delete_admin))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/:id/permissions", put(set_role_permissions))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route("/permissions/:id", delete(delete_permission))
        .route("/admins/:id/sessions/revoke", post(revoke_admin_sessions))
        .route("/sessions", get(list_sessions))
        .route("/sessions/cleanup", post(cleanup_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/revoke", post(revoke_session))
        // Books and chapters
        .route("/books", get(admin_list_books).post(admin_create_book))
        .route("/books/statistics", get(book_statistics))
        .route(
            "/books/:id",
            get(admin_get_book).put(admin_update_book).delete(admin_delete_book),
        )
        .route("/books/:id/publish", put(publish_book))
        .route("/books/:id/feature", put(feature_book))
        .route("/books/:id/chapters", get(admin_list_chapters).post(admin_create_chapter))
        .route(
            "/chapters/:id",
            get(admin_get_chapter).put(admin_update_chapter).delete(admin_delete_chapter),
        )
        // Catalog
        .route("/categories", get(admin_list_categories).post(admin_create_category))
        .route(
            "/categories/:id",
            get(admin_get_category).put(admin_update_category).delete(admin_delete_category),
        )
        .route("/tags", get(admin_list_tags).post(admin_create_tag))
        .route(
            "/tags/:id",
            get(admin_get_tag).put(admin_update_tag).delete(admin_delete_tag),
        )
        .route("/authors", get(admin_list_authors).post(admin_create_author))
        .route(
            "/authors/:id",
            get(admin_get_author).put(admin_update_author).delete(admin_delete_author),
        )
        .route("/publishers", get(admin_list_publishers).post(admin_create_publisher))
        .route(
            "/publishers/:id",
            get(admin_get_publisher).put(admin_update_publisher).delete(admin_delete_publisher),
        )
        // Users
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        // Commerce
        .route("/subscription-plans", get(admin_list_plans).post(admin_create_plan))
        .route(
            "/subscription-plans/:id",
            get(admin_get_plan).put(admin_update_plan).delete(admin_delete_plan),
        )
        .route("/subscriptions", get(admin_list_subscriptions))
        .route("/subscriptions/:id/status", put(admin_set_subscription_status))
        .route("/payments", get(admin_list_payments))
        .route("/payments/:id", get(admin_get_payment))
        .route("/payments/:id/status", put(admin_set_payment_status))
        // Moderation
        .route("/reviews", get(admin_list_reviews))
        .route("/reviews/:id", delete(admin_delete_review))
        .route("/reviews/:id/status", put(moderate_review))
        .route("/discussions", get(admin_list_discussions))
        .route("/discussions/:id", delete(admin_delete_discussion))
        .route("/discussions/:id/pin", put(pin_discussion))
        .route("/discussions/:id/hide", put(hide_discussion))
        .route("/notifications", post(send_notification))
        // Logs
        .route("/logs/admin-activity", get(list_activity_logs))
        .route("/logs/authentication", get(list_auth_logs))
        // System
        .route("/system/profiler", get(profiler_report).delete(clear_profiler))
        .route("/system/metrics", get(get_metrics))
        .route("/system/cache", get(cache_stats).delete(clear_cache))
        .route("/system/cache/tags/:tag", delete(invalidate_cache_tag))
        .route("/system/backup", post(backup_database))
        .route_layer(middleware::from_fn_with_state(state, authenticate_admin));

    Router::new()
        .route("/auth/login", post(admin_login))
        .merge(protected)
}
