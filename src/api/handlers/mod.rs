pub mod access;
pub mod admin_books;
pub mod admin_catalog;
pub mod catalog;
pub mod community;
pub mod logs;
pub mod reading;
pub mod sessions;
pub mod subscriptions;
pub mod system;
pub mod users;

pub use access::*;
pub use admin_books::*;
pub use admin_catalog::*;
pub use catalog::*;
pub use community::*;
pub use logs::*;
pub use reading::*;
pub use sessions::*;
pub use subscriptions::*;
pub use system::*;
pub use users::*;

use crate::api::middleware::ClientInfo;
use crate::auth::{AdminUser, LoginGuard, PermissionChecker};
use crate::cache::CacheManager;
use crate::core::audit::{Activity, ActivityType, AuditLogger};
use crate::core::config::Config;
use crate::core::profiler::ApiProfiler;
use crate::core::services::{BookService, CatalogService, ReviewService, SubscriptionService};
use crate::db::repository::{
    ActivityLogRepository, AdminRepository, AuthLogRepository, AuthorRepository, BookRepository,
    BookmarkRepository, CategoryRepository, ChapterRepository, DiscussionRepository,
    NotificationRepository, PaymentRepository, PermissionRepository, PlanRepository,
    PublisherRepository, ReadingProgressRepository, ReviewRepository, RoleRepository,
    SessionRepository, SubscriptionRepository, TagRepository, UserRepository,
};
use crate::db::DatabaseManager;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseManager>,
    pub cache: Arc<CacheManager>,
    pub profiler: Arc<ApiProfiler>,
    pub jwt_secret: Arc<String>,
    pub started_at: Instant,

    pub book_repo: Arc<BookRepository>,
    pub chapter_repo: Arc<ChapterRepository>,
    pub category_repo: Arc<CategoryRepository>,
    pub tag_repo: Arc<TagRepository>,
    pub author_repo: Arc<AuthorRepository>,
    pub publisher_repo: Arc<PublisherRepository>,
    pub user_repo: Arc<UserRepository>,
    pub admin_repo: Arc<AdminRepository>,
    pub role_repo: Arc<RoleRepository>,
    pub permission_repo: Arc<PermissionRepository>,
    pub session_repo: Arc<SessionRepository>,
    pub plan_repo: Arc<PlanRepository>,
    pub subscription_repo: Arc<SubscriptionRepository>,
    pub payment_repo: Arc<PaymentRepository>,
    pub review_repo: Arc<ReviewRepository>,
    pub discussion_repo: Arc<DiscussionRepository>,
    pub notification_repo: Arc<NotificationRepository>,
    pub activity_log_repo: Arc<ActivityLogRepository>,
    pub auth_log_repo: Arc<AuthLogRepository>,
    pub reading_repo: Arc<ReadingProgressRepository>,
    pub bookmark_repo: Arc<BookmarkRepository>,

    pub book_service: Arc<BookService>,
    pub catalog_service: Arc<CatalogService>,
    pub review_service: Arc<ReviewService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub permissions: Arc<PermissionChecker>,
    pub audit: Arc<AuditLogger>,
    pub login_guard: LoginGuard,
}

impl AppState {
    /// Build repositories and services over one database and cache
    pub fn new(config: Config, db: Arc<DatabaseManager>, profiler: Arc<ApiProfiler>) -> Self {
        let cache = Arc::new(CacheManager::from_config(&config.cache));

        let book_repo = Arc::new(BookRepository::new(db.clone()));
        let chapter_repo = Arc::new(ChapterRepository::new(db.clone()));
        let category_repo = Arc::new(CategoryRepository::new(db.clone()));
        let tag_repo = Arc::new(TagRepository::new(db.clone()));
        let author_repo = Arc::new(AuthorRepository::new(db.clone()));
        let publisher_repo = Arc::new(PublisherRepository::new(db.clone()));
        let user_repo = Arc::new(UserRepository::new(db.clone()));
        let admin_repo = Arc::new(AdminRepository::new(db.clone()));
        let role_repo = Arc::new(RoleRepository::new(db.clone()));
        let permission_repo = Arc::new(PermissionRepository::new(db.clone()));
        let session_repo = Arc::new(SessionRepository::new(db.clone()));
        let plan_repo = Arc::new(PlanRepository::new(db.clone()));
        let subscription_repo = Arc::new(SubscriptionRepository::new(db.clone()));
        let payment_repo = Arc::new(PaymentRepository::new(db.clone()));
        let review_repo = Arc::new(ReviewRepository::new(db.clone()));
        let discussion_repo = Arc::new(DiscussionRepository::new(db.clone()));
        let notification_repo = Arc::new(NotificationRepository::new(db.clone()));
        let activity_log_repo = Arc::new(ActivityLogRepository::new(db.clone()));
        let auth_log_repo = Arc::new(AuthLogRepository::new(db.clone()));
        let reading_repo = Arc::new(ReadingProgressRepository::new(db.clone()));
        let bookmark_repo = Arc::new(BookmarkRepository::new(db.clone()));

        let book_service = Arc::new(BookService::new(
            book_repo.clone(),
            chapter_repo.clone(),
            cache.clone(),
        ));
        let catalog_service = Arc::new(CatalogService::new(
            category_repo.clone(),
            tag_repo.clone(),
            author_repo.clone(),
            publisher_repo.clone(),
            cache.clone(),
        ));
        let review_service = Arc::new(ReviewService::new(
            review_repo.clone(),
            book_repo.clone(),
            cache.clone(),
        ));
        let subscription_service = Arc::new(SubscriptionService::new(
            plan_repo.clone(),
            subscription_repo.clone(),
            payment_repo.clone(),
            notification_repo.clone(),
        ));
        let permissions = Arc::new(PermissionChecker::new(
            admin_repo.clone(),
            permission_repo.clone(),
            cache.clone(),
        ));
        let audit = Arc::new(AuditLogger::new(activity_log_repo.clone(), auth_log_repo.clone()));

        Self {
            login_guard: LoginGuard::from_config(&config.security),
            jwt_secret: Arc::new(config.security.jwt_secret.clone()),
            config: Arc::new(config),
            db,
            cache,
            profiler,
            started_at: Instant::now(),
            book_repo,
            chapter_repo,
            category_repo,
            tag_repo,
            author_repo,
            publisher_repo,
            user_repo,
            admin_repo,
            role_repo,
            permission_repo,
            session_repo,
            plan_repo,
            subscription_repo,
            payment_repo,
            review_repo,
            discussion_repo,
            notification_repo,
            activity_log_repo,
            auth_log_repo,
            reading_repo,
            bookmark_repo,
            book_service,
            catalog_service,
            review_service,
            subscription_service,
            permissions,
            audit,
        }
    }
}

impl AppState {
    /// Record an admin mutation in the activity log
    pub(crate) async fn log_activity(
        &self,
        admin: &AdminUser,
        client: &ClientInfo,
        activity_type: ActivityType,
        resource_type: &str,
        resource_id: Option<&str>,
        description: impl Into<String>,
    ) {
        self.audit
            .record_activity(
                Activity::new(&admin.id, activity_type, resource_type, resource_id, description),
                client,
            )
            .await;
    }
}
