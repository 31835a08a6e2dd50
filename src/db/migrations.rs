//! Database migrations
//!
//! Versioned schema changes tracked in `schema_migrations`. File-backed
//! databases are copied aside before pending migrations run and restored if
//! one of them fails.

use crate::core::error::{AppError, Result};
use chrono::Local;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initial schema (version 1)
const MIGRATION_V1: &str = r#"
-- Readers
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    full_name TEXT,
    bio TEXT,
    avatar_url TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_premium INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    last_login TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Back-office access control
CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS permissions (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id TEXT NOT NULL,
    permission_id TEXT NOT NULL,
    PRIMARY KEY (role_id, permission_id),
    FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE,
    FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS admins (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    full_name TEXT,
    role_id TEXT,
    is_superadmin INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login TEXT,
    login_count INTEGER NOT NULL DEFAULT 0,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS admin_sessions (
    id TEXT PRIMARY KEY,
    admin_id TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    ended_at TEXT,
    FOREIGN KEY (admin_id) REFERENCES admins(id) ON DELETE CASCADE
);

-- Catalog
CREATE TABLE IF NOT EXISTS publishers (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    description TEXT,
    website TEXT,
    logo_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS authors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    biography TEXT,
    nationality TEXT,
    photo_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    description TEXT,
    parent_id TEXT,
    display_order INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES categories(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    isbn TEXT UNIQUE,
    title TEXT NOT NULL,
    subtitle TEXT,
    description TEXT,
    publisher_id TEXT,
    language TEXT NOT NULL DEFAULT 'en',
    page_count INTEGER,
    publication_date TEXT,
    cover_url TEXT,
    is_featured INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 0,
    avg_rating REAL NOT NULL DEFAULT 0,
    review_count INTEGER NOT NULL DEFAULT 0,
    view_count INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS book_authors (
    book_id TEXT NOT NULL,
    author_id TEXT NOT NULL,
    PRIMARY KEY (book_id, author_id),
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS book_categories (
    book_id TEXT NOT NULL,
    category_id TEXT NOT NULL,
    PRIMARY KEY (book_id, category_id),
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS book_tags (
    book_id TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    PRIMARY KEY (book_id, tag_id),
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    word_count INTEGER NOT NULL DEFAULT 0,
    is_free INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (book_id, number),
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
);

-- Commerce
CREATE TABLE IF NOT EXISTS subscription_plans (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT,
    price REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    billing_cycle TEXT NOT NULL,
    duration_days INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    status TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    auto_renew INTEGER NOT NULL DEFAULT 1,
    cancelled_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (plan_id) REFERENCES subscription_plans(id) ON DELETE RESTRICT
);

CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    subscription_id TEXT,
    amount REAL NOT NULL,
    currency TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    status TEXT NOT NULL,
    transaction_id TEXT UNIQUE NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (subscription_id) REFERENCES subscriptions(id) ON DELETE SET NULL
);

-- Community
CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    title TEXT,
    content TEXT,
    is_spoiler INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'approved',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, book_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS discussions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chapter_id TEXT,
    parent_id TEXT,
    title TEXT,
    content TEXT NOT NULL,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    is_spoiler INTEGER NOT NULL DEFAULT 0,
    is_hidden INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE SET NULL,
    FOREIGN KEY (parent_id) REFERENCES discussions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    link TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- Audit trails
CREATE TABLE IF NOT EXISTS admin_activity_logs (
    id TEXT PRIMARY KEY,
    admin_id TEXT,
    activity_type TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id TEXT,
    description TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS authentication_logs (
    id TEXT PRIMARY KEY,
    subject_kind TEXT NOT NULL,
    subject_id TEXT,
    username TEXT NOT NULL,
    event TEXT NOT NULL,
    success INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    failure_reason TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_published ON books(is_published, is_deleted);
CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher_id);
CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id, number);
CREATE INDEX IF NOT EXISTS idx_reviews_book ON reviews(book_id, status);
CREATE INDEX IF NOT EXISTS idx_discussions_book ON discussions(book_id, parent_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id, status);
CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
CREATE INDEX IF NOT EXISTS idx_admin_activity_created ON admin_activity_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_auth_logs_created ON authentication_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_admin_sessions_admin ON admin_sessions(admin_id, is_active);
"#;

/// Built-in permissions and starter roles (version 2)
const MIGRATION_V2: &str = r#"
INSERT OR IGNORE INTO permissions (id, name, description) VALUES
    (lower(hex(randomblob(16))), 'book:read', 'View books'),
    (lower(hex(randomblob(16))), 'book:create', 'Create books'),
    (lower(hex(randomblob(16))), 'book:update', 'Edit, publish and feature books'),
    (lower(hex(randomblob(16))), 'book:delete', 'Delete books'),
    (lower(hex(randomblob(16))), 'chapter:read', 'View chapters'),
    (lower(hex(randomblob(16))), 'chapter:create', 'Create chapters'),
    (lower(hex(randomblob(16))), 'chapter:update', 'Edit chapters'),
    (lower(hex(randomblob(16))), 'chapter:delete', 'Delete chapters'),
    (lower(hex(randomblob(16))), 'category:read', 'View categories'),
    (lower(hex(randomblob(16))), 'category:create', 'Create categories'),
    (lower(hex(randomblob(16))), 'category:update', 'Edit categories'),
    (lower(hex(randomblob(16))), 'category:delete', 'Delete categories'),
    (lower(hex(randomblob(16))), 'tag:read', 'View tags'),
    (lower(hex(randomblob(16))), 'tag:create', 'Create tags'),
    (lower(hex(randomblob(16))), 'tag:update', 'Edit tags'),
    (lower(hex(randomblob(16))), 'tag:delete', 'Delete tags'),
    (lower(hex(randomblob(16))), 'author:read', 'View authors'),
    (lower(hex(randomblob(16))), 'author:create', 'Create authors'),
    (lower(hex(randomblob(16))), 'author:update', 'Edit authors'),
    (lower(hex(randomblob(16))), 'author:delete', 'Delete authors'),
    (lower(hex(randomblob(16))), 'publisher:read', 'View publishers'),
    (lower(hex(randomblob(16))), 'publisher:create', 'Create publishers'),
    (lower(hex(randomblob(16))), 'publisher:update', 'Edit publishers'),
    (lower(hex(randomblob(16))), 'publisher:delete', 'Delete publishers'),
    (lower(hex(randomblob(16))), 'user:read', 'View readers'),
    (lower(hex(randomblob(16))), 'user:update', 'Edit readers'),
    (lower(hex(randomblob(16))), 'user:delete', 'Delete readers'),
    (lower(hex(randomblob(16))), 'subscription:read', 'View plans and subscriptions'),
    (lower(hex(randomblob(16))), 'subscription:create', 'Create plans'),
    (lower(hex(randomblob(16))), 'subscription:update', 'Edit plans and subscriptions'),
    (lower(hex(randomblob(16))), 'subscription:delete', 'Delete plans'),
    (lower(hex(randomblob(16))), 'payment:read', 'View payments'),
    (lower(hex(randomblob(16))), 'payment:update', 'Change payment status'),
    (lower(hex(randomblob(16))), 'review:read', 'View reviews'),
    (lower(hex(randomblob(16))), 'review:moderate', 'Approve or reject reviews'),
    (lower(hex(randomblob(16))), 'review:delete', 'Delete reviews'),
    (lower(hex(randomblob(16))), 'discussion:read', 'View discussions'),
    (lower(hex(randomblob(16))), 'discussion:moderate', 'Pin or hide discussions'),
    (lower(hex(randomblob(16))), 'discussion:delete', 'Delete discussions'),
    (lower(hex(randomblob(16))), 'notification:create', 'Send notifications'),
    (lower(hex(randomblob(16))), 'admin:read', 'View admins'),
    (lower(hex(randomblob(16))), 'admin:create', 'Create admins'),
    (lower(hex(randomblob(16))), 'admin:update', 'Edit admins'),
    (lower(hex(randomblob(16))), 'admin:delete', 'Delete admins'),
    (lower(hex(randomblob(16))), 'role:read', 'View roles'),
    (lower(hex(randomblob(16))), 'role:create', 'Create roles'),
    (lower(hex(randomblob(16))), 'role:update', 'Edit roles'),
    (lower(hex(randomblob(16))), 'role:delete', 'Delete roles'),
    (lower(hex(randomblob(16))), 'permission:read', 'View permissions'),
    (lower(hex(randomblob(16))), 'permission:create', 'Create permissions'),
    (lower(hex(randomblob(16))), 'permission:delete', 'Delete permissions'),
    (lower(hex(randomblob(16))), 'logs:read', 'Read audit logs'),
    (lower(hex(randomblob(16))), 'system:read', 'View profiler, metrics and cache'),
    (lower(hex(randomblob(16))), 'system:manage', 'Clear profiler data and caches');

INSERT OR IGNORE INTO roles (id, name, description) VALUES
    (lower(hex(randomblob(16))), 'content_manager', 'Manages the catalog'),
    (lower(hex(randomblob(16))), 'moderator', 'Moderates reviews and discussions'),
    (lower(hex(randomblob(16))), 'viewer', 'Read-only back-office access');

INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
    SELECT r.id, p.id FROM roles r, permissions p
    WHERE r.name = 'content_manager'
      AND (p.name LIKE 'book:%' OR p.name LIKE 'chapter:%' OR p.name LIKE 'category:%'
           OR p.name LIKE 'tag:%' OR p.name LIKE 'author:%' OR p.name LIKE 'publisher:%');

INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
    SELECT r.id, p.id FROM roles r, permissions p
    WHERE r.name = 'moderator'
      AND (p.name LIKE 'review:%' OR p.name LIKE 'discussion:%'
           OR p.name IN ('user:read', 'book:read', 'notification:create'));

INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
    SELECT r.id, p.id FROM roles r, permissions p
    WHERE r.name = 'viewer' AND p.name LIKE '%:read';
"#;

/// Reading progress, bookmarks and session permissions (version 3)
const MIGRATION_V3: &str = r#"
CREATE TABLE IF NOT EXISTS reading_progress (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chapter_id TEXT,
    progress_percentage REAL NOT NULL DEFAULT 0,
    last_position TEXT,
    time_spent_seconds INTEGER NOT NULL DEFAULT 0,
    is_completed INTEGER NOT NULL DEFAULT 0,
    last_read_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, book_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_reading_progress_user ON reading_progress(user_id, last_read_at);

CREATE TABLE IF NOT EXISTS bookmarks (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chapter_id TEXT,
    position TEXT,
    note TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
    FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_bookmarks_user ON bookmarks(user_id, created_at);

INSERT OR IGNORE INTO permissions (id, name, description) VALUES
    (lower(hex(randomblob(16))), 'session:read', 'View admin login sessions'),
    (lower(hex(randomblob(16))), 'session:revoke', 'End admin login sessions');

INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
    SELECT r.id, p.id FROM roles r, permissions p
    WHERE r.name = 'viewer' AND p.name = 'session:read';
"#;

/// Every migration in application order
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "Initial schema", MIGRATION_V1),
    (2, "Built-in permissions and roles", MIGRATION_V2),
    (3, "Reading progress, bookmarks and session permissions", MIGRATION_V3),
];

/// Apply every pending migration
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    info!("Running database migrations");

    conn.execute_batch(MIGRATION_TABLE)?;

    let current_version = current_version(conn)?;
    info!("Current database schema version: {}", current_version);

    for (version, name, sql) in MIGRATIONS {
        if current_version < *version {
            info!("Applying migration v{}: {}", version, name);
            apply_migration(conn, *version, sql)?;
        }
    }

    info!("Database migrations completed successfully");
    Ok(())
}

/// Highest applied migration version, 0 for a fresh database
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(AppError::DatabaseError)
}

/// Latest migration version known to this build
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or(0)
}

/// Run migrations against a database file, restoring a copy if one fails
pub fn run_migrations_with_backup(db_path: &Path) -> Result<()> {
    let pending = {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(MIGRATION_TABLE)?;
        current_version(&conn)? < latest_version()
    };
    if !pending {
        return Ok(());
    }

    let backup_path = create_migration_backup(db_path)?;
    info!("Created migration backup at: {}", backup_path.display());

    let mut conn = Connection::open(db_path)?;
    match run_migrations(&mut conn) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Migration failed: {}, restoring from backup", e);
            drop(conn);
            fs::copy(&backup_path, db_path)?;
            info!("Database restored from backup");
            Err(e)
        }
    }
}

fn create_migration_backup(db_path: &Path) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_dir = db_path
        .parent()
        .ok_or_else(|| AppError::ConfigError("Invalid database path".to_string()))?
        .join("backups");

    fs::create_dir_all(&backup_dir)?;

    let backup_path = backup_dir.join(format!("migration_backup_{}.db", timestamp));
    fs::copy(db_path, &backup_path)?;

    Ok(backup_path)
}

fn apply_migration(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(sql).map_err(|e| {
        warn!("Migration v{} failed: {}", version, e);
        AppError::DatabaseError(e)
    })?;

    tx.execute("INSERT INTO schema_migrations (version) VALUES (?)", [version])?;
    tx.commit()?;

    info!("Migration v{} applied successfully", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_builtin_permissions_seeded() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM permissions \
                 WHERE name IN ('book:create', 'logs:read', 'system:manage', 'session:read', 'session:revoke')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);

        let viewer_writes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM role_permissions rp
                 JOIN roles r ON r.id = rp.role_id
                 JOIN permissions p ON p.id = rp.permission_id
                 WHERE r.name = 'viewer' AND p.name NOT LIKE '%:read'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(viewer_writes, 0);
    }

    #[test]
    fn test_file_database_backup_created() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("bookhub.db");
        Connection::open(&db_path).unwrap();

        run_migrations_with_backup(&db_path).unwrap();

        assert!(dir.path().join("backups").read_dir().unwrap().next().is_some());
        let conn = Connection::open(&db_path).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }
}
