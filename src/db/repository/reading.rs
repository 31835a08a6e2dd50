//! Reading progress and bookmarks
//!
//! Both belong to a single reader; every lookup is scoped by `user_id` so one
//! reader can never see or touch another reader's rows.

use super::{fetch_page, Conditions};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Bookmark, ReadingProgress};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Totals over one reader's progress rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadingStats {
    pub books_started: i64,
    pub books_completed: i64,
    pub total_time_spent_seconds: i64,
    pub last_read_at: Option<String>,
}

/// Repository for ReadingProgress entities
pub struct ReadingProgressRepository {
    db: Arc<DatabaseManager>,
}

impl ReadingProgressRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find(&self, user_id: &str, book_id: &str) -> Result<Option<ReadingProgress>> {
        let user_id = user_id.to_string();
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM reading_progress WHERE user_id = ? AND book_id = ?",
                            ReadingProgress::COLUMNS
                        ),
                        [&user_id, &book_id],
                        ReadingProgress::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Insert the row, or overwrite the reader's existing row for the book
    ///
    /// An existing row keeps its id and `created_at`.
    pub async fn upsert(&self, progress: &ReadingProgress) -> Result<()> {
        let p = progress.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO reading_progress (id, user_id, book_id, chapter_id, progress_percentage, \
                     last_position, time_spent_seconds, is_completed, last_read_at, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (user_id, book_id) DO UPDATE SET \
                       chapter_id = excluded.chapter_id, \
                       progress_percentage = excluded.progress_percentage, \
                       last_position = excluded.last_position, \
                       time_spent_seconds = excluded.time_spent_seconds, \
                       is_completed = excluded.is_completed, \
                       last_read_at = excluded.last_read_at, \
                       updated_at = excluded.updated_at",
                    params![
                        p.id,
                        p.user_id,
                        p.book_id,
                        p.chapter_id,
                        p.progress_percentage,
                        p.last_position,
                        p.time_spent_seconds,
                        p.is_completed,
                        p.last_read_at,
                        p.created_at,
                        p.updated_at,
                    ],
                )
                .map_err(|e| AppError::from_write(e, || "Reading progress already exists".to_string()))?;
                Ok(())
            })
            .await
    }

    /// Most recently read first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        is_completed: Option<bool>,
        window: Pagination,
    ) -> Result<(Vec<ReadingProgress>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_value("user_id = ?", user_id.to_string())
            .push_opt("is_completed = ?", is_completed);
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "reading_progress",
                    ReadingProgress::COLUMNS,
                    &conditions,
                    "last_read_at DESC, id",
                    window,
                    ReadingProgress::from_row,
                )
            })
            .await
    }

    pub async fn delete(&self, user_id: &str, book_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM reading_progress WHERE user_id = ? AND book_id = ?",
                    [&user_id, &book_id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!(
                        "No reading progress for book {}",
                        book_id
                    )));
                }
                Ok(())
            })
            .await
    }

    pub async fn stats(&self, user_id: &str) -> Result<ReadingStats> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(is_completed), 0), COALESCE(SUM(time_spent_seconds), 0), \
                     MAX(last_read_at) FROM reading_progress WHERE user_id = ?",
                    [&user_id],
                    |row| {
                        Ok(ReadingStats {
                            books_started: row.get(0)?,
                            books_completed: row.get(1)?,
                            total_time_spent_seconds: row.get(2)?,
                            last_read_at: row.get(3)?,
                        })
                    },
                )?)
            })
            .await
    }
}

/// Repository for Bookmark entities
pub struct BookmarkRepository {
    db: Arc<DatabaseManager>,
}

impl BookmarkRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// The bookmark if it belongs to `user_id`
    pub async fn find_owned(&self, id: &str, user_id: &str) -> Result<Option<Bookmark>> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM bookmarks WHERE id = ? AND user_id = ?", Bookmark::COLUMNS),
                        [&id, &user_id],
                        Bookmark::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        book_id: Option<String>,
        window: Pagination,
    ) -> Result<(Vec<Bookmark>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_value("user_id = ?", user_id.to_string())
            .push_opt("book_id = ?", book_id);
        self.db
            .execute(move |conn| {
                fetch_page(conn, "bookmarks", Bookmark::COLUMNS, &conditions, "created_at DESC, id", window, Bookmark::from_row)
            })
            .await
    }

    pub async fn create(&self, bookmark: &Bookmark) -> Result<()> {
        let b = bookmark.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO bookmarks (id, user_id, book_id, chapter_id, position, note, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![b.id, b.user_id, b.book_id, b.chapter_id, b.position, b.note, b.created_at, b.updated_at],
                )
                .map_err(|e| AppError::from_write(e, || format!("Bookmark {} already exists", b.id)))?;
                Ok(())
            })
            .await
    }

    /// Only the position and note of a bookmark change
    pub async fn update(&self, bookmark: &Bookmark) -> Result<()> {
        let b = bookmark.clone();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE bookmarks SET position = ?, note = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                    params![b.position, b.note, b.updated_at, b.id, b.user_id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Bookmark {} not found", b.id)));
                }
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let changed = conn.execute("DELETE FROM bookmarks WHERE id = ? AND user_id = ?", [&id, &user_id])?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Bookmark {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{now, sample_user, Repository, UserRepository};

    fn insert_book(db: &DatabaseManager, id: &str) {
        let conn = db.get_connection().unwrap();
        conn.execute(
            "INSERT INTO books (id, title, is_published, created_at, updated_at) VALUES (?, ?, 1, ?, ?)",
            params![id, format!("Book {}", id), now(), now()],
        )
        .unwrap();
    }

    async fn setup() -> Arc<DatabaseManager> {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let users = UserRepository::new(db.clone());
        users.create(&sample_user("u1", "alice")).await.unwrap();
        users.create(&sample_user("u2", "bob")).await.unwrap();
        insert_book(&db, "b1");
        insert_book(&db, "b2");
        db
    }

    fn progress(id: &str, user_id: &str, book_id: &str, percentage: f64, seconds: i64) -> ReadingProgress {
        let ts = now();
        ReadingProgress {
            id: id.to_string(),
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            chapter_id: None,
            progress_percentage: percentage,
            last_position: None,
            time_spent_seconds: seconds,
            is_completed: percentage >= 100.0,
            last_read_at: ts.clone(),
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_book() {
        let db = setup().await;
        let repo = ReadingProgressRepository::new(db);

        repo.upsert(&progress("p1", "u1", "b1", 10.0, 60)).await.unwrap();
        repo.upsert(&progress("p2", "u1", "b1", 100.0, 600)).await.unwrap();
        repo.upsert(&progress("p3", "u1", "b2", 5.0, 30)).await.unwrap();

        let row = repo.find("u1", "b1").await.unwrap().unwrap();
        assert_eq!(row.id, "p1");
        assert_eq!(row.progress_percentage, 100.0);
        assert!(row.is_completed);
        assert!(repo.find("u2", "b1").await.unwrap().is_none());

        let stats = repo.stats("u1").await.unwrap();
        assert_eq!(stats.books_started, 2);
        assert_eq!(stats.books_completed, 1);
        assert_eq!(stats.total_time_spent_seconds, 630);

        let (completed, total) = repo.list_for_user("u1", Some(true), Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(completed[0].book_id, "b1");

        assert!(matches!(repo.delete("u2", "b1").await, Err(AppError::NotFound(_))));
        repo.delete("u1", "b1").await.unwrap();
        assert_eq!(repo.stats("u1").await.unwrap().books_started, 1);
    }

    #[tokio::test]
    async fn test_bookmarks_are_scoped_to_their_owner() {
        let db = setup().await;
        let repo = BookmarkRepository::new(db);
        let ts = now();
        let mut bookmark = Bookmark {
            id: "bm1".to_string(),
            user_id: "u1".to_string(),
            book_id: "b1".to_string(),
            chapter_id: None,
            position: Some("page 12".to_string()),
            note: None,
            created_at: ts.clone(),
            updated_at: ts,
        };
        repo.create(&bookmark).await.unwrap();

        assert!(repo.find_owned("bm1", "u2").await.unwrap().is_none());
        assert!(matches!(repo.delete("bm1", "u2").await, Err(AppError::NotFound(_))));

        bookmark.note = Some("great line".to_string());
        repo.update(&bookmark).await.unwrap();
        let stored = repo.find_owned("bm1", "u1").await.unwrap().unwrap();
        assert_eq!(stored.note.as_deref(), Some("great line"));

        let (items, total) = repo
            .list_for_user("u1", Some("b2".to_string()), Pagination::default())
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);

        let orphan = Bookmark {
            id: "bm2".to_string(),
            book_id: "missing".to_string(),
            ..bookmark.clone()
        };
        assert!(matches!(repo.create(&orphan).await, Err(AppError::InvalidRequest(_))));

        repo.delete("bm1", "u1").await.unwrap();
        assert!(repo.find_owned("bm1", "u1").await.unwrap().is_none());
    }
}
