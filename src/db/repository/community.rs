//! Reviews, discussions and notifications

use super::books::refresh_rating;
use super::{fetch_all, fetch_page, Conditions};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Discussion, Notification, Review, ReviewStatus};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFilter {
    pub book_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<ReviewStatus>,
    pub rating: Option<i64>,
}

/// Repository for Review entities
///
/// Every write recomputes the rating columns of the reviewed book inside the
/// same transaction.
pub struct ReviewRepository {
    db: Arc<DatabaseManager>,
}

impl ReviewRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Review>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_review(conn, &id)).await
    }

    pub async fn list(&self, filter: &ReviewFilter, window: Pagination) -> Result<(Vec<Review>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("book_id = ?", filter.book_id.clone())
            .push_opt("user_id = ?", filter.user_id.clone())
            .push_opt("status = ?", filter.status.map(|s| s.as_str().to_string()))
            .push_opt("rating = ?", filter.rating);
        self.db
            .execute(move |conn| {
                fetch_page(conn, "reviews", Review::COLUMNS, &conditions, "created_at DESC, id", window, Review::from_row)
            })
            .await
    }

    pub async fn create(&self, review: &Review) -> Result<()> {
        let review = review.clone();
        self.db
            .transaction(move |tx| {
                tx.execute(
                    "INSERT INTO reviews (id, user_id, book_id, rating, title, content, is_spoiler, status, \
                     created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        review.id,
                        review.user_id,
                        review.book_id,
                        review.rating,
                        review.title,
                        review.content,
                        review.is_spoiler,
                        review.status,
                        review.created_at,
                        review.updated_at,
                    ],
                )
                .map_err(|e| AppError::from_write(e, || "You have already reviewed this book".to_string()))?;
                refresh_rating(tx, &review.book_id)
            })
            .await
    }

    pub async fn update(&self, review: &Review) -> Result<()> {
        let review = review.clone();
        self.db
            .transaction(move |tx| {
                let changed = tx.execute(
                    "UPDATE reviews SET rating = ?, title = ?, content = ?, is_spoiler = ?, updated_at = ? WHERE id = ?",
                    params![
                        review.rating,
                        review.title,
                        review.content,
                        review.is_spoiler,
                        review.updated_at,
                        review.id,
                    ],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Review {} not found", review.id)));
                }
                refresh_rating(tx, &review.book_id)
            })
            .await
    }

    pub async fn set_status(&self, id: &str, status: ReviewStatus, at: &str) -> Result<Review> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .transaction(move |tx| {
                let changed = tx.execute(
                    "UPDATE reviews SET status = ?, updated_at = ? WHERE id = ?",
                    params![status.as_str(), at, id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Review {} not found", id)));
                }
                let review = find_review(tx, &id)?
                    .ok_or_else(|| AppError::NotFound(format!("Review {} not found", id)))?;
                refresh_rating(tx, &review.book_id)?;
                Ok(review)
            })
            .await
    }

    /// Delete a review, returning the book it belonged to
    pub async fn delete(&self, id: &str) -> Result<String> {
        let id = id.to_string();
        self.db
            .transaction(move |tx| {
                let review = find_review(tx, &id)?
                    .ok_or_else(|| AppError::NotFound(format!("Review {} not found", id)))?;
                tx.execute("DELETE FROM reviews WHERE id = ?", [&id])?;
                refresh_rating(tx, &review.book_id)?;
                Ok(review.book_id)
            })
            .await
    }
}

fn find_review(conn: &Connection, id: &str) -> Result<Option<Review>> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM reviews WHERE id = ?", Review::COLUMNS), [id], Review::from_row)
        .optional()?)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscussionFilter {
    pub book_id: Option<String>,
    pub user_id: Option<String>,
    pub is_hidden: Option<bool>,
    pub is_pinned: Option<bool>,
}

/// Repository for Discussion entities
pub struct DiscussionRepository {
    db: Arc<DatabaseManager>,
}

impl DiscussionRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Discussion>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_discussion(conn, &id)).await
    }

    /// Visible top-level threads of a book, pinned first
    pub async fn list_threads(&self, book_id: &str, window: Pagination) -> Result<(Vec<Discussion>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_value("book_id = ?", book_id.to_string())
            .push("parent_id IS NULL")
            .push("is_hidden = 0");
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "discussions",
                    Discussion::COLUMNS,
                    &conditions,
                    "is_pinned DESC, created_at DESC, id",
                    window,
                    Discussion::from_row,
                )
            })
            .await
    }

    /// Visible replies in posting order
    pub async fn replies(&self, parent_id: &str) -> Result<Vec<Discussion>> {
        let parent_id = parent_id.to_string();
        self.db
            .execute(move |conn| {
                fetch_all(
                    conn,
                    &format!(
                        "SELECT {} FROM discussions WHERE parent_id = ? AND is_hidden = 0 ORDER BY created_at, id",
                        Discussion::COLUMNS
                    ),
                    [&parent_id],
                    Discussion::from_row,
                )
            })
            .await
    }

    pub async fn list(&self, filter: &DiscussionFilter, window: Pagination) -> Result<(Vec<Discussion>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("book_id = ?", filter.book_id.clone())
            .push_opt("user_id = ?", filter.user_id.clone())
            .push_opt("is_hidden = ?", filter.is_hidden)
            .push_opt("is_pinned = ?", filter.is_pinned);
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "discussions",
                    Discussion::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    Discussion::from_row,
                )
            })
            .await
    }

    /// Insert a post; its chapter and parent must belong to the same book
    pub async fn create(&self, discussion: &Discussion) -> Result<()> {
        let discussion = discussion.clone();
        self.db
            .execute(move |conn| {
                if let Some(chapter_id) = &discussion.chapter_id {
                    let same_book: Option<String> = conn
                        .query_row("SELECT book_id FROM chapters WHERE id = ?", [chapter_id], |row| row.get(0))
                        .optional()?;
                    match same_book {
                        None => return Err(AppError::NotFound(format!("Chapter {} not found", chapter_id))),
                        Some(book_id) if book_id != discussion.book_id => {
                            return Err(AppError::InvalidRequest(
                                "Chapter does not belong to this book".to_string(),
                            ))
                        }
                        Some(_) => {}
                    }
                }
                if let Some(parent_id) = &discussion.parent_id {
                    let parent = find_discussion(conn, parent_id)?
                        .ok_or_else(|| AppError::NotFound(format!("Discussion {} not found", parent_id)))?;
                    if parent.book_id != discussion.book_id {
                        return Err(AppError::InvalidRequest(
                            "Parent discussion belongs to another book".to_string(),
                        ));
                    }
                }

                conn.execute(
                    "INSERT INTO discussions (id, user_id, book_id, chapter_id, parent_id, title, content, is_pinned, \
                     is_spoiler, is_hidden, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        discussion.id,
                        discussion.user_id,
                        discussion.book_id,
                        discussion.chapter_id,
                        discussion.parent_id,
                        discussion.title,
                        discussion.content,
                        discussion.is_pinned,
                        discussion.is_spoiler,
                        discussion.is_hidden,
                        discussion.created_at,
                        discussion.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn update(&self, discussion: &Discussion) -> Result<()> {
        let discussion = discussion.clone();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE discussions SET title = ?, content = ?, is_spoiler = ?, updated_at = ? WHERE id = ?",
                    params![
                        discussion.title,
                        discussion.content,
                        discussion.is_spoiler,
                        discussion.updated_at,
                        discussion.id,
                    ],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Discussion {} not found", discussion.id)));
                }
                Ok(())
            })
            .await
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool, at: &str) -> Result<Discussion> {
        self.set_flag(id, "is_pinned", pinned, at).await
    }

    pub async fn set_hidden(&self, id: &str, hidden: bool, at: &str) -> Result<Discussion> {
        self.set_flag(id, "is_hidden", hidden, at).await
    }

    async fn set_flag(&self, id: &str, column: &'static str, value: bool, at: &str) -> Result<Discussion> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    &format!("UPDATE discussions SET {} = ?, updated_at = ? WHERE id = ?", column),
                    params![value, at, id],
                )?;
                find_discussion(conn, &id)?.ok_or_else(|| AppError::NotFound(format!("Discussion {} not found", id)))
            })
            .await
    }

    /// Delete a post together with its replies
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM discussions WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Discussion {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

fn find_discussion(conn: &Connection, id: &str) -> Result<Option<Discussion>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM discussions WHERE id = ?", Discussion::COLUMNS),
            [id],
            Discussion::from_row,
        )
        .optional()?)
}

/// Repository for Notification entities
pub struct NotificationRepository {
    db: Arc<DatabaseManager>,
}

impl NotificationRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn create(&self, notification: &Notification) -> Result<()> {
        self.create_many(vec![notification.clone()]).await.map(|_| ())
    }

    /// Insert a batch atomically, returning how many were written
    pub async fn create_many(&self, notifications: Vec<Notification>) -> Result<usize> {
        self.db
            .transaction(move |tx| {
                let mut stmt = tx.prepare(
                    "INSERT INTO notifications (id, user_id, kind, title, message, link, is_read, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )?;
                for n in &notifications {
                    stmt.execute(params![n.id, n.user_id, n.kind, n.title, n.message, n.link, n.is_read, n.created_at])
                        .map_err(|e| AppError::from_write(e, || format!("Notification {} already exists", n.id)))?;
                }
                Ok(notifications.len())
            })
            .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        window: Pagination,
    ) -> Result<(Vec<Notification>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_value("user_id = ?", user_id.to_string());
        if unread_only {
            conditions.push("is_read = 0");
        }
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "notifications",
                    Notification::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    Notification::from_row,
                )
            })
            .await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
                    [&user_id],
                    |row| row.get(0),
                )?)
            })
            .await
    }

    /// Mark one of the user's notifications read
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
                    [&id, &user_id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Notification {} not found", id)));
                }
                Ok(())
            })
            .await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
                    [&user_id],
                )?)
            })
            .await
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM notifications WHERE id = ? AND user_id = ?", [&id, &user_id])? == 0 {
                    return Err(AppError::NotFound(format!("Notification {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::books::tests::sample_book;
    use crate::db::repository::users::tests::sample_user;
    use crate::db::repository::{now, BookRepository, Repository, UserRepository};

    async fn setup() -> (Arc<DatabaseManager>, BookRepository) {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let users = UserRepository::new(db.clone());
        users.create(&sample_user("u1", "ann")).await.unwrap();
        users.create(&sample_user("u2", "bob")).await.unwrap();
        let books = BookRepository::new(db.clone());
        books.create(&sample_book("b1", "Dune")).await.unwrap();
        books.create(&sample_book("b2", "Emma")).await.unwrap();
        (db, books)
    }

    fn review(id: &str, user_id: &str, rating: i64) -> Review {
        let ts = now();
        Review {
            id: id.to_string(),
            user_id: user_id.to_string(),
            book_id: "b1".to_string(),
            rating,
            title: None,
            content: None,
            is_spoiler: false,
            status: ReviewStatus::Approved.as_str().to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_rating_tracks_approved_reviews() {
        let (db, books) = setup().await;
        let reviews = ReviewRepository::new(db);

        reviews.create(&review("r1", "u1", 5)).await.unwrap();
        reviews.create(&review("r2", "u2", 2)).await.unwrap();
        let book = books.find_by_id("b1").await.unwrap().unwrap();
        assert_eq!(book.review_count, 2);
        assert!((book.avg_rating - 3.5).abs() < 1e-9);

        reviews.set_status("r2", ReviewStatus::Rejected, &now()).await.unwrap();
        let book = books.find_by_id("b1").await.unwrap().unwrap();
        assert_eq!(book.review_count, 1);
        assert!((book.avg_rating - 5.0).abs() < 1e-9);

        assert!(matches!(
            reviews.create(&review("r3", "u1", 4)).await,
            Err(AppError::Conflict(_))
        ));

        reviews.delete("r1").await.unwrap();
        let book = books.find_by_id("b1").await.unwrap().unwrap();
        assert_eq!(book.review_count, 0);
        assert_eq!(book.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn test_discussion_parent_must_share_book() {
        let (db, _) = setup().await;
        let discussions = DiscussionRepository::new(db);
        let ts = now();
        let thread = Discussion {
            id: "d1".to_string(),
            user_id: "u1".to_string(),
            book_id: "b1".to_string(),
            chapter_id: None,
            parent_id: None,
            title: Some("Thoughts".to_string()),
            content: "Loved it".to_string(),
            is_pinned: false,
            is_spoiler: false,
            is_hidden: false,
            created_at: ts.clone(),
            updated_at: ts,
        };
        discussions.create(&thread).await.unwrap();

        let stray = Discussion {
            id: "d2".to_string(),
            book_id: "b2".to_string(),
            parent_id: Some("d1".to_string()),
            ..thread.clone()
        };
        assert!(matches!(discussions.create(&stray).await, Err(AppError::InvalidRequest(_))));

        let reply = Discussion {
            id: "d3".to_string(),
            parent_id: Some("d1".to_string()),
            ..thread
        };
        discussions.create(&reply).await.unwrap();
        assert_eq!(discussions.replies("d1").await.unwrap().len(), 1);

        let (threads, total) = discussions.list_threads("b1", Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(threads[0].id, "d1");

        discussions.set_hidden("d1", true, &now()).await.unwrap();
        assert_eq!(discussions.list_threads("b1", Pagination::default()).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_notifications_are_scoped_to_owner() {
        let (db, _) = setup().await;
        let notifications = NotificationRepository::new(db);
        let batch = ["u1", "u1", "u2"]
            .iter()
            .enumerate()
            .map(|(i, user_id)| Notification {
                id: format!("n{}", i),
                user_id: user_id.to_string(),
                kind: "system".to_string(),
                title: "Hello".to_string(),
                message: "Welcome".to_string(),
                link: None,
                is_read: false,
                created_at: now(),
            })
            .collect();
        assert_eq!(notifications.create_many(batch).await.unwrap(), 3);

        assert!(matches!(notifications.mark_read("n2", "u1").await, Err(AppError::NotFound(_))));
        notifications.mark_read("n0", "u1").await.unwrap();
        assert_eq!(notifications.unread_count("u1").await.unwrap(), 1);
        assert_eq!(notifications.mark_all_read("u1").await.unwrap(), 1);

        let (unread, total) = notifications
            .list_for_user("u1", true, Pagination::default())
            .await
            .unwrap();
        assert!(unread.is_empty());
        assert_eq!(total, 0);
    }
}
