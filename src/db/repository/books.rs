//! Books and chapters

use super::{exists, fetch_all, fetch_page, Conditions, Repository};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Author, Book, BookDetail, Category, Chapter, Publisher, Tag};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BOOK_ORDER_COLUMNS: &[&str] = &["created_at", "title", "avg_rating", "view_count", "publication_date"];

/// Listing filters shared by the public and admin book lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookFilter {
    pub search: Option<String>,
    pub category_id: Option<String>,
    pub tag_id: Option<String>,
    pub author_id: Option<String>,
    pub publisher_id: Option<String>,
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
}

impl BookFilter {
    fn order_sql(&self) -> Result<String> {
        let column = self.order_by.as_deref().unwrap_or("created_at");
        if !BOOK_ORDER_COLUMNS.contains(&column) {
            return Err(AppError::ValidationError(format!(
                "order_by must be one of: {}",
                BOOK_ORDER_COLUMNS.join(", ")
            )));
        }
        let direction = if self.order_desc.unwrap_or(true) { "DESC" } else { "ASC" };
        Ok(format!("{} {}, id ASC", column, direction))
    }

    fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        conditions
            .push("is_deleted = 0")
            .push_search(&["title", "subtitle", "isbn"], self.search.as_deref())
            .push_opt(
                "id IN (SELECT book_id FROM book_categories WHERE category_id = ?)",
                self.category_id.clone(),
            )
            .push_opt("id IN (SELECT book_id FROM book_tags WHERE tag_id = ?)", self.tag_id.clone())
            .push_opt(
                "id IN (SELECT book_id FROM book_authors WHERE author_id = ?)",
                self.author_id.clone(),
            )
            .push_opt("publisher_id = ?", self.publisher_id.clone())
            .push_opt("is_published = ?", self.is_published)
            .push_opt("is_featured = ?", self.is_featured);
        conditions
    }
}

/// Related records of a book; `None` leaves that relation untouched on update
#[derive(Debug, Clone, Default)]
pub struct BookRelations {
    pub author_ids: Option<Vec<String>>,
    pub category_ids: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

/// Catalog totals for the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookStatistics {
    pub total_books: i64,
    pub published_books: i64,
    pub featured_books: i64,
    pub total_chapters: i64,
    pub total_reviews: i64,
    pub average_rating: f64,
}

/// Repository for Book entities
pub struct BookRepository {
    db: Arc<DatabaseManager>,
}

impl BookRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Non-deleted books matching `filter`
    pub async fn list(&self, filter: &BookFilter, window: Pagination) -> Result<(Vec<Book>, i64)> {
        let order = filter.order_sql()?;
        let conditions = filter.conditions();
        self.db
            .execute(move |conn| fetch_page(conn, "books", Book::COLUMNS, &conditions, &order, window, Book::from_row))
            .await
    }

    /// Published featured books, best rated first
    pub async fn featured(&self, limit: u32) -> Result<Vec<Book>> {
        self.db
            .execute(move |conn| {
                fetch_all(
                    conn,
                    &format!(
                        "SELECT {} FROM books WHERE is_featured = 1 AND is_published = 1 AND is_deleted = 0 \
                         ORDER BY avg_rating DESC, created_at DESC LIMIT ?",
                        Book::COLUMNS
                    ),
                    [limit as i64],
                    Book::from_row,
                )
            })
            .await
    }

    /// Book with publisher, authors, categories and tags
    pub async fn find_detail(&self, id: &str, published_only: bool) -> Result<Option<BookDetail>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let Some(book) = find_book(conn, &id)? else {
                    return Ok(None);
                };
                if published_only && !book.is_published {
                    return Ok(None);
                }
                load_detail(conn, book).map(Some)
            })
            .await
    }

    /// Insert a book and link its relations in one transaction
    pub async fn create_with_relations(&self, book: &Book, relations: BookRelations) -> Result<BookDetail> {
        let book = book.clone();
        self.db
            .transaction(move |tx| {
                insert_book(tx, &book)?;
                link_relations(tx, &book.id, &relations)?;
                load_detail(tx, book)
            })
            .await
    }

    /// Update a book and replace the relations that are given
    pub async fn update_with_relations(&self, book: &Book, relations: BookRelations) -> Result<BookDetail> {
        let book = book.clone();
        self.db
            .transaction(move |tx| {
                update_book(tx, &book)?;
                link_relations(tx, &book.id, &relations)?;
                load_detail(tx, book)
            })
            .await
    }

    pub async fn increment_view_count(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("UPDATE books SET view_count = view_count + 1 WHERE id = ?", [&id])?;
                Ok(())
            })
            .await
    }

    pub async fn set_published(&self, id: &str, published: bool, updated_at: &str) -> Result<()> {
        self.set_flag(id, "is_published", published, updated_at).await
    }

    pub async fn set_featured(&self, id: &str, featured: bool, updated_at: &str) -> Result<()> {
        self.set_flag(id, "is_featured", featured, updated_at).await
    }

    async fn set_flag(&self, id: &str, column: &'static str, value: bool, updated_at: &str) -> Result<()> {
        let id = id.to_string();
        let updated_at = updated_at.to_string();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    &format!("UPDATE books SET {} = ?, updated_at = ? WHERE id = ? AND is_deleted = 0", column),
                    params![value, updated_at, id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Book {} not found", id)));
                }
                Ok(())
            })
            .await
    }

    pub async fn statistics(&self) -> Result<BookStatistics> {
        self.db
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT \
                       (SELECT COUNT(*) FROM books WHERE is_deleted = 0), \
                       (SELECT COUNT(*) FROM books WHERE is_deleted = 0 AND is_published = 1), \
                       (SELECT COUNT(*) FROM books WHERE is_deleted = 0 AND is_featured = 1), \
                       (SELECT COUNT(*) FROM chapters c JOIN books b ON b.id = c.book_id WHERE b.is_deleted = 0), \
                       (SELECT COUNT(*) FROM reviews WHERE status = 'approved'), \
                       (SELECT COALESCE(AVG(rating), 0) FROM reviews WHERE status = 'approved')",
                    [],
                    |row| {
                        Ok(BookStatistics {
                            total_books: row.get(0)?,
                            published_books: row.get(1)?,
                            featured_books: row.get(2)?,
                            total_chapters: row.get(3)?,
                            total_reviews: row.get(4)?,
                            average_rating: row.get(5)?,
                        })
                    },
                )?)
            })
            .await
    }
}

/// Recompute the cached rating columns from approved reviews
pub(crate) fn refresh_rating(conn: &Connection, book_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE books SET \
           avg_rating = COALESCE((SELECT AVG(rating) FROM reviews WHERE book_id = ?1 AND status = 'approved'), 0), \
           review_count = (SELECT COUNT(*) FROM reviews WHERE book_id = ?1 AND status = 'approved') \
         WHERE id = ?1",
        [book_id],
    )?;
    Ok(())
}

fn find_book(conn: &Connection, id: &str) -> Result<Option<Book>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM books WHERE id = ? AND is_deleted = 0", Book::COLUMNS),
            [id],
            Book::from_row,
        )
        .optional()?)
}

fn insert_book(conn: &Connection, book: &Book) -> Result<()> {
    conn.execute(
        "INSERT INTO books (id, isbn, title, subtitle, description, publisher_id, language, page_count, \
         publication_date, cover_url, is_featured, is_published, avg_rating, review_count, view_count, \
         is_deleted, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            book.id,
            book.isbn,
            book.title,
            book.subtitle,
            book.description,
            book.publisher_id,
            book.language,
            book.page_count,
            book.publication_date,
            book.cover_url,
            book.is_featured,
            book.is_published,
            book.avg_rating,
            book.review_count,
            book.view_count,
            book.is_deleted,
            book.created_at,
            book.updated_at,
        ],
    )
    .map_err(|e| isbn_conflict(e, book))?;
    Ok(())
}

fn update_book(conn: &Connection, book: &Book) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE books SET isbn = ?, title = ?, subtitle = ?, description = ?, publisher_id = ?, \
             language = ?, page_count = ?, publication_date = ?, cover_url = ?, is_featured = ?, \
             is_published = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
            params![
                book.isbn,
                book.title,
                book.subtitle,
                book.description,
                book.publisher_id,
                book.language,
                book.page_count,
                book.publication_date,
                book.cover_url,
                book.is_featured,
                book.is_published,
                book.updated_at,
                book.id,
            ],
        )
        .map_err(|e| isbn_conflict(e, book))?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("Book {} not found", book.id)));
    }
    Ok(())
}

fn isbn_conflict(err: rusqlite::Error, book: &Book) -> AppError {
    AppError::from_write(err, || {
        format!("A book with ISBN {} already exists", book.isbn.as_deref().unwrap_or_default())
    })
}

fn link_relations(conn: &Connection, book_id: &str, relations: &BookRelations) -> Result<()> {
    let links: [(&str, &str, &str, &Option<Vec<String>>); 3] = [
        ("book_authors", "author_id", "authors", &relations.author_ids),
        ("book_categories", "category_id", "categories", &relations.category_ids),
        ("book_tags", "tag_id", "tags", &relations.tag_ids),
    ];

    for (join_table, column, target, ids) in links {
        let Some(ids) = ids else { continue };
        conn.execute(&format!("DELETE FROM {} WHERE book_id = ?", join_table), [book_id])?;
        for id in ids {
            if !exists(conn, target, id)? {
                return Err(AppError::NotFound(format!(
                    "{} {} not found",
                    singular(target),
                    id
                )));
            }
            conn.execute(
                &format!("INSERT OR IGNORE INTO {} (book_id, {}) VALUES (?, ?)", join_table, column),
                [book_id, id.as_str()],
            )?;
        }
    }
    Ok(())
}

fn singular(table: &str) -> &'static str {
    match table {
        "authors" => "Author",
        "categories" => "Category",
        _ => "Tag",
    }
}

fn load_detail(conn: &Connection, book: Book) -> Result<BookDetail> {
    let publisher = match &book.publisher_id {
        Some(publisher_id) => conn
            .query_row(
                &format!("SELECT {} FROM publishers WHERE id = ?", Publisher::COLUMNS),
                [publisher_id],
                Publisher::from_row,
            )
            .optional()?,
        None => None,
    };
    let authors = fetch_all(
        conn,
        &format!(
            "SELECT {} FROM authors WHERE id IN (SELECT author_id FROM book_authors WHERE book_id = ?) ORDER BY name",
            Author::COLUMNS
        ),
        [&book.id],
        Author::from_row,
    )?;
    let categories = fetch_all(
        conn,
        &format!(
            "SELECT {} FROM categories WHERE id IN (SELECT category_id FROM book_categories WHERE book_id = ?) \
             ORDER BY display_order, name",
            Category::COLUMNS
        ),
        [&book.id],
        Category::from_row,
    )?;
    let tags = fetch_all(
        conn,
        &format!(
            "SELECT {} FROM tags WHERE id IN (SELECT tag_id FROM book_tags WHERE book_id = ?) ORDER BY name",
            Tag::COLUMNS
        ),
        [&book.id],
        Tag::from_row,
    )?;

    Ok(BookDetail {
        book,
        publisher,
        authors,
        categories,
        tags,
    })
}

#[async_trait]
impl Repository<Book> for BookRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Book>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_book(conn, &id)).await
    }

    async fn find_all(&self) -> Result<Vec<Book>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM books WHERE is_deleted = 0 ORDER BY created_at DESC", Book::COLUMNS),
                    [],
                    Book::from_row,
                )
            })
            .await
    }

    async fn create(&self, book: &Book) -> Result<()> {
        let book = book.clone();
        self.db.execute(move |conn| insert_book(conn, &book)).await
    }

    async fn update(&self, book: &Book) -> Result<()> {
        let book = book.clone();
        self.db.execute(move |conn| update_book(conn, &book)).await
    }

    /// Soft delete
    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let updated_at = super::now();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE books SET is_deleted = 1, is_published = 0, is_featured = 0, updated_at = ? \
                     WHERE id = ? AND is_deleted = 0",
                    params![updated_at, id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Book {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Chapter entities
pub struct ChapterRepository {
    db: Arc<DatabaseManager>,
}

impl ChapterRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Chapters of a book ordered by number
    pub async fn list_for_book(&self, book_id: &str, published_only: bool) -> Result<Vec<Chapter>> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                let filter = if published_only { " AND is_published = 1" } else { "" };
                fetch_all(
                    conn,
                    &format!(
                        "SELECT {} FROM chapters WHERE book_id = ?{} ORDER BY number",
                        Chapter::COLUMNS,
                        filter
                    ),
                    [&book_id],
                    Chapter::from_row,
                )
            })
            .await
    }

    pub async fn find_by_number(&self, book_id: &str, number: i64) -> Result<Option<Chapter>> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM chapters WHERE book_id = ? AND number = ?", Chapter::COLUMNS),
                        params![book_id, number],
                        Chapter::from_row,
                    )
                    .optional()?)
            })
            .await
    }
}

fn chapter_conflict(err: rusqlite::Error, chapter: &Chapter) -> AppError {
    AppError::from_write(err, || {
        format!("Chapter {} already exists for this book", chapter.number)
    })
}

#[async_trait]
impl Repository<Chapter> for ChapterRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Chapter>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM chapters WHERE id = ?", Chapter::COLUMNS),
                        [&id],
                        Chapter::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Chapter>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM chapters ORDER BY book_id, number", Chapter::COLUMNS),
                    [],
                    Chapter::from_row,
                )
            })
            .await
    }

    async fn create(&self, chapter: &Chapter) -> Result<()> {
        let chapter = chapter.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO chapters (id, book_id, number, title, content, word_count, is_free, \
                     is_published, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        chapter.id,
                        chapter.book_id,
                        chapter.number,
                        chapter.title,
                        chapter.content,
                        chapter.word_count,
                        chapter.is_free,
                        chapter.is_published,
                        chapter.created_at,
                        chapter.updated_at,
                    ],
                )
                .map_err(|e| chapter_conflict(e, &chapter))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, chapter: &Chapter) -> Result<()> {
        let chapter = chapter.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE chapters SET number = ?, title = ?, content = ?, word_count = ?, is_free = ?, \
                         is_published = ?, updated_at = ? WHERE id = ?",
                        params![
                            chapter.number,
                            chapter.title,
                            chapter.content,
                            chapter.word_count,
                            chapter.is_free,
                            chapter.is_published,
                            chapter.updated_at,
                            chapter.id,
                        ],
                    )
                    .map_err(|e| chapter_conflict(e, &chapter))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Chapter {} not found", chapter.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM chapters WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Chapter {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repository::now;

    pub(crate) fn sample_book(id: &str, title: &str) -> Book {
        let ts = now();
        Book {
            id: id.to_string(),
            isbn: None,
            title: title.to_string(),
            subtitle: None,
            description: None,
            publisher_id: None,
            language: "en".to_string(),
            page_count: None,
            publication_date: None,
            cover_url: None,
            is_featured: false,
            is_published: true,
            avg_rating: 0.0,
            review_count: 0,
            view_count: 0,
            is_deleted: false,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    fn repos() -> (BookRepository, ChapterRepository) {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        (BookRepository::new(db.clone()), ChapterRepository::new(db))
    }

    #[tokio::test]
    async fn test_duplicate_isbn_conflicts() {
        let (books, _) = repos();
        let mut first = sample_book("b1", "First");
        first.isbn = Some("978-0".to_string());
        books.create(&first).await.unwrap();

        let mut second = sample_book("b2", "Second");
        second.isbn = Some("978-0".to_string());
        let err = books.create(&second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_relation_rolls_back() {
        let (books, _) = repos();
        let relations = BookRelations {
            author_ids: Some(vec!["missing".to_string()]),
            ..Default::default()
        };
        let err = books
            .create_with_relations(&sample_book("b1", "Orphan"), relations)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(books.find_by_id("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters_and_soft_delete() {
        let (books, _) = repos();
        books.create(&sample_book("b1", "Rust in Action")).await.unwrap();
        let mut draft = sample_book("b2", "Rusty Drafts");
        draft.is_published = false;
        books.create(&draft).await.unwrap();
        books.create(&sample_book("b3", "Gardening")).await.unwrap();

        let filter = BookFilter {
            search: Some("rust".to_string()),
            is_published: Some(true),
            ..Default::default()
        };
        let (items, total) = books.list(&filter, Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, "b1");

        books.delete("b1").await.unwrap();
        assert!(books.find_by_id("b1").await.unwrap().is_none());
        assert!(matches!(books.delete("b1").await, Err(AppError::NotFound(_))));

        let bad_order = BookFilter {
            order_by: Some("password".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            books.list(&bad_order, Pagination::default()).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_chapter_number_unique_per_book() {
        let (books, chapters) = repos();
        books.create(&sample_book("b1", "Book")).await.unwrap();

        let ts = now();
        let chapter = Chapter {
            id: "c1".to_string(),
            book_id: "b1".to_string(),
            number: 1,
            title: "One".to_string(),
            content: "a b c".to_string(),
            word_count: 3,
            is_free: true,
            is_published: true,
            created_at: ts.clone(),
            updated_at: ts,
        };
        chapters.create(&chapter).await.unwrap();

        let duplicate = Chapter { id: "c2".to_string(), ..chapter };
        assert!(matches!(chapters.create(&duplicate).await, Err(AppError::Conflict(_))));
        assert_eq!(chapters.list_for_book("b1", true).await.unwrap().len(), 1);
    }
}
