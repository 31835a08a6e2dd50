//! Categories, tags, authors and publishers

use super::{fetch_all, fetch_page, Conditions, Repository};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Author, Category, Publisher, Tag};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub search: Option<String>,
    pub parent_id: Option<String>,
    pub is_active: Option<bool>,
}

/// Repository for Category entities
pub struct CategoryRepository {
    db: Arc<DatabaseManager>,
}

impl CategoryRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Active categories in display order
    pub async fn list_active(&self) -> Result<Vec<Category>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!(
                        "SELECT {} FROM categories WHERE is_active = 1 ORDER BY display_order, name",
                        Category::COLUMNS
                    ),
                    [],
                    Category::from_row,
                )
            })
            .await
    }

    pub async fn list(&self, filter: &CategoryFilter, window: Pagination) -> Result<(Vec<Category>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_search(&["name", "slug"], filter.search.as_deref())
            .push_opt("parent_id = ?", filter.parent_id.clone())
            .push_opt("is_active = ?", filter.is_active);
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "categories",
                    Category::COLUMNS,
                    &conditions,
                    "display_order, name",
                    window,
                    Category::from_row,
                )
            })
            .await
    }
}

fn category_conflict(err: rusqlite::Error, category: &Category) -> AppError {
    AppError::from_write(err, || {
        format!("Category '{}' or slug '{}' already exists", category.name, category.slug)
    })
}

#[async_trait]
impl Repository<Category> for CategoryRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Category>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM categories WHERE id = ?", Category::COLUMNS),
                        [&id],
                        Category::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Category>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM categories ORDER BY display_order, name", Category::COLUMNS),
                    [],
                    Category::from_row,
                )
            })
            .await
    }

    async fn create(&self, category: &Category) -> Result<()> {
        let category = category.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO categories (id, name, slug, description, parent_id, display_order, \
                     is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        category.id,
                        category.name,
                        category.slug,
                        category.description,
                        category.parent_id,
                        category.display_order,
                        category.is_active,
                        category.created_at,
                        category.updated_at,
                    ],
                )
                .map_err(|e| category_conflict(e, &category))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, category: &Category) -> Result<()> {
        let category = category.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE categories SET name = ?, slug = ?, description = ?, parent_id = ?, \
                         display_order = ?, is_active = ?, updated_at = ? WHERE id = ?",
                        params![
                            category.name,
                            category.slug,
                            category.description,
                            category.parent_id,
                            category.display_order,
                            category.is_active,
                            category.updated_at,
                            category.id,
                        ],
                    )
                    .map_err(|e| category_conflict(e, &category))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Category {} not found", category.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM categories WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Category {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Tag entities
pub struct TagRepository {
    db: Arc<DatabaseManager>,
}

impl TagRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<String>, window: Pagination) -> Result<(Vec<Tag>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name", "slug"], search.as_deref());
        self.db
            .execute(move |conn| fetch_page(conn, "tags", Tag::COLUMNS, &conditions, "name", window, Tag::from_row))
            .await
    }
}

fn tag_conflict(err: rusqlite::Error, tag: &Tag) -> AppError {
    AppError::from_write(err, || format!("Tag '{}' already exists", tag.name))
}

#[async_trait]
impl Repository<Tag> for TagRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Tag>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(&format!("SELECT {} FROM tags WHERE id = ?", Tag::COLUMNS), [&id], Tag::from_row)
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Tag>> {
        self.db
            .execute(|conn| {
                fetch_all(conn, &format!("SELECT {} FROM tags ORDER BY name", Tag::COLUMNS), [], Tag::from_row)
            })
            .await
    }

    async fn create(&self, tag: &Tag) -> Result<()> {
        let tag = tag.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO tags (id, name, slug, created_at) VALUES (?, ?, ?, ?)",
                    params![tag.id, tag.name, tag.slug, tag.created_at],
                )
                .map_err(|e| tag_conflict(e, &tag))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, tag: &Tag) -> Result<()> {
        let tag = tag.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE tags SET name = ?, slug = ? WHERE id = ?",
                        params![tag.name, tag.slug, tag.id],
                    )
                    .map_err(|e| tag_conflict(e, &tag))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Tag {} not found", tag.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM tags WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Tag {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Author entities
pub struct AuthorRepository {
    db: Arc<DatabaseManager>,
}

impl AuthorRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<String>, window: Pagination) -> Result<(Vec<Author>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name", "nationality"], search.as_deref());
        self.db
            .execute(move |conn| {
                fetch_page(conn, "authors", Author::COLUMNS, &conditions, "name", window, Author::from_row)
            })
            .await
    }
}

fn author_conflict(err: rusqlite::Error, author: &Author) -> AppError {
    AppError::from_write(err, || format!("An author with slug '{}' already exists", author.slug))
}

#[async_trait]
impl Repository<Author> for AuthorRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Author>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM authors WHERE id = ?", Author::COLUMNS),
                        [&id],
                        Author::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Author>> {
        self.db
            .execute(|conn| {
                fetch_all(conn, &format!("SELECT {} FROM authors ORDER BY name", Author::COLUMNS), [], Author::from_row)
            })
            .await
    }

    async fn create(&self, author: &Author) -> Result<()> {
        let author = author.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO authors (id, name, slug, biography, nationality, photo_url, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        author.id,
                        author.name,
                        author.slug,
                        author.biography,
                        author.nationality,
                        author.photo_url,
                        author.created_at,
                        author.updated_at,
                    ],
                )
                .map_err(|e| author_conflict(e, &author))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, author: &Author) -> Result<()> {
        let author = author.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE authors SET name = ?, slug = ?, biography = ?, nationality = ?, photo_url = ?, \
                         updated_at = ? WHERE id = ?",
                        params![
                            author.name,
                            author.slug,
                            author.biography,
                            author.nationality,
                            author.photo_url,
                            author.updated_at,
                            author.id,
                        ],
                    )
                    .map_err(|e| author_conflict(e, &author))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Author {} not found", author.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM authors WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Author {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Publisher entities
pub struct PublisherRepository {
    db: Arc<DatabaseManager>,
}

impl PublisherRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<String>, window: Pagination) -> Result<(Vec<Publisher>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name", "description"], search.as_deref());
        self.db
            .execute(move |conn| {
                fetch_page(conn, "publishers", Publisher::COLUMNS, &conditions, "name", window, Publisher::from_row)
            })
            .await
    }
}

fn publisher_conflict(err: rusqlite::Error, publisher: &Publisher) -> AppError {
    AppError::from_write(err, || format!("Publisher '{}' already exists", publisher.name))
}

#[async_trait]
impl Repository<Publisher> for PublisherRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Publisher>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM publishers WHERE id = ?", Publisher::COLUMNS),
                        [&id],
                        Publisher::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Publisher>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM publishers ORDER BY name", Publisher::COLUMNS),
                    [],
                    Publisher::from_row,
                )
            })
            .await
    }

    async fn create(&self, publisher: &Publisher) -> Result<()> {
        let publisher = publisher.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO publishers (id, name, slug, description, website, logo_url, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        publisher.id,
                        publisher.name,
                        publisher.slug,
                        publisher.description,
                        publisher.website,
                        publisher.logo_url,
                        publisher.created_at,
                        publisher.updated_at,
                    ],
                )
                .map_err(|e| publisher_conflict(e, &publisher))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, publisher: &Publisher) -> Result<()> {
        let publisher = publisher.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE publishers SET name = ?, slug = ?, description = ?, website = ?, logo_url = ?, \
                         updated_at = ? WHERE id = ?",
                        params![
                            publisher.name,
                            publisher.slug,
                            publisher.description,
                            publisher.website,
                            publisher.logo_url,
                            publisher.updated_at,
                            publisher.id,
                        ],
                    )
                    .map_err(|e| publisher_conflict(e, &publisher))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Publisher {} not found", publisher.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM publishers WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Publisher {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::now;

    fn category(id: &str, name: &str, slug: &str) -> Category {
        let ts = now();
        Category {
            id: id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            parent_id: None,
            display_order: 0,
            is_active: true,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_category_uniqueness_and_parent_nulling() {
        let repo = CategoryRepository::new(Arc::new(DatabaseManager::new_in_memory().unwrap()));
        repo.create(&category("c1", "Fiction", "fiction")).await.unwrap();

        let dup = category("c2", "Fiction", "fiction-2");
        assert!(matches!(repo.create(&dup).await, Err(AppError::Conflict(_))));

        let mut child = category("c3", "Fantasy", "fantasy");
        child.parent_id = Some("c1".to_string());
        repo.create(&child).await.unwrap();

        repo.delete("c1").await.unwrap();
        let child = repo.find_by_id("c3").await.unwrap().unwrap();
        assert!(child.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_tag_search_paginates() {
        let repo = TagRepository::new(Arc::new(DatabaseManager::new_in_memory().unwrap()));
        for (i, name) in ["rust", "rustacean", "go"].iter().enumerate() {
            repo.create(&Tag {
                id: format!("t{}", i),
                name: name.to_string(),
                slug: name.to_string(),
                created_at: now(),
            })
            .await
            .unwrap();
        }

        let (items, total) = repo
            .list(Some("RUST".to_string()), Pagination::new(1, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "rust");
    }

    #[tokio::test]
    async fn test_missing_author_update_is_not_found() {
        let repo = AuthorRepository::new(Arc::new(DatabaseManager::new_in_memory().unwrap()));
        let ts = now();
        let ghost = Author {
            id: "ghost".to_string(),
            name: "Nobody".to_string(),
            slug: "nobody".to_string(),
            biography: None,
            nationality: None,
            photo_url: None,
            created_at: ts.clone(),
            updated_at: ts,
        };
        assert!(matches!(repo.update(&ghost).await, Err(AppError::NotFound(_))));
    }
}
