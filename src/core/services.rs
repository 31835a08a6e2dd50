//! Business logic services
//!
//! This module implements the application layer that sits between the REST
//! handlers and the repositories: request validation, construction of
//! records from requests, read-through caching of catalog queries and cache
//! invalidation after writes.

use crate::api::models::{
    CreateAuthorRequest, CreateBookRequest, CreateCategoryRequest, CreateChapterRequest,
    CreatePlanRequest, CreatePublisherRequest, CreateReviewRequest, SubscribeRequest, TagRequest,
    UpdateAuthorRequest, UpdateBookRequest, UpdateCategoryRequest, UpdateChapterRequest,
    UpdatePlanRequest, UpdatePublisherRequest, UpdateReviewRequest,
};
use crate::cache::{hashed_key, CacheManager};
use crate::core::error::{AppError, Result};
use crate::core::pagination::{Page, Pagination};
use crate::core::utils::{require_non_empty, slug_or_derive, word_count};
use crate::db::models::{
    Author, Book, BookDetail, Category, Chapter, ChapterSummary, Notification, Payment,
    PaymentStatus, Publisher, Review, ReviewStatus, Subscription, SubscriptionPlan,
    SubscriptionStatus, Tag,
};
use crate::db::repository::{
    new_id, now, AuthorRepository, BookFilter, BookRelations, BookRepository, BookStatistics,
    CategoryFilter, CategoryRepository, ChapterRepository, NotificationRepository, PaymentRepository,
    PlanRepository, PublisherRepository, Repository, ReviewFilter, ReviewRepository,
    SubscriptionRepository, TagRepository,
};
use chrono::{Duration, SecondsFormat, Utc};
use std::sync::Arc;

/// Cache tags
pub const BOOKS_TAG: &str = "books";
pub const CATEGORIES_TAG: &str = "categories";
pub const TAGS_TAG: &str = "tags";

fn book_tag(id: &str) -> String {
    format!("book:{}", id)
}

fn not_found(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", kind, id))
}

/// Book service for catalog reads and admin book management
pub struct BookService {
    books: Arc<BookRepository>,
    chapters: Arc<ChapterRepository>,
    cache: Arc<CacheManager>,
}

impl BookService {
    pub fn new(
        books: Arc<BookRepository>,
        chapters: Arc<ChapterRepository>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            books,
            chapters,
            cache,
        }
    }

    /// Published books matching the filter (cached)
    pub async fn list_published(&self, mut filter: BookFilter, window: Pagination) -> Result<Page<Book>> {
        filter.is_published = Some(true);
        let key = hashed_key("books:list", &(&filter, window.page, window.size, window.offset));
        let books = self.books.clone();
        self.cache
            .get_or_insert_with(&key, None, &[BOOKS_TAG], || async move {
                let (items, total) = books.list(&filter, window).await?;
                Ok::<_, AppError>(Page::new(items, total, window))
            })
            .await
    }

    /// Featured published books (cached)
    pub async fn featured(&self, limit: u32) -> Result<Vec<Book>> {
        if limit == 0 || limit > 100 {
            return Err(AppError::ValidationError(
                "limit must be between 1 and 100".to_string(),
            ));
        }
        let books = self.books.clone();
        self.cache
            .get_or_insert_with(
                &format!("books:featured:{}", limit),
                None,
                &[BOOKS_TAG],
                || async move { books.featured(limit).await },
            )
            .await
    }

    /// Published book detail; every read counts as a view
    pub async fn published_detail(&self, id: &str) -> Result<BookDetail> {
        let books = self.books.clone();
        let book_id = id.to_string();
        let detail = self
            .cache
            .get_or_insert_with(
                &format!("books:detail:{}", id),
                None,
                &[BOOKS_TAG, &book_tag(id)],
                || async move {
                    books
                        .find_detail(&book_id, true)
                        .await?
                        .ok_or_else(|| not_found("Book", &book_id))
                },
            )
            .await?;

        self.books.increment_view_count(id).await?;
        Ok(detail)
    }

    /// Any non-deleted book, published or not
    pub async fn list_all(&self, filter: &BookFilter, window: Pagination) -> Result<Page<Book>> {
        let (items, total) = self.books.list(filter, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_book(&self, id: &str) -> Result<BookDetail> {
        self.books
            .find_detail(id, false)
            .await?
            .ok_or_else(|| not_found("Book", id))
    }

    pub async fn statistics(&self) -> Result<BookStatistics> {
        self.books.statistics().await
    }

    /// Create a book and link its authors, categories and tags
    pub async fn create_book(&self, request: CreateBookRequest) -> Result<BookDetail> {
        require_non_empty("title", &request.title)?;
        validate_page_count(request.page_count)?;

        let ts = now();
        let book = Book {
            id: new_id(),
            isbn: request.isbn.map(|isbn| isbn.trim().to_string()).filter(|isbn| !isbn.is_empty()),
            title: request.title.trim().to_string(),
            subtitle: request.subtitle,
            description: request.description,
            publisher_id: request.publisher_id,
            language: request.language,
            page_count: request.page_count,
            publication_date: request.publication_date,
            cover_url: request.cover_url,
            is_featured: request.is_featured,
            is_published: request.is_published,
            avg_rating: 0.0,
            review_count: 0,
            view_count: 0,
            is_deleted: false,
            created_at: ts.clone(),
            updated_at: ts,
        };
        let relations = BookRelations {
            author_ids: Some(request.author_ids),
            category_ids: Some(request.category_ids),
            tag_ids: Some(request.tag_ids),
        };

        let detail = self.books.create_with_relations(&book, relations).await?;
        self.invalidate_book(&detail.book.id).await;
        tracing::info!(book_id = %detail.book.id, title = %detail.book.title, "Book created");
        Ok(detail)
    }

    /// Apply the given fields; relation lists that are present replace the old links
    pub async fn update_book(&self, id: &str, request: UpdateBookRequest) -> Result<BookDetail> {
        let mut book = self
            .books
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Book", id))?;

        if let Some(title) = request.title {
            require_non_empty("title", &title)?;
            book.title = title.trim().to_string();
        }
        if let Some(isbn) = request.isbn {
            let isbn = isbn.trim().to_string();
            book.isbn = if isbn.is_empty() { None } else { Some(isbn) };
        }
        if let Some(subtitle) = request.subtitle {
            book.subtitle = Some(subtitle);
        }
        if let Some(description) = request.description {
            book.description = Some(description);
        }
        if let Some(publisher_id) = request.publisher_id {
            book.publisher_id = Some(publisher_id);
        }
        if let Some(language) = request.language {
            book.language = language;
        }
        if request.page_count.is_some() {
            validate_page_count(request.page_count)?;
            book.page_count = request.page_count;
        }
        if let Some(publication_date) = request.publication_date {
            book.publication_date = Some(publication_date);
        }
        if let Some(cover_url) = request.cover_url {
            book.cover_url = Some(cover_url);
        }
        if let Some(is_featured) = request.is_featured {
            book.is_featured = is_featured;
        }
        if let Some(is_published) = request.is_published {
            book.is_published = is_published;
        }
        book.updated_at = now();

        let relations = BookRelations {
            author_ids: request.author_ids,
            category_ids: request.category_ids,
            tag_ids: request.tag_ids,
        };
        let detail = self.books.update_with_relations(&book, relations).await?;
        self.invalidate_book(id).await;
        Ok(detail)
    }

    /// Soft delete
    pub async fn delete_book(&self, id: &str) -> Result<()> {
        self.books.delete(id).await?;
        self.invalidate_book(id).await;
        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }

    pub async fn set_published(&self, id: &str, published: bool) -> Result<BookDetail> {
        self.books.set_published(id, published, &now()).await?;
        self.invalidate_book(id).await;
        self.get_book(id).await
    }

    pub async fn set_featured(&self, id: &str, featured: bool) -> Result<BookDetail> {
        self.books.set_featured(id, featured, &now()).await?;
        self.invalidate_book(id).await;
        self.get_book(id).await
    }

    async fn invalidate_book(&self, id: &str) {
        self.cache.invalidate_tags(&[BOOKS_TAG, &book_tag(id)]).await;
    }

    async fn require_book(&self, id: &str, published_only: bool) -> Result<Book> {
        match self.books.find_by_id(id).await? {
            Some(book) if !published_only || book.is_published => Ok(book),
            _ => Err(not_found("Book", id)),
        }
    }

    /// Table of contents of a published book
    pub async fn published_chapters(&self, book_id: &str) -> Result<Vec<ChapterSummary>> {
        self.require_book(book_id, true).await?;
        let chapters = self.chapters.list_for_book(book_id, true).await?;
        Ok(chapters.into_iter().map(ChapterSummary::from).collect())
    }

    /// A published chapter of a published book, including its text
    pub async fn published_chapter(&self, book_id: &str, number: i64) -> Result<Chapter> {
        self.require_book(book_id, true).await?;
        match self.chapters.find_by_number(book_id, number).await? {
            Some(chapter) if chapter.is_published => Ok(chapter),
            _ => Err(AppError::NotFound(format!(
                "Chapter {} of book {} not found",
                number, book_id
            ))),
        }
    }

    pub async fn list_chapters(&self, book_id: &str) -> Result<Vec<ChapterSummary>> {
        self.require_book(book_id, false).await?;
        let chapters = self.chapters.list_for_book(book_id, false).await?;
        Ok(chapters.into_iter().map(ChapterSummary::from).collect())
    }

    pub async fn get_chapter(&self, id: &str) -> Result<Chapter> {
        self.chapters
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Chapter", id))
    }

    pub async fn create_chapter(&self, book_id: &str, request: CreateChapterRequest) -> Result<Chapter> {
        self.require_book(book_id, false).await?;
        require_non_empty("title", &request.title)?;
        validate_chapter_number(request.number)?;

        let ts = now();
        let chapter = Chapter {
            id: new_id(),
            book_id: book_id.to_string(),
            number: request.number,
            title: request.title.trim().to_string(),
            word_count: word_count(&request.content),
            content: request.content,
            is_free: request.is_free,
            is_published: request.is_published,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.chapters.create(&chapter).await?;
        Ok(chapter)
    }

    pub async fn update_chapter(&self, id: &str, request: UpdateChapterRequest) -> Result<Chapter> {
        let mut chapter = self.get_chapter(id).await?;

        if let Some(number) = request.number {
            validate_chapter_number(number)?;
            chapter.number = number;
        }
        if let Some(title) = request.title {
            require_non_empty("title", &title)?;
            chapter.title = title.trim().to_string();
        }
        if let Some(content) = request.content {
            chapter.word_count = word_count(&content);
            chapter.content = content;
        }
        if let Some(is_free) = request.is_free {
            chapter.is_free = is_free;
        }
        if let Some(is_published) = request.is_published {
            chapter.is_published = is_published;
        }
        chapter.updated_at = now();

        self.chapters.update(&chapter).await?;
        Ok(chapter)
    }

    pub async fn delete_chapter(&self, id: &str) -> Result<()> {
        self.chapters.delete(id).await
    }
}

fn validate_page_count(page_count: Option<i64>) -> Result<()> {
    match page_count {
        Some(count) if count < 0 => Err(AppError::ValidationError(
            "page_count cannot be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_chapter_number(number: i64) -> Result<()> {
    if number < 1 {
        return Err(AppError::ValidationError(
            "Chapter number must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Categories, tags, authors and publishers
pub struct CatalogService {
    categories: Arc<CategoryRepository>,
    tags: Arc<TagRepository>,
    authors: Arc<AuthorRepository>,
    publishers: Arc<PublisherRepository>,
    cache: Arc<CacheManager>,
}

impl CatalogService {
    pub fn new(
        categories: Arc<CategoryRepository>,
        tags: Arc<TagRepository>,
        authors: Arc<AuthorRepository>,
        publishers: Arc<PublisherRepository>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            categories,
            tags,
            authors,
            publishers,
            cache,
        }
    }

    // Public reads

    pub async fn active_categories(&self) -> Result<Vec<Category>> {
        let categories = self.categories.clone();
        self.cache
            .get_or_insert_with("categories:list", None, &[CATEGORIES_TAG], || async move {
                categories.list_active().await
            })
            .await
    }

    pub async fn active_category(&self, id: &str) -> Result<Category> {
        let categories = self.categories.clone();
        let category_id = id.to_string();
        self.cache
            .get_or_insert_with(
                &format!("categories:detail:{}", id),
                None,
                &[CATEGORIES_TAG],
                || async move {
                    match categories.find_by_id(&category_id).await? {
                        Some(category) if category.is_active => Ok(category),
                        _ => Err(not_found("Category", &category_id)),
                    }
                },
            )
            .await
    }

    pub async fn all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self.tags.clone();
        self.cache
            .get_or_insert_with("tags:list", None, &[TAGS_TAG], || async move { tags.find_all().await })
            .await
    }

    pub async fn list_authors(&self, search: Option<String>, window: Pagination) -> Result<Page<Author>> {
        let (items, total) = self.authors.list(search, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_author(&self, id: &str) -> Result<Author> {
        self.authors
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Author", id))
    }

    pub async fn list_publishers(&self, search: Option<String>, window: Pagination) -> Result<Page<Publisher>> {
        let (items, total) = self.publishers.list(search, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_publisher(&self, id: &str) -> Result<Publisher> {
        self.publishers
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Publisher", id))
    }

    // Categories

    pub async fn list_categories(&self, filter: &CategoryFilter, window: Pagination) -> Result<Page<Category>> {
        let (items, total) = self.categories.list(filter, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_category(&self, id: &str) -> Result<Category> {
        self.categories
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Category", id))
    }

    pub async fn create_category(&self, request: CreateCategoryRequest) -> Result<Category> {
        require_non_empty("name", &request.name)?;
        let id = new_id();
        self.check_parent(&id, request.parent_id.as_deref()).await?;

        let ts = now();
        let category = Category {
            slug: slug_or_derive(request.slug.as_deref(), &request.name)?,
            id,
            name: request.name.trim().to_string(),
            description: request.description,
            parent_id: request.parent_id,
            display_order: request.display_order,
            is_active: request.is_active,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.categories.create(&category).await?;
        self.cache.invalidate_tags(&[CATEGORIES_TAG, BOOKS_TAG]).await;
        Ok(category)
    }

    pub async fn update_category(&self, id: &str, request: UpdateCategoryRequest) -> Result<Category> {
        let mut category = self.get_category(id).await?;

        if let Some(name) = request.name {
            require_non_empty("name", &name)?;
            category.name = name.trim().to_string();
        }
        if let Some(slug) = request.slug {
            category.slug = slug_or_derive(Some(&slug), &category.name)?;
        }
        if let Some(description) = request.description {
            category.description = Some(description);
        }
        if let Some(parent_id) = request.parent_id {
            self.check_parent(id, Some(&parent_id)).await?;
            category.parent_id = Some(parent_id);
        }
        if let Some(display_order) = request.display_order {
            category.display_order = display_order;
        }
        if let Some(is_active) = request.is_active {
            category.is_active = is_active;
        }
        category.updated_at = now();

        self.categories.update(&category).await?;
        self.cache.invalidate_tags(&[CATEGORIES_TAG, BOOKS_TAG]).await;
        Ok(category)
    }

    pub async fn delete_category(&self, id: &str) -> Result<()> {
        self.categories.delete(id).await?;
        self.cache.invalidate_tags(&[CATEGORIES_TAG, BOOKS_TAG]).await;
        Ok(())
    }

    /// A parent must exist and cannot be the category itself
    async fn check_parent(&self, id: &str, parent_id: Option<&str>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        if parent_id == id {
            return Err(AppError::ValidationError(
                "A category cannot be its own parent".to_string(),
            ));
        }
        if self.categories.find_by_id(parent_id).await?.is_none() {
            return Err(not_found("Parent category", parent_id));
        }
        Ok(())
    }

    // Tags

    pub async fn list_tags(&self, search: Option<String>, window: Pagination) -> Result<Page<Tag>> {
        let (items, total) = self.tags.list(search, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_tag(&self, id: &str) -> Result<Tag> {
        self.tags.find_by_id(id).await?.ok_or_else(|| not_found("Tag", id))
    }

    pub async fn create_tag(&self, request: TagRequest) -> Result<Tag> {
        require_non_empty("name", &request.name)?;
        let tag = Tag {
            id: new_id(),
            slug: slug_or_derive(request.slug.as_deref(), &request.name)?,
            name: request.name.trim().to_string(),
            created_at: now(),
        };
        self.tags.create(&tag).await?;
        self.cache.invalidate_tags(&[TAGS_TAG, BOOKS_TAG]).await;
        Ok(tag)
    }

    pub async fn update_tag(&self, id: &str, request: TagRequest) -> Result<Tag> {
        require_non_empty("name", &request.name)?;
        let mut tag = self.get_tag(id).await?;
        tag.slug = slug_or_derive(request.slug.as_deref(), &request.name)?;
        tag.name = request.name.trim().to_string();

        self.tags.update(&tag).await?;
        self.cache.invalidate_tags(&[TAGS_TAG, BOOKS_TAG]).await;
        Ok(tag)
    }

    pub async fn delete_tag(&self, id: &str) -> Result<()> {
        self.tags.delete(id).await?;
        self.cache.invalidate_tags(&[TAGS_TAG, BOOKS_TAG]).await;
        Ok(())
    }

    // Authors

    pub async fn create_author(&self, request: CreateAuthorRequest) -> Result<Author> {
        require_non_empty("name", &request.name)?;
        let ts = now();
        let author = Author {
            id: new_id(),
            slug: slug_or_derive(request.slug.as_deref(), &request.name)?,
            name: request.name.trim().to_string(),
            biography: request.biography,
            nationality: request.nationality,
            photo_url: request.photo_url,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.authors.create(&author).await?;
        Ok(author)
    }

    pub async fn update_author(&self, id: &str, request: UpdateAuthorRequest) -> Result<Author> {
        let mut author = self.get_author(id).await?;

        if let Some(name) = request.name {
            require_non_empty("name", &name)?;
            author.name = name.trim().to_string();
        }
        if let Some(slug) = request.slug {
            author.slug = slug_or_derive(Some(&slug), &author.name)?;
        }
        if let Some(biography) = request.biography {
            author.biography = Some(biography);
        }
        if let Some(nationality) = request.nationality {
            author.nationality = Some(nationality);
        }
        if let Some(photo_url) = request.photo_url {
            author.photo_url = Some(photo_url);
        }
        author.updated_at = now();

        self.authors.update(&author).await?;
        self.cache.invalidate_tag(BOOKS_TAG).await;
        Ok(author)
    }

    pub async fn delete_author(&self, id: &str) -> Result<()> {
        self.authors.delete(id).await?;
        self.cache.invalidate_tag(BOOKS_TAG).await;
        Ok(())
    }

    // Publishers

    pub async fn create_publisher(&self, request: CreatePublisherRequest) -> Result<Publisher> {
        require_non_empty("name", &request.name)?;
        let ts = now();
        let publisher = Publisher {
            id: new_id(),
            slug: slug_or_derive(request.slug.as_deref(), &request.name)?,
            name: request.name.trim().to_string(),
            description: request.description,
            website: request.website,
            logo_url: request.logo_url,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.publishers.create(&publisher).await?;
        Ok(publisher)
    }

    pub async fn update_publisher(&self, id: &str, request: UpdatePublisherRequest) -> Result<Publisher> {
        let mut publisher = self.get_publisher(id).await?;

        if let Some(name) = request.name {
            require_non_empty("name", &name)?;
            publisher.name = name.trim().to_string();
        }
        if let Some(slug) = request.slug {
            publisher.slug = slug_or_derive(Some(&slug), &publisher.name)?;
        }
        if let Some(description) = request.description {
            publisher.description = Some(description);
        }
        if let Some(website) = request.website {
            publisher.website = Some(website);
        }
        if let Some(logo_url) = request.logo_url {
            publisher.logo_url = Some(logo_url);
        }
        publisher.updated_at = now();

        self.publishers.update(&publisher).await?;
        self.cache.invalidate_tag(BOOKS_TAG).await;
        Ok(publisher)
    }

    pub async fn delete_publisher(&self, id: &str) -> Result<()> {
        self.publishers.delete(id).await?;
        self.cache.invalidate_tag(BOOKS_TAG).await;
        Ok(())
    }
}

/// Reviews and the book ratings derived from them
pub struct ReviewService {
    reviews: Arc<ReviewRepository>,
    books: Arc<BookRepository>,
    cache: Arc<CacheManager>,
}

impl ReviewService {
    pub fn new(reviews: Arc<ReviewRepository>, books: Arc<BookRepository>, cache: Arc<CacheManager>) -> Self {
        Self { reviews, books, cache }
    }

    /// Approved reviews of a book
    pub async fn book_reviews(&self, book_id: &str, window: Pagination) -> Result<Page<Review>> {
        self.require_published_book(book_id).await?;
        let filter = ReviewFilter {
            book_id: Some(book_id.to_string()),
            status: Some(ReviewStatus::Approved),
            ..Default::default()
        };
        self.list(&filter, window).await
    }

    pub async fn list(&self, filter: &ReviewFilter, window: Pagination) -> Result<Page<Review>> {
        let (items, total) = self.reviews.list(filter, window).await?;
        Ok(Page::new(items, total, window))
    }

    async fn require_published_book(&self, book_id: &str) -> Result<()> {
        match self.books.find_by_id(book_id).await? {
            Some(book) if book.is_published => Ok(()),
            _ => Err(not_found("Book", book_id)),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Review> {
        self.reviews
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Review", id))
    }

    /// One review per reader and book; new reviews are published immediately
    pub async fn create(&self, user_id: &str, book_id: &str, request: CreateReviewRequest) -> Result<Review> {
        validate_rating(request.rating)?;
        self.require_published_book(book_id).await?;

        let ts = now();
        let review = Review {
            id: new_id(),
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            rating: request.rating,
            title: request.title,
            content: request.content,
            is_spoiler: request.is_spoiler,
            status: ReviewStatus::Approved.as_str().to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.reviews.create(&review).await?;
        self.invalidate_book(book_id).await;
        Ok(review)
    }

    /// Edit one's own review
    pub async fn update_own(&self, user_id: &str, id: &str, request: UpdateReviewRequest) -> Result<Review> {
        let mut review = self.owned(user_id, id).await?;

        if let Some(rating) = request.rating {
            validate_rating(rating)?;
            review.rating = rating;
        }
        if let Some(title) = request.title {
            review.title = Some(title);
        }
        if let Some(content) = request.content {
            review.content = Some(content);
        }
        if let Some(is_spoiler) = request.is_spoiler {
            review.is_spoiler = is_spoiler;
        }
        review.updated_at = now();

        self.reviews.update(&review).await?;
        self.invalidate_book(&review.book_id).await;
        Ok(review)
    }

    pub async fn delete_own(&self, user_id: &str, id: &str) -> Result<()> {
        self.owned(user_id, id).await?;
        self.delete(id).await
    }

    pub async fn moderate(&self, id: &str, status: ReviewStatus) -> Result<Review> {
        let review = self.reviews.set_status(id, status, &now()).await?;
        self.invalidate_book(&review.book_id).await;
        Ok(review)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let book_id = self.reviews.delete(id).await?;
        self.invalidate_book(&book_id).await;
        Ok(())
    }

    async fn owned(&self, user_id: &str, id: &str) -> Result<Review> {
        let review = self.get(id).await?;
        if review.user_id != user_id {
            return Err(AppError::PermissionDenied(
                "You can only modify your own reviews".to_string(),
            ));
        }
        Ok(review)
    }

    async fn invalidate_book(&self, book_id: &str) {
        self.cache.invalidate_tags(&[BOOKS_TAG, &book_tag(book_id)]).await;
    }
}

fn validate_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::ValidationError(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

/// Subscription plans, subscriptions and payments
pub struct SubscriptionService {
    plans: Arc<PlanRepository>,
    subscriptions: Arc<SubscriptionRepository>,
    payments: Arc<PaymentRepository>,
    notifications: Arc<NotificationRepository>,
}

impl SubscriptionService {
    pub fn new(
        plans: Arc<PlanRepository>,
        subscriptions: Arc<SubscriptionRepository>,
        payments: Arc<PaymentRepository>,
        notifications: Arc<NotificationRepository>,
    ) -> Self {
        Self {
            plans,
            subscriptions,
            payments,
            notifications,
        }
    }

    pub async fn active_plans(&self) -> Result<Vec<SubscriptionPlan>> {
        self.plans.list_active().await
    }

    pub async fn current(&self, user_id: &str) -> Result<Option<Subscription>> {
        self.subscriptions.active_for_user(user_id, &now()).await
    }

    pub async fn has_active(&self, user_id: &str) -> Result<bool> {
        Ok(self.current(user_id).await?.is_some())
    }

    /// Subscribe to an active plan: records a completed payment and an active
    /// subscription running for the plan's duration
    pub async fn subscribe(&self, user_id: &str, request: SubscribeRequest) -> Result<Subscription> {
        let plan = self
            .plans
            .find_by_id(&request.plan_id)
            .await?
            .ok_or_else(|| not_found("Subscription plan", &request.plan_id))?;
        if !plan.is_active {
            return Err(AppError::InvalidRequest(format!(
                "Subscription plan {} is not available",
                plan.name
            )));
        }

        let started = Utc::now();
        let start_date = started.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_date = Duration::try_days(plan.duration_days)
            .and_then(|d| started.checked_add_signed(d))
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Subscription plan {} has an invalid duration",
                    plan.name
                ))
            })?
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let subscription = Subscription {
            id: new_id(),
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Active.as_str().to_string(),
            start_date: start_date.clone(),
            end_date,
            auto_renew: request.auto_renew,
            cancelled_at: None,
            created_at: start_date.clone(),
            updated_at: start_date.clone(),
        };
        let payment = Payment {
            id: new_id(),
            user_id: user_id.to_string(),
            subscription_id: Some(subscription.id.clone()),
            amount: plan.price,
            currency: plan.currency.clone(),
            payment_method: request.payment_method,
            status: PaymentStatus::Completed.as_str().to_string(),
            transaction_id: format!("txn_{}", uuid::Uuid::new_v4().simple()),
            created_at: start_date.clone(),
            updated_at: start_date,
        };
        self.subscriptions.create_with_payment(&subscription, &payment).await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan.name,
            subscription_id = %subscription.id,
            "Subscription activated"
        );
        self.notify(
            user_id,
            "Subscription activated",
            format!("Your {} subscription is active until {}", plan.name, subscription.end_date),
        )
        .await;
        Ok(subscription)
    }

    pub async fn cancel(&self, user_id: &str) -> Result<Subscription> {
        let subscription = self.subscriptions.cancel_active(user_id, &now()).await?;
        self.notify(
            user_id,
            "Subscription cancelled",
            format!("Your subscription remains readable until {}", subscription.end_date),
        )
        .await;
        Ok(subscription)
    }

    /// A notification is best effort; the subscription change already happened
    async fn notify(&self, user_id: &str, title: &str, message: String) {
        let notification = Notification {
            id: new_id(),
            user_id: user_id.to_string(),
            kind: "subscription".to_string(),
            title: title.to_string(),
            message,
            link: Some("/subscriptions/me".to_string()),
            is_read: false,
            created_at: now(),
        };
        if let Err(e) = self.notifications.create(&notification).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to send subscription notification");
        }
    }

    // Plans (admin)

    pub async fn list_plans(&self, is_active: Option<bool>, window: Pagination) -> Result<Page<SubscriptionPlan>> {
        let (items, total) = self.plans.list(is_active, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn get_plan(&self, id: &str) -> Result<SubscriptionPlan> {
        self.plans
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Subscription plan", id))
    }

    pub async fn create_plan(&self, request: CreatePlanRequest) -> Result<SubscriptionPlan> {
        require_non_empty("name", &request.name)?;
        validate_plan_terms(request.price, request.duration_days)?;

        let ts = now();
        let plan = SubscriptionPlan {
            id: new_id(),
            name: request.name.trim().to_string(),
            description: request.description,
            price: request.price,
            currency: request.currency.to_uppercase(),
            billing_cycle: request.billing_cycle,
            duration_days: request.duration_days,
            is_active: request.is_active,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.plans.create(&plan).await?;
        Ok(plan)
    }

    pub async fn update_plan(&self, id: &str, request: UpdatePlanRequest) -> Result<SubscriptionPlan> {
        let mut plan = self.get_plan(id).await?;

        if let Some(name) = request.name {
            require_non_empty("name", &name)?;
            plan.name = name.trim().to_string();
        }
        if let Some(description) = request.description {
            plan.description = Some(description);
        }
        if let Some(price) = request.price {
            plan.price = price;
        }
        if let Some(currency) = request.currency {
            plan.currency = currency.to_uppercase();
        }
        if let Some(billing_cycle) = request.billing_cycle {
            plan.billing_cycle = billing_cycle;
        }
        if let Some(duration_days) = request.duration_days {
            plan.duration_days = duration_days;
        }
        if let Some(is_active) = request.is_active {
            plan.is_active = is_active;
        }
        validate_plan_terms(plan.price, plan.duration_days)?;
        plan.updated_at = now();

        self.plans.update(&plan).await?;
        Ok(plan)
    }

    /// Plans referenced by subscriptions cannot be deleted
    pub async fn delete_plan(&self, id: &str) -> Result<()> {
        self.plans.delete(id).await
    }

    // Subscriptions and payments (admin)

    pub async fn set_subscription_status(&self, id: &str, status: SubscriptionStatus) -> Result<Subscription> {
        self.subscriptions.set_status(id, status, &now()).await
    }

    pub async fn get_payment(&self, id: &str) -> Result<Payment> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found("Payment", id))
    }

    /// A refund also cancels the subscription the payment bought
    pub async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> Result<Payment> {
        let payment = self.payments.set_status(id, status, &now()).await?;
        tracing::info!(payment_id = %id, status = %status, "Payment status changed");
        Ok(payment)
    }
}

/// A hundred years
const MAX_PLAN_DURATION_DAYS: i64 = 36_500;

fn validate_plan_terms(price: f64, duration_days: i64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::ValidationError("price cannot be negative".to_string()));
    }
    if !(1..=MAX_PLAN_DURATION_DAYS).contains(&duration_days) {
        return Err(AppError::ValidationError(format!(
            "duration_days must be between 1 and {}",
            MAX_PLAN_DURATION_DAYS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::sample_user;
    use crate::db::repository::UserRepository;
    use crate::db::DatabaseManager;

    struct Services {
        books: BookService,
        catalog: CatalogService,
        reviews: ReviewService,
        subscriptions: SubscriptionService,
        cache: Arc<CacheManager>,
        users: UserRepository,
    }

    fn services() -> Services {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let cache = Arc::new(CacheManager::new(true, 100, std::time::Duration::from_secs(60)));
        let books = Arc::new(BookRepository::new(db.clone()));
        Services {
            books: BookService::new(
                books.clone(),
                Arc::new(ChapterRepository::new(db.clone())),
                cache.clone(),
            ),
            catalog: CatalogService::new(
                Arc::new(CategoryRepository::new(db.clone())),
                Arc::new(TagRepository::new(db.clone())),
                Arc::new(AuthorRepository::new(db.clone())),
                Arc::new(PublisherRepository::new(db.clone())),
                cache.clone(),
            ),
            reviews: ReviewService::new(Arc::new(ReviewRepository::new(db.clone())), books, cache.clone()),
            subscriptions: SubscriptionService::new(
                Arc::new(PlanRepository::new(db.clone())),
                Arc::new(SubscriptionRepository::new(db.clone())),
                Arc::new(PaymentRepository::new(db.clone())),
                Arc::new(NotificationRepository::new(db.clone())),
            ),
            cache,
            users: UserRepository::new(db),
        }
    }

    fn book_request(title: &str, published: bool) -> CreateBookRequest {
        CreateBookRequest {
            title: title.to_string(),
            isbn: None,
            subtitle: None,
            description: None,
            publisher_id: None,
            language: "en".to_string(),
            page_count: Some(120),
            publication_date: None,
            cover_url: None,
            is_featured: false,
            is_published: published,
            author_ids: vec![],
            category_ids: vec![],
            tag_ids: vec![],
        }
    }

    #[tokio::test]
    async fn test_published_list_is_cached_until_a_write() {
        let s = services();
        s.books.create_book(book_request("Dune", true)).await.unwrap();

        let first = s.books.list_published(BookFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(first.pagination.total, 1);
        assert_eq!(s.cache.stats().await.entries, 1);

        s.books.create_book(book_request("Emma", true)).await.unwrap();
        // the write dropped every entry tagged "books"
        assert_eq!(s.cache.stats().await.entries, 0);
        let second = s.books.list_published(BookFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(second.pagination.total, 2);
    }

    #[tokio::test]
    async fn test_unpublished_book_is_hidden_from_readers() {
        let s = services();
        let draft = s.books.create_book(book_request("Draft", false)).await.unwrap();
        let id = draft.book.id;

        assert!(matches!(s.books.published_detail(&id).await, Err(AppError::NotFound(_))));
        assert!(s.books.get_book(&id).await.is_ok());

        s.books.set_published(&id, true).await.unwrap();
        let detail = s.books.published_detail(&id).await.unwrap();
        assert_eq!(detail.book.title, "Draft");
        assert_eq!(s.books.get_book(&id).await.unwrap().book.view_count, 1);
    }

    #[tokio::test]
    async fn test_chapter_word_count_follows_content() {
        let s = services();
        let book = s.books.create_book(book_request("Words", true)).await.unwrap();
        let chapter = s
            .books
            .create_chapter(
                &book.book.id,
                CreateChapterRequest {
                    number: 1,
                    title: "Opening".to_string(),
                    content: "one two three".to_string(),
                    is_free: true,
                    is_published: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(chapter.word_count, 3);

        let updated = s
            .books
            .update_chapter(
                &chapter.id,
                UpdateChapterRequest {
                    content: Some("just two".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.word_count, 2);
        assert_eq!(s.books.published_chapter(&book.book.id, 1).await.unwrap().content, "just two");
    }

    #[tokio::test]
    async fn test_category_parent_rules_and_slug() {
        let s = services();
        let parent = s
            .catalog
            .create_category(CreateCategoryRequest {
                name: "Science Fiction".to_string(),
                slug: None,
                description: None,
                parent_id: None,
                display_order: 0,
                is_active: true,
            })
            .await
            .unwrap();
        assert_eq!(parent.slug, "science-fiction");

        let err = s
            .catalog
            .update_category(
                &parent.id,
                UpdateCategoryRequest {
                    parent_id: Some(parent.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = s
            .catalog
            .create_category(CreateCategoryRequest {
                name: "Orphan".to_string(),
                slug: None,
                description: None,
                parent_id: Some("missing".to_string()),
                display_order: 0,
                is_active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_review_ownership_and_rating() {
        let s = services();
        s.users.create(&sample_user("u1", "alice")).await.unwrap();
        s.users.create(&sample_user("u2", "bob")).await.unwrap();
        let book = s.books.create_book(book_request("Rated", true)).await.unwrap();
        let book_id = book.book.id;

        let review = s
            .reviews
            .create(
                "u1",
                &book_id,
                CreateReviewRequest {
                    rating: 4,
                    title: None,
                    content: Some("Good".to_string()),
                    is_spoiler: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(s.books.get_book(&book_id).await.unwrap().book.avg_rating, 4.0);

        let err = s
            .reviews
            .update_own("u2", &review.id, UpdateReviewRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let bad = CreateReviewRequest {
            rating: 6,
            title: None,
            content: None,
            is_spoiler: false,
        };
        assert!(matches!(
            s.reviews.create("u2", &book_id, bad).await,
            Err(AppError::ValidationError(_))
        ));

        s.reviews.moderate(&review.id, ReviewStatus::Rejected).await.unwrap();
        let book = s.books.get_book(&book_id).await.unwrap().book;
        assert_eq!(book.review_count, 0);
        assert_eq!(book.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn test_reviews_of_hidden_books_are_not_found() {
        let s = services();
        let draft = s.books.create_book(book_request("Draft", false)).await.unwrap();

        for id in [draft.book.id.as_str(), "missing"] {
            let err = s.reviews.book_reviews(id, Pagination::default()).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }

        s.books.set_published(&draft.book.id, true).await.unwrap();
        let page = s.reviews.book_reviews(&draft.book.id, Pagination::default()).await.unwrap();
        assert_eq!(page.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_subscribe_records_payment_and_notifies() {
        let s = services();
        s.users.create(&sample_user("u1", "alice")).await.unwrap();
        let plan = s
            .subscriptions
            .create_plan(CreatePlanRequest {
                name: "Monthly".to_string(),
                description: None,
                price: 9.99,
                currency: "usd".to_string(),
                billing_cycle: "monthly".to_string(),
                duration_days: 30,
                is_active: true,
            })
            .await
            .unwrap();
        assert_eq!(plan.currency, "USD");

        let request = || SubscribeRequest {
            plan_id: plan.id.clone(),
            payment_method: "card".to_string(),
            auto_renew: true,
        };
        let subscription = s.subscriptions.subscribe("u1", request()).await.unwrap();
        assert_eq!(subscription.status, "active");
        assert!(subscription.end_date > subscription.start_date);
        assert!(s.subscriptions.has_active("u1").await.unwrap());

        let err = s.subscriptions.subscribe("u1", request()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let cancelled = s.subscriptions.cancel("u1").await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(!cancelled.auto_renew);
        assert!(matches!(s.subscriptions.cancel("u1").await, Err(AppError::NotFound(_))));

        // plan is referenced now
        assert!(matches!(s.subscriptions.delete_plan(&plan.id).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_plan_duration_is_bounded() {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let plans = Arc::new(PlanRepository::new(db.clone()));
        let subscriptions = SubscriptionService::new(
            plans.clone(),
            Arc::new(SubscriptionRepository::new(db.clone())),
            Arc::new(PaymentRepository::new(db.clone())),
            Arc::new(NotificationRepository::new(db.clone())),
        );
        UserRepository::new(db).create(&sample_user("u1", "alice")).await.unwrap();

        let request = |duration_days| CreatePlanRequest {
            name: "Forever".to_string(),
            description: None,
            price: 1.0,
            currency: "USD".to_string(),
            billing_cycle: "once".to_string(),
            duration_days,
            is_active: true,
        };
        let err = subscriptions.create_plan(request(i64::MAX)).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let plan = subscriptions.create_plan(request(MAX_PLAN_DURATION_DAYS)).await.unwrap();
        let update = UpdatePlanRequest {
            duration_days: Some(1_000_000_000_000),
            ..Default::default()
        };
        let err = subscriptions.update_plan(&plan.id, update).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        // a row that bypassed validation still cannot overflow the end date
        let mut stored = plan.clone();
        stored.duration_days = i64::MAX;
        plans.update(&stored).await.unwrap();
        let err = subscriptions
            .subscribe(
                "u1",
                SubscribeRequest {
                    plan_id: plan.id.clone(),
                    payment_method: "card".to_string(),
                    auto_renew: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
