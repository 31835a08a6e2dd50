//! Repository pattern implementation for data access layer
//!
//! Every entity gets a repository holding the shared [`DatabaseManager`].
//! Simple CRUD goes through the generic [`Repository`] trait; filtered and
//! paginated listings are inherent methods built on [`Conditions`] and
//! [`fetch_page`].

mod access;
mod books;
mod catalog;
mod commerce;
mod community;
mod logs;
mod reading;
mod users;

pub use access::{
    AdminFilter, AdminRepository, PermissionRepository, RoleRepository, SessionFilter, SessionRepository,
};
pub use books::{BookFilter, BookRelations, BookRepository, BookStatistics, ChapterRepository};
pub use catalog::{AuthorRepository, CategoryFilter, CategoryRepository, PublisherRepository, TagRepository};
pub use commerce::{
    PaymentFilter, PaymentRepository, PlanRepository, SubscriptionFilter, SubscriptionRepository,
};
pub use community::{
    DiscussionFilter, DiscussionRepository, NotificationRepository, ReviewFilter, ReviewRepository,
};
pub use logs::{ActivityLogFilter, ActivityLogRepository, AuthLogFilter, AuthLogRepository};
pub use reading::{BookmarkRepository, ReadingProgressRepository, ReadingStats};
pub use users::{UserFilter, UserRepository};

#[cfg(test)]
pub(crate) use users::tests::sample_user;

use crate::core::error::Result;
use crate::core::pagination::Pagination;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use uuid::Uuid;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T>: Send + Sync {
    /// Find an entity by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Find all entities
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<()>;

    /// Update an existing entity, failing with `NotFound` when it does not exist
    async fn update(&self, entity: &T) -> Result<()>;

    /// Delete an entity by its ID, failing with `NotFound` when it does not exist
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Current time as stored in timestamp columns
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `WHERE` clause assembled from optional filters
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause without parameters
    pub fn push(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// Add a clause with one `?` placeholder
    pub fn push_value(&mut self, clause: &str, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.values.push(value.into());
        self
    }

    /// Add the clause only when the filter value is present
    pub fn push_opt<V: Into<Value>>(&mut self, clause: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.push_value(clause, value);
        }
        self
    }

    /// Case-insensitive substring match over several columns
    pub fn push_search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let pattern = format!("%{}%", term.to_lowercase());
        let clause = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE ?", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({})", clause));
        for _ in columns {
            self.values.push(Value::Text(pattern.clone()));
        }
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Count the matching rows of `table` and load one window of them
pub fn fetch_page<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    conditions: &Conditions,
    order_by: &str,
    window: Pagination,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<(Vec<T>, i64)> {
    let where_sql = conditions.where_sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}{}", table, where_sql),
        params_from_iter(conditions.values()),
        |row| row.get(0),
    )?;

    let mut values = conditions.values().to_vec();
    values.push(Value::Integer(window.limit()));
    values.push(Value::Integer(window.offset()));

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        columns, table, where_sql, order_by
    ))?;
    let items = stmt
        .query_map(params_from_iter(values), map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total))
}

/// Load every row returned by `sql`
pub fn fetch_all<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Whether a row with this id exists in `table`
pub fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let found: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table),
        [id],
        |row| row.get(0),
    )?;
    Ok(found == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_sql() {
        let mut conditions = Conditions::new();
        assert_eq!(conditions.where_sql(), "");

        conditions
            .push("is_deleted = 0")
            .push_opt("publisher_id = ?", Some("p1".to_string()))
            .push_opt::<i64>("page_count > ?", None)
            .push_search(&["title", "isbn"], Some("  Rust "));

        assert_eq!(
            conditions.where_sql(),
            " WHERE is_deleted = 0 AND publisher_id = ? AND (LOWER(title) LIKE ? OR LOWER(isbn) LIKE ?)"
        );
        assert_eq!(conditions.values().len(), 3);
        assert_eq!(conditions.values()[1], Value::Text("%rust%".to_string()));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name"], Some("   "));
        assert_eq!(conditions.where_sql(), "");
    }
}
