//! Reader accounts

use super::{fetch_all, fetch_page, Conditions, Repository};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::User;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub is_premium: Option<bool>,
}

/// Repository for User entities
///
/// Deleted users are kept with `is_deleted = 1` and are invisible to every
/// lookup here.
pub struct UserRepository {
    db: Arc<DatabaseManager>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Find by username or email, as typed on the login form
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let login = login.trim().to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM users WHERE (username = ?1 OR LOWER(email) = LOWER(?1)) AND is_deleted = 0",
                            User::COLUMNS
                        ),
                        [&login],
                        User::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn list(&self, filter: &UserFilter, window: Pagination) -> Result<(Vec<User>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push("is_deleted = 0")
            .push_search(&["username", "email", "full_name"], filter.search.as_deref())
            .push_opt("is_active = ?", filter.is_active)
            .push_opt("is_premium = ?", filter.is_premium);
        self.db
            .execute(move |conn| {
                fetch_page(conn, "users", User::COLUMNS, &conditions, "created_at DESC, id", window, User::from_row)
            })
            .await
    }

    pub async fn touch_last_login(&self, id: &str, at: &str) -> Result<()> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("UPDATE users SET last_login = ? WHERE id = ?", params![at, id])?;
                Ok(())
            })
            .await
    }

    /// Ids of every active account, for broadcast notifications
    pub async fn active_ids(&self) -> Result<Vec<String>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    "SELECT id FROM users WHERE is_active = 1 AND is_deleted = 0 ORDER BY created_at",
                    [],
                    |row| row.get(0),
                )
            })
            .await
    }
}

fn user_conflict(err: rusqlite::Error, user: &User) -> AppError {
    AppError::from_write(err, || {
        format!("Username '{}' or email '{}' is already registered", user.username, user.email)
    })
}

#[async_trait]
impl Repository<User> for UserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM users WHERE id = ? AND is_deleted = 0", User::COLUMNS),
                        [&id],
                        User::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<User>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM users WHERE is_deleted = 0 ORDER BY created_at DESC", User::COLUMNS),
                    [],
                    User::from_row,
                )
            })
            .await
    }

    async fn create(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, email, password_hash, full_name, bio, avatar_url, \
                     is_active, is_premium, is_deleted, last_login, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        user.id,
                        user.username,
                        user.email,
                        user.password_hash,
                        user.full_name,
                        user.bio,
                        user.avatar_url,
                        user.is_active,
                        user.is_premium,
                        user.is_deleted,
                        user.last_login,
                        user.created_at,
                        user.updated_at,
                    ],
                )
                .map_err(|e| user_conflict(e, &user))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE users SET email = ?, password_hash = ?, full_name = ?, bio = ?, avatar_url = ?, \
                         is_active = ?, is_premium = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
                        params![
                            user.email,
                            user.password_hash,
                            user.full_name,
                            user.bio,
                            user.avatar_url,
                            user.is_active,
                            user.is_premium,
                            user.updated_at,
                            user.id,
                        ],
                    )
                    .map_err(|e| user_conflict(e, &user))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("User {} not found", user.id)));
                }
                Ok(())
            })
            .await
    }

    /// Soft delete; the account is also deactivated
    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let updated_at = super::now();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET is_deleted = 1, is_active = 0, updated_at = ? WHERE id = ? AND is_deleted = 0",
                    params![updated_at, id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("User {} not found", id)));
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

    pub(crate) fn sample_user(id: &str, username: &str) -> User {
        let ts = now();
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            full_name: None,
            bio: None,
            avatar_url: None,
            is_active: true,
            is_premium: false,
            is_deleted: false,
            last_login: None,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_login_lookup_and_soft_delete() {
        let repo = UserRepository::new(Arc::new(DatabaseManager::new_in_memory().unwrap()));
        repo.create(&sample_user("u1", "alice")).await.unwrap();

        assert!(repo.find_by_login("alice").await.unwrap().is_some());
        assert!(repo.find_by_login("ALICE@example.com").await.unwrap().is_some());

        let dup = sample_user("u2", "alice");
        assert!(matches!(repo.create(&dup).await, Err(AppError::Conflict(_))));

        repo.delete("u1").await.unwrap();
        assert!(repo.find_by_login("alice").await.unwrap().is_none());
        assert!(repo.active_ids().await.unwrap().is_empty());

        let (items, total) = repo.list(&UserFilter::default(), Pagination::default()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }
}
