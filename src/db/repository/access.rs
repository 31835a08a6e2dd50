//! Admins, roles, permissions and admin sessions

use super::{exists, fetch_all, fetch_page, Conditions, Repository};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Admin, AdminSession, Permission, Role};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminFilter {
    pub search: Option<String>,
    pub role_id: Option<String>,
    pub is_active: Option<bool>,
}

/// Repository for Admin entities
pub struct AdminRepository {
    db: Arc<DatabaseManager>,
}

impl AdminRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let username = username.trim().to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM admins WHERE username = ?", Admin::COLUMNS),
                        [&username],
                        Admin::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?))
            .await
    }

    pub async fn list(&self, filter: &AdminFilter, window: Pagination) -> Result<(Vec<Admin>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_search(&["username", "email", "full_name"], filter.search.as_deref())
            .push_opt("role_id = ?", filter.role_id.clone())
            .push_opt("is_active = ?", filter.is_active);
        self.db
            .execute(move |conn| {
                fetch_page(conn, "admins", Admin::COLUMNS, &conditions, "username", window, Admin::from_row)
            })
            .await
    }

    pub async fn record_login_success(&self, id: &str, at: &str) -> Result<()> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE admins SET last_login = ?, login_count = login_count + 1, \
                     failed_login_attempts = 0 WHERE id = ?",
                    params![at, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn record_login_failure(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE admins SET failed_login_attempts = failed_login_attempts + 1 WHERE id = ?",
                    [&id],
                )?;
                Ok(())
            })
            .await
    }

    /// Permission names granted through the admin's role
    pub async fn permission_names(&self, admin_id: &str) -> Result<Vec<String>> {
        let admin_id = admin_id.to_string();
        self.db
            .execute(move |conn| {
                fetch_all(
                    conn,
                    "SELECT p.name FROM permissions p \
                     JOIN role_permissions rp ON rp.permission_id = p.id \
                     JOIN admins a ON a.role_id = rp.role_id \
                     WHERE a.id = ? ORDER BY p.name",
                    [&admin_id],
                    |row| row.get(0),
                )
            })
            .await
    }
}

fn admin_conflict(err: rusqlite::Error, admin: &Admin) -> AppError {
    AppError::from_write(err, || {
        format!("Admin username '{}' or email '{}' already exists", admin.username, admin.email)
    })
}

#[async_trait]
impl Repository<Admin> for AdminRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Admin>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM admins WHERE id = ?", Admin::COLUMNS),
                        [&id],
                        Admin::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Admin>> {
        self.db
            .execute(|conn| {
                fetch_all(conn, &format!("SELECT {} FROM admins ORDER BY username", Admin::COLUMNS), [], Admin::from_row)
            })
            .await
    }

    async fn create(&self, admin: &Admin) -> Result<()> {
        let admin = admin.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO admins (id, username, email, password_hash, full_name, role_id, is_superadmin, \
                     is_active, last_login, login_count, failed_login_attempts, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        admin.id,
                        admin.username,
                        admin.email,
                        admin.password_hash,
                        admin.full_name,
                        admin.role_id,
                        admin.is_superadmin,
                        admin.is_active,
                        admin.last_login,
                        admin.login_count,
                        admin.failed_login_attempts,
                        admin.created_at,
                        admin.updated_at,
                    ],
                )
                .map_err(|e| admin_conflict(e, &admin))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, admin: &Admin) -> Result<()> {
        let admin = admin.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE admins SET email = ?, password_hash = ?, full_name = ?, role_id = ?, \
                         is_superadmin = ?, is_active = ?, updated_at = ? WHERE id = ?",
                        params![
                            admin.email,
                            admin.password_hash,
                            admin.full_name,
                            admin.role_id,
                            admin.is_superadmin,
                            admin.is_active,
                            admin.updated_at,
                            admin.id,
                        ],
                    )
                    .map_err(|e| admin_conflict(e, &admin))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Admin {} not found", admin.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM admins WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Admin {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Role entities and their permission grants
pub struct RoleRepository {
    db: Arc<DatabaseManager>,
}

impl RoleRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<String>, window: Pagination) -> Result<(Vec<Role>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name", "description"], search.as_deref());
        self.db
            .execute(move |conn| fetch_page(conn, "roles", Role::COLUMNS, &conditions, "name", window, Role::from_row))
            .await
    }

    pub async fn permissions(&self, role_id: &str) -> Result<Vec<Permission>> {
        let role_id = role_id.to_string();
        self.db
            .execute(move |conn| role_permissions(conn, &role_id))
            .await
    }

    /// Replace every grant of the role; unknown permission ids abort the change
    pub async fn replace_permissions(&self, role_id: &str, permission_ids: Vec<String>) -> Result<Vec<Permission>> {
        let role_id = role_id.to_string();
        self.db
            .transaction(move |tx| {
                if !exists(tx, "roles", &role_id)? {
                    return Err(AppError::NotFound(format!("Role {} not found", role_id)));
                }
                tx.execute("DELETE FROM role_permissions WHERE role_id = ?", [&role_id])?;
                for permission_id in &permission_ids {
                    if !exists(tx, "permissions", permission_id)? {
                        return Err(AppError::NotFound(format!("Permission {} not found", permission_id)));
                    }
                    tx.execute(
                        "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
                        [&role_id, permission_id],
                    )?;
                }
                role_permissions(tx, &role_id)
            })
            .await
    }
}

fn role_permissions(conn: &Connection, role_id: &str) -> Result<Vec<Permission>> {
    fetch_all(
        conn,
        &format!(
            "SELECT {} FROM permissions WHERE id IN (SELECT permission_id FROM role_permissions WHERE role_id = ?) \
             ORDER BY name",
            Permission::COLUMNS
        ),
        [role_id],
        Permission::from_row,
    )
}

fn role_conflict(err: rusqlite::Error, role: &Role) -> AppError {
    AppError::from_write(err, || format!("Role '{}' already exists", role.name))
}

#[async_trait]
impl Repository<Role> for RoleRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Role>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(&format!("SELECT {} FROM roles WHERE id = ?", Role::COLUMNS), [&id], Role::from_row)
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Role>> {
        self.db
            .execute(|conn| {
                fetch_all(conn, &format!("SELECT {} FROM roles ORDER BY name", Role::COLUMNS), [], Role::from_row)
            })
            .await
    }

    async fn create(&self, role: &Role) -> Result<()> {
        let role = role.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                    params![role.id, role.name, role.description, role.created_at, role.updated_at],
                )
                .map_err(|e| role_conflict(e, &role))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, role: &Role) -> Result<()> {
        let role = role.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE roles SET name = ?, description = ?, updated_at = ? WHERE id = ?",
                        params![role.name, role.description, role.updated_at, role.id],
                    )
                    .map_err(|e| role_conflict(e, &role))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Role {} not found", role.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM roles WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Role {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

/// Repository for Permission entities
pub struct PermissionRepository {
    db: Arc<DatabaseManager>,
}

impl PermissionRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list(&self, search: Option<String>, window: Pagination) -> Result<(Vec<Permission>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_search(&["name", "description"], search.as_deref());
        self.db
            .execute(move |conn| {
                fetch_page(conn, "permissions", Permission::COLUMNS, &conditions, "name", window, Permission::from_row)
            })
            .await
    }
}

fn permission_conflict(err: rusqlite::Error, permission: &Permission) -> AppError {
    AppError::from_write(err, || format!("Permission '{}' already exists", permission.name))
}

#[async_trait]
impl Repository<Permission> for PermissionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Permission>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM permissions WHERE id = ?", Permission::COLUMNS),
                        [&id],
                        Permission::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Permission>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM permissions ORDER BY name", Permission::COLUMNS),
                    [],
                    Permission::from_row,
                )
            })
            .await
    }

    async fn create(&self, permission: &Permission) -> Result<()> {
        let permission = permission.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO permissions (id, name, description, created_at) VALUES (?, ?, ?, ?)",
                    params![permission.id, permission.name, permission.description, permission.created_at],
                )
                .map_err(|e| permission_conflict(e, &permission))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, permission: &Permission) -> Result<()> {
        let permission = permission.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE permissions SET name = ?, description = ? WHERE id = ?",
                        params![permission.name, permission.description, permission.id],
                    )
                    .map_err(|e| permission_conflict(e, &permission))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Permission {} not found", permission.id)));
                }
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                if conn.execute("DELETE FROM permissions WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Permission {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub admin_id: Option<String>,
    pub is_active: Option<bool>,
    pub ip_address: Option<String>,
}

/// Repository for admin login sessions
pub struct SessionRepository {
    db: Arc<DatabaseManager>,
}

impl SessionRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn create(&self, session: &AdminSession) -> Result<()> {
        let session = session.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO admin_sessions (id, admin_id, ip_address, user_agent, is_active, created_at, \
                     expires_at, ended_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        session.id,
                        session.admin_id,
                        session.ip_address,
                        session.user_agent,
                        session.is_active,
                        session.created_at,
                        session.expires_at,
                        session.ended_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// The session if it belongs to the admin, is active and has not expired at `now`
    pub async fn find_active(&self, id: &str, admin_id: &str, now: &str) -> Result<Option<AdminSession>> {
        let id = id.to_string();
        let admin_id = admin_id.to_string();
        let now = now.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM admin_sessions \
                             WHERE id = ? AND admin_id = ? AND is_active = 1 AND expires_at > ?",
                            AdminSession::COLUMNS
                        ),
                        params![id, admin_id, now],
                        AdminSession::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Mark the session ended; returns whether it was still active
    pub async fn end(&self, id: &str, at: &str) -> Result<bool> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE admin_sessions SET is_active = 0, ended_at = ? WHERE id = ? AND is_active = 1",
                    params![at, id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<AdminSession>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM admin_sessions WHERE id = ?", AdminSession::COLUMNS),
                        [&id],
                        AdminSession::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    /// Newest first
    pub async fn list(&self, filter: &SessionFilter, window: Pagination) -> Result<(Vec<AdminSession>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("admin_id = ?", filter.admin_id.clone())
            .push_opt("is_active = ?", filter.is_active)
            .push_opt("ip_address = ?", filter.ip_address.clone());
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "admin_sessions",
                    AdminSession::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    AdminSession::from_row,
                )
            })
            .await
    }

    /// Delete sessions that ended or expired before `before`
    pub async fn delete_finished_before(&self, before: &str) -> Result<usize> {
        let before = before.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM admin_sessions \
                     WHERE (is_active = 0 AND ended_at < ?1) OR expires_at < ?1",
                    [&before],
                )?)
            })
            .await
    }

    /// End every open session of an admin, e.g. after deactivation
    pub async fn end_all_for_admin(&self, admin_id: &str, at: &str) -> Result<usize> {
        let admin_id = admin_id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn.execute(
                    "UPDATE admin_sessions SET is_active = 0, ended_at = ? WHERE admin_id = ? AND is_active = 1",
                    params![at, admin_id],
                )?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{new_id, now};

    fn admin(id: &str, username: &str, role_id: Option<&str>) -> Admin {
        let ts = now();
        Admin {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            full_name: None,
            role_id: role_id.map(str::to_string),
            is_superadmin: false,
            is_active: true,
            last_login: None,
            login_count: 0,
            failed_login_attempts: 0,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_role_grants_flow_to_admin() {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let roles = RoleRepository::new(db.clone());
        let admins = AdminRepository::new(db.clone());
        let permissions = PermissionRepository::new(db);

        let ts = now();
        let role = Role {
            id: "r1".to_string(),
            name: "editor".to_string(),
            description: None,
            created_at: ts.clone(),
            updated_at: ts,
        };
        roles.create(&role).await.unwrap();
        admins.create(&admin("a1", "ed", Some("r1"))).await.unwrap();

        let all = permissions.find_all().await.unwrap();
        let book_create = all.iter().find(|p| p.name == "book:create").unwrap();
        roles
            .replace_permissions("r1", vec![book_create.id.clone()])
            .await
            .unwrap();
        assert_eq!(admins.permission_names("a1").await.unwrap(), vec!["book:create"]);

        let err = roles
            .replace_permissions("r1", vec!["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // failed replacement leaves the previous grants in place
        assert_eq!(admins.permission_names("a1").await.unwrap(), vec!["book:create"]);

        roles.delete("r1").await.unwrap();
        assert!(admins.find_by_id("a1").await.unwrap().unwrap().role_id.is_none());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        AdminRepository::new(db.clone())
            .create(&admin("a1", "root", None))
            .await
            .unwrap();
        let sessions = SessionRepository::new(db);

        let id = new_id();
        sessions
            .create(&AdminSession {
                id: id.clone(),
                admin_id: "a1".to_string(),
                ip_address: None,
                user_agent: None,
                is_active: true,
                created_at: "2024-01-01T00:00:00Z".to_string(),
                expires_at: "2099-01-01T00:00:00Z".to_string(),
                ended_at: None,
            })
            .await
            .unwrap();

        let at = now();
        assert!(sessions.find_active(&id, "a1", &at).await.unwrap().is_some());
        assert!(sessions.find_active(&id, "someone-else", &at).await.unwrap().is_none());
        assert!(sessions.find_active(&id, "a1", "2100-01-01T00:00:00Z").await.unwrap().is_none());

        assert!(sessions.end(&id, &at).await.unwrap());
        assert!(!sessions.end(&id, &at).await.unwrap());
        assert!(sessions.find_active(&id, "a1", &at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_listing_and_cleanup() {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        AdminRepository::new(db.clone())
            .create(&admin("a1", "root", None))
            .await
            .unwrap();
        let sessions = SessionRepository::new(db);

        let session = |id: &str, created_at: &str, expires_at: &str| AdminSession {
            id: id.to_string(),
            admin_id: "a1".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            is_active: true,
            created_at: created_at.to_string(),
            expires_at: expires_at.to_string(),
            ended_at: None,
        };
        sessions.create(&session("old", "2020-01-01T00:00:00Z", "2020-01-02T00:00:00Z")).await.unwrap();
        sessions.create(&session("ended", "2024-01-01T00:00:00Z", "2099-01-01T00:00:00Z")).await.unwrap();
        sessions.create(&session("live", "2024-02-01T00:00:00Z", "2099-01-01T00:00:00Z")).await.unwrap();
        sessions.end("ended", "2024-01-01T01:00:00Z").await.unwrap();

        let filter = SessionFilter {
            admin_id: Some("a1".to_string()),
            is_active: Some(true),
            ..Default::default()
        };
        let (active, total) = sessions.list(&filter, Pagination::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(active[0].id, "live");

        let removed = sessions.delete_finished_before("2024-06-01T00:00:00Z").await.unwrap();
        assert_eq!(removed, 2);
        assert!(sessions.find_by_id("live").await.unwrap().is_some());
        assert!(sessions.find_by_id("old").await.unwrap().is_none());
    }
}
