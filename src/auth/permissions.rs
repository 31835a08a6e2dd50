//! Role-based permission checks for admins
//!
//! Permissions are `resource:action` names granted to roles. An admin holds
//! the permissions of its role; a superadmin holds all of them. Resolved
//! permission sets are cached per admin and dropped whenever roles change.

use crate::auth::middleware::AdminUser;
use crate::cache::CacheManager;
use crate::core::error::{AppError, Result};
use crate::db::repository::{AdminRepository, PermissionRepository, Repository};
use std::sync::Arc;
use std::time::Duration;

pub const PERMISSION_CACHE_TTL: Duration = Duration::from_secs(300);
pub const PERMISSION_CACHE_TAG: &str = "admin_permissions";

fn cache_key(admin_id: &str) -> String {
    format!("admin:{}:permissions", admin_id)
}

pub struct PermissionChecker {
    admins: Arc<AdminRepository>,
    permissions: Arc<PermissionRepository>,
    cache: Arc<CacheManager>,
}

impl PermissionChecker {
    pub fn new(
        admins: Arc<AdminRepository>,
        permissions: Arc<PermissionRepository>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            admins,
            permissions,
            cache,
        }
    }

    /// Permission names granted through the admin's role
    pub async fn granted(&self, admin_id: &str) -> Result<Vec<String>> {
        let admins = self.admins.clone();
        let id = admin_id.to_string();
        self.cache
            .get_or_insert_with(
                &cache_key(admin_id),
                Some(PERMISSION_CACHE_TTL),
                &[PERMISSION_CACHE_TAG],
                || async move { admins.permission_names(&id).await },
            )
            .await
    }

    /// Everything the admin may do; superadmins get every known permission
    pub async fn effective(&self, admin: &AdminUser) -> Result<Vec<String>> {
        if admin.is_superadmin {
            let mut names: Vec<String> = self
                .permissions
                .find_all()
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect();
            names.sort();
            return Ok(names);
        }
        self.granted(&admin.id).await
    }

    /// Succeed only when the admin holds every one of `required`
    pub async fn require(&self, admin: &AdminUser, required: &[&str]) -> Result<()> {
        if admin.is_superadmin {
            return Ok(());
        }

        let granted = self.granted(&admin.id).await?;
        let missing: Vec<String> = required
            .iter()
            .filter(|needed| !granted.iter().any(|g| g == *needed))
            .map(|needed| needed.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                admin_id = %admin.id,
                missing = ?missing,
                "Admin lacks required permissions"
            );
            Err(AppError::MissingPermissions(missing))
        }
    }

    pub async fn invalidate(&self, admin_id: &str) {
        self.cache.delete(&cache_key(admin_id)).await;
    }

    /// Drop every cached permission set, e.g. after a role's grants change
    pub async fn invalidate_all(&self) -> usize {
        self.cache.invalidate_tag(PERMISSION_CACHE_TAG).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Admin, Role};
    use crate::db::repository::{now, RoleRepository};
    use crate::db::DatabaseManager;

    struct Fixture {
        checker: PermissionChecker,
        roles: RoleRepository,
        permissions: Arc<PermissionRepository>,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        let admins = Arc::new(AdminRepository::new(db.clone()));
        let permissions = Arc::new(PermissionRepository::new(db.clone()));
        let roles = RoleRepository::new(db);
        let ts = now();

        roles
            .create(&Role {
                id: "editor".to_string(),
                name: "editor".to_string(),
                description: None,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            })
            .await
            .unwrap();
        admins
            .create(&Admin {
                id: "a1".to_string(),
                username: "ed".to_string(),
                email: "ed@example.com".to_string(),
                password_hash: "x".to_string(),
                full_name: None,
                role_id: Some("editor".to_string()),
                is_superadmin: false,
                is_active: true,
                last_login: None,
                login_count: 0,
                failed_login_attempts: 0,
                created_at: ts.clone(),
                updated_at: ts,
            })
            .await
            .unwrap();

        let cache = Arc::new(CacheManager::new(true, 100, Duration::from_secs(60)));
        Fixture {
            checker: PermissionChecker::new(admins, permissions.clone(), cache),
            roles,
            permissions,
        }
    }

    fn admin(superadmin: bool) -> AdminUser {
        AdminUser {
            id: "a1".to_string(),
            username: "ed".to_string(),
            role_id: Some("editor".to_string()),
            is_superadmin: superadmin,
            session_id: "s1".to_string(),
        }
    }

    async fn grant(fixture: &Fixture, names: &[&str]) {
        let ids = fixture
            .permissions
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .filter(|p| names.contains(&p.name.as_str()))
            .map(|p| p.id)
            .collect();
        fixture.roles.replace_permissions("editor", ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_all_permissions_required() {
        let fixture = fixture().await;
        grant(&fixture, &["book:read"]).await;

        assert!(fixture.checker.require(&admin(false), &["book:read"]).await.is_ok());
        let err = fixture
            .checker
            .require(&admin(false), &["book:read", "book:delete"])
            .await
            .unwrap_err();
        match err {
            AppError::MissingPermissions(missing) => assert_eq!(missing, vec!["book:delete"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_superadmin_bypasses_checks() {
        let fixture = fixture().await;
        assert!(fixture
            .checker
            .require(&admin(true), &["system:manage", "admin:delete"])
            .await
            .is_ok());
        let effective = fixture.checker.effective(&admin(true)).await.unwrap();
        assert!(effective.contains(&"logs:read".to_string()));
    }

    #[tokio::test]
    async fn test_cached_grants_refresh_after_invalidation() {
        let fixture = fixture().await;
        grant(&fixture, &["book:read"]).await;
        assert!(fixture.checker.require(&admin(false), &["book:read"]).await.is_ok());

        grant(&fixture, &["tag:read"]).await;
        // still served from cache
        assert!(fixture.checker.require(&admin(false), &["book:read"]).await.is_ok());

        assert_eq!(fixture.checker.invalidate_all().await, 1);
        assert!(fixture.checker.require(&admin(false), &["book:read"]).await.is_err());
        assert!(fixture.checker.require(&admin(false), &["tag:read"]).await.is_ok());
    }
}
