//! First superadmin

use crate::auth::password::hash_password_async;
use crate::core::config::SecurityConfig;
use crate::core::error::Result;
use crate::db::models::Admin;
use crate::db::repository::{new_id, now, AdminRepository, Repository};

/// Create the configured superadmin when the admins table is empty
///
/// Returns the new admin, or `None` when admins already exist.
pub async fn ensure_bootstrap_admin(
    admins: &AdminRepository,
    security: &SecurityConfig,
) -> Result<Option<Admin>> {
    if admins.count().await? > 0 {
        return Ok(None);
    }

    let ts = now();
    let admin = Admin {
        id: new_id(),
        username: security.bootstrap_admin_username.clone(),
        email: security.bootstrap_admin_email.clone(),
        password_hash: hash_password_async(security.bootstrap_admin_password.clone()).await?,
        full_name: Some("Administrator".to_string()),
        role_id: None,
        is_superadmin: true,
        is_active: true,
        last_login: None,
        login_count: 0,
        failed_login_attempts: 0,
        created_at: ts.clone(),
        updated_at: ts,
    };
    admins.create(&admin).await?;

    tracing::warn!(
        username = %admin.username,
        "Created bootstrap superadmin; change its password"
    );
    Ok(Some(admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::db::DatabaseManager;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let admins = AdminRepository::new(Arc::new(DatabaseManager::new_in_memory().unwrap()));
        let security = Config::defaults().unwrap().security;

        let created = ensure_bootstrap_admin(&admins, &security).await.unwrap().unwrap();
        assert!(created.is_superadmin);
        assert_eq!(created.username, security.bootstrap_admin_username);

        assert!(ensure_bootstrap_admin(&admins, &security).await.unwrap().is_none());
        assert_eq!(admins.count().await.unwrap(), 1);
    }
}
