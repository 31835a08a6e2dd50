//! Audit trail writer
//!
//! Admin mutations and every authentication attempt are recorded. A failure
//! to write an audit entry is logged and never fails the request itself.

use crate::api::middleware::ClientInfo;
use crate::core::error::Result;
use crate::core::pagination::{Page, Pagination};
use crate::db::models::{AdminActivityLog, AuthenticationLog, SubjectKind};
use crate::db::repository::{
    new_id, now, ActivityLogFilter, ActivityLogRepository, AuthLogFilter, AuthLogRepository,
};
use std::sync::Arc;

/// Kind of admin activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    Moderate,
    Send,
    Clear,
    Backup,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Create => "CREATE",
            ActivityType::Update => "UPDATE",
            ActivityType::Delete => "DELETE",
            ActivityType::Login => "LOGIN",
            ActivityType::Logout => "LOGOUT",
            ActivityType::Moderate => "MODERATE",
            ActivityType::Send => "SEND",
            ActivityType::Clear => "CLEAR",
            ActivityType::Backup => "BACKUP",
        }
    }
}

/// One admin activity about to be recorded
#[derive(Debug, Clone)]
pub struct Activity<'a> {
    pub admin_id: &'a str,
    pub activity_type: ActivityType,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

impl<'a> Activity<'a> {
    pub fn new(
        admin_id: &'a str,
        activity_type: ActivityType,
        resource_type: &'a str,
        resource_id: Option<&'a str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            admin_id,
            activity_type,
            resource_type,
            resource_id,
            description: description.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One authentication attempt about to be recorded
#[derive(Debug, Clone)]
pub struct AuthAttempt<'a> {
    pub subject_kind: SubjectKind,
    pub subject_id: Option<&'a str>,
    pub username: &'a str,
    pub event: &'a str,
    pub success: bool,
    pub failure_reason: Option<&'a str>,
}

pub struct AuditLogger {
    activity_logs: Arc<ActivityLogRepository>,
    auth_logs: Arc<AuthLogRepository>,
}

impl AuditLogger {
    pub fn new(activity_logs: Arc<ActivityLogRepository>, auth_logs: Arc<AuthLogRepository>) -> Self {
        Self {
            activity_logs,
            auth_logs,
        }
    }

    pub async fn record_activity(&self, activity: Activity<'_>, client: &ClientInfo) {
        let entry = AdminActivityLog {
            id: new_id(),
            admin_id: Some(activity.admin_id.to_string()),
            activity_type: activity.activity_type.as_str().to_string(),
            resource_type: activity.resource_type.to_string(),
            resource_id: activity.resource_id.map(str::to_string),
            description: activity.description,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            metadata: activity.metadata,
            created_at: now(),
        };

        tracing::info!(
            admin_id = activity.admin_id,
            activity_type = %entry.activity_type,
            resource_type = %entry.resource_type,
            resource_id = ?entry.resource_id,
            "{}",
            entry.description
        );

        if let Err(e) = self.activity_logs.insert(&entry).await {
            tracing::warn!(error = %e, "Failed to write admin activity log");
        }
    }

    pub async fn record_auth(&self, attempt: AuthAttempt<'_>, client: &ClientInfo) {
        let entry = AuthenticationLog {
            id: new_id(),
            subject_kind: attempt.subject_kind.as_str().to_string(),
            subject_id: attempt.subject_id.map(str::to_string),
            username: attempt.username.to_string(),
            event: attempt.event.to_string(),
            success: attempt.success,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            failure_reason: attempt.failure_reason.map(str::to_string),
            created_at: now(),
        };

        if attempt.success {
            tracing::info!(
                subject_kind = attempt.subject_kind.as_str(),
                username = attempt.username,
                event = attempt.event,
                "Authentication succeeded"
            );
        } else {
            tracing::warn!(
                subject_kind = attempt.subject_kind.as_str(),
                username = attempt.username,
                event = attempt.event,
                reason = ?attempt.failure_reason,
                "Authentication failed"
            );
        }

        if let Err(e) = self.auth_logs.insert(&entry).await {
            tracing::warn!(error = %e, "Failed to write authentication log");
        }
    }

    pub async fn activity_page(
        &self,
        filter: &ActivityLogFilter,
        window: Pagination,
    ) -> Result<Page<AdminActivityLog>> {
        let (items, total) = self.activity_logs.list(filter, window).await?;
        Ok(Page::new(items, total, window))
    }

    pub async fn auth_page(
        &self,
        filter: &AuthLogFilter,
        window: Pagination,
    ) -> Result<Page<AuthenticationLog>> {
        let (items, total) = self.auth_logs.list(filter, window).await?;
        Ok(Page::new(items, total, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseManager;

    fn logger() -> AuditLogger {
        let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
        AuditLogger::new(
            Arc::new(ActivityLogRepository::new(db.clone())),
            Arc::new(AuthLogRepository::new(db)),
        )
    }

    #[tokio::test]
    async fn test_activity_carries_client_info() {
        let audit = logger();
        let client = ClientInfo {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("admin-console".to_string()),
        };

        audit
            .record_activity(
                Activity::new("admin-1", ActivityType::Delete, "book", Some("b1"), "Deleted book")
                    .with_metadata(serde_json::json!({"soft": true})),
                &client,
            )
            .await;

        let page = audit
            .activity_page(&ActivityLogFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        let entry = &page.items[0];
        assert_eq!(entry.activity_type, "DELETE");
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(entry.metadata, Some(serde_json::json!({"soft": true})));
    }

    #[tokio::test]
    async fn test_failed_attempt_is_recorded() {
        let audit = logger();
        audit
            .record_auth(
                AuthAttempt {
                    subject_kind: SubjectKind::User,
                    subject_id: None,
                    username: "ghost",
                    event: "login",
                    success: false,
                    failure_reason: Some("Invalid credentials"),
                },
                &ClientInfo::default(),
            )
            .await;

        let filter = AuthLogFilter {
            success: Some(false),
            ..Default::default()
        };
        let page = audit.auth_page(&filter, Pagination::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].subject_kind, "user");
        assert_eq!(page.items[0].failure_reason.as_deref(), Some("Invalid credentials"));
    }
}
