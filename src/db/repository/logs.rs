//! Append-only audit trails

use super::{fetch_page, Conditions};
use crate::core::error::Result;
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{AdminActivityLog, AuthenticationLog, SubjectKind};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityLogFilter {
    pub admin_id: Option<String>,
    pub activity_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub struct ActivityLogRepository {
    db: Arc<DatabaseManager>,
}

impl ActivityLogRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, entry: &AdminActivityLog) -> Result<()> {
        let entry = entry.clone();
        let metadata = entry.metadata.as_ref().map(|m| m.to_string());
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO admin_activity_logs (id, admin_id, activity_type, resource_type, resource_id, \
                     description, ip_address, user_agent, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        entry.id,
                        entry.admin_id,
                        entry.activity_type,
                        entry.resource_type,
                        entry.resource_id,
                        entry.description,
                        entry.ip_address,
                        entry.user_agent,
                        metadata,
                        entry.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Newest first; date bounds are inclusive
    pub async fn list(
        &self,
        filter: &ActivityLogFilter,
        window: Pagination,
    ) -> Result<(Vec<AdminActivityLog>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("admin_id = ?", filter.admin_id.clone())
            .push_opt("activity_type = ?", filter.activity_type.clone().map(|t| t.to_uppercase()))
            .push_opt("resource_type = ?", filter.resource_type.clone())
            .push_opt("resource_id = ?", filter.resource_id.clone())
            .push_opt("created_at >= ?", filter.start_date.clone())
            .push_opt("created_at <= ?", filter.end_date.as_deref().map(end_of_day));
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "admin_activity_logs",
                    AdminActivityLog::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    AdminActivityLog::from_row,
                )
            })
            .await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthLogFilter {
    pub subject_kind: Option<SubjectKind>,
    pub username: Option<String>,
    pub success: Option<bool>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub struct AuthLogRepository {
    db: Arc<DatabaseManager>,
}

impl AuthLogRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, entry: &AuthenticationLog) -> Result<()> {
        let entry = entry.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO authentication_logs (id, subject_kind, subject_id, username, event, success, \
                     ip_address, user_agent, failure_reason, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        entry.id,
                        entry.subject_kind,
                        entry.subject_id,
                        entry.username,
                        entry.event,
                        entry.success,
                        entry.ip_address,
                        entry.user_agent,
                        entry.failure_reason,
                        entry.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list(&self, filter: &AuthLogFilter, window: Pagination) -> Result<(Vec<AuthenticationLog>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("subject_kind = ?", filter.subject_kind.map(|k| k.as_str().to_string()))
            .push_opt("username = ?", filter.username.clone())
            .push_opt("success = ?", filter.success)
            .push_opt("created_at >= ?", filter.start_date.clone())
            .push_opt("created_at <= ?", filter.end_date.as_deref().map(end_of_day));
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "authentication_logs",
                    AuthenticationLog::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    AuthenticationLog::from_row,
                )
            })
            .await
    }
}

/// A bare `YYYY-MM-DD` upper bound covers the whole day
fn end_of_day(date: &str) -> String {
    if date.len() == 10 {
        format!("{}T23:59:59Z", date)
    } else {
        date.to_string()
    }
}
