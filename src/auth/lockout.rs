//! Failed-login lockout
//!
//! Accounts are locked for a while once too many wrong passwords arrive in a
//! row. Failures for unknown logins are counted too, so guessing at valid
//! usernames gets locked out the same way.

use crate::core::config::SecurityConfig;
use crate::core::error::AppError;
use crate::db::models::SubjectKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct FailedLogins {
    count: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

/// Rejection for a locked account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLocked {
    pub retry_after: u64,
}

impl From<AccountLocked> for AppError {
    fn from(locked: AccountLocked) -> Self {
        AppError::ResourceLimitExceeded(format!(
            "Too many failed login attempts. Try again in {} minute(s).",
            locked.retry_after.div_ceil(60).max(1)
        ))
    }
}

/// Counts consecutive failed logins per account
///
/// Failures older than the lockout window no longer count, and a successful
/// login resets the account.
#[derive(Clone)]
pub struct LoginGuard {
    accounts: Arc<Mutex<HashMap<String, FailedLogins>>>,
    max_attempts: u32,
    lockout: Duration,
}

impl LoginGuard {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
            max_attempts,
            lockout,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.max_login_attempts, Duration::from_secs(config.lockout_minutes * 60))
    }

    fn key(kind: SubjectKind, account: &str) -> String {
        format!("{}:{}", kind, account.trim().to_lowercase())
    }

    /// Reject the attempt while the account is locked
    pub async fn check(&self, kind: SubjectKind, account: &str) -> Result<(), AccountLocked> {
        let now = Instant::now();
        let key = Self::key(kind, account);
        let mut accounts = self.accounts.lock().await;

        match accounts.get(&key).and_then(|entry| entry.locked_until) {
            Some(until) if until > now => Err(AccountLocked {
                retry_after: (until - now).as_secs().max(1),
            }),
            Some(_) => {
                accounts.remove(&key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Count a failed attempt; returns the lock when this failure triggered it
    pub async fn record_failure(&self, kind: SubjectKind, account: &str) -> Option<AccountLocked> {
        let now = Instant::now();
        let key = Self::key(kind, account);
        let mut accounts = self.accounts.lock().await;
        let entry = accounts.entry(key).or_insert(FailedLogins {
            count: 0,
            last_failure: now,
            locked_until: None,
        });

        if now.duration_since(entry.last_failure) >= self.lockout {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_failure = now;

        if entry.count >= self.max_attempts {
            entry.locked_until = Some(now + self.lockout);
            tracing::warn!(
                kind = %kind,
                account = %account,
                attempts = entry.count,
                "Account locked after repeated failed logins"
            );
            return Some(AccountLocked {
                retry_after: self.lockout.as_secs().max(1),
            });
        }
        None
    }

    pub async fn record_success(&self, kind: SubjectKind, account: &str) {
        self.accounts.lock().await.remove(&Self::key(kind, account));
    }

    /// Forget accounts whose failures and locks have all expired
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut accounts = self.accounts.lock().await;
        let before = accounts.len();
        accounts.retain(|_, entry| match entry.locked_until {
            Some(until) => until > now,
            None => now.duration_since(entry.last_failure) < self.lockout,
        });
        before - accounts.len()
    }

    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let guard = self.clone();
        let period = self.lockout.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = guard.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "Login lockout entries expired");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let guard = LoginGuard::new(3, Duration::from_secs(60));
        assert!(guard.record_failure(SubjectKind::User, "alice").await.is_none());
        assert!(guard.record_failure(SubjectKind::User, "alice").await.is_none());
        assert!(guard.check(SubjectKind::User, "alice").await.is_ok());

        let locked = guard.record_failure(SubjectKind::User, "Alice ").await.unwrap();
        assert_eq!(locked.retry_after, 60);
        assert!(guard.check(SubjectKind::User, "alice").await.is_err());

        // the same name on the other site is a different account
        assert!(guard.check(SubjectKind::Admin, "alice").await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let guard = LoginGuard::new(2, Duration::from_secs(60));
        guard.record_failure(SubjectKind::Admin, "root").await;
        guard.record_success(SubjectKind::Admin, "root").await;
        assert!(guard.record_failure(SubjectKind::Admin, "root").await.is_none());
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let guard = LoginGuard::new(1, Duration::from_millis(50));
        guard.record_failure(SubjectKind::User, "bob").await;
        assert!(guard.check(SubjectKind::User, "bob").await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(guard.check(SubjectKind::User, "bob").await.is_ok());
        assert_eq!(guard.cleanup_expired().await, 0);
    }

    #[test]
    fn test_locked_maps_to_too_many_requests() {
        let error: AppError = AccountLocked { retry_after: 90 }.into();
        assert_eq!(error.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert!(error.to_string().contains("2 minute(s)"));
    }
}
