//! Subscription plans, subscriptions and payments

use super::{fetch_all, fetch_page, Conditions, Repository};
use crate::core::error::{AppError, Result};
use crate::core::pagination::Pagination;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Payment, PaymentStatus, Subscription, SubscriptionPlan, SubscriptionStatus};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Repository for SubscriptionPlan entities
pub struct PlanRepository {
    db: Arc<DatabaseManager>,
}

impl PlanRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn list_active(&self) -> Result<Vec<SubscriptionPlan>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!(
                        "SELECT {} FROM subscription_plans WHERE is_active = 1 ORDER BY price, name",
                        SubscriptionPlan::COLUMNS
                    ),
                    [],
                    SubscriptionPlan::from_row,
                )
            })
            .await
    }

    pub async fn list(&self, is_active: Option<bool>, window: Pagination) -> Result<(Vec<SubscriptionPlan>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push_opt("is_active = ?", is_active);
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "subscription_plans",
                    SubscriptionPlan::COLUMNS,
                    &conditions,
                    "price, name",
                    window,
                    SubscriptionPlan::from_row,
                )
            })
            .await
    }
}

fn plan_conflict(err: rusqlite::Error, plan: &SubscriptionPlan) -> AppError {
    AppError::from_write(err, || format!("Plan '{}' already exists", plan.name))
}

#[async_trait]
impl Repository<SubscriptionPlan> for PlanRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<SubscriptionPlan>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM subscription_plans WHERE id = ?", SubscriptionPlan::COLUMNS),
                        [&id],
                        SubscriptionPlan::from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<SubscriptionPlan>> {
        self.db
            .execute(|conn| {
                fetch_all(
                    conn,
                    &format!("SELECT {} FROM subscription_plans ORDER BY price, name", SubscriptionPlan::COLUMNS),
                    [],
                    SubscriptionPlan::from_row,
                )
            })
            .await
    }

    async fn create(&self, plan: &SubscriptionPlan) -> Result<()> {
        let plan = plan.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO subscription_plans (id, name, description, price, currency, billing_cycle, \
                     duration_days, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        plan.id,
                        plan.name,
                        plan.description,
                        plan.price,
                        plan.currency,
                        plan.billing_cycle,
                        plan.duration_days,
                        plan.is_active,
                        plan.created_at,
                        plan.updated_at,
                    ],
                )
                .map_err(|e| plan_conflict(e, &plan))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, plan: &SubscriptionPlan) -> Result<()> {
        let plan = plan.clone();
        self.db
            .execute(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE subscription_plans SET name = ?, description = ?, price = ?, currency = ?, \
                         billing_cycle = ?, duration_days = ?, is_active = ?, updated_at = ? WHERE id = ?",
                        params![
                            plan.name,
                            plan.description,
                            plan.price,
                            plan.currency,
                            plan.billing_cycle,
                            plan.duration_days,
                            plan.is_active,
                            plan.updated_at,
                            plan.id,
                        ],
                    )
                    .map_err(|e| plan_conflict(e, &plan))?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Plan {} not found", plan.id)));
                }
                Ok(())
            })
            .await
    }

    /// Plans referenced by any subscription cannot be removed
    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .transaction(move |tx| {
                let in_use: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM subscriptions WHERE plan_id = ?",
                    [&id],
                    |row| row.get(0),
                )?;
                if in_use > 0 {
                    return Err(AppError::Conflict(format!(
                        "Plan {} is used by {} subscription(s); deactivate it instead",
                        id, in_use
                    )));
                }
                if tx.execute("DELETE FROM subscription_plans WHERE id = ?", [&id])? == 0 {
                    return Err(AppError::NotFound(format!("Plan {} not found", id)));
                }
                Ok(())
            })
            .await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub user_id: Option<String>,
    pub plan_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
}

/// Repository for Subscription entities
pub struct SubscriptionRepository {
    db: Arc<DatabaseManager>,
}

impl SubscriptionRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Subscription>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_subscription(conn, &id)).await
    }

    /// The user's current active subscription; lapsed ones are marked expired first
    pub async fn active_for_user(&self, user_id: &str, now: &str) -> Result<Option<Subscription>> {
        let user_id = user_id.to_string();
        let now = now.to_string();
        self.db
            .transaction(move |tx| {
                expire_lapsed(tx, &now)?;
                active_subscription(tx, &user_id)
            })
            .await
    }

    pub async fn list(&self, filter: &SubscriptionFilter, window: Pagination) -> Result<(Vec<Subscription>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("user_id = ?", filter.user_id.clone())
            .push_opt("plan_id = ?", filter.plan_id.clone())
            .push_opt("status = ?", filter.status.map(|s| s.as_str().to_string()));
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "subscriptions",
                    Subscription::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    Subscription::from_row,
                )
            })
            .await
    }

    /// Record the completed payment and the new active subscription together
    pub async fn create_with_payment(&self, subscription: &Subscription, payment: &Payment) -> Result<()> {
        let subscription = subscription.clone();
        let payment = payment.clone();
        self.db
            .transaction(move |tx| {
                expire_lapsed(tx, &subscription.start_date)?;
                if active_subscription(tx, &subscription.user_id)?.is_some() {
                    return Err(AppError::Conflict("You already have an active subscription".to_string()));
                }
                tx.execute(
                    "INSERT INTO subscriptions (id, user_id, plan_id, status, start_date, end_date, auto_renew, \
                     cancelled_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        subscription.id,
                        subscription.user_id,
                        subscription.plan_id,
                        subscription.status,
                        subscription.start_date,
                        subscription.end_date,
                        subscription.auto_renew,
                        subscription.cancelled_at,
                        subscription.created_at,
                        subscription.updated_at,
                    ],
                )?;
                insert_payment(tx, &payment)?;
                Ok(())
            })
            .await
    }

    /// Cancel the user's active subscription, returning it
    pub async fn cancel_active(&self, user_id: &str, at: &str) -> Result<Subscription> {
        let user_id = user_id.to_string();
        let at = at.to_string();
        self.db
            .transaction(move |tx| {
                expire_lapsed(tx, &at)?;
                let Some(active) = active_subscription(tx, &user_id)? else {
                    return Err(AppError::NotFound("No active subscription".to_string()));
                };
                tx.execute(
                    "UPDATE subscriptions SET status = 'cancelled', auto_renew = 0, cancelled_at = ?1, \
                     updated_at = ?1 WHERE id = ?2",
                    params![at, active.id],
                )?;
                find_subscription(tx, &active.id)?
                    .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", active.id)))
            })
            .await
    }

    pub async fn set_status(&self, id: &str, status: SubscriptionStatus, at: &str) -> Result<Subscription> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .transaction(move |tx| {
                set_subscription_status(tx, &id, status, &at)?;
                find_subscription(tx, &id)?
                    .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
            })
            .await
    }
}

fn find_subscription(conn: &Connection, id: &str) -> Result<Option<Subscription>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM subscriptions WHERE id = ?", Subscription::COLUMNS),
            [id],
            Subscription::from_row,
        )
        .optional()?)
}

fn active_subscription(conn: &Connection, user_id: &str) -> Result<Option<Subscription>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM subscriptions WHERE user_id = ? AND status = 'active' \
                 ORDER BY end_date DESC LIMIT 1",
                Subscription::COLUMNS
            ),
            [user_id],
            Subscription::from_row,
        )
        .optional()?)
}

fn expire_lapsed(conn: &Connection, now: &str) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE subscriptions SET status = 'expired', updated_at = ?1 WHERE status = 'active' AND end_date <= ?1",
        [now],
    )?)
}

fn set_subscription_status(conn: &Connection, id: &str, status: SubscriptionStatus, at: &str) -> Result<()> {
    let changed = if status == SubscriptionStatus::Cancelled {
        conn.execute(
            "UPDATE subscriptions SET status = ?1, auto_renew = 0, cancelled_at = COALESCE(cancelled_at, ?2), \
             updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), at, id],
        )?
    } else {
        conn.execute(
            "UPDATE subscriptions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), at, id],
        )?
    };
    if changed == 0 {
        return Err(AppError::NotFound(format!("Subscription {} not found", id)));
    }
    Ok(())
}

fn insert_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        "INSERT INTO payments (id, user_id, subscription_id, amount, currency, payment_method, status, \
         transaction_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            payment.id,
            payment.user_id,
            payment.subscription_id,
            payment.amount,
            payment.currency,
            payment.payment_method,
            payment.status,
            payment.transaction_id,
            payment.created_at,
            payment.updated_at,
        ],
    )
    .map_err(|e| {
        AppError::from_write(e, || format!("Transaction {} was already recorded", payment.transaction_id))
    })?;
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub user_id: Option<String>,
    pub status: Option<PaymentStatus>,
}

/// Repository for Payment entities; payments are never deleted
pub struct PaymentRepository {
    db: Arc<DatabaseManager>,
}

impl PaymentRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_payment(conn, &id)).await
    }

    pub async fn list(&self, filter: &PaymentFilter, window: Pagination) -> Result<(Vec<Payment>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_opt("user_id = ?", filter.user_id.clone())
            .push_opt("status = ?", filter.status.map(|s| s.as_str().to_string()));
        self.db
            .execute(move |conn| {
                fetch_page(
                    conn,
                    "payments",
                    Payment::COLUMNS,
                    &conditions,
                    "created_at DESC, id",
                    window,
                    Payment::from_row,
                )
            })
            .await
    }

    /// Change the payment status; a refund cancels the linked subscription
    pub async fn set_status(&self, id: &str, status: PaymentStatus, at: &str) -> Result<Payment> {
        let id = id.to_string();
        let at = at.to_string();
        self.db
            .transaction(move |tx| {
                let changed = tx.execute(
                    "UPDATE payments SET status = ?, updated_at = ? WHERE id = ?",
                    params![status.as_str(), at, id],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound(format!("Payment {} not found", id)));
                }
                let payment = find_payment(tx, &id)?
                    .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", id)))?;

                if status == PaymentStatus::Refunded {
                    if let Some(subscription_id) = &payment.subscription_id {
                        set_subscription_status(tx, subscription_id, SubscriptionStatus::Cancelled, &at)?;
                    }
                }
                Ok(payment)
            })
            .await
    }
}

fn find_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE id = ?", Payment::COLUMNS),
            [id],
            Payment::from_row,
        )
        .optional()?)
}
