use crate::db::models::{PaymentStatus, SubscriptionStatus};
use serde::Deserialize;

// Subscription plan, subscription and payment API models

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// "monthly", "yearly", ...
    pub billing_cycle: String,
    pub duration_days: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub billing_cycle: Option<String>,
    pub duration_days: Option<i64>,
    pub is_active: Option<bool>,
}

/// Query parameters for GET /api/v1/admin/subscription-plans
#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    pub is_active: Option<bool>,
}

/// Request body for POST /api/v1/subscriptions
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_id: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub auto_renew: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionStatusRequest {
    pub status: SubscriptionStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_payment_method() -> String {
    "card".to_string()
}

fn default_true() -> bool {
    true
}
