use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    CreatePlanRequest, PaymentStatusRequest, PlanQuery, SubscribeRequest, SubscriptionStatusRequest,
    UpdatePlanRequest,
};
use crate::auth::{AdminUser, AuthUser};
use crate::core::audit::ActivityType;
use crate::core::error::Result;
use crate::core::pagination::{Page, PageParams};
use crate::db::repository::{PaymentFilter, SubscriptionFilter};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

// Subscriptions and payments: reader endpoints first, then admin endpoints

/// Handler for GET /api/v1/subscriptions/plans
pub async fn list_active_plans(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.subscription_service.active_plans().await?))
}

/// Handler for GET /api/v1/subscriptions/me - Active subscription or null
pub async fn my_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    Ok(Json(state.subscription_service.current(&user.id).await?))
}

/// Handler for POST /api/v1/subscriptions
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse> {
    let subscription = state.subscription_service.subscribe(&user.id, req).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Handler for POST /api/v1/subscriptions/me/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    Ok(Json(state.subscription_service.cancel(&user.id).await?))
}

/// Handler for GET /api/v1/payments - Own payment history
pub async fn my_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    let window = page.resolve()?;
    let filter = PaymentFilter {
        user_id: Some(user.id),
        status: None,
    };
    let (items, total) = state.payment_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/admin/subscription-plans
pub async fn admin_list_plans(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<PlanQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:read"]).await?;
    let plans = state
        .subscription_service
        .list_plans(query.is_active, page.resolve()?)
        .await?;
    Ok(Json(plans))
}

/// Handler for POST /api/v1/admin/subscription-plans
pub async fn admin_create_plan(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreatePlanRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:create"]).await?;
    let plan = state.subscription_service.create_plan(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "subscription_plan",
            Some(&plan.id),
            format!("Created subscription plan '{}'", plan.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Handler for GET /api/v1/admin/subscription-plans/:id
pub async fn admin_get_plan(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:read"]).await?;
    Ok(Json(state.subscription_service.get_plan(&id).await?))
}

/// Handler for PUT /api/v1/admin/subscription-plans/:id
pub async fn admin_update_plan(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:update"]).await?;
    let plan = state.subscription_service.update_plan(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "subscription_plan",
            Some(&id),
            format!("Updated subscription plan '{}'", plan.name),
        )
        .await;
    Ok(Json(plan))
}

/// Handler for DELETE /api/v1/admin/subscription-plans/:id
pub async fn admin_delete_plan(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:delete"]).await?;
    state.subscription_service.delete_plan(&id).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Delete,
            "subscription_plan",
            Some(&id),
            "Deleted subscription plan",
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/subscriptions
pub async fn admin_list_subscriptions(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<SubscriptionFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.subscription_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for PUT /api/v1/admin/subscriptions/:id/status
pub async fn admin_set_subscription_status(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<SubscriptionStatusRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["subscription:update"]).await?;
    let subscription = state
        .subscription_service
        .set_subscription_status(&id, req.status)
        .await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "subscription",
            Some(&id),
            format!("Set subscription status to {}", req.status),
        )
        .await;
    Ok(Json(subscription))
}

/// Handler for GET /api/v1/admin/payments
pub async fn admin_list_payments(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<PaymentFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["payment:read"]).await?;
    let window = page.resolve()?;
    let (items, total) = state.payment_repo.list(&filter, window).await?;
    Ok(Json(Page::new(items, total, window)))
}

/// Handler for GET /api/v1/admin/payments/:id
pub async fn admin_get_payment(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["payment:read"]).await?;
    Ok(Json(state.subscription_service.get_payment(&id).await?))
}

/// Handler for PUT /api/v1/admin/payments/:id/status
pub async fn admin_set_payment_status(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<PaymentStatusRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["payment:update"]).await?;
    let payment = state
        .subscription_service
        .set_payment_status(&id, req.status)
        .await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "payment",
            Some(&id),
            format!("Set payment status to {}", req.status),
        )
        .await;
    Ok(Json(payment))
}
