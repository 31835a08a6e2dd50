use super::AppState;
use crate::api::middleware::ClientInfo;
use crate::api::models::{
    CreateAuthorRequest, CreateCategoryRequest, CreatePublisherRequest, SearchQuery, TagRequest,
    UpdateAuthorRequest, UpdateCategoryRequest, UpdatePublisherRequest,
};
use crate::auth::AdminUser;
use crate::core::audit::ActivityType;
use crate::core::error::Result;
use crate::core::pagination::PageParams;
use crate::db::repository::CategoryFilter;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

// Category, tag, author and publisher management (admin site)

/// Handler for GET /api/v1/admin/categories
pub async fn admin_list_categories(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(filter): Query<CategoryFilter>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["category:read"]).await?;
    let categories = state
        .catalog_service
        .list_categories(&filter, page.resolve()?)
        .await?;
    Ok(Json(categories))
}

/// Handler for POST /api/v1/admin/categories
pub async fn admin_create_category(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["category:create"]).await?;
    let category = state.catalog_service.create_category(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "category",
            Some(&category.id),
            format!("Created category '{}'", category.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Handler for GET /api/v1/admin/categories/:id
pub async fn admin_get_category(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["category:read"]).await?;
    Ok(Json(state.catalog_service.get_category(&id).await?))
}

/// Handler for PUT /api/v1/admin/categories/:id
pub async fn admin_update_category(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["category:update"]).await?;
    let category = state.catalog_service.update_category(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "category",
            Some(&id),
            format!("Updated category '{}'", category.name),
        )
        .await;
    Ok(Json(category))
}

/// Handler for DELETE /api/v1/admin/categories/:id
pub async fn admin_delete_category(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["category:delete"]).await?;
    state.catalog_service.delete_category(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "category", Some(&id), "Deleted category")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/tags
pub async fn admin_list_tags(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["tag:read"]).await?;
    let tags = state.catalog_service.list_tags(query.search, page.resolve()?).await?;
    Ok(Json(tags))
}

/// Handler for POST /api/v1/admin/tags
pub async fn admin_create_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<TagRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["tag:create"]).await?;
    let tag = state.catalog_service.create_tag(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "tag",
            Some(&tag.id),
            format!("Created tag '{}'", tag.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// Handler for GET /api/v1/admin/tags/:id
pub async fn admin_get_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["tag:read"]).await?;
    Ok(Json(state.catalog_service.get_tag(&id).await?))
}

/// Handler for PUT /api/v1/admin/tags/:id
pub async fn admin_update_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<TagRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["tag:update"]).await?;
    let tag = state.catalog_service.update_tag(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "tag",
            Some(&id),
            format!("Updated tag '{}'", tag.name),
        )
        .await;
    Ok(Json(tag))
}

/// Handler for DELETE /api/v1/admin/tags/:id
pub async fn admin_delete_tag(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["tag:delete"]).await?;
    state.catalog_service.delete_tag(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "tag", Some(&id), "Deleted tag")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/authors
pub async fn admin_list_authors(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["author:read"]).await?;
    let authors = state
        .catalog_service
        .list_authors(query.search, page.resolve()?)
        .await?;
    Ok(Json(authors))
}

/// Handler for POST /api/v1/admin/authors
pub async fn admin_create_author(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreateAuthorRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["author:create"]).await?;
    let author = state.catalog_service.create_author(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "author",
            Some(&author.id),
            format!("Created author '{}'", author.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Handler for GET /api/v1/admin/authors/:id
pub async fn admin_get_author(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["author:read"]).await?;
    Ok(Json(state.catalog_service.get_author(&id).await?))
}

/// Handler for PUT /api/v1/admin/authors/:id
pub async fn admin_update_author(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateAuthorRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["author:update"]).await?;
    let author = state.catalog_service.update_author(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "author",
            Some(&id),
            format!("Updated author '{}'", author.name),
        )
        .await;
    Ok(Json(author))
}

/// Handler for DELETE /api/v1/admin/authors/:id
pub async fn admin_delete_author(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["author:delete"]).await?;
    state.catalog_service.delete_author(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "author", Some(&id), "Deleted author")
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/admin/publishers
pub async fn admin_list_publishers(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["publisher:read"]).await?;
    let publishers = state
        .catalog_service
        .list_publishers(query.search, page.resolve()?)
        .await?;
    Ok(Json(publishers))
}

/// Handler for POST /api/v1/admin/publishers
pub async fn admin_create_publisher(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Json(req): Json<CreatePublisherRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["publisher:create"]).await?;
    let publisher = state.catalog_service.create_publisher(req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Create,
            "publisher",
            Some(&publisher.id),
            format!("Created publisher '{}'", publisher.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(publisher)))
}

/// Handler for GET /api/v1/admin/publishers/:id
pub async fn admin_get_publisher(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["publisher:read"]).await?;
    Ok(Json(state.catalog_service.get_publisher(&id).await?))
}

/// Handler for PUT /api/v1/admin/publishers/:id
pub async fn admin_update_publisher(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdatePublisherRequest>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["publisher:update"]).await?;
    let publisher = state.catalog_service.update_publisher(&id, req).await?;

    state
        .log_activity(
            &admin,
            &client,
            ActivityType::Update,
            "publisher",
            Some(&id),
            format!("Updated publisher '{}'", publisher.name),
        )
        .await;
    Ok(Json(publisher))
}

/// Handler for DELETE /api/v1/admin/publishers/:id
pub async fn admin_delete_publisher(
    State(state): State<AppState>,
    admin: AdminUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.permissions.require(&admin, &["publisher:delete"]).await?;
    state.catalog_service.delete_publisher(&id).await?;

    state
        .log_activity(&admin, &client, ActivityType::Delete, "publisher", Some(&id), "Deleted publisher")
        .await;
    Ok(StatusCode::NO_CONTENT)
}
