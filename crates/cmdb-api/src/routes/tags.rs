//! Tag endpoints and asset tag associations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use cmdb_core::{Tag, TagInput};

use crate::auth::AuthenticatedUser;
use crate::dto::ItemsResponse;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Creates tag routes, nested under `/tags`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/:id", put(update_tag).delete(delete_tag))
        .route(
            "/assets/:asset_id/tags",
            get(get_asset_tags).post(add_asset_tags).put(set_asset_tags),
        )
        .route("/assets/:asset_id/tags/:tag_id", delete(remove_asset_tag))
}

#[derive(Debug, Deserialize)]
pub struct ListTagsQuery {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// Tag ids to attach to an asset.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TagIdsRequest {
    pub tag_ids: Vec<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/tags",
    params(
        ("key" = Option<String>, Query, description = "Substring of the tag key"),
        ("value" = Option<String>, Query, description = "Substring of the tag value")
    ),
    responses(
        (status = 200, description = "Matching tags", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn list_tags(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ListTagsQuery>,
) -> Result<Json<ItemsResponse<Tag>>, ApiError> {
    let tags = state
        .tags
        .list(query.key.as_deref(), query.value.as_deref())
        .await?;
    Ok(Json(tags.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/tags",
    request_body(content = serde_json::Value, description = "`key` and `value`"),
    responses(
        (status = 201, description = "Tag created", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Caller may not manage tags", body = ErrorResponse),
        (status = 409, description = "Tag pair already exists", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn create_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<TagInput>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tags.create(&user.context(), &input).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[utoipa::path(
    put,
    path = "/api/v1/tags/{id}",
    params(
        ("id" = i64, Path, description = "Tag ID")
    ),
    request_body(content = serde_json::Value, description = "New `key` and `value`"),
    responses(
        (status = 200, description = "Tag renamed", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Caller may not manage tags", body = ErrorResponse),
        (status = 404, description = "Tag not found", body = ErrorResponse),
        (status = 409, description = "Tag pair already exists", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn update_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TagInput>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tags.update(&user.context(), id, &input).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tags/{id}",
    params(
        ("id" = i64, Path, description = "Tag ID")
    ),
    responses(
        (status = 204, description = "Tag deleted and detached from every asset"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Caller may not manage tags", body = ErrorResponse),
        (status = 404, description = "Tag not found", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn delete_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tags.delete(&user.context(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/tags/assets/{asset_id}/tags",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Tags of the asset", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn get_asset_tags(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(asset_id): Path<i64>,
) -> Result<Json<ItemsResponse<Tag>>, ApiError> {
    Ok(Json(state.tags.get_tags(asset_id).await?.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/tags/assets/{asset_id}/tags",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    request_body = TagIdsRequest,
    responses(
        (status = 200, description = "Tags of the asset after adding", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset or tag not found", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn add_asset_tags(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<i64>,
    Json(request): Json<TagIdsRequest>,
) -> Result<Json<ItemsResponse<Tag>>, ApiError> {
    let tags = state
        .tags
        .add_tags(&user.context(), asset_id, &request.tag_ids)
        .await?;
    Ok(Json(tags.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/tags/assets/{asset_id}/tags",
    params(
        ("asset_id" = i64, Path, description = "Asset ID")
    ),
    request_body = TagIdsRequest,
    responses(
        (status = 200, description = "Tags of the asset after replacing", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset or tag not found", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn set_asset_tags(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<i64>,
    Json(request): Json<TagIdsRequest>,
) -> Result<Json<ItemsResponse<Tag>>, ApiError> {
    let tags = state
        .tags
        .set_tags(&user.context(), asset_id, &request.tag_ids)
        .await?;
    Ok(Json(tags.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tags/assets/{asset_id}/tags/{tag_id}",
    params(
        ("asset_id" = i64, Path, description = "Asset ID"),
        ("tag_id" = i64, Path, description = "Tag ID")
    ),
    responses(
        (status = 204, description = "Tag detached"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset or tag not found", body = ErrorResponse)
    ),
    tag = "Tags"
)]
async fn remove_asset_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((asset_id, tag_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .tags
        .remove_tag(&user.context(), asset_id, tag_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
