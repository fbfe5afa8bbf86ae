//! Asset management endpoints.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use cmdb_core::asset_store::batch::rows_from_table;
use cmdb_core::db::{PaginatedResult, Pagination};
use cmdb_core::tabular::{self, xlsx};
use cmdb_core::{Asset, AssetFilter, AssetInput, AssetType, BatchImportResult, TagFilter};

use crate::auth::AuthenticatedUser;
use crate::dto::{FieldValuesResponse, ItemsResponse};
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;
use crate::upload::{read_file_field, MAX_BODY_BYTES};

/// Creates asset routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assets).post(create_asset))
        .route("/field-values", get(field_values))
        .route("/expiring", get(expiring_assets))
        .route("/export", get(export_assets))
        .route("/batch-import", post(batch_import))
        .route("/batch-import/template/:asset_type", get(import_template))
        .route(
            "/:id",
            get(get_asset).put(update_asset).delete(delete_asset),
        )
}

// ============================================================================
// DTOs
// ============================================================================

/// Query parameters for listing assets.
#[derive(Debug, Deserialize, Validate)]
pub struct ListAssetsQuery {
    pub asset_type: Option<String>,
    /// Free-text search over name, description and identifying attributes.
    pub search: Option<String>,
    /// Comma-separated `key=value` or `key` terms.
    pub tags: Option<String>,
    /// Page number (1-indexed).
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    /// Items per page.
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u32>,
}

impl ListAssetsQuery {
    fn filter(&self) -> Result<AssetFilter, ApiError> {
        let mut filter = AssetFilter::new(parse_asset_type(self.asset_type.as_deref())?);
        filter.search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        filter.tags = self
            .tags
            .as_deref()
            .map(TagFilter::parse_list)
            .unwrap_or_default();
        Ok(filter)
    }
}

#[derive(Debug, Deserialize)]
pub struct FieldValuesQuery {
    pub asset_type: Option<String>,
    pub field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub asset_type: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssetTypeQuery {
    pub asset_type: Option<String>,
}

/// Default look-ahead for the expiring listing.
const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;

/// Parses a required `asset_type` parameter.
pub(crate) fn parse_asset_type(raw: Option<&str>) -> Result<AssetType, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation_field("asset_type", "required", "asset_type is required"))?;
    raw.parse::<AssetType>()
        .map_err(|errors| ApiError::ValidationError(errors.into()))
}

fn attachment(content_type: &str, filename: &str, body: impl IntoResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Lists one page of assets of a type, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/assets",
    params(
        ("asset_type" = String, Query, description = "server, cloud, database, software, system or hardware"),
        ("search" = Option<String>, Query, description = "Free-text search"),
        ("tags" = Option<String>, Query, description = "Comma-separated key=value or key terms, all must match"),
        ("page" = Option<u32>, Query, description = "Page number (1-indexed)"),
        ("page_size" = Option<u32>, Query, description = "Items per page (max 100)")
    ),
    responses(
        (status = 200, description = "One page of assets", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn list_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Json<PaginatedResult<Asset>>, ApiError> {
    query.validate()?;
    let filter = query.filter()?;
    let pagination = Pagination::from_query(query.page, query.page_size);

    let page = state
        .assets
        .list(&user.context(), &filter, &pagination)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/assets",
    request_body(content = serde_json::Value, description = "Asset with `asset_type` and its type-specific fields"),
    responses(
        (status = 201, description = "Asset created", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn create_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<AssetInput>,
) -> Result<(StatusCode, Json<Asset>), ApiError> {
    let asset = state.assets.create(&user.context(), &input).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

#[utoipa::path(
    get,
    path = "/api/v1/assets/{id}",
    params(
        ("id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Asset with tags and credentials", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn get_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Asset>, ApiError> {
    Ok(Json(state.assets.get(&user.context(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/assets/{id}",
    params(
        ("id" = i64, Path, description = "Asset ID")
    ),
    request_body(content = serde_json::Value, description = "Full asset; blank or masked secrets keep their stored value"),
    responses(
        (status = 200, description = "Asset updated", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn update_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<AssetInput>,
) -> Result<Json<Asset>, ApiError> {
    Ok(Json(state.assets.update(&user.context(), id, &input).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/assets/{id}",
    params(
        ("id" = i64, Path, description = "Asset ID")
    ),
    responses(
        (status = 204, description = "Asset deleted"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn delete_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.assets.delete(&user.context(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Distinct values of a suggestion field across assets of a type.
#[utoipa::path(
    get,
    path = "/api/v1/assets/field-values",
    params(
        ("asset_type" = String, Query, description = "Asset type"),
        ("field" = String, Query, description = "Suggestion field of that type")
    ),
    responses(
        (status = 200, description = "Distinct values, sorted", body = FieldValuesResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn field_values(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<FieldValuesQuery>,
) -> Result<Json<FieldValuesResponse>, ApiError> {
    let asset_type = parse_asset_type(query.asset_type.as_deref())?;
    let field = query
        .field
        .as_deref()
        .ok_or_else(|| ApiError::validation_field("field", "required", "field is required"))?;

    let values = state
        .assets
        .distinct_field_values(&user.context(), asset_type, field)
        .await?;
    Ok(Json(FieldValuesResponse { values }))
}

/// Assets whose expiry falls within the next `days` days, soonest first.
#[utoipa::path(
    get,
    path = "/api/v1/assets/expiring",
    params(
        ("asset_type" = String, Query, description = "Asset type with an expiry date"),
        ("days" = Option<i64>, Query, description = "Look-ahead window in days (1-365, default 30)")
    ),
    responses(
        (status = 200, description = "Expiring assets, soonest first", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn expiring_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<ItemsResponse<Asset>>, ApiError> {
    let asset_type = parse_asset_type(query.asset_type.as_deref())?;
    let days = query.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);

    let assets = state
        .assets
        .expiring_soon(&user.context(), asset_type, days)
        .await?;
    Ok(Json(assets.into()))
}

/// Every asset matching the list filters, as a CSV attachment.
#[utoipa::path(
    get,
    path = "/api/v1/assets/export",
    params(
        ("asset_type" = String, Query, description = "Asset type"),
        ("search" = Option<String>, Query, description = "Free-text search"),
        ("tags" = Option<String>, Query, description = "Tag filter terms")
    ),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn export_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Response, ApiError> {
    let filter = query.filter()?;
    let assets = state.assets.search_all(&user.context(), &filter).await?;
    let csv = tabular::export_assets_csv(filter.asset_type, &assets);

    info!(
        asset_type = %filter.asset_type,
        count = assets.len(),
        actor = %user.0.username,
        "Assets exported to CSV"
    );

    let filename = format!(
        "{}_assets_{}.csv",
        filter.asset_type,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok(attachment("text/csv; charset=utf-8", &filename, csv))
}

/// Creates one asset per row of an uploaded `.xlsx` or `.csv` sheet.
#[utoipa::path(
    post,
    path = "/api/v1/assets/batch-import",
    params(
        ("asset_type" = String, Query, description = "Asset type of every row")
    ),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "`file` field holding an .xlsx or .csv sheet"),
    responses(
        (status = 200, description = "Created count and per-row errors", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn batch_import(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AssetTypeQuery>,
    multipart: Multipart,
) -> Result<Json<BatchImportResult>, ApiError> {
    let asset_type = parse_asset_type(query.asset_type.as_deref())?;
    let file = read_file_field(multipart, MAX_BODY_BYTES).await?;

    let table = tabular::read_table(&file.filename, &file.bytes)?;
    let rows = rows_from_table(table);
    info!(
        %asset_type,
        filename = %file.filename,
        rows = rows.len(),
        "Batch import uploaded"
    );

    let result = state
        .assets
        .batch_import(&user.context(), asset_type, &rows)
        .await?;
    Ok(Json(result))
}

/// Spreadsheet template with the import headers and one example row.
#[utoipa::path(
    get,
    path = "/api/v1/assets/batch-import/template/{asset_type}",
    params(
        ("asset_type" = String, Path, description = "Asset type")
    ),
    responses(
        (status = 200, description = "XLSX template", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Assets"
)]
async fn import_template(
    _user: AuthenticatedUser,
    Path(asset_type): Path<String>,
) -> Result<Response, ApiError> {
    let asset_type = parse_asset_type(Some(&asset_type))?;
    let workbook = xlsx::build_template(asset_type)?;
    let filename = format!("{}_import_template.xlsx", asset_type);
    Ok(attachment(xlsx::XLSX_CONTENT_TYPE, &filename, workbook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use cmdb_core::Role;
    use serde_json::{json, Value};

    use crate::test_helpers::{
        create_test_state, create_test_user, send, send_json, test_router, upload,
    };

    async fn setup(role: Role) -> Router {
        let state = create_test_state().await;
        let user = create_test_user(&state, "operator", role).await;
        test_router(state, user)
    }

    fn server_body(name: &str) -> Value {
        json!({
            "asset_type": "server",
            "name": name,
            "public_ipv4": "203.0.113.10",
            "os_name": "Ubuntu",
            "credentials": [
                {"credential_type": "password", "key": "root", "value": "hunter2"}
            ]
        })
    }

    #[test]
    fn test_parse_asset_type() {
        assert!(matches!(parse_asset_type(Some("cloud")), Ok(AssetType::Cloud)));
        assert!(matches!(
            parse_asset_type(Some("printer")),
            Err(ApiError::ValidationError(_))
        ));
        assert!(matches!(
            parse_asset_type(None),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_get_masks_for_user() {
        let app = setup(Role::User).await;

        let (status, created): (_, Value) =
            send_json(&app, Method::POST, "/api/v1/assets", Some(server_body("web-1"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["asset_type"], "server");
        assert_eq!(created["credentials"][0]["value"], "***");

        let uri = format!("/api/v1/assets/{}", created["id"]);
        let (status, fetched): (_, Value) = send_json(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "web-1");
        assert_eq!(fetched["os_name"], "Ubuntu");
    }

    #[tokio::test]
    async fn test_admin_sees_plaintext() {
        let app = setup(Role::Admin).await;

        let (_, created): (_, Value) =
            send_json(&app, Method::POST, "/api/assets", Some(server_body("db-host"))).await;
        assert_eq!(created["credentials"][0]["value"], "hunter2");
    }

    #[tokio::test]
    async fn test_invalid_asset_is_unprocessable() {
        let app = setup(Role::User).await;
        let mut body = server_body("bad");
        body["public_ipv4"] = json!("999.1.1.1");

        let (status, error): (_, Value) =
            send_json(&app, Method::POST, "/api/v1/assets", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["code"], "VALIDATION_ERROR");
        assert!(error["details"]["fields"]["public_ipv4"].is_array());
    }

    #[tokio::test]
    async fn test_list_requires_asset_type_and_pages() {
        let app = setup(Role::User).await;
        for i in 0..3 {
            send(
                &app,
                Method::POST,
                "/api/v1/assets",
                Some(server_body(&format!("node-{}", i))),
            )
            .await;
        }

        let (status, _) = send(&app, Method::GET, "/api/v1/assets", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, page): (_, Value) = send_json(
            &app,
            Method::GET,
            "/api/v1/assets?asset_type=server&page=1&page_size=2",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 3);
        assert_eq!(page["total_pages"], 2);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);

        let (status, page): (_, Value) = send_json(
            &app,
            Method::GET,
            "/api/v1/assets?asset_type=server&search=node-2",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let app = setup(Role::User).await;
        let (_, created): (_, Value) =
            send_json(&app, Method::POST, "/api/v1/assets", Some(server_body("old"))).await;
        let uri = format!("/api/v1/assets/{}", created["id"]);

        let mut body = server_body("new");
        body.as_object_mut().unwrap().remove("credentials");
        let (status, updated): (_, Value) = send_json(&app, Method::PUT, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "new");
        assert_eq!(updated["credentials"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_field_values_and_expiring() {
        let app = setup(Role::User).await;
        send(&app, Method::POST, "/api/v1/assets", Some(server_body("a"))).await;

        let (status, values): (_, Value) = send_json(
            &app,
            Method::GET,
            "/api/v1/assets/field-values?asset_type=server&field=os_name",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(values["values"], json!(["Ubuntu"]));

        let (status, _) = send(
            &app,
            Method::GET,
            "/api/v1/assets/field-values?asset_type=server&field=name",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let expires = (Utc::now() + chrono::Duration::days(3)).to_rfc3339();
        send(
            &app,
            Method::POST,
            "/api/v1/assets",
            Some(json!({"asset_type": "cloud", "name": "ecs-1", "expires_at": expires})),
        )
        .await;
        let (status, expiring): (_, Value) = send_json(
            &app,
            Method::GET,
            "/api/v1/assets/expiring?asset_type=cloud&days=7",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(expiring["total"], 1);
        assert_eq!(expiring["items"][0]["name"], "ecs-1");
    }

    #[tokio::test]
    async fn test_export_csv_quotes_notes() {
        let app = setup(Role::User).await;
        let mut body = server_body("web");
        body["notes"] = json!("rack 4, shelf \"B\"");
        send(&app, Method::POST, "/api/v1/assets", Some(body)).await;

        let (status, bytes) = send(
            &app,
            Method::GET,
            "/api/v1/assets/export?asset_type=server",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with('\u{feff}'));
        assert!(text.contains("\"rack 4, shelf \"\"B\"\"\""));

        let rows = tabular::csv::parse_csv(&text);
        let notes_col = rows[0].iter().position(|h| h == "Notes").unwrap();
        assert_eq!(rows[1][notes_col], "rack 4, shelf \"B\"");
    }

    #[tokio::test]
    async fn test_batch_import_csv() {
        let app = setup(Role::User).await;
        let csv = "Name,Public IPv4,OS Name,Tags\n\
                   imported-1,198.51.100.7,Debian,env=prod\n\
                   ,,,\n\
                   imported-2,not-an-ip,Debian,\n";

        let (status, result) = upload(
            &app,
            "/api/v1/assets/batch-import?asset_type=server",
            "servers.csv",
            csv.as_bytes(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["created_count"], 1);
        let errors = result["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().starts_with("Row 4:"));
    }

    #[tokio::test]
    async fn test_batch_import_rejects_unknown_extension() {
        let app = setup(Role::User).await;
        let (status, error) = upload(
            &app,
            "/api/v1/assets/batch-import?asset_type=server",
            "servers.ods",
            b"whatever",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_template_download() {
        let app = setup(Role::User).await;
        let (status, bytes) = send(
            &app,
            Method::GET,
            "/api/v1/assets/batch-import/template/database",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // xlsx is a zip archive
        assert_eq!(&bytes[..2], b"PK");

        let table = xlsx::read_xlsx(&bytes).unwrap();
        assert_eq!(table.len(), 2);
    }
}
