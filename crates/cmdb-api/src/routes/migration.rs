//! Database export and import endpoints.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use cmdb_core::{ImportResult, Snapshot};

use crate::auth::RequireAdmin;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;
use crate::upload::{read_file_field, MAX_BODY_BYTES};

/// Creates migration routes, nested under `/migration`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/export", get(export_snapshot))
        .route("/import", post(import_snapshot))
}

/// Downloads the whole database as a JSON snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/migration/export",
    responses(
        (status = 200, description = "JSON snapshot attachment", content_type = "application/json"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Administrator required", body = ErrorResponse)
    ),
    tag = "Migration"
)]
async fn export_snapshot(
    State(state): State<AppState>,
    admin: RequireAdmin,
) -> Result<Response, ApiError> {
    let snapshot = state.migration.export(&admin.context()).await?;
    let body = serde_json::to_vec_pretty(&snapshot)?;

    let filename = format!("cmdb_export_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
    info!(
        bytes = body.len(),
        assets = snapshot.data.assets.len(),
        actor = %admin.0.username,
        "Snapshot exported"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// Replays an uploaded snapshot. Per-record failures are reported in the
/// result, not as an error status.
#[utoipa::path(
    post,
    path = "/api/v1/migration/import",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "`file` field holding a snapshot"),
    responses(
        (status = 200, description = "Per-entity counts and record errors", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 403, description = "Administrator required", body = ErrorResponse),
        (status = 422, description = "Malformed snapshot or unsupported version", body = ErrorResponse)
    ),
    tag = "Migration"
)]
async fn import_snapshot(
    State(state): State<AppState>,
    admin: RequireAdmin,
    multipart: Multipart,
) -> Result<Json<ImportResult>, ApiError> {
    let file = read_file_field(multipart, MAX_BODY_BYTES).await?;
    let snapshot = Snapshot::from_json(&file.bytes)?;

    info!(
        filename = %file.filename,
        version = %snapshot.version,
        actor = %admin.0.username,
        "Snapshot import started"
    );
    let result = state.migration.import(&admin.context(), &snapshot).await?;
    Ok(Json(result))
}
