//! License file storage.
//!
//! Uploaded files land under `<upload_dir>/licenses/` with a generated
//! name; software assets keep the returned relative path.

use std::path::{Component, Path as FsPath};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::upload::read_file_field;

/// Extensions accepted for license files.
pub const LICENSE_EXTENSIONS: &[&str] = &[
    ".lic", ".key", ".txt", ".dat", ".bin", ".pem", ".crt", ".cer",
];

/// Largest accepted license file.
pub const MAX_LICENSE_BYTES: usize = 10 * 1024 * 1024;

const LICENSE_SUBDIR: &str = "licenses";

/// Creates file routes, nested under `/files`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/license", post(upload_license))
        .route("/license/*path", get(download_license))
}

#[derive(Debug, Serialize)]
pub struct StoredFileResponse {
    /// Path relative to the upload directory.
    pub file_path: String,
    /// Name supplied by the client.
    pub filename: String,
    pub size: usize,
}

async fn upload_license(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFileResponse>), ApiError> {
    let file = read_file_field(multipart, MAX_LICENSE_BYTES).await?;

    let extension = file.extension();
    if !LICENSE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "unsupported file type; allowed: {}",
            LICENSE_EXTENSIONS.join(", ")
        )));
    }

    let id = Uuid::new_v4().simple().to_string();
    let stored_name = format!(
        "{}_{}{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8],
        extension
    );

    let dir = state.upload_dir.join(LICENSE_SUBDIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create {}: {}", dir.display(), e)))?;
    tokio::fs::write(dir.join(&stored_name), &file.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store license file: {}", e)))?;

    let file_path = format!("{}/{}", LICENSE_SUBDIR, stored_name);
    info!(
        %file_path,
        size = file.bytes.len(),
        actor = %user.0.username,
        "License file stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(StoredFileResponse {
            file_path,
            filename: file.filename,
            size: file.bytes.len(),
        }),
    ))
}

async fn download_license(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    if !is_safe_relative(&path) {
        warn!(%path, "Rejected license path");
        return Err(ApiError::BadRequest("invalid file path".to_string()));
    }

    let full_path = state.upload_dir.join(&path);
    let bytes = match tokio::fs::read(&full_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("file {} not found", path)))
        }
        Err(e) => {
            // reading a directory lands here on most platforms
            if full_path.is_dir() {
                return Err(ApiError::NotFound(format!("file {} not found", path)));
            }
            return Err(ApiError::Internal(format!("failed to read {}: {}", path, e)));
        }
    };

    let name = full_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("license");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Relative, without `..`, and not rooted.
fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') || path.contains("..") {
        return false;
    }
    FsPath::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}
