//! Multipart upload handling shared by the import and file routes.

use axum::extract::Multipart;

use crate::error::ApiError;

/// Name of the form field carrying the uploaded file.
pub const FILE_FIELD: &str = "file";

/// Request body limit for routes accepting uploads.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// An uploaded file held in memory.
#[derive(Debug)]
pub struct UploadedFile {
    /// Client-supplied file name, without any directory part.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Lowercased extension including the dot, or empty.
    pub fn extension(&self) -> String {
        self.filename
            .rfind('.')
            .map(|i| self.filename[i..].to_lowercase())
            .unwrap_or_default()
    }
}

/// Reads the `file` part of a multipart body. Other parts are ignored.
///
/// Fails with 400 when the part is missing and 413 when it exceeds
/// `max_bytes`.
pub async fn read_file_field(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(base_name)
            .unwrap_or_default()
            .to_string();
        let data = field.bytes().await?;
        if data.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "file exceeds {} bytes",
                max_bytes
            )));
        }

        return Ok(UploadedFile {
            filename,
            bytes: data.to_vec(),
        });
    }

    Err(ApiError::BadRequest(format!(
        "missing '{}' field",
        FILE_FIELD
    )))
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
