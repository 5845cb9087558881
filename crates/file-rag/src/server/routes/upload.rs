//! File upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::collection::UploadResponse;
use crate::error::{Error, Result};
use crate::server::state::AppState;

/// POST /upload - multipart `file` and `file_type`
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut file_type = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Internal(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Internal(format!("Failed to read file: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            "file_type" => {
                file_type = field
                    .text()
                    .await
                    .map_err(|e| Error::Internal(format!("Failed to read file_type: {}", e)))?;
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, data) =
        file.ok_or_else(|| Error::Unsupported("multipart field 'file' is required".to_string()))?;

    tracing::info!("Upload: {} ({} bytes, type '{}')", filename, data.len(), file_type);

    let response = state
        .collections()
        .upload(&filename, &file_type, data)
        .await?;
    Ok(Json(response))
}
