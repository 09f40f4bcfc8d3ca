//! Image upload handler.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use super::super::state::AppState;
use super::reject;

/// Multipart field names accepted for the upload.
const UPLOAD_FIELDS: [&str; 2] = ["image", "file"];

/// An uploaded asset, ready to be referenced by an image element.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    /// Value for an image element's `src`.
    pub src: String,
    pub width: u32,
    pub height: u32,
}

fn bad_request(what: &str, e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, format!("{}: {}", what, e))
}

/// First accepted upload field, if the form has one.
async fn take_upload(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request("malformed form", e))?
    {
        if !UPLOAD_FIELDS.contains(&field.name().unwrap_or_default()) {
            continue;
        }
        if let Some(kind) = field.content_type()
            && !kind.starts_with("image/")
        {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("expected an image, got {}", kind),
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request("upload interrupted", e))?;
        return Ok(Some(bytes.to_vec()));
    }
    Ok(None)
}

/// POST /api/assets - store an uploaded image for the asset lifetime.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let bytes = take_upload(&mut multipart).await?.ok_or((
        StatusCode::BAD_REQUEST,
        "form has no 'image' or 'file' field".to_string(),
    ))?;

    let info = state.images.add_asset(&bytes).await.map_err(reject)?;
    log::info!(
        "[server] stored asset {} ({}x{})",
        info.id,
        info.width,
        info.height
    );

    Ok(Json(UploadResponse {
        src: format!("asset:{}", info.id),
        id: info.id,
        width: info.width,
        height: info.height,
    }))
}
