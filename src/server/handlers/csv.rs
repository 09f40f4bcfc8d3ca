//! CSV upload handler.

use axum::{Json, http::StatusCode};

use crate::data::{Dataset, parse_csv};

/// Handle POST /api/csv/parse - parse CSV text into records.
pub async fn parse(body: String) -> Result<Json<Dataset>, (StatusCode, String)> {
    let dataset = parse_csv(&body);
    if dataset.headers.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "CSV has no header row".to_string()));
    }
    Ok(Json(dataset))
}
