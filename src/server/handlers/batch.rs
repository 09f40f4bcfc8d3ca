//! Batch generation handler.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::batch::{
    ArtifactKind, BatchFailure, BatchGenerator, BatchMode, BatchOptions, BatchOutcome,
};
use crate::data::parse_csv;
use crate::render::SoftwareRasterizer;
use crate::scene::Scene;
use crate::template::Template;

use super::super::state::AppState;
use super::render_blocking;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub template: Template,
    pub csv: String,
    #[serde(default)]
    pub filename_pattern: Option<String>,
    /// One multi-page PDF instead of one file per record.
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub format: ArtifactKind,
}

#[derive(Debug, Serialize)]
pub struct ArtifactJson {
    pub filename: String,
    pub index: Option<usize>,
    /// Base64 file content (PDF or PNG, per the request format).
    pub pdf: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub artifacts: Vec<ArtifactJson>,
    /// Metadata CSV text with the `filename` column.
    pub metadata: String,
    pub failures: Vec<BatchFailure>,
    pub warnings: Vec<String>,
    pub outcome: BatchOutcome,
}

/// Handle POST /api/batch - render one certificate per CSV record.
///
/// Merged batches answer with the PDF itself, per-record batches with JSON.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<Response, (StatusCode, String)> {
    let engine = &state.config.engine;
    let dataset = parse_csv(&req.csv);
    let mut options = BatchOptions::from_config(&engine.batch);
    if let Some(pattern) = req.filename_pattern.filter(|p| !p.trim().is_empty()) {
        options.filename_pattern = pattern;
    }
    options.kind = req.format;
    if req.merged {
        options.mode = BatchMode::Merged;
    }

    let job_state = state.clone();
    let job_options = options.clone();
    let report = render_blocking(move || async move {
        let engine = &job_state.config.engine;
        let mut scene = Scene::from_template(&req.template, &engine.render)?;
        let mut generator = BatchGenerator::new(engine.render.clone(), job_state.images.clone())
            .with_gate(job_state.gate.clone())
            .with_rasterizer(Box::new(SoftwareRasterizer::new(job_state.fonts.clone())));
        generator.generate(&mut scene, &dataset, &job_options).await
    })
    .await?;

    if options.mode == BatchMode::Merged {
        let Some(artifact) = report.artifacts.into_iter().next() else {
            let reason = report
                .failures
                .first()
                .map(|f| f.error.clone())
                .unwrap_or_else(|| "no records rendered".to_string());
            return Err((StatusCode::INTERNAL_SERVER_ERROR, reason));
        };
        return Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", artifact.filename),
                ),
            ],
            artifact.bytes,
        )
            .into_response());
    }

    let response = BatchResponse {
        metadata: report.metadata.to_csv(),
        artifacts: report
            .artifacts
            .into_iter()
            .map(|a| ArtifactJson {
                filename: a.filename,
                index: a.record_index,
                pdf: STANDARD.encode(&a.bytes),
            })
            .collect(),
        failures: report.failures,
        warnings: report.warnings,
        outcome: report.outcome,
    };
    Ok(Json(response).into_response())
}
