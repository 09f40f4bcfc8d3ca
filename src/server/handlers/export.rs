//! Single-certificate PDF export handler.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::batch::sanitize;
use crate::credit::{CreditOperation, ensure_allowed};
use crate::data::Record;
use crate::error::CertforgeError;
use crate::render::{self, SoftwareRasterizer, pdf::to_pdf};
use crate::scene::Scene;
use crate::template::Template;

use super::super::state::AppState;
use super::{reject, render_blocking};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub template: Template,
    #[serde(default)]
    pub record: Option<Record>,
}

/// Handle POST /api/export - render the template to a one-page PDF.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    ensure_allowed(state.gate.as_ref(), CreditOperation::Export, 1)
        .await
        .map_err(reject)?;

    let stem = sanitize(&req.template.name, state.config.engine.batch.max_value_len);
    let job_state = state.clone();
    let pdf = render_blocking(move || async move {
        let config = &job_state.config.engine.render;
        let mut scene = Scene::from_template(&req.template, config)?;
        let mut rasterizer = SoftwareRasterizer::new(job_state.fonts.clone());
        let output = render::render(
            &mut scene,
            req.record.as_ref(),
            &mut rasterizer,
            job_state.images.clone(),
            config,
        )
        .await?;

        Ok::<_, CertforgeError>(to_pdf(
            &output.image,
            req.template.page_size(),
            req.template.orientation,
            &req.template.name,
        )?)
    })
    .await?;

    state
        .gate
        .confirm(CreditOperation::Export, 1)
        .await
        .map_err(reject)?;

    let filename = if stem.is_empty() {
        "certificate.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    };
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    ))
}
