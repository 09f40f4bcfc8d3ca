//! Canvas preview handler.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::data::Record;
use crate::error::CertforgeError;
use crate::fields::{DisplayMode, apply_mode};
use crate::render::{self, SoftwareRasterizer};
use crate::scene::Scene;
use crate::template::Template;

use super::super::state::AppState;
use super::render_blocking;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub template: Template,
    /// Record shown in actual-data mode.
    #[serde(default)]
    pub record: Option<Record>,
    #[serde(default)]
    pub mode: DisplayMode,
}

/// Handle POST /api/preview - render the template as PNG.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let png = render_blocking(move || async move {
        let config = &state.config.engine.render;
        let mut scene = Scene::from_template(&req.template, config)?;
        apply_mode(&mut scene, req.mode, req.record);

        let mut rasterizer = SoftwareRasterizer::new(state.fonts.clone());
        let output =
            render::render(&mut scene, None, &mut rasterizer, state.images.clone(), config).await?;
        Ok::<_, CertforgeError>(output.png()?)
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
