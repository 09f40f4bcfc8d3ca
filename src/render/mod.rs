//! # Render Pipeline
//!
//! Turns a scene into pixels and pixels into PDF pages.
//!
//! ## Modules
//!
//! - [`stage`]: offscreen copy of a scene with per-record substitution
//! - [`frame`]: display lists committed from a stage
//! - [`raster`]: software rasterizer for display lists
//! - [`text`]: TrueType and bitmap font rendering
//! - [`assets`]: image fetching, decoding and caching
//! - [`color`]: CSS color parsing
//! - [`pdf`]: PDF composition with `lopdf`
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use certforge::config::RenderConfig;
//! use certforge::data::Record;
//! use certforge::render::{self, ImageStore, SoftwareRasterizer};
//! use certforge::scene::Scene;
//! use certforge::template::Template;
//!
//! # async fn example() -> Result<(), certforge::CertforgeError> {
//! let template = Template::from_json(&std::fs::read_to_string("award.json")?)?;
//! let config = RenderConfig::default();
//! let mut scene = Scene::from_template(&template, &config)?;
//! let record = Record::from_pairs([("name", "Ada Lovelace")]);
//!
//! let images = Arc::new(ImageStore::new()?);
//! let mut rasterizer = SoftwareRasterizer::default();
//! let output = render::render(&mut scene, Some(&record), &mut rasterizer, images, &config).await?;
//! std::fs::write("award.png", output.png()?)?;
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod color;
pub mod frame;
pub mod pdf;
pub mod raster;
pub mod stage;
pub mod text;

pub use assets::{ImageSource, ImageStore, SourcePolicy};
pub use frame::Frame;
pub use raster::SoftwareRasterizer;
pub use stage::{Stage, SubstitutionGuard};

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RenderConfig;
use crate::data::Record;
use crate::error::CertforgeError;
use crate::scene::Scene;

/// Rasterizer output buffer.
pub type RasterImage = RgbaImage;

/// Errors that can occur while rasterizing.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Font error: {0}")]
    Font(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    #[error("Image encoding error: {0}")]
    Encode(String),

    /// The stage changed after the frame was committed.
    #[error("Frame {frame} is stale (stage is at generation {stage})")]
    StaleFrame { frame: u64, stage: u64 },
}

/// Draws committed frames.
pub trait Rasterizer: Send {
    fn rasterize(&mut self, frame: &Frame) -> Result<RasterImage, RenderError>;
}

/// A rendered page plus anything that was left out of it.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub image: RasterImage,
    /// Elements skipped while rendering (failed images).
    pub warnings: Vec<String>,
}

impl RenderOutput {
    /// Encode the raster as PNG.
    pub fn png(&self) -> Result<Vec<u8>, RenderError> {
        encode_png(&self.image)
    }
}

/// Encode an RGBA buffer as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Commit a frame from the stage's current content and rasterize it.
pub async fn render_stage(
    stage: &Stage,
    rasterizer: &mut dyn Rasterizer,
) -> Result<RenderOutput, RenderError> {
    let frame = stage.commit_frame().await;
    let image = stage.rasterize(&frame, rasterizer)?;
    Ok(RenderOutput {
        image,
        warnings: frame.warnings,
    })
}

/// Render a scene, optionally with a record's values substituted.
///
/// The selection is cleared and the overlay hidden for the duration; the
/// scene's own elements are never modified.
pub async fn render(
    scene: &mut Scene,
    record: Option<&Record>,
    rasterizer: &mut dyn Rasterizer,
    images: Arc<dyn ImageSource>,
    config: &RenderConfig,
) -> Result<RenderOutput, CertforgeError> {
    let export = scene.begin_export();
    let mut stage = Stage::from_scene(&export, config, images);
    let output = match record {
        Some(record) => {
            let guard = stage.substitute(record);
            render_stage(&guard, rasterizer).await?
        }
        None => render_stage(&stage, rasterizer).await?,
    };
    log::info!(
        "[render] rendered '{}' at {}x{}",
        stage.name(),
        output.image.width(),
        output.image.height()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_render_restores_overlay_and_text() {
        let template = Template::from_json(
            r#"{"name": "Award", "elements": [
                {"type": "text", "id": "n", "text": "{{name}}", "isDynamic": true, "dataField": "name"}
            ]}"#,
        )
        .unwrap();
        let config = RenderConfig {
            pixel_ratio: 1.0,
            ..RenderConfig::default()
        };
        let mut scene = Scene::from_template(&template, &config).unwrap();
        scene.select("n").unwrap();
        let before = scene.to_template();

        let images = Arc::new(ImageStore::with_client(reqwest::Client::new()));
        let record = Record::from_pairs([("name", "Ada")]);
        let output = render(
            &mut scene,
            Some(&record),
            &mut SoftwareRasterizer::default(),
            images,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(output.image.dimensions(), (842, 595));
        assert!(output.warnings.is_empty());
        assert!(scene.overlay_visible());
        assert!(scene.selection().is_empty());
        assert_eq!(scene.to_template(), before);
    }

    #[test]
    fn test_png_signature() {
        let png = encode_png(&RgbaImage::new(2, 2)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
