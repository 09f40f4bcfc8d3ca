//! Offscreen render target.
//!
//! A [`Stage`] is a private copy of a scene's elements owned by one render
//! job. Interactive editing never sees it, so a batch can rewrite text on
//! the stage for each record without touching the editor.
//!
//! ```text
//! substitute(record) ──▶ commit_frame().await ──▶ rasterize(frame)
//!        │                                              │
//!        └──────────── guard drop restores text ◀───────┘
//! ```
//!
//! Every content change bumps the stage generation. A [`Frame`] remembers
//! the generation it was laid out from and rasterizing it against a stage
//! that has moved on fails with [`RenderError::StaleFrame`].

use image::Rgba;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::assets::ImageSource;
use super::color::{self, parse_color};
use super::frame::{Frame, element_items};
use super::{RasterImage, Rasterizer, RenderError};
use crate::config::{PageSize, RenderConfig};
use crate::data::Record;
use crate::fields::{DisplayMode, FieldValues, builtin_variables, resolve_with};
use crate::scene::Scene;
use crate::template::{Element, TextContent, TextElement};

/// A render job's private copy of a scene.
pub struct Stage {
    name: String,
    page_size: PageSize,
    canvas_width: f64,
    canvas_height: f64,
    pixel_ratio: f64,
    background: Rgba<u8>,
    elements: Vec<Element>,
    mode: DisplayMode,
    preview: Option<Record>,
    builtins: HashMap<String, String>,
    images: Arc<dyn ImageSource>,
    generation: u64,
}

impl Stage {
    /// Copy a scene onto a new stage. Built-in variables are fixed at this
    /// point so every record of a batch sees the same date.
    pub fn from_scene(scene: &Scene, config: &RenderConfig, images: Arc<dyn ImageSource>) -> Self {
        let (canvas_width, canvas_height) = scene.canvas_size();
        let background = parse_color(scene.background_color()).unwrap_or_else(|| {
            log::warn!(
                "[render] unknown background '{}', using white",
                scene.background_color()
            );
            color::WHITE
        });
        Self {
            name: scene.name().to_string(),
            page_size: scene.page_size(),
            canvas_width,
            canvas_height,
            pixel_ratio: config.pixel_ratio,
            background,
            elements: scene.elements().to_vec(),
            mode: scene.display_mode(),
            preview: scene.preview_record().cloned(),
            builtins: builtin_variables(),
            images,
            generation: 0,
        }
    }

    /// Replace the built-in variables.
    pub fn with_builtins(mut self, builtins: HashMap<String, String>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn values(&self) -> FieldValues<'_> {
        FieldValues::with_builtins(self.preview.as_ref(), self.builtins.clone())
    }

    /// Text the element with `id` currently displays on this stage.
    pub fn display_text(&self, id: &str) -> Option<String> {
        let values = self.values();
        self.elements
            .iter()
            .find(|el| el.id() == id)
            .and_then(Element::as_text)
            .map(|t| resolve_with(t, self.mode, &values))
    }

    /// Write `record`'s values into every text element as literal text.
    ///
    /// The returned guard restores the original elements exactly when it
    /// drops, whether or not the render in between succeeded.
    pub fn substitute(&mut self, record: &Record) -> SubstitutionGuard<'_> {
        let values = FieldValues::with_builtins(Some(record), self.builtins.clone());
        let mut originals = Vec::new();
        for (index, el) in self.elements.iter_mut().enumerate() {
            let Some(text) = el.as_text_mut() else {
                continue;
            };
            let shown = resolve_with(text, DisplayMode::ActualData, &values);
            originals.push((index, text.clone()));
            text.text = TextContent::literal(shown);
            text.is_dynamic = false;
            text.data_field = None;
        }
        self.generation += 1;
        log::debug!(
            "[render] substituted {} text element(s) on '{}'",
            originals.len(),
            self.name
        );
        SubstitutionGuard {
            stage: self,
            originals,
        }
    }

    /// Lay out the current content.
    ///
    /// Resolves once every image source has been fetched. Images that fail
    /// to load are left out and reported in [`Frame::warnings`].
    pub async fn commit_frame(&self) -> Frame {
        let values = self.values();
        let mut items = Vec::new();
        let mut warnings = Vec::new();

        for el in &self.elements {
            match el {
                Element::Text(t) => {
                    let shown = resolve_with(t, self.mode, &values);
                    items.extend(element_items(el, Some(&shown), None));
                }
                Element::Image(img) => match self.images.fetch(&img.src).await {
                    Ok(pixels) => items.extend(element_items(el, None, Some(pixels))),
                    Err(e) => {
                        log::warn!("[render] skipping image '{}': {}", img.base.id, e);
                        warnings.push(format!("image '{}' skipped: {}", img.base.id, e));
                    }
                },
                _ => items.extend(element_items(el, None, None)),
            }
        }

        Frame {
            generation: self.generation,
            canvas_width: self.canvas_width,
            canvas_height: self.canvas_height,
            pixel_ratio: self.pixel_ratio,
            background: self.background,
            items,
            warnings,
        }
    }

    /// Rasterize a frame committed from this stage's current content.
    pub fn rasterize(
        &self,
        frame: &Frame,
        rasterizer: &mut dyn Rasterizer,
    ) -> Result<RasterImage, RenderError> {
        if frame.generation != self.generation {
            return Err(RenderError::StaleFrame {
                frame: frame.generation,
                stage: self.generation,
            });
        }
        rasterizer.rasterize(frame)
    }
}

/// Substituted stage content; the originals come back on drop.
pub struct SubstitutionGuard<'a> {
    stage: &'a mut Stage,
    originals: Vec<(usize, TextElement)>,
}

impl Deref for SubstitutionGuard<'_> {
    type Target = Stage;

    fn deref(&self) -> &Stage {
        self.stage
    }
}

impl DerefMut for SubstitutionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Stage {
        self.stage
    }
}

impl Drop for SubstitutionGuard<'_> {
    fn drop(&mut self) {
        for (index, original) in self.originals.drain(..) {
            if let Some(slot) = self
                .stage
                .elements
                .get_mut(index)
                .and_then(Element::as_text_mut)
            {
                *slot = original;
            }
        }
        self.stage.generation += 1;
    }
}
