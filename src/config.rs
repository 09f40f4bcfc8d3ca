//! # Page and Engine Configuration
//!
//! Physical page formats, render settings, and the engine-wide configuration
//! loaded from an optional JSON file.
//!
//! ## Page Formats
//!
//! | Format | Portrait size (mm) |
//! |--------|--------------------|
//! | A3 | 297 × 420 |
//! | A4 | 210 × 297 |
//! | A5 | 148 × 210 |
//! | Letter | 215.9 × 279.4 |
//! | Legal | 215.9 × 355.6 |
//!
//! ## Usage
//!
//! ```
//! use certforge::config::{Orientation, PageFormat};
//!
//! let page = PageFormat::A4.size(Orientation::Landscape);
//! assert_eq!(page.width_mm, 297.0);
//! assert_eq!(page.height_mm, 210.0);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CertforgeError;

/// Millimeters per PDF point denominator: 1 inch = 25.4 mm = 72 pt.
pub const MM_PER_INCH: f64 = 25.4;
pub const POINTS_PER_INCH: f64 = 72.0;

/// Page orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

/// Named physical page formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    /// Size comes from the template's explicit `pageWidth`/`pageHeight`.
    Custom,
}

impl PageFormat {
    /// Portrait dimensions in millimeters, `None` for [`PageFormat::Custom`].
    pub fn portrait_mm(self) -> Option<(f64, f64)> {
        match self {
            PageFormat::A3 => Some((297.0, 420.0)),
            PageFormat::A4 => Some((210.0, 297.0)),
            PageFormat::A5 => Some((148.0, 210.0)),
            PageFormat::Letter => Some((215.9, 279.4)),
            PageFormat::Legal => Some((215.9, 355.6)),
            PageFormat::Custom => None,
        }
    }

    /// Oriented page size. Custom formats fall back to A4.
    pub fn size(self, orientation: Orientation) -> PageSize {
        let (w, h) = self.portrait_mm().unwrap_or((210.0, 297.0));
        PageSize::new(w, h).oriented(orientation)
    }
}

/// A physical page size in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    pub const fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }

    /// Swap dimensions so the long edge matches the orientation.
    pub fn oriented(self, orientation: Orientation) -> Self {
        let long = self.width_mm.max(self.height_mm);
        let short = self.width_mm.min(self.height_mm);
        match orientation {
            Orientation::Landscape => Self::new(long, short),
            Orientation::Portrait => Self::new(short, long),
        }
    }

    /// Page width in PDF points.
    #[inline]
    pub fn width_pt(&self) -> f64 {
        self.width_mm / MM_PER_INCH * POINTS_PER_INCH
    }

    /// Page height in PDF points.
    #[inline]
    pub fn height_pt(&self) -> f64 {
        self.height_mm / MM_PER_INCH * POINTS_PER_INCH
    }

    pub fn is_valid(&self) -> bool {
        self.width_mm.is_finite()
            && self.height_mm.is_finite()
            && self.width_mm > 0.0
            && self.height_mm > 0.0
    }
}

/// Rendering settings that are not part of the portable template format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Pixel-density multiplier applied when rasterizing for print.
    pub pixel_ratio: f64,
    /// Visual boost applied to font sizes and stroke widths when a template
    /// is loaded onto a canvas, divided out again on save.
    pub font_boost: f64,
    /// Editor canvas width in pixels for landscape pages. Portrait pages
    /// swap the two edges (see [`RenderConfig::canvas_for`]).
    pub canvas_width: f64,
    /// Editor canvas height in pixels for landscape pages.
    pub canvas_height: f64,
    /// TrueType fonts to register: `(family, path)`.
    pub fonts: Vec<FontSource>,
}

impl RenderConfig {
    /// Editor stage of 842 × 595 px (A4 landscape at 72 DPI), rasterized at 2x.
    pub const DEFAULT_PIXEL_RATIO: f64 = 2.0;
    pub const DEFAULT_FONT_BOOST: f64 = 1.5;
    /// Largest relative difference between canvas and page aspect ratios
    /// that is kept as configured.
    pub const ASPECT_TOLERANCE: f64 = 0.01;

    /// Canvas size for `page`: the configured canvas turned to the page's
    /// orientation. When its aspect ratio differs from the page's, the short
    /// edge is refit so pixels stay square in millimeters.
    pub fn canvas_for(&self, page: PageSize) -> (f64, f64) {
        let long = self.canvas_width.max(self.canvas_height);
        let short = self.canvas_width.min(self.canvas_height);
        let page_aspect = page.width_mm.max(page.height_mm) / page.width_mm.min(page.height_mm);
        let short = if ((long / short) / page_aspect - 1.0).abs() > Self::ASPECT_TOLERANCE {
            long / page_aspect
        } else {
            short
        };
        if page.width_mm >= page.height_mm {
            (long, short)
        } else {
            (short, long)
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: Self::DEFAULT_PIXEL_RATIO,
            font_boost: Self::DEFAULT_FONT_BOOST,
            canvas_width: 842.0,
            canvas_height: 595.0,
            fonts: Vec::new(),
        }
    }
}

/// A TrueType font file registered under a family name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontSource {
    pub family: String,
    pub path: String,
    #[serde(default)]
    pub bold: bool,
}

/// Undo history settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept. `None` keeps every snapshot.
    pub limit: Option<usize>,
}

/// Batch generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    /// Default filename pattern for per-record artifacts.
    pub filename_pattern: String,
    /// Maximum length of each substituted filename value.
    pub max_value_len: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            filename_pattern: "certificate_{{name}}_{{index}}".to_string(),
            max_value_len: 50,
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub history: HistoryConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Load a configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, CertforgeError> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_orientations() {
        let landscape = PageFormat::A4.size(Orientation::Landscape);
        assert_eq!((landscape.width_mm, landscape.height_mm), (297.0, 210.0));
        let portrait = PageFormat::A4.size(Orientation::Portrait);
        assert_eq!((portrait.width_mm, portrait.height_mm), (210.0, 297.0));
    }

    #[test]
    fn test_canvas_follows_page_orientation() {
        let render = RenderConfig::default();
        assert_eq!(
            render.canvas_for(PageFormat::A4.size(Orientation::Landscape)),
            (842.0, 595.0)
        );
        assert_eq!(
            render.canvas_for(PageFormat::A4.size(Orientation::Portrait)),
            (595.0, 842.0)
        );
    }

    #[test]
    fn test_canvas_refit_to_page_aspect() {
        let render = RenderConfig::default();
        let page = PageFormat::Letter.size(Orientation::Portrait);
        let (w, h) = render.canvas_for(page);
        assert_eq!(h, 842.0);
        assert!((w / h - page.width_mm / page.height_mm).abs() < 1e-9);
    }

    #[test]
    fn test_page_size_points() {
        let page = PageFormat::A4.size(Orientation::Portrait);
        assert!((page.width_pt() - 595.27).abs() < 0.01);
        assert!((page.height_pt() - 841.89).abs() < 0.01);
    }

    #[test]
    fn test_custom_falls_back_to_a4() {
        assert_eq!(
            PageFormat::Custom.size(Orientation::Portrait),
            PageFormat::A4.size(Orientation::Portrait)
        );
    }

    #[test]
    fn test_engine_config_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"render": {"pixelRatio": 3.0}, "history": {"limit": 50}}"#)
                .unwrap();
        assert_eq!(config.render.pixel_ratio, 3.0);
        assert_eq!(config.render.font_boost, RenderConfig::DEFAULT_FONT_BOOST);
        assert_eq!(config.history.limit, Some(50));
        assert_eq!(config.batch.max_value_len, 50);
    }

    #[test]
    fn test_page_size_validity() {
        assert!(PageSize::new(210.0, 297.0).is_valid());
        assert!(!PageSize::new(0.0, 297.0).is_valid());
        assert!(!PageSize::new(f64::NAN, 297.0).is_valid());
    }
}
