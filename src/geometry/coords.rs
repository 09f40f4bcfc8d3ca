//! Millimeter ↔ pixel conversion.
//!
//! Template geometry is stored in millimeters; the editor canvas works in
//! pixels. The scale factor per axis is `canvas_px / page_mm`, always
//! computed from the template's declared page size.
//!
//! ```text
//! A4 landscape (297 × 210 mm) on an 842 × 595 px stage:
//!   sx = 842 / 297 ≈ 2.835 px/mm
//!   sy = 595 / 210 ≈ 2.833 px/mm
//! ```
//!
//! Font sizes and stroke widths additionally carry a fixed visual boost that
//! is applied on load and divided out on save. Saved values are quantized to
//! [`MM_PRECISION`] so a load → save cycle reproduces the stored numbers.

use crate::config::PageSize;
use crate::error::CertforgeError;

use super::Point;

/// Decimal places kept when writing millimeter values back to a template.
pub const MM_PRECISION: i32 = 6;

/// Convert a millimeter length to pixels along one axis.
#[inline]
pub fn to_pixels(mm: f64, page_mm: f64, canvas_px: f64) -> f64 {
    mm * (canvas_px / page_mm)
}

/// Convert a pixel length to millimeters along one axis.
#[inline]
pub fn to_mm(px: f64, page_mm: f64, canvas_px: f64) -> f64 {
    px / (canvas_px / page_mm)
}

/// Round a millimeter value to [`MM_PRECISION`] decimal places.
#[inline]
pub fn quantize_mm(value: f64) -> f64 {
    let factor = 10f64.powi(MM_PRECISION);
    let rounded = (value * factor).round() / factor;
    // Normalize -0.0 so serialized output is stable
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Converter bound to one page size and one canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateConverter {
    pub page: PageSize,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub font_boost: f64,
}

impl CoordinateConverter {
    /// Create a converter. Page and canvas sizes must be positive.
    pub fn new(
        page: PageSize,
        canvas_width: f64,
        canvas_height: f64,
        font_boost: f64,
    ) -> Result<Self, CertforgeError> {
        if !page.is_valid() {
            return Err(CertforgeError::Template(format!(
                "invalid page size {}x{} mm",
                page.width_mm, page.height_mm
            )));
        }
        if !(canvas_width > 0.0 && canvas_height > 0.0) {
            return Err(CertforgeError::Template(format!(
                "invalid canvas size {}x{} px",
                canvas_width, canvas_height
            )));
        }
        if !(font_boost > 0.0) {
            return Err(CertforgeError::Template(format!(
                "font boost must be positive, got {}",
                font_boost
            )));
        }
        Ok(Self {
            page,
            canvas_width,
            canvas_height,
            font_boost,
        })
    }

    /// Pixels per millimeter along x.
    pub fn scale_x(&self) -> f64 {
        self.canvas_width / self.page.width_mm
    }

    /// Pixels per millimeter along y.
    pub fn scale_y(&self) -> f64 {
        self.canvas_height / self.page.height_mm
    }

    /// Axis-independent factor for radii and stroke widths.
    pub fn scale_uniform(&self) -> f64 {
        (self.scale_x() + self.scale_y()) / 2.0
    }

    pub fn x_to_px(&self, mm: f64) -> f64 {
        to_pixels(mm, self.page.width_mm, self.canvas_width)
    }

    pub fn y_to_px(&self, mm: f64) -> f64 {
        to_pixels(mm, self.page.height_mm, self.canvas_height)
    }

    pub fn x_to_mm(&self, px: f64) -> f64 {
        quantize_mm(to_mm(px, self.page.width_mm, self.canvas_width))
    }

    pub fn y_to_mm(&self, px: f64) -> f64 {
        quantize_mm(to_mm(px, self.page.height_mm, self.canvas_height))
    }

    pub fn point_to_px(&self, p: Point) -> Point {
        Point::new(self.x_to_px(p.x), self.y_to_px(p.y))
    }

    pub fn point_to_mm(&self, p: Point) -> Point {
        Point::new(self.x_to_mm(p.x), self.y_to_mm(p.y))
    }

    /// Radius or other unboosted length to pixels.
    pub fn length_to_px(&self, mm: f64) -> f64 {
        mm * self.scale_uniform()
    }

    pub fn length_to_mm(&self, px: f64) -> f64 {
        quantize_mm(px / self.scale_uniform())
    }

    /// Font size to canvas pixels, including the visual boost.
    pub fn font_to_px(&self, size: f64) -> f64 {
        size * self.scale_uniform() * self.font_boost
    }

    /// Canvas font size back to template units, removing the boost.
    pub fn font_to_mm(&self, px: f64) -> f64 {
        quantize_mm(px / self.font_boost / self.scale_uniform())
    }
}
