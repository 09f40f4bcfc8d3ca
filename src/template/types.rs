//! Element struct types for the template model.
//!
//! All types derive `Serialize + Deserialize` with camelCase field names, so
//! the same structs are the Rust API and the template JSON format.
//!
//! Each element implements [`ElementKind`] to declare its display label,
//! editor default, local bounds, and how its dimensions scale between
//! millimeters and canvas pixels.

use serde::{Deserialize, Serialize};

use super::content::TextContent;
use crate::geometry::coords::quantize_mm;
use crate::geometry::{CoordinateConverter, Rect};

fn one() -> f64 {
    1.0
}

/// Per-element behavior every element struct provides.
pub trait ElementKind: Sized {
    /// Human-readable display label (e.g. "Text", "Star").
    fn label() -> &'static str;

    /// Starter value for the editor palette, positioned at the origin.
    ///
    /// Distinct from `Default`: editor defaults have visible content.
    fn editor_default() -> Self;

    /// Whether negative scale is kept as flip state instead of folded away.
    const FLIPPABLE: bool = false;

    /// Bounds in unscaled local coordinates, relative to the element anchor.
    fn local_bounds(&self) -> Rect;

    /// Scale non-positional dimensions (sizes, radii, strokes, points).
    fn scale_dimensions(&mut self, f: &ScaleFactors);

    /// Fold a non-negative scale magnitude into absolute dimensions.
    fn fold_scale(&mut self, sx: f64, sy: f64);
}

/// Multipliers for converting element dimensions between unit systems.
#[derive(Debug, Clone, Copy)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
    pub uniform: f64,
    pub font: f64,
    /// Stroke widths carry the same visual boost as fonts.
    pub stroke: f64,
    /// Round results to the millimeter precision (used when saving).
    pub quantize: bool,
}

impl ScaleFactors {
    /// Millimeters → canvas pixels.
    pub fn to_canvas(conv: &CoordinateConverter) -> Self {
        Self {
            x: conv.scale_x(),
            y: conv.scale_y(),
            uniform: conv.scale_uniform(),
            font: conv.scale_uniform() * conv.font_boost,
            stroke: conv.scale_uniform() * conv.font_boost,
            quantize: false,
        }
    }

    /// Canvas pixels → millimeters.
    pub fn to_template(conv: &CoordinateConverter) -> Self {
        Self {
            x: 1.0 / conv.scale_x(),
            y: 1.0 / conv.scale_y(),
            uniform: 1.0 / conv.scale_uniform(),
            font: 1.0 / (conv.scale_uniform() * conv.font_boost),
            stroke: 1.0 / (conv.scale_uniform() * conv.font_boost),
            quantize: true,
        }
    }

    fn finish(&self, v: f64) -> f64 {
        if self.quantize { quantize_mm(v) } else { v }
    }

    pub fn sx(&self, v: f64) -> f64 {
        self.finish(v * self.x)
    }

    pub fn sy(&self, v: f64) -> f64 {
        self.finish(v * self.y)
    }

    pub fn len(&self, v: f64) -> f64 {
        self.finish(v * self.uniform)
    }

    pub fn font_size(&self, v: f64) -> f64 {
        self.finish(v * self.font)
    }

    pub fn stroke_width(&self, v: f64) -> f64 {
        self.finish(v * self.stroke)
    }

    /// Scale a flat `[x0, y0, x1, y1, ...]` point list.
    pub fn points(&self, points: &mut [f64]) {
        for (i, v) in points.iter_mut().enumerate() {
            *v = if i % 2 == 0 { self.sx(*v) } else { self.sy(*v) };
        }
    }
}

// ============================================================================
// COMMON FIELDS
// ============================================================================

/// Fields shared by every element.
///
/// `x`/`y` are millimeters in a stored template and canvas pixels while the
/// element is on a scene. Array index in the template is the paint order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBase {
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f64,
    /// Sign carries flip state for flippable elements.
    #[serde(default = "one")]
    pub scale_x: f64,
    #[serde(default = "one")]
    pub scale_y: f64,
    #[serde(default)]
    pub skew_x: f64,
    #[serde(default)]
    pub skew_y: f64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "one")]
    pub opacity: f64,
}

impl Default for ElementBase {
    fn default() -> Self {
        Self {
            id: String::new(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
            locked: false,
            opacity: 1.0,
        }
    }
}

/// Fill and stroke shared by shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub stroke: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: Some("#000000".into()),
            stroke_width: 1.0,
        }
    }
}

impl ShapeStyle {
    fn filled(fill: &str) -> Self {
        Self {
            fill: Some(fill.into()),
            stroke: None,
            stroke_width: 0.0,
        }
    }
}

// ============================================================================
// TEXT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontStyle {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "bold")]
    Bold,
    #[serde(rename = "italic")]
    Italic,
    #[serde(rename = "bold italic", alias = "italic bold")]
    BoldItalic,
}

impl FontStyle {
    pub fn is_bold(self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontStyle::Italic | FontStyle::BoldItalic)
    }
}

fn default_font_size() -> f64 {
    24.0
}

fn default_font_family() -> String {
    "Arial".into()
}

fn default_text_fill() -> String {
    "#000000".into()
}

fn default_line_height() -> f64 {
    1.2
}

/// Width of one glyph in ems for the built-in bitmap font.
pub const BITMAP_ADVANCE_EM: f64 = 0.5;

/// A text element. `text` may mix literal words with `{{field}}` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default)]
    pub text: TextContent,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_style: FontStyle,
    #[serde(default = "default_text_fill")]
    pub fill: String,
    #[serde(default)]
    pub align: TextAlign,
    /// Wrap width. `None` lays the text out on its natural lines.
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub data_field: Option<String>,
}

impl Default for TextElement {
    fn default() -> Self {
        Self {
            base: ElementBase::default(),
            text: TextContent::new(),
            font_size: default_font_size(),
            font_family: default_font_family(),
            font_style: FontStyle::Normal,
            fill: default_text_fill(),
            align: TextAlign::Left,
            width: None,
            line_height: default_line_height(),
            is_dynamic: false,
            data_field: None,
        }
    }
}

impl TextElement {
    pub fn new(text: &str) -> Self {
        Self {
            text: TextContent::parse(text),
            ..Default::default()
        }
    }

    /// Bind this element to a CSV column.
    ///
    /// Content without a reference to `field` is replaced by the bare
    /// placeholder so the binding is always visible.
    pub fn bind_field(&mut self, field: &str) {
        self.is_dynamic = true;
        self.data_field = Some(field.to_string());
        if !self.text.references(field) {
            self.text = TextContent::field(field);
        }
    }

    /// Remove the binding; references to the old field become its name.
    pub fn unbind_field(&mut self) {
        if let Some(field) = self.data_field.take() {
            self.text.replace_field_with_literal(&field, &field);
        }
        self.is_dynamic = false;
    }

    /// Approximate box of `display` using bitmap-font metrics.
    pub fn estimate_size(&self, display: &str) -> (f64, f64) {
        let advance = self.font_size * BITMAP_ADVANCE_EM;
        let line_h = self.font_size * self.line_height;
        let lines: Vec<&str> = display.split('\n').collect();
        let natural = lines
            .iter()
            .map(|l| l.chars().count() as f64 * advance)
            .fold(0.0, f64::max);
        match self.width {
            Some(w) if w > 0.0 => {
                let wrapped: f64 = lines
                    .iter()
                    .map(|l| ((l.chars().count() as f64 * advance) / w).ceil().max(1.0))
                    .sum();
                (w, wrapped * line_h)
            }
            _ => (natural, lines.len() as f64 * line_h),
        }
    }
}

impl ElementKind for TextElement {
    fn label() -> &'static str {
        "Text"
    }

    fn editor_default() -> Self {
        TextElement::new("Certificate of Achievement")
    }

    fn local_bounds(&self) -> Rect {
        let (w, h) = self.estimate_size(&self.text.to_source());
        Rect::new(0.0, 0.0, w, h)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        self.font_size = f.font_size(self.font_size);
        self.width = self.width.map(|w| f.sx(w));
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        self.font_size *= sy;
        self.width = self.width.map(|w| w * sx);
    }
}

// ============================================================================
// SHAPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectElement {
    #[serde(flatten)]
    pub base: ElementBase,
    pub width: f64,
    pub height: f64,
    #[serde(flatten)]
    pub style: ShapeStyle,
    #[serde(default)]
    pub corner_radius: f64,
}

impl ElementKind for RectElement {
    fn label() -> &'static str {
        "Rectangle"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            width: 60.0,
            height: 40.0,
            style: ShapeStyle::filled("#d9d9d9"),
            corner_radius: 0.0,
        }
    }

    fn local_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        self.width = f.sx(self.width);
        self.height = f.sy(self.height);
        self.style.stroke_width = f.stroke_width(self.style.stroke_width);
        self.corner_radius = f.len(self.corner_radius);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        self.width *= sx;
        self.height *= sy;
    }
}

/// A circle centered on its anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleElement {
    #[serde(flatten)]
    pub base: ElementBase,
    pub radius: f64,
    #[serde(flatten)]
    pub style: ShapeStyle,
}

impl ElementKind for CircleElement {
    fn label() -> &'static str {
        "Circle"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            radius: 20.0,
            style: ShapeStyle::filled("#d9d9d9"),
        }
    }

    fn local_bounds(&self) -> Rect {
        Rect::new(-self.radius, -self.radius, self.radius * 2.0, self.radius * 2.0)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        self.radius = f.len(self.radius);
        self.style.stroke_width = f.stroke_width(self.style.stroke_width);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        self.radius *= sx.max(sy);
    }
}

fn default_num_points() -> u32 {
    5
}

/// A star centered on its anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "default_num_points")]
    pub num_points: u32,
    pub inner_radius: f64,
    pub outer_radius: f64,
    #[serde(flatten)]
    pub style: ShapeStyle,
}

impl StarElement {
    /// Polygon vertices in local coordinates, first spike pointing up.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        let n = self.num_points.max(2) as usize;
        (0..n * 2)
            .map(|i| {
                let r = if i % 2 == 0 {
                    self.outer_radius
                } else {
                    self.inner_radius
                };
                let angle = std::f64::consts::PI * i as f64 / n as f64;
                (r * angle.sin(), -r * angle.cos())
            })
            .collect()
    }
}

impl ElementKind for StarElement {
    fn label() -> &'static str {
        "Star"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            num_points: 5,
            inner_radius: 8.0,
            outer_radius: 20.0,
            style: ShapeStyle::filled("#f2c94c"),
        }
    }

    fn local_bounds(&self) -> Rect {
        let r = self.outer_radius.max(self.inner_radius);
        Rect::new(-r, -r, r * 2.0, r * 2.0)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        self.inner_radius = f.len(self.inner_radius);
        self.outer_radius = f.len(self.outer_radius);
        self.style.stroke_width = f.stroke_width(self.style.stroke_width);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        let s = (sx + sy) / 2.0;
        self.inner_radius *= s;
        self.outer_radius *= s;
    }
}

fn default_stroke() -> String {
    "#000000".into()
}

fn default_stroke_width() -> f64 {
    2.0
}

/// Bounds of a flat point list, inflated by half the stroke.
fn points_bounds(points: &[f64], pad: f64) -> Rect {
    Rect::bounding(
        points
            .chunks_exact(2)
            .map(|p| crate::geometry::Point::new(p[0], p[1])),
    )
    .inflate(pad)
}

/// A polyline; `points` are relative to the anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineElement {
    #[serde(flatten)]
    pub base: ElementBase,
    pub points: Vec<f64>,
    #[serde(default = "default_stroke")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
}

impl ElementKind for LineElement {
    fn label() -> &'static str {
        "Line"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            points: vec![0.0, 0.0, 80.0, 0.0],
            stroke: default_stroke(),
            stroke_width: default_stroke_width(),
        }
    }

    fn local_bounds(&self) -> Rect {
        points_bounds(&self.points, self.stroke_width / 2.0)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        f.points(&mut self.points);
        self.stroke_width = f.stroke_width(self.stroke_width);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        for (i, v) in self.points.iter_mut().enumerate() {
            *v *= if i % 2 == 0 { sx } else { sy };
        }
    }
}

fn default_pointer() -> f64 {
    10.0
}

/// A polyline with an arrow head at the last point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowElement {
    #[serde(flatten)]
    pub base: ElementBase,
    pub points: Vec<f64>,
    #[serde(default = "default_stroke")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    /// Head fill; defaults to the stroke color.
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default = "default_pointer")]
    pub pointer_length: f64,
    #[serde(default = "default_pointer")]
    pub pointer_width: f64,
}

impl ElementKind for ArrowElement {
    fn label() -> &'static str {
        "Arrow"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            points: vec![0.0, 0.0, 80.0, 0.0],
            stroke: default_stroke(),
            stroke_width: default_stroke_width(),
            fill: None,
            pointer_length: default_pointer(),
            pointer_width: default_pointer(),
        }
    }

    fn local_bounds(&self) -> Rect {
        let pad = (self.stroke_width / 2.0).max(self.pointer_width / 2.0);
        points_bounds(&self.points, pad)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        f.points(&mut self.points);
        self.stroke_width = f.stroke_width(self.stroke_width);
        self.pointer_length = f.len(self.pointer_length);
        self.pointer_width = f.len(self.pointer_width);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        for (i, v) in self.points.iter_mut().enumerate() {
            *v *= if i % 2 == 0 { sx } else { sy };
        }
    }
}

// ============================================================================
// IMAGE
// ============================================================================

/// A raster image. `src` is a data URL, http(s) URL, `asset:<id>`, or a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    #[serde(flatten)]
    pub base: ElementBase,
    pub src: String,
    pub width: f64,
    pub height: f64,
}

impl ElementKind for ImageElement {
    const FLIPPABLE: bool = true;

    fn label() -> &'static str {
        "Image"
    }

    fn editor_default() -> Self {
        Self {
            base: ElementBase::default(),
            src: String::new(),
            width: 50.0,
            height: 50.0,
        }
    }

    fn local_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    fn scale_dimensions(&mut self, f: &ScaleFactors) {
        self.width = f.sx(self.width);
        self.height = f.sy(self.height);
    }

    fn fold_scale(&mut self, sx: f64, sy: f64) {
        self.width *= sx;
        self.height *= sy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_defaults_from_minimal_json() {
        let t: TextElement = serde_json::from_str(r#"{"id": "t1", "text": "Hello"}"#).unwrap();
        assert_eq!(t.base.id, "t1");
        assert_eq!(t.font_size, 24.0);
        assert_eq!(t.base.scale_x, 1.0);
        assert_eq!(t.base.opacity, 1.0);
        assert!(!t.is_dynamic);
    }

    #[test]
    fn test_font_style_wire_names() {
        let t: TextElement =
            serde_json::from_str(r#"{"id": "t", "fontStyle": "bold italic"}"#).unwrap();
        assert_eq!(t.font_style, FontStyle::BoldItalic);
        assert!(t.font_style.is_bold() && t.font_style.is_italic());
    }

    #[test]
    fn test_bind_field_sets_placeholder() {
        let mut t = TextElement::new("Sample Name");
        t.bind_field("name");
        assert!(t.is_dynamic);
        assert_eq!(t.data_field.as_deref(), Some("name"));
        assert_eq!(t.text.to_source(), "{{name}}");
    }

    #[test]
    fn test_bind_field_keeps_mixed_content() {
        let mut t = TextElement::new("Awarded to {{name}}");
        t.bind_field("name");
        assert_eq!(t.text.to_source(), "Awarded to {{name}}");
    }

    #[test]
    fn test_unbind_field() {
        let mut t = TextElement::new("Hi {{name}}");
        t.bind_field("name");
        t.unbind_field();
        assert!(!t.is_dynamic);
        assert_eq!(t.data_field, None);
        assert_eq!(t.text.to_source(), "Hi name");
    }

    #[test]
    fn test_estimate_size_wraps() {
        let mut t = TextElement::new("");
        t.font_size = 10.0;
        // 10 chars at 5px each = 50px natural width
        assert_eq!(t.estimate_size("abcdefghij"), (50.0, 12.0));
        t.width = Some(20.0);
        assert_eq!(t.estimate_size("abcdefghij"), (20.0, 36.0));
    }

    #[test]
    fn test_star_vertices_alternate() {
        let star = StarElement::editor_default();
        let v = star.vertices();
        assert_eq!(v.len(), 10);
        // First spike points straight up
        assert!((v[0].0).abs() < 1e-9);
        assert!((v[0].1 + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_line_bounds_include_stroke() {
        let line = LineElement::editor_default();
        assert_eq!(line.local_bounds(), Rect::new(-1.0, -1.0, 82.0, 2.0));
    }
}
