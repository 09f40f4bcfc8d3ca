//! Display lists.
//!
//! A [`Frame`] is the committed layout of one stage state: a flat list of
//! drawing primitives in paint order, each with its local → canvas
//! transform. Rasterizers consume frames and never see elements.

use image::{Rgba, RgbaImage};
use std::sync::Arc;

use super::color::{self, paint};
use crate::geometry::{Affine, Point, Rect};
use crate::scene::transform::node_transform;
use crate::template::{Element, TextAlign, TextElement, BITMAP_ADVANCE_EM};

/// The committed layout of a stage.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Stage generation this frame was laid out from.
    pub generation: u64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Device pixels per canvas pixel.
    pub pixel_ratio: f64,
    pub background: Rgba<u8>,
    pub items: Vec<DisplayItem>,
    /// Elements skipped during layout, with the reason.
    pub warnings: Vec<String>,
}

impl Frame {
    /// Output raster size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        (
            (self.canvas_width * self.pixel_ratio).round().max(1.0) as u32,
            (self.canvas_height * self.pixel_ratio).round().max(1.0) as u32,
        )
    }

    /// Canvas → device transform.
    pub fn device_transform(&self) -> Affine {
        Affine::scale(self.pixel_ratio, self.pixel_ratio)
    }

    /// The text of every text item, lines joined with `\n`.
    pub fn texts(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match &item.kind {
                DisplayKind::Text(block) => Some(block.lines.join("\n")),
                _ => None,
            })
            .collect()
    }
}

/// One drawing primitive.
#[derive(Debug, Clone)]
pub struct DisplayItem {
    /// Id of the element this item came from.
    pub element_id: String,
    /// Local → canvas transform.
    pub transform: Affine,
    pub opacity: f64,
    pub kind: DisplayKind,
}

#[derive(Debug, Clone)]
pub enum DisplayKind {
    Rect {
        width: f64,
        height: f64,
        corner_radius: f64,
        fill: Option<Rgba<u8>>,
        stroke: Option<Rgba<u8>>,
        stroke_width: f64,
    },
    Circle {
        radius: f64,
        fill: Option<Rgba<u8>>,
        stroke: Option<Rgba<u8>>,
        stroke_width: f64,
    },
    /// Closed polygon.
    Polygon {
        points: Vec<Point>,
        fill: Option<Rgba<u8>>,
        stroke: Option<Rgba<u8>>,
        stroke_width: f64,
    },
    /// Open polyline.
    Polyline {
        points: Vec<Point>,
        stroke: Rgba<u8>,
        stroke_width: f64,
    },
    Text(TextBlock),
    Image {
        pixels: Arc<RgbaImage>,
        width: f64,
        height: f64,
    },
}

impl DisplayKind {
    /// Bounds in local coordinates, including strokes.
    pub fn local_bounds(&self) -> Rect {
        match self {
            DisplayKind::Rect {
                width,
                height,
                stroke_width,
                ..
            } => Rect::new(0.0, 0.0, *width, *height).inflate(stroke_width / 2.0),
            DisplayKind::Circle {
                radius,
                stroke_width,
                ..
            } => {
                let r = radius + stroke_width / 2.0;
                Rect::new(-r, -r, r * 2.0, r * 2.0)
            }
            DisplayKind::Polygon {
                points,
                stroke_width,
                ..
            } => Rect::bounding(points.iter().copied()).inflate(stroke_width / 2.0),
            DisplayKind::Polyline {
                points,
                stroke_width,
                ..
            } => Rect::bounding(points.iter().copied()).inflate(stroke_width / 2.0),
            DisplayKind::Text(block) => block.estimated_bounds(),
            DisplayKind::Image { width, height, .. } => Rect::new(0.0, 0.0, *width, *height),
        }
    }
}

/// Laid-out text, top-left at the local origin.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub font_size: f64,
    /// Distance between baselines in canvas pixels.
    pub line_height: f64,
    pub family: String,
    pub bold: bool,
    pub italic: bool,
    pub color: Rgba<u8>,
    pub align: TextAlign,
    /// Wrap box width; `None` aligns against the widest line.
    pub box_width: Option<f64>,
}

impl TextBlock {
    fn estimated_bounds(&self) -> Rect {
        let advance = self.font_size * BITMAP_ADVANCE_EM;
        let widest = self
            .lines
            .iter()
            .map(|l| l.chars().count() as f64 * advance)
            .fold(0.0, f64::max);
        // Generous width: TrueType advances can exceed the bitmap estimate
        let width = self.box_width.unwrap_or(0.0).max(widest * 1.5);
        let slant = if self.italic { self.font_size * 0.25 } else { 0.0 };
        Rect::new(
            0.0,
            0.0,
            width + slant,
            self.line_height * self.lines.len().max(1) as f64,
        )
    }
}

/// Break display text into lines, wrapping words to `width` when set.
pub fn wrap_lines(text: &str, font_size: f64, width: Option<f64>) -> Vec<String> {
    let advance = font_size * BITMAP_ADVANCE_EM;
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let Some(max) = width.filter(|w| *w > 0.0 && advance > 0.0) else {
            lines.push(paragraph.to_string());
            continue;
        };
        let max_chars = ((max / advance).floor() as usize).max(1);
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let candidate = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if candidate > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

fn text_item(el: &TextElement, display: &str) -> DisplayKind {
    DisplayKind::Text(TextBlock {
        lines: wrap_lines(display, el.font_size, el.width),
        font_size: el.font_size,
        line_height: el.font_size * el.line_height,
        family: el.font_family.clone(),
        bold: el.font_style.is_bold(),
        italic: el.font_style.is_italic(),
        color: paint(Some(&el.fill), &el.base.id).unwrap_or(color::BLACK),
        align: el.align,
        box_width: el.width,
    })
}

fn flat_points(points: &[f64]) -> Vec<Point> {
    points
        .chunks_exact(2)
        .map(|p| Point::new(p[0], p[1]))
        .collect()
}

/// Arrow head triangle at the end of a polyline.
fn arrow_head(points: &[Point], length: f64, width: f64) -> Option<Vec<Point>> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let tip = points[n - 1];
    let from = points[n - 2];
    let (dx, dy) = (tip.x - from.x, tip.y - from.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);
    let base = Point::new(tip.x - ux * length, tip.y - uy * length);
    let half = width / 2.0;
    Some(vec![
        tip,
        Point::new(base.x - uy * half, base.y + ux * half),
        Point::new(base.x + uy * half, base.y - ux * half),
    ])
}

/// Display items for one element.
///
/// `text` is the resolved display text for text elements; `image` the
/// decoded pixels for image elements. Image elements without pixels
/// produce nothing.
pub fn element_items(
    el: &Element,
    text: Option<&str>,
    image: Option<Arc<RgbaImage>>,
) -> Vec<DisplayItem> {
    let base = el.base();
    let id = base.id.as_str();
    let kinds = match el {
        Element::Text(t) => vec![text_item(t, text.unwrap_or_default())],
        Element::Rectangle(r) => vec![DisplayKind::Rect {
            width: r.width,
            height: r.height,
            corner_radius: r.corner_radius,
            fill: paint(r.style.fill.as_deref(), id),
            stroke: paint(r.style.stroke.as_deref(), id),
            stroke_width: r.style.stroke_width,
        }],
        Element::Circle(c) => vec![DisplayKind::Circle {
            radius: c.radius,
            fill: paint(c.style.fill.as_deref(), id),
            stroke: paint(c.style.stroke.as_deref(), id),
            stroke_width: c.style.stroke_width,
        }],
        Element::Star(s) => vec![DisplayKind::Polygon {
            points: s
                .vertices()
                .into_iter()
                .map(|(x, y)| Point::new(x, y))
                .collect(),
            fill: paint(s.style.fill.as_deref(), id),
            stroke: paint(s.style.stroke.as_deref(), id),
            stroke_width: s.style.stroke_width,
        }],
        Element::Line(l) => match paint(Some(&l.stroke), id) {
            Some(stroke) => vec![DisplayKind::Polyline {
                points: flat_points(&l.points),
                stroke,
                stroke_width: l.stroke_width,
            }],
            None => Vec::new(),
        },
        Element::Arrow(a) => {
            let points = flat_points(&a.points);
            let mut kinds = Vec::new();
            let stroke = paint(Some(&a.stroke), id);
            let head_fill = paint(a.fill.as_deref(), id).or(stroke);
            let head = arrow_head(&points, a.pointer_length, a.pointer_width);
            if let Some(stroke) = stroke {
                kinds.push(DisplayKind::Polyline {
                    points,
                    stroke,
                    stroke_width: a.stroke_width,
                });
            }
            if let (Some(head), Some(fill)) = (head, head_fill) {
                kinds.push(DisplayKind::Polygon {
                    points: head,
                    fill: Some(fill),
                    stroke: None,
                    stroke_width: 0.0,
                });
            }
            kinds
        }
        Element::Image(img) => match image {
            Some(pixels) => vec![DisplayKind::Image {
                pixels,
                width: img.width,
                height: img.height,
            }],
            None => Vec::new(),
        },
    };

    let transform = node_transform(base);
    kinds
        .into_iter()
        .map(|kind| DisplayItem {
            element_id: id.to_string(),
            transform,
            opacity: base.opacity.clamp(0.0, 1.0),
            kind,
        })
        .collect()
}
