//! Software rasterizer.
//!
//! Draws a [`Frame`] into an RGBA buffer. Each display item is mapped to
//! device pixels through `device · item.transform`; every pixel center in
//! the item's device bounds is mapped back to local coordinates with the
//! inverse transform and tested against the primitive. Rotation, skew,
//! scale and flips therefore need no special cases.

use image::{Rgba, RgbaImage};
use std::sync::Arc;

use super::frame::{DisplayItem, DisplayKind, Frame, TextBlock};
use super::text::{Coverage, FontBook, FontRequest};
use super::{RasterImage, Rasterizer, RenderError};
use crate::geometry::{Affine, Point, Rect};
use crate::template::TextAlign;

/// Largest raster we agree to allocate, in pixels.
pub const MAX_PIXELS: u64 = 120_000_000;

/// CPU rasterizer backed by the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct SoftwareRasterizer {
    fonts: Arc<FontBook>,
}

impl SoftwareRasterizer {
    pub fn new(fonts: Arc<FontBook>) -> Self {
        Self { fonts }
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn rasterize(&mut self, frame: &Frame) -> Result<RasterImage, RenderError> {
        let (w, h) = frame.device_size();
        if w as u64 * h as u64 > MAX_PIXELS {
            return Err(RenderError::Raster(format!(
                "raster of {}x{} exceeds the pixel limit",
                w, h
            )));
        }

        let mut background = frame.background;
        // Pages are opaque
        background[3] = 255;
        let mut img = RgbaImage::from_pixel(w, h, background);
        let device = frame.device_transform();

        for item in &frame.items {
            let m = device.then(&item.transform);
            let Some(inv) = m.invert() else {
                log::debug!("[render] skipping degenerate '{}'", item.element_id);
                continue;
            };
            match &item.kind {
                DisplayKind::Text(block) => {
                    let text = TextRaster::layout(block, m.mean_scale(), &self.fonts);
                    fill_region(&mut img, &m, &inv, text.bounds(), |p| {
                        text.sample(p).map(|c| (block.color, c))
                    }, item.opacity);
                }
                kind => {
                    let bounds = kind.local_bounds();
                    let min_half = 0.5 / m.mean_scale().max(1e-9);
                    draw_shape(&mut img, &m, &inv, item, bounds, min_half);
                }
            }
        }
        Ok(img)
    }
}

/// Visit every device pixel whose center maps inside `local` bounds and
/// blend the color returned by `shade`.
fn fill_region(
    img: &mut RgbaImage,
    m: &Affine,
    inv: &Affine,
    local: Rect,
    mut shade: impl FnMut(Point) -> Option<(Rgba<u8>, f64)>,
    opacity: f64,
) {
    let device = m.bounds_of(&local);
    let x0 = device.x.floor().max(0.0) as u32;
    let y0 = device.y.floor().max(0.0) as u32;
    let x1 = (device.right().ceil().max(0.0) as u32).min(img.width());
    let y1 = (device.bottom().ceil().max(0.0) as u32).min(img.height());

    for y in y0..y1 {
        for x in x0..x1 {
            let p = inv.apply(Point::new(x as f64 + 0.5, y as f64 + 0.5));
            if let Some((color, coverage)) = shade(p) {
                blend(img.get_pixel_mut(x, y), color, coverage * opacity);
            }
        }
    }
}

fn draw_shape(
    img: &mut RgbaImage,
    m: &Affine,
    inv: &Affine,
    item: &DisplayItem,
    bounds: Rect,
    min_half: f64,
) {
    match &item.kind {
        DisplayKind::Rect {
            width,
            height,
            corner_radius,
            fill,
            stroke,
            stroke_width,
        } => {
            let rect = Rect::new(0.0, 0.0, *width, *height);
            let r = corner_radius.min(width / 2.0).min(height / 2.0).max(0.0);
            let half = stroke_width / 2.0;
            fill_region(img, m, inv, bounds, |p| {
                paint_layers(
                    fill.filter(|_| in_round_rect(p, &rect, r)),
                    stroke.filter(|_| {
                        *stroke_width > 0.0
                            && in_round_rect(p, &rect.inflate(half), r + half)
                            && !in_round_rect(p, &rect.inflate(-half), (r - half).max(0.0))
                    }),
                )
            }, item.opacity);
        }
        DisplayKind::Circle {
            radius,
            fill,
            stroke,
            stroke_width,
        } => {
            let half = (stroke_width / 2.0).max(min_half);
            fill_region(img, m, inv, bounds, |p| {
                let d = (p.x * p.x + p.y * p.y).sqrt();
                paint_layers(
                    fill.filter(|_| d <= *radius),
                    stroke.filter(|_| *stroke_width > 0.0 && (d - radius).abs() <= half),
                )
            }, item.opacity);
        }
        DisplayKind::Polygon {
            points,
            fill,
            stroke,
            stroke_width,
        } => {
            let half = (stroke_width / 2.0).max(min_half);
            fill_region(img, m, inv, bounds, |p| {
                paint_layers(
                    fill.filter(|_| in_polygon(p, points)),
                    stroke.filter(|_| {
                        *stroke_width > 0.0 && distance_to_path(p, points, true) <= half
                    }),
                )
            }, item.opacity);
        }
        DisplayKind::Polyline {
            points,
            stroke,
            stroke_width,
        } => {
            let half = (stroke_width / 2.0).max(min_half);
            fill_region(img, m, inv, bounds, |p| {
                (distance_to_path(p, points, false) <= half).then_some((*stroke, 1.0))
            }, item.opacity);
        }
        DisplayKind::Image {
            pixels,
            width,
            height,
        } => {
            let (iw, ih) = pixels.dimensions();
            fill_region(img, m, inv, bounds, |p| {
                if p.x < 0.0 || p.y < 0.0 || p.x >= *width || p.y >= *height {
                    return None;
                }
                let sx = ((p.x / width * iw as f64) as u32).min(iw.saturating_sub(1));
                let sy = ((p.y / height * ih as f64) as u32).min(ih.saturating_sub(1));
                Some((*pixels.get_pixel(sx, sy), 1.0))
            }, item.opacity);
        }
        DisplayKind::Text(_) => {}
    }
}

/// Stroke over fill: the stroke wins where both apply.
fn paint_layers(fill: Option<Rgba<u8>>, stroke: Option<Rgba<u8>>) -> Option<(Rgba<u8>, f64)> {
    stroke.or(fill).map(|c| (c, 1.0))
}

/// Source-over blend with an extra coverage factor.
fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f64) {
    let a = (src[3] as f64 / 255.0) * coverage.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let da = dst[3] as f64 / 255.0;
    let out_a = a + da * (1.0 - a);
    for i in 0..3 {
        let s = src[i] as f64;
        let d = dst[i] as f64;
        let v = if out_a > 0.0 {
            (s * a + d * da * (1.0 - a)) / out_a
        } else {
            0.0
        };
        dst[i] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn in_round_rect(p: Point, rect: &Rect, r: f64) -> bool {
    if rect.width < 0.0 || rect.height < 0.0 {
        return false;
    }
    if p.x < rect.x || p.y < rect.y || p.x > rect.right() || p.y > rect.bottom() {
        return false;
    }
    if r <= 0.0 {
        return true;
    }
    // Distance to the nearest corner circle center
    let cx = p.x.clamp(rect.x + r, rect.right() - r);
    let cy = p.y.clamp(rect.y + r, rect.bottom() - r);
    let (dx, dy) = (p.x - cx, p.y - cy);
    dx * dx + dy * dy <= r * r
}

/// Even-odd point in polygon.
fn in_polygon(p: Point, points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - qx).powi(2) + (p.y - qy).powi(2)).sqrt()
}

fn distance_to_path(p: Point, points: &[Point], closed: bool) -> f64 {
    let mut best = f64::INFINITY;
    for pair in points.windows(2) {
        best = best.min(distance_to_segment(p, pair[0], pair[1]));
    }
    if closed && points.len() > 2 {
        best = best.min(distance_to_segment(p, points[points.len() - 1], points[0]));
    }
    if points.len() == 1 {
        best = distance_to_segment(p, points[0], points[0]);
    }
    best
}

/// A text block rendered at device resolution in its own local frame.
struct TextRaster {
    /// Device pixels per local unit.
    scale: f64,
    coverage: Coverage,
}

impl TextRaster {
    fn layout(block: &TextBlock, scale: f64, fonts: &FontBook) -> Self {
        let scale = scale.max(1e-6);
        let req = FontRequest {
            family: &block.family,
            bold: block.bold,
            italic: block.italic,
            size: (block.font_size * scale) as f32,
        };
        let rendered: Vec<Coverage> = block
            .lines
            .iter()
            .map(|line| fonts.render_line(line, &req))
            .collect();

        let widest = rendered.iter().map(|c| c.width).max().unwrap_or(0);
        let box_w = block
            .box_width
            .map(|w| (w * scale).ceil() as usize)
            .unwrap_or(widest)
            .max(widest);
        let line_h = block.line_height * scale;
        let em = block.font_size * scale;
        let height = (line_h * block.lines.len() as f64).ceil().max(em.ceil()) as usize;

        let mut coverage = Coverage::new(box_w.max(1), height.max(1));
        let align_w = block
            .box_width
            .map(|w| (w * scale).ceil() as usize)
            .unwrap_or(widest);
        for (i, line) in rendered.iter().enumerate() {
            let x_off = match block.align {
                TextAlign::Left => 0,
                TextAlign::Center => align_w.saturating_sub(line.width) / 2,
                TextAlign::Right => align_w.saturating_sub(line.width),
            };
            let y_off = (i as f64 * line_h + (line_h - em).max(0.0) / 2.0).round() as usize;
            for y in 0..line.height {
                for x in 0..line.width {
                    let v = line.get(x, y);
                    let (tx, ty) = (x + x_off, y + y_off);
                    if v > 0.0 && tx < coverage.width && ty < coverage.height {
                        let idx = ty * coverage.width + tx;
                        coverage.data[idx] = coverage.data[idx].max(v);
                    }
                }
            }
        }
        Self { scale, coverage }
    }

    fn bounds(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            self.coverage.width as f64 / self.scale,
            self.coverage.height as f64 / self.scale,
        )
    }

    fn sample(&self, p: Point) -> Option<f64> {
        if p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let v = self
            .coverage
            .get((p.x * self.scale) as usize, (p.y * self.scale) as usize);
        (v > 0.0).then_some(v as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::color::{BLACK, WHITE};

    fn frame(items: Vec<DisplayItem>) -> Frame {
        Frame {
            generation: 0,
            canvas_width: 100.0,
            canvas_height: 50.0,
            pixel_ratio: 2.0,
            background: WHITE,
            items,
            warnings: Vec::new(),
        }
    }

    fn item(transform: Affine, kind: DisplayKind) -> DisplayItem {
        DisplayItem {
            element_id: "t".into(),
            transform,
            opacity: 1.0,
            kind,
        }
    }

    fn red_rect(w: f64, h: f64) -> DisplayKind {
        DisplayKind::Rect {
            width: w,
            height: h,
            corner_radius: 0.0,
            fill: Some(Rgba([255, 0, 0, 255])),
            stroke: None,
            stroke_width: 0.0,
        }
    }

    #[test]
    fn test_device_size_and_background() {
        let img = SoftwareRasterizer::default().rasterize(&frame(vec![])).unwrap();
        assert_eq!(img.dimensions(), (200, 100));
        assert_eq!(*img.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn test_rect_fill_at_pixel_ratio() {
        let f = frame(vec![item(Affine::translate(10.0, 10.0), red_rect(20.0, 10.0))]);
        let img = SoftwareRasterizer::default().rasterize(&f).unwrap();
        assert_eq!(*img.get_pixel(25, 25), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(19, 25), WHITE);
        assert_eq!(*img.get_pixel(59, 39), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(60, 25), WHITE);
    }

    #[test]
    fn test_flipped_rect_draws_left_of_anchor() {
        let t = Affine::translate(50.0, 10.0).then(&Affine::scale(-1.0, 1.0));
        let img = SoftwareRasterizer::default()
            .rasterize(&frame(vec![item(t, red_rect(20.0, 10.0))]))
            .unwrap();
        assert_eq!(*img.get_pixel(70, 25), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(110, 25), WHITE);
    }

    #[test]
    fn test_opacity_blends() {
        let mut it = item(Affine::IDENTITY, red_rect(100.0, 50.0));
        it.opacity = 0.5;
        let img = SoftwareRasterizer::default().rasterize(&frame(vec![it])).unwrap();
        assert_eq!(*img.get_pixel(10, 10), Rgba([255, 128, 128, 255]));
    }

    #[test]
    fn test_text_inks_pixels() {
        let block = TextBlock {
            lines: vec!["Ada".into()],
            font_size: 12.0,
            line_height: 14.0,
            family: "Arial".into(),
            bold: false,
            italic: false,
            color: BLACK,
            align: TextAlign::Left,
            box_width: None,
        };
        let f = frame(vec![item(Affine::translate(5.0, 5.0), DisplayKind::Text(block))]);
        let img = SoftwareRasterizer::default().rasterize(&f).unwrap();
        let dark = img.pixels().filter(|p| p[0] < 128).count();
        assert!(dark > 0);
        // Nothing above or left of the anchor
        assert!((0..200).all(|x| *img.get_pixel(x, 5) == WHITE));
    }

    #[test]
    fn test_polygon_contains() {
        let tri = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)];
        assert!(in_polygon(Point::new(2.0, 2.0), &tri));
        assert!(!in_polygon(Point::new(8.0, 8.0), &tri));
    }

    #[test]
    fn test_round_rect_corner() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!in_round_rect(Point::new(0.2, 0.2), &r, 3.0));
        assert!(in_round_rect(Point::new(5.0, 0.2), &r, 3.0));
    }
}
