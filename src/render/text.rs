//! Text rasterization.
//!
//! TrueType fonts registered in a [`FontBook`] render anti-aliased through
//! `ab_glyph`. Families without a registered font fall back to the embedded
//! Spleen 12×24 bitmap font, scaled nearest-neighbor to the requested size
//! with an advance of half an em per character.

use ab_glyph::{Font, FontArc, ScaleFont};
use spleen_font::{FONT_12X24, PSF2Font};
use std::collections::HashMap;

use super::RenderError;
use crate::config::FontSource;
use crate::template::BITMAP_ADVANCE_EM;

/// Horizontal shear applied for synthetic italics.
const ITALIC_SHEAR: f32 = 0.2;

/// A single-channel coverage buffer: 0.0 = empty, 1.0 = fully inked.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Coverage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        if x < self.width && y < self.height {
            self.data[y * self.width + x]
        } else {
            0.0
        }
    }

    fn add(&mut self, x: i64, y: i64, value: f32) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            let idx = y as usize * self.width + x as usize;
            self.data[idx] = (self.data[idx] + value).min(1.0);
        }
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }
}

/// Style inputs for one line of text.
#[derive(Debug, Clone, Copy)]
pub struct FontRequest<'a> {
    pub family: &'a str,
    pub bold: bool,
    pub italic: bool,
    /// Em size in device pixels.
    pub size: f32,
}

/// Registered TrueType faces keyed by lowercase family and weight.
#[derive(Default, Clone)]
pub struct FontBook {
    faces: HashMap<(String, bool), FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("faces", &self.faces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured font file.
    pub fn from_sources(sources: &[FontSource]) -> Result<Self, RenderError> {
        let mut book = Self::new();
        for source in sources {
            let bytes = std::fs::read(&source.path).map_err(|e| {
                RenderError::Font(format!("failed to read {}: {}", source.path, e))
            })?;
            book.register(&source.family, source.bold, bytes)?;
        }
        Ok(book)
    }

    pub fn register(&mut self, family: &str, bold: bool, bytes: Vec<u8>) -> Result<(), RenderError> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| RenderError::Font(format!("invalid font for '{}': {}", family, e)))?;
        self.faces.insert((family.to_lowercase(), bold), font);
        log::debug!("[render] registered font '{}' (bold: {})", family, bold);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn face(&self, family: &str, bold: bool) -> Option<&FontArc> {
        let key = family.to_lowercase();
        self.faces
            .get(&(key.clone(), bold))
            .or_else(|| self.faces.get(&(key, !bold)))
    }

    /// Advance width of `text` in device pixels.
    pub fn measure(&self, text: &str, req: &FontRequest<'_>) -> f32 {
        match self.face(req.family, req.bold) {
            Some(font) => {
                let scaled = font.as_scaled(req.size);
                text.chars().map(|c| scaled.h_advance(font.glyph_id(c))).sum()
            }
            None => text.chars().count() as f32 * bitmap_advance(req.size),
        }
    }

    /// Rasterize one line. The buffer is `measure` wide and one em tall
    /// (TrueType: ascent + descent).
    pub fn render_line(&self, text: &str, req: &FontRequest<'_>) -> Coverage {
        let mut cov = match self.face(req.family, req.bold) {
            Some(font) => render_ttf(font, text, req.size),
            None => render_bitmap(text, req.size, req.bold),
        };
        if req.italic {
            cov = shear(&cov);
        }
        cov
    }
}

fn bitmap_advance(size: f32) -> f32 {
    size * BITMAP_ADVANCE_EM as f32
}

fn render_ttf(font: &FontArc, text: &str, size: f32) -> Coverage {
    let scaled = font.as_scaled(size);
    let ascent = scaled.ascent();
    let height = (ascent - scaled.descent()).ceil().max(1.0) as usize;

    let mut glyphs = Vec::new();
    let mut caret = 0.0f32;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        glyphs.push((id, caret));
        caret += scaled.h_advance(id);
    }

    let mut cov = Coverage::new(caret.ceil().max(1.0) as usize, height);
    for (id, x) in glyphs {
        let glyph = id.with_scale_and_position(size, ab_glyph::point(x, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, c| {
                cov.add(
                    px as i64 + bounds.min.x as i64,
                    py as i64 + bounds.min.y as i64,
                    c,
                );
            });
        }
    }
    cov
}

fn render_bitmap(text: &str, size: f32, bold: bool) -> Coverage {
    let cell_w = bitmap_advance(size).max(1.0);
    let cell_h = size.max(1.0);
    let count = text.chars().count();
    let mut cov = Coverage::new(
        (cell_w * count as f32).ceil().max(1.0) as usize,
        cell_h.ceil() as usize,
    );
    let mut font = PSF2Font::new(FONT_12X24).ok();

    for (i, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let mut bits: Option<Vec<bool>> = None;
        if let Some(spleen) = font.as_mut() {
            let utf8 = ch.to_string();
            if let Some(rows) = spleen.glyph_for_utf8(utf8.as_bytes()) {
                let mut grid = vec![false; 12 * 24];
                for (y, row) in rows.enumerate() {
                    for (x, on) in row.enumerate() {
                        if x < 12 && y < 24 {
                            grid[y * 12 + x] = on;
                        }
                    }
                }
                bits = Some(grid);
            }
        }
        let x0 = (i as f32 * cell_w).floor() as i64;
        let w = cell_w.ceil() as i64;
        let h = cell_h.ceil() as i64;
        for dy in 0..h {
            for dx in 0..w {
                let sx = (dx as f32 * 12.0 / cell_w) as usize;
                let sy = (dy as f32 * 24.0 / cell_h) as usize;
                let on = match &bits {
                    Some(b) => b.get(sy * 12 + sx).copied().unwrap_or(false),
                    // Box outline for characters missing from the font
                    None => dx == 0 || dy == 0 || dx == w - 1 || dy == h - 1,
                };
                if on {
                    cov.add(x0 + dx, dy, 1.0);
                    if bold {
                        cov.add(x0 + dx + 1, dy, 1.0);
                    }
                }
            }
        }
    }
    cov
}

/// Slant a line buffer to the right, widening it to fit.
fn shear(src: &Coverage) -> Coverage {
    let extra = (src.height as f32 * ITALIC_SHEAR).ceil() as usize;
    let mut out = Coverage::new(src.width + extra, src.height);
    for y in 0..src.height {
        let shift = ((src.height - y) as f32 * ITALIC_SHEAR) as i64;
        for x in 0..src.width {
            let v = src.get(x, y);
            if v > 0.0 {
                out.add(x as i64 + shift, y as i64, v);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(size: f32) -> FontRequest<'static> {
        FontRequest {
            family: "Arial",
            bold: false,
            italic: false,
            size,
        }
    }

    #[test]
    fn test_bitmap_measure_matches_advance() {
        let book = FontBook::new();
        assert_eq!(book.measure("abcd", &req(24.0)), 48.0);
    }

    #[test]
    fn test_bitmap_render_inks_pixels() {
        let book = FontBook::new();
        let cov = book.render_line("Ada", &req(24.0));
        assert_eq!((cov.width, cov.height), (36, 24));
        assert!(!cov.is_blank());
    }

    #[test]
    fn test_whitespace_is_blank() {
        let book = FontBook::new();
        assert!(book.render_line("   ", &req(24.0)).is_blank());
    }

    #[test]
    fn test_italic_widens() {
        let book = FontBook::new();
        let upright = book.render_line("I", &req(24.0));
        let italic = book.render_line("I", &FontRequest { italic: true, ..req(24.0) });
        assert!(italic.width > upright.width);
    }

    #[test]
    fn test_invalid_font_rejected() {
        let mut book = FontBook::new();
        assert!(book.register("Broken", false, vec![0, 1, 2, 3]).is_err());
        assert!(book.is_empty());
    }
}
