//! # Scene Model
//!
//! The live, editable form of a [`Template`]: elements in canvas pixels,
//! the active selection, the overlay state, the display mode, and the undo
//! history.
//!
//! ## Units
//!
//! A template stores millimeters and the visible top-left corner of each
//! element. A scene stores pixels and the node anchor. The two differ only
//! for flipped images (see [`transform::anchor_offset`]).
//!
//! ```text
//! Template (mm) ──from_template──▶ Scene (px) ──to_template──▶ Template (mm)
//!                  scale ×px/mm                  scale ×mm/px, quantize
//!                  font, stroke × boost          font, stroke ÷ boost
//!                  + anchor offset               − anchor offset
//! ```
//!
//! ## Editing
//!
//! Every editing operation that changes something commits exactly one
//! history snapshot. Operations that change nothing commit nothing.

pub mod selection;
pub mod transform;

pub use selection::Selection;
pub use transform::TransformResult;

use std::ops::{Deref, DerefMut};

use crate::config::{HistoryConfig, PageSize, RenderConfig};
use crate::data::Record;
use crate::error::CertforgeError;
use crate::fields::{DisplayMode, resolve_display_text};
use crate::geometry::{CoordinateConverter, Point, Rect};
use crate::history::{History, HistorySnapshot};
use crate::template::{Element, ScaleFactors, Template};

use transform::{contains_point, normalize_transform, set_visual_origin, visual_origin};

/// Offset applied to duplicated elements, in canvas pixels.
pub const DUPLICATE_OFFSET: f64 = 20.0;

fn new_element_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn not_found(id: &str) -> CertforgeError {
    CertforgeError::Template(format!("no element with id '{}'", id))
}

/// A template loaded onto a canvas for editing and rendering.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Template metadata; its element list is always empty.
    header: Template,
    converter: CoordinateConverter,
    elements: Vec<Element>,
    background_color: String,
    selection: Selection,
    overlay_visible: bool,
    display_mode: DisplayMode,
    preview_record: Option<Record>,
    history: History,
}

impl Scene {
    /// Load a template onto the canvas [`RenderConfig::canvas_for`] gives
    /// its page.
    pub fn from_template(template: &Template, render: &RenderConfig) -> Result<Self, CertforgeError> {
        template.validate()?;
        let page = template.page_size();
        let (canvas_width, canvas_height) = render.canvas_for(page);
        let converter =
            CoordinateConverter::new(page, canvas_width, canvas_height, render.font_boost)?;
        let factors = ScaleFactors::to_canvas(&converter);

        let elements = template
            .elements
            .iter()
            .map(|el| {
                let mut el = el.clone();
                let origin = converter.point_to_px(Point::new(el.base().x, el.base().y));
                el.scale_dimensions(&factors);
                set_visual_origin(&mut el, origin);
                el
            })
            .collect();

        let mut header = template.clone();
        header.elements.clear();

        let mut scene = Self {
            background_color: template.background_color.clone(),
            header,
            converter,
            elements,
            selection: Selection::new(),
            overlay_visible: true,
            display_mode: DisplayMode::Placeholder,
            preview_record: None,
            history: History::default(),
        };
        scene.commit();
        log::debug!(
            "[scene] loaded '{}' with {} element(s)",
            scene.header.name,
            scene.elements.len()
        );
        Ok(scene)
    }

    /// Replace the history with one bounded by `config`.
    pub fn with_history(mut self, config: &HistoryConfig) -> Self {
        self.history = History::new(config);
        self.commit();
        self
    }

    /// Convert back to the portable millimeter form.
    pub fn to_template(&self) -> Template {
        let factors = ScaleFactors::to_template(&self.converter);
        let elements = self
            .elements
            .iter()
            .map(|el| {
                let origin = self.converter.point_to_mm(visual_origin(el));
                let mut el = el.clone();
                let base = el.base_mut();
                base.x = origin.x;
                base.y = origin.y;
                el.scale_dimensions(&factors);
                el
            })
            .collect();

        Template {
            background_color: self.background_color.clone(),
            stage_width: self.converter.canvas_width,
            stage_height: self.converter.canvas_height,
            elements,
            ..self.header.clone()
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn converter(&self) -> &CoordinateConverter {
        &self.converter
    }

    pub fn page_size(&self) -> PageSize {
        self.converter.page
    }

    /// Canvas size in pixels.
    pub fn canvas_size(&self) -> (f64, f64) {
        (self.converter.canvas_width, self.converter.canvas_height)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Direct element access without a history commit.
    pub(crate) fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    fn index_of(&self, id: &str) -> Result<usize, CertforgeError> {
        self.elements
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| not_found(id))
    }

    pub fn background_color(&self) -> &str {
        &self.background_color
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn preview_record(&self) -> Option<&Record> {
        self.preview_record.as_ref()
    }

    pub(crate) fn set_display(&mut self, mode: DisplayMode, record: Option<Record>) {
        self.display_mode = mode;
        self.preview_record = record;
    }

    /// What a text element currently shows, `None` for other elements.
    pub fn display_text(&self, id: &str) -> Option<String> {
        let text = self.element(id)?.as_text()?;
        Some(resolve_display_text(
            text,
            self.display_mode,
            self.preview_record.as_ref(),
        ))
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Topmost element under a canvas point.
    pub fn hit_test(&self, p: Point) -> Option<&str> {
        self.elements
            .iter()
            .rev()
            .find(|el| contains_point(el, p))
            .map(|el| el.id())
    }

    /// Click at a canvas point; `additive` is the modifier key.
    pub fn click(&mut self, p: Point, additive: bool) {
        let hit = self.hit_test(p).map(str::to_string);
        self.selection.click(hit.as_deref(), additive);
    }

    pub fn select(&mut self, id: &str) -> Result<(), CertforgeError> {
        self.index_of(id)?;
        self.selection.select_only(id);
        Ok(())
    }

    pub fn marquee(&mut self, area: Rect) {
        self.selection.marquee(&area, &self.elements);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ========================================================================
    // Editing
    // ========================================================================

    fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            elements: self.elements.clone(),
            background_color: self.background_color.clone(),
        }
    }

    fn commit(&mut self) {
        let snapshot = self.snapshot();
        self.history.commit(snapshot);
    }

    fn restore(&mut self, snapshot: HistorySnapshot) {
        self.elements = snapshot.elements;
        self.background_color = snapshot.background_color;
        self.selection.retain_existing(&self.elements);
    }

    /// Add an element on top. An empty id is replaced by a fresh one.
    pub fn add_element(&mut self, mut el: Element) -> Result<String, CertforgeError> {
        if el.id().is_empty() {
            el.base_mut().id = new_element_id();
        } else if self.element(el.id()).is_some() {
            return Err(CertforgeError::Template(format!(
                "duplicate id '{}'",
                el.id()
            )));
        }
        let id = el.id().to_string();
        self.elements.push(el);
        self.commit();
        Ok(id)
    }

    /// Delete every selected element. Returns how many were removed.
    pub fn remove_selected(&mut self) -> usize {
        let before = self.elements.len();
        let selection = &self.selection;
        self.elements.retain(|el| !selection.contains(el.id()));
        let removed = before - self.elements.len();
        self.selection.clear();
        if removed > 0 {
            self.commit();
        }
        removed
    }

    /// Move an element's anchor to `(x, y)` canvas pixels.
    pub fn move_element(&mut self, id: &str, x: f64, y: f64) -> Result<(), CertforgeError> {
        let idx = self.editable_index(id)?;
        let result = TransformResult::moved(self.elements[idx].base(), x, y);
        self.edit_at(idx, |el| normalize_transform(el, &result));
        Ok(())
    }

    /// Apply the result of a drag/resize/rotate gesture.
    pub fn apply_transform(
        &mut self,
        id: &str,
        result: &TransformResult,
    ) -> Result<(), CertforgeError> {
        let idx = self.editable_index(id)?;
        self.edit_at(idx, |el| normalize_transform(el, result));
        Ok(())
    }

    /// Apply `edit` to one element, committing only if it changed.
    fn edit_at(&mut self, idx: usize, edit: impl FnOnce(&mut Element)) -> bool {
        let before = self.elements[idx].clone();
        edit(&mut self.elements[idx]);
        let changed = self.elements[idx] != before;
        if changed {
            self.commit();
        }
        changed
    }

    fn editable_index(&self, id: &str) -> Result<usize, CertforgeError> {
        let idx = self.index_of(id)?;
        if self.elements[idx].base().locked {
            return Err(CertforgeError::Template(format!(
                "element '{}' is locked",
                id
            )));
        }
        Ok(idx)
    }

    /// Change properties of one element. The id cannot be changed.
    pub fn update_element(
        &mut self,
        id: &str,
        update: impl FnOnce(&mut Element),
    ) -> Result<(), CertforgeError> {
        let idx = self.index_of(id)?;
        self.edit_at(idx, |el| {
            update(el);
            el.base_mut().id = id.to_string();
        });
        Ok(())
    }

    fn reorder(&mut self, id: &str, target: impl FnOnce(usize, usize) -> usize) -> Result<bool, CertforgeError> {
        let idx = self.index_of(id)?;
        let to = target(idx, self.elements.len() - 1);
        if to == idx {
            return Ok(false);
        }
        let el = self.elements.remove(idx);
        self.elements.insert(to, el);
        self.commit();
        Ok(true)
    }

    /// Move one step towards the top. Returns false when already on top.
    pub fn bring_forward(&mut self, id: &str) -> Result<bool, CertforgeError> {
        self.reorder(id, |i, last| (i + 1).min(last))
    }

    pub fn send_backward(&mut self, id: &str) -> Result<bool, CertforgeError> {
        self.reorder(id, |i, _| i.saturating_sub(1))
    }

    pub fn bring_to_front(&mut self, id: &str) -> Result<bool, CertforgeError> {
        self.reorder(id, |_, last| last)
    }

    pub fn send_to_back(&mut self, id: &str) -> Result<bool, CertforgeError> {
        self.reorder(id, |_, _| 0)
    }

    /// Copy the selection on top, offset by [`DUPLICATE_OFFSET`].
    ///
    /// The copies become the new selection. Returns their ids.
    pub fn duplicate_selected(&mut self) -> Vec<String> {
        let copies: Vec<Element> = self
            .elements
            .iter()
            .filter(|el| self.selection.contains(el.id()))
            .map(|el| {
                let mut copy = el.clone();
                let base = copy.base_mut();
                base.id = new_element_id();
                base.x += DUPLICATE_OFFSET;
                base.y += DUPLICATE_OFFSET;
                base.locked = false;
                copy
            })
            .collect();
        if copies.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = copies.iter().map(|el| el.id().to_string()).collect();
        self.elements.extend(copies);
        self.selection.clear();
        for id in &ids {
            self.selection.toggle(id);
        }
        self.commit();
        ids
    }

    pub fn set_background(&mut self, color: &str) {
        if self.background_color == color {
            return;
        }
        self.background_color = color.to_string();
        self.commit();
    }

    /// Mirror selected images left-to-right, keeping their visible box in place.
    pub fn flip_selected_horizontal(&mut self) -> usize {
        self.flip_selected(true)
    }

    /// Mirror selected images top-to-bottom, keeping their visible box in place.
    pub fn flip_selected_vertical(&mut self) -> usize {
        self.flip_selected(false)
    }

    fn flip_selected(&mut self, horizontal: bool) -> usize {
        let mut flipped = 0;
        for el in self.elements.iter_mut() {
            if !self.selection.contains(el.id()) || el.base().locked {
                continue;
            }
            if !el.is_flippable() {
                log::debug!("[scene] '{}' ({}) cannot be flipped", el.id(), el.label());
                continue;
            }
            let origin = visual_origin(el);
            let base = el.base_mut();
            if horizontal {
                base.scale_x = -base.scale_x;
            } else {
                base.scale_y = -base.scale_y;
            }
            set_visual_origin(el, origin);
            flipped += 1;
        }
        if flipped > 0 {
            self.commit();
        }
        flipped
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Suspend interactive state for an export: clears the selection and
    /// hides the overlay until the guard drops.
    pub fn begin_export(&mut self) -> ExportGuard<'_> {
        let overlay_was_visible = self.overlay_visible;
        self.selection.clear();
        self.overlay_visible = false;
        ExportGuard {
            scene: self,
            overlay_was_visible,
        }
    }
}

/// Restores overlay visibility when an export finishes.
pub struct ExportGuard<'a> {
    scene: &'a mut Scene,
    overlay_was_visible: bool,
}

impl Deref for ExportGuard<'_> {
    type Target = Scene;

    fn deref(&self) -> &Scene {
        self.scene
    }
}

impl DerefMut for ExportGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scene {
        self.scene
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.scene.overlay_visible = self.overlay_was_visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ElementKind, ImageElement, RectElement, TextElement};
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r##"{
        "name": "Scene test",
        "format": "a4",
        "orientation": "landscape",
        "elements": [
            {"type": "rectangle", "id": "frame", "x": 10, "y": 10, "width": 277, "height": 190,
             "stroke": "#333333", "strokeWidth": 1.5},
            {"type": "text", "id": "title", "x": 40, "y": 30, "text": "Certificate", "fontSize": 12},
            {"type": "image", "id": "logo", "x": 20, "y": 20, "width": 30, "height": 25,
             "src": "asset:logo", "scaleX": -1},
            {"type": "circle", "id": "seal", "x": 250, "y": 170, "radius": 15, "locked": true}
        ]
    }"##;

    fn scene() -> Scene {
        let template = Template::from_json(TEMPLATE).unwrap();
        Scene::from_template(&template, &RenderConfig::default()).unwrap()
    }

    /// Canvas where 1 mm == 2 px exactly.
    fn exact_config() -> RenderConfig {
        RenderConfig {
            canvas_width: 594.0,
            canvas_height: 420.0,
            font_boost: 1.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_template_round_trip_is_exact() {
        let template = Template::from_json(TEMPLATE).unwrap();
        let back = scene().to_template();
        assert_eq!(back.elements, template.elements);
        assert_eq!(back.background_color, template.background_color);
    }

    #[test]
    fn test_load_scales_to_pixels() {
        let template = Template::from_json(TEMPLATE).unwrap();
        let scene = Scene::from_template(&template, &exact_config()).unwrap();
        let Some(Element::Rectangle(frame)) = scene.element("frame") else {
            panic!("frame missing")
        };
        // Stroke: 1.5 × 2 px/mm × 1.5 boost
        assert_eq!((frame.base.x, frame.width, frame.style.stroke_width), (20.0, 554.0, 4.5));
        let Some(Element::Text(title)) = scene.element("title") else {
            panic!("title missing")
        };
        // 12 × 2 px/mm × 1.5 boost
        assert_eq!(title.font_size, 36.0);
    }

    #[test]
    fn test_portrait_page_gets_portrait_canvas() {
        let template = Template::from_json(
            r#"{"format": "a4", "orientation": "portrait",
                "elements": [{"type": "circle", "id": "c", "x": 100, "y": 100, "radius": 10}]}"#,
        )
        .unwrap();
        let scene = Scene::from_template(&template, &RenderConfig::default()).unwrap();
        assert_eq!(scene.canvas_size(), (595.0, 842.0));

        let conv = scene.converter();
        assert!((conv.scale_x() / conv.scale_y() - 1.0).abs() < RenderConfig::ASPECT_TOLERANCE);
        assert_eq!(scene.to_template().elements, template.elements);
    }

    #[test]
    fn test_flipped_image_anchor() {
        let template = Template::from_json(TEMPLATE).unwrap();
        let scene = Scene::from_template(&template, &exact_config()).unwrap();
        let logo = scene.element("logo").unwrap();
        // Visible box starts at 40 px; the node anchor sits on its right edge
        assert_eq!(logo.base().x, 100.0);
        assert_eq!(transform::world_bounds(logo), Rect::new(40.0, 40.0, 60.0, 50.0));
    }

    #[test]
    fn test_flip_twice_restores_geometry() {
        let template = Template::from_json(TEMPLATE).unwrap();
        let mut scene = Scene::from_template(&template, &exact_config()).unwrap();
        let before = scene.element("logo").cloned().unwrap();
        scene.select("logo").unwrap();

        assert_eq!(scene.flip_selected_horizontal(), 1);
        let flipped = scene.element("logo").unwrap();
        assert_eq!(flipped.base().scale_x, 1.0);
        assert_eq!(transform::world_bounds(flipped), transform::world_bounds(&before));

        scene.flip_selected_horizontal();
        assert_eq!(scene.element("logo"), Some(&before));
        assert_eq!(scene.to_template().elements, template.elements);
    }

    #[test]
    fn test_flip_skips_non_images() {
        let mut scene = scene();
        scene.select("frame").unwrap();
        assert_eq!(scene.flip_selected_vertical(), 0);
        assert!(!scene.can_undo());
    }

    #[test]
    fn test_every_edit_commits_once() {
        let mut scene = scene();
        assert_eq!(scene.history().len(), 1);

        let id = scene
            .add_element(Element::Text(TextElement::new("{{name}}")))
            .unwrap();
        assert_eq!(scene.history().len(), 2);
        assert!(!id.is_empty());

        scene.move_element(&id, 5.0, 6.0).unwrap();
        scene.set_background("#fafafa");
        scene.set_background("#fafafa");
        scene.bring_to_front("frame").unwrap();
        scene.bring_to_front("frame").unwrap();
        assert_eq!(scene.history().len(), 5);
    }

    #[test]
    fn test_unchanged_edits_commit_nothing() {
        let mut scene = scene();
        let title = scene.element("title").unwrap().base().clone();

        scene.move_element("title", title.x, title.y).unwrap();
        scene.update_element("title", |_| {}).unwrap();
        scene
            .update_element("frame", |el| el.base_mut().id = "renamed".into())
            .unwrap();
        let result = TransformResult::moved(&title, title.x, title.y);
        scene.apply_transform("title", &result).unwrap();
        assert_eq!(scene.history().len(), 1);
        assert!(!scene.can_undo());

        scene.update_element("title", |el| el.base_mut().opacity = 0.5).unwrap();
        assert_eq!(scene.history().len(), 2);
    }

    #[test]
    fn test_undo_redo_restores_elements() {
        let mut scene = scene();
        let original = scene.elements().to_vec();
        scene.select("title").unwrap();
        assert_eq!(scene.remove_selected(), 1);
        assert!(scene.element("title").is_none());

        assert!(scene.undo());
        assert_eq!(scene.elements(), original.as_slice());
        assert!(scene.redo());
        assert!(scene.element("title").is_none());
        assert!(!scene.redo());
    }

    #[test]
    fn test_locked_elements_cannot_move() {
        let mut scene = scene();
        assert!(scene.move_element("seal", 0.0, 0.0).is_err());
        assert!(scene.move_element("nope", 0.0, 0.0).is_err());
    }

    #[test]
    fn test_apply_transform_resize() {
        let mut scene = Scene::from_template(
            &Template::from_json(TEMPLATE).unwrap(),
            &exact_config(),
        )
        .unwrap();
        let result = TransformResult {
            x: 30.0,
            y: 30.0,
            rotation: 0.0,
            scale_x: 0.5,
            scale_y: 2.0,
            skew_x: 0.0,
            skew_y: 0.0,
        };
        scene.apply_transform("frame", &result).unwrap();
        let Some(Element::Rectangle(r)) = scene.element("frame") else {
            panic!("frame missing")
        };
        assert_eq!((r.width, r.height), (277.0, 760.0));
        assert_eq!(r.base.scale_x, 1.0);
    }

    #[test]
    fn test_z_order() {
        let mut scene = scene();
        let order = |s: &Scene| s.elements().iter().map(|e| e.id().to_string()).collect::<Vec<_>>();
        scene.send_to_back("seal").unwrap();
        assert_eq!(order(&scene), vec!["seal", "frame", "title", "logo"]);
        scene.bring_forward("seal").unwrap();
        assert_eq!(order(&scene), vec!["frame", "seal", "title", "logo"]);
        assert!(!scene.send_backward("frame").unwrap());
    }

    #[test]
    fn test_duplicate_selected() {
        let mut scene = scene();
        scene.select("title").unwrap();
        let ids = scene.duplicate_selected();
        assert_eq!(ids.len(), 1);
        assert_eq!(scene.selection().ids(), ids.as_slice());
        let copy = scene.element(&ids[0]).unwrap();
        let orig = scene.element("title").unwrap();
        assert_eq!(copy.base().x, orig.base().x + DUPLICATE_OFFSET);
    }

    #[test]
    fn test_click_and_marquee() {
        let mut scene = scene();
        let frame = scene.element("frame").unwrap().base().clone();
        scene.click(Point::new(frame.x + 1.0, frame.y + 1.0), false);
        assert_eq!(scene.selection().ids(), &["frame".to_string()]);
        scene.click(Point::new(-50.0, -50.0), false);
        assert!(scene.selection().is_empty());

        let (w, h) = scene.canvas_size();
        scene.marquee(Rect::new(0.0, 0.0, w, h));
        assert!(!scene.selection().contains("seal"));
        assert_eq!(scene.selection().len(), 3);
    }

    #[test]
    fn test_export_guard_restores_overlay() {
        let mut scene = scene();
        scene.select("frame").unwrap();
        {
            let guard = scene.begin_export();
            assert!(!guard.overlay_visible());
            assert!(guard.selection().is_empty());
        }
        assert!(scene.overlay_visible());
    }

    #[test]
    fn test_update_element_keeps_id() {
        let mut scene = scene();
        scene
            .update_element("frame", |el| {
                el.base_mut().id = "renamed".into();
                el.base_mut().opacity = 0.5;
            })
            .unwrap();
        assert_eq!(scene.element("frame").unwrap().base().opacity, 0.5);
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut scene = scene();
        let mut r = RectElement::editor_default();
        r.base.id = "frame".into();
        assert!(scene.add_element(Element::Rectangle(r)).is_err());
        let mut img = ImageElement::editor_default();
        img.base.id = String::new();
        assert!(scene.add_element(Element::Image(img)).is_ok());
    }

    #[test]
    fn test_history_limit_applies() {
        let mut scene = scene().with_history(&HistoryConfig { limit: Some(2) });
        scene.set_background("#000001");
        scene.set_background("#000002");
        scene.set_background("#000003");
        assert_eq!(scene.history().len(), 2);
        assert!(scene.undo());
        assert_eq!(scene.background_color(), "#000002");
        assert!(!scene.undo());
    }
}
