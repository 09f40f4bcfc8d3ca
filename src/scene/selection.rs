//! Active selection on the canvas.
//!
//! | Gesture | Effect |
//! |---------|--------|
//! | click element | select only that element |
//! | modifier + click | toggle element in the selection |
//! | click empty canvas | clear |
//! | marquee drag | every unlocked element whose bounds intersect the box |

use crate::geometry::Rect;
use crate::template::Element;

use super::transform::world_bounds;

/// Ordered set of selected element ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Replace the selection with one element.
    pub fn select_only(&mut self, id: &str) {
        self.ids.clear();
        self.ids.push(id.to_string());
    }

    /// Add or remove one element (modifier-click).
    pub fn toggle(&mut self, id: &str) {
        if let Some(pos) = self.ids.iter().position(|s| s == id) {
            self.ids.remove(pos);
        } else {
            self.ids.push(id.to_string());
        }
    }

    /// Apply a click. `hit` is the topmost element under the pointer.
    pub fn click(&mut self, hit: Option<&str>, additive: bool) {
        match (hit, additive) {
            (Some(id), true) => self.toggle(id),
            (Some(id), false) => self.select_only(id),
            (None, _) => self.clear(),
        }
    }

    /// Select every unlocked element whose canvas bounds intersect `area`.
    pub fn marquee(&mut self, area: &Rect, elements: &[Element]) {
        self.ids = elements
            .iter()
            .filter(|el| !el.base().locked && world_bounds(el).intersects(area))
            .map(|el| el.id().to_string())
            .collect();
    }

    /// Drop ids that no longer exist (after delete or undo).
    pub fn retain_existing(&mut self, elements: &[Element]) {
        self.ids
            .retain(|id| elements.iter().any(|el| el.id() == id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ElementKind, RectElement};

    fn rect(id: &str, x: f64, y: f64, locked: bool) -> Element {
        let mut r = RectElement::editor_default();
        r.base.id = id.into();
        r.base.x = x;
        r.base.y = y;
        r.base.locked = locked;
        Element::Rectangle(r)
    }

    #[test]
    fn test_click_modes() {
        let mut sel = Selection::new();
        sel.click(Some("a"), false);
        sel.click(Some("b"), true);
        assert_eq!(sel.ids(), &["a".to_string(), "b".to_string()]);
        sel.click(Some("a"), true);
        assert_eq!(sel.ids(), &["b".to_string()]);
        sel.click(Some("c"), false);
        assert_eq!(sel.ids(), &["c".to_string()]);
        sel.click(None, false);
        assert!(sel.is_empty());
    }

    #[test]
    fn test_marquee_excludes_locked() {
        let elements = vec![
            rect("a", 0.0, 0.0, false),
            rect("b", 10.0, 10.0, true),
            rect("c", 500.0, 500.0, false),
        ];
        let mut sel = Selection::new();
        sel.marquee(&Rect::new(0.0, 0.0, 100.0, 100.0), &elements);
        assert_eq!(sel.ids(), &["a".to_string()]);
    }

    #[test]
    fn test_retain_existing() {
        let elements = vec![rect("a", 0.0, 0.0, false)];
        let mut sel = Selection::new();
        sel.toggle("a");
        sel.toggle("gone");
        sel.retain_existing(&elements);
        assert_eq!(sel.ids(), &["a".to_string()]);
    }
}
