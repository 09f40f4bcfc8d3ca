//! Node transforms and resize/flip normalization.
//!
//! On the canvas an element is a node: an anchor point plus rotation, skew
//! and scale, composed as
//!
//! ```text
//! world = translate(x, y) · rotate(rotation) · skew(skewX, skewY) · scale(scaleX, scaleY)
//! ```
//!
//! A flipped image (negative scale) draws from its anchor towards negative
//! local x/y, so the anchor sits on the far edge of the visible box. Stored
//! templates always hold the visible top-left corner; [`anchor_offset`] is
//! the vector between the two.

use serde::{Deserialize, Serialize};

use crate::geometry::{Affine, Point, Rect};
use crate::template::{Element, ElementBase};

/// Local → canvas transform of an element node.
pub fn node_transform(base: &ElementBase) -> Affine {
    Affine::translate(base.x, base.y)
        .then(&Affine::rotate(base.rotation))
        .then(&Affine::skew(base.skew_x, base.skew_y))
        .then(&Affine::scale(base.scale_x, base.scale_y))
}

/// Axis-aligned canvas bounds of an element.
pub fn world_bounds(el: &Element) -> Rect {
    node_transform(el.base()).bounds_of(&el.local_bounds())
}

/// Whether a canvas point falls inside the element's transformed box.
pub fn contains_point(el: &Element, p: Point) -> bool {
    match node_transform(el.base()).invert() {
        Some(inv) => {
            let local = inv.apply(p);
            let b = el.local_bounds();
            local.x >= b.x && local.x <= b.right() && local.y >= b.y && local.y <= b.bottom()
        }
        None => false,
    }
}

/// Vector from the visible top-left corner to the node anchor.
///
/// Zero unless the element is flippable and currently flipped.
pub fn anchor_offset(el: &Element) -> Point {
    let Element::Image(img) = el else {
        return Point::new(0.0, 0.0);
    };
    let base = &img.base;
    let dx = if base.scale_x < 0.0 {
        img.width * base.scale_x.abs()
    } else {
        0.0
    };
    let dy = if base.scale_y < 0.0 {
        img.height * base.scale_y.abs()
    } else {
        0.0
    };
    if dx == 0.0 && dy == 0.0 {
        return Point::new(0.0, 0.0);
    }
    Affine::rotate(base.rotation).apply_vector(Point::new(dx, dy))
}

/// The visible top-left corner of an element, in its current units.
pub fn visual_origin(el: &Element) -> Point {
    let off = anchor_offset(el);
    Point::new(el.base().x - off.x, el.base().y - off.y)
}

/// Move the anchor so the visible top-left corner lands on `origin`.
pub fn set_visual_origin(el: &mut Element, origin: Point) {
    let off = anchor_offset(el);
    let base = el.base_mut();
    base.x = origin.x + off.x;
    base.y = origin.y + off.y;
}

/// Node attributes reported by the manipulation layer after a drag/resize.
///
/// `scale_x`/`scale_y` are multiplicative relative to the last committed
/// node scale, so a plain move reports `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    #[serde(default)]
    pub skew_x: f64,
    #[serde(default)]
    pub skew_y: f64,
}

impl TransformResult {
    /// A pure move to `(x, y)`, keeping the element's other attributes.
    pub fn moved(base: &ElementBase, x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            rotation: base.rotation,
            scale_x: base.scale_x,
            scale_y: base.scale_y,
            skew_x: base.skew_x,
            skew_y: base.skew_y,
        }
    }
}

/// Fold a reported transform into an element.
///
/// Scale magnitude goes into absolute dimensions. Flippable elements keep
/// the sign as a unit scale; other elements end with scale `1`.
pub fn normalize_transform(el: &mut Element, result: &TransformResult) {
    let prev_sx = el.base().scale_x;
    let prev_sy = el.base().scale_y;
    let mag_x = (result.scale_x / prev_sx).abs();
    let mag_y = (result.scale_y / prev_sy).abs();

    if mag_x.is_finite() && mag_y.is_finite() && (mag_x != 1.0 || mag_y != 1.0) {
        el.fold_scale(mag_x, mag_y);
    }

    let flippable = el.is_flippable();
    let base = el.base_mut();
    base.x = result.x;
    base.y = result.y;
    base.rotation = result.rotation;
    base.skew_x = result.skew_x;
    base.skew_y = result.skew_y;
    if flippable {
        base.scale_x = unit_sign(result.scale_x);
        base.scale_y = unit_sign(result.scale_y);
    } else {
        if result.scale_x < 0.0 || result.scale_y < 0.0 {
            log::debug!("[scene] dropping mirror on non-flippable '{}'", base.id);
        }
        base.scale_x = 1.0;
        base.scale_y = 1.0;
    }
}

fn unit_sign(v: f64) -> f64 {
    if v < 0.0 { -1.0 } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ElementKind, ImageElement, RectElement};

    fn image(w: f64, h: f64) -> Element {
        let mut img = ImageElement::editor_default();
        img.base.id = "img".into();
        img.width = w;
        img.height = h;
        Element::Image(img)
    }

    #[test]
    fn test_node_transform_order() {
        let base = ElementBase {
            x: 10.0,
            y: 20.0,
            scale_x: 2.0,
            ..Default::default()
        };
        let p = node_transform(&base).apply(Point::new(5.0, 5.0));
        assert_eq!(p, Point::new(20.0, 25.0));
    }

    #[test]
    fn test_anchor_offset_flipped() {
        let mut el = image(40.0, 30.0);
        assert_eq!(anchor_offset(&el), Point::new(0.0, 0.0));
        el.base_mut().scale_x = -1.0;
        assert_eq!(anchor_offset(&el), Point::new(40.0, 0.0));
        el.base_mut().scale_y = -1.0;
        assert_eq!(anchor_offset(&el), Point::new(40.0, 30.0));
    }

    #[test]
    fn test_flipped_bounds_match_visual_origin() {
        let mut el = image(40.0, 30.0);
        set_visual_origin(&mut el, Point::new(100.0, 50.0));
        el.base_mut().scale_x = -1.0;
        set_visual_origin(&mut el, Point::new(100.0, 50.0));
        assert_eq!(el.base().x, 140.0);
        assert_eq!(world_bounds(&el), Rect::new(100.0, 50.0, 40.0, 30.0));
    }

    #[test]
    fn test_normalize_folds_scale() {
        let mut el = Element::Rectangle(RectElement::editor_default());
        let result = TransformResult {
            x: 5.0,
            y: 6.0,
            rotation: 0.0,
            scale_x: 2.0,
            scale_y: 0.5,
            skew_x: 0.0,
            skew_y: 0.0,
        };
        normalize_transform(&mut el, &result);
        let Element::Rectangle(r) = &el else {
            unreachable!()
        };
        assert_eq!((r.width, r.height), (120.0, 20.0));
        assert_eq!((r.base.scale_x, r.base.scale_y), (1.0, 1.0));
        assert_eq!((r.base.x, r.base.y), (5.0, 6.0));
    }

    #[test]
    fn test_normalize_keeps_image_flip_sign() {
        let mut el = image(40.0, 30.0);
        let result = TransformResult {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: -2.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
        };
        normalize_transform(&mut el, &result);
        let Element::Image(img) = &el else {
            unreachable!()
        };
        assert_eq!(img.base.scale_x, -1.0);
        assert_eq!(img.width, 80.0);

        // A plain move of a flipped image does not unflip or resize it
        let moved = TransformResult::moved(&img.base.clone(), 3.0, 4.0);
        normalize_transform(&mut el, &moved);
        let Element::Image(img) = &el else {
            unreachable!()
        };
        assert_eq!((img.base.scale_x, img.width), (-1.0, 80.0));
    }

    #[test]
    fn test_contains_point_respects_rotation() {
        let mut el = Element::Rectangle(RectElement::editor_default());
        el.base_mut().rotation = 90.0;
        // 60x40 rect rotated a quarter turn occupies x in [-40, 0], y in [0, 60]
        assert!(contains_point(&el, Point::new(-20.0, 30.0)));
        assert!(!contains_point(&el, Point::new(20.0, 30.0)));
    }
}
