//! # Template Model
//!
//! The portable, serializable definition of a designable document: page
//! format, background, and an ordered list of elements whose geometry is
//! stored in millimeters.
//!
//! ```
//! use certforge::template::Template;
//!
//! let json = r##"{
//!     "name": "Course certificate",
//!     "orientation": "landscape",
//!     "format": "a4",
//!     "backgroundColor": "#ffffff",
//!     "stageWidth": 842,
//!     "stageHeight": 595,
//!     "elements": [
//!         {"type": "text", "id": "t1", "x": 40, "y": 90, "text": "{{name}}",
//!          "isDynamic": true, "dataField": "name"}
//!     ],
//!     "version": 1
//! }"##;
//! let template = Template::from_json(json).unwrap();
//! assert_eq!(template.referenced_fields(), vec!["name"]);
//! ```

pub mod content;
pub mod types;

pub use content::{TextContent, Token, placeholder};
pub use types::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::{Orientation, PageFormat, PageSize};
use crate::error::CertforgeError;
use crate::geometry::Rect;

/// Current template format version.
pub const TEMPLATE_VERSION: u32 = 1;

fn default_background() -> String {
    "#ffffff".into()
}

fn default_stage_width() -> f64 {
    842.0
}

fn default_stage_height() -> f64 {
    595.0
}

fn default_version() -> u32 {
    TEMPLATE_VERSION
}

/// Deserialize `Vec<Element>` with the element index in error messages.
fn deserialize_elements<'de, D>(deserializer: D) -> Result<Vec<Element>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            if !v.is_object() {
                return Err(serde::de::Error::custom(format!(
                    "elements[{}]: expected object, got {}",
                    i, v
                )));
            }
            serde_json::from_value(v)
                .map_err(|e| serde::de::Error::custom(format!("elements[{}]: {}", i, e)))
        })
        .collect()
}

/// A designable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub format: PageFormat,
    /// Explicit page width in mm, required for `format: "custom"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_height: Option<f64>,
    #[serde(default = "default_background")]
    pub background_color: String,
    /// Canvas size of the editor that saved the template (informational).
    #[serde(default = "default_stage_width")]
    pub stage_width: f64,
    #[serde(default = "default_stage_height")]
    pub stage_height: f64,
    #[serde(default, deserialize_with = "deserialize_elements")]
    pub elements: Vec<Element>,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            name: String::new(),
            orientation: Orientation::Landscape,
            format: PageFormat::A4,
            page_width: None,
            page_height: None,
            background_color: default_background(),
            stage_width: default_stage_width(),
            stage_height: default_stage_height(),
            elements: Vec::new(),
            version: TEMPLATE_VERSION,
        }
    }
}

impl Template {
    /// Create an empty template.
    pub fn new(name: impl Into<String>, format: PageFormat, orientation: Orientation) -> Self {
        Self {
            name: name.into(),
            format,
            orientation,
            ..Default::default()
        }
    }

    /// Parse and validate template JSON.
    pub fn from_json(json: &str) -> Result<Self, CertforgeError> {
        let template: Template = serde_json::from_str(json)
            .map_err(|e| CertforgeError::Template(format!("invalid template JSON: {}", e)))?;
        template.validate()?;
        Ok(template)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, CertforgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The declared physical page size, oriented.
    pub fn page_size(&self) -> PageSize {
        match (self.format, self.page_width, self.page_height) {
            (PageFormat::Custom, Some(w), Some(h)) => PageSize::new(w, h).oriented(self.orientation),
            (format, _, _) => format.size(self.orientation),
        }
    }

    /// Check structural invariants: valid page and unique, non-empty ids.
    pub fn validate(&self) -> Result<(), CertforgeError> {
        if self.format == PageFormat::Custom
            && (self.page_width.is_none() || self.page_height.is_none())
        {
            return Err(CertforgeError::Template(
                "custom format requires pageWidth and pageHeight".into(),
            ));
        }
        if !self.page_size().is_valid() {
            return Err(CertforgeError::Template("page size must be positive".into()));
        }

        let mut seen = HashSet::new();
        for (i, el) in self.elements.iter().enumerate() {
            let id = &el.base().id;
            if id.is_empty() {
                return Err(CertforgeError::Template(format!(
                    "elements[{}]: missing id",
                    i
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(CertforgeError::Template(format!(
                    "elements[{}]: duplicate id '{}'",
                    i, id
                )));
            }
        }
        Ok(())
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.base().id == id)
    }

    /// Every field referenced by a text element, in order of first appearance.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for el in &self.elements {
            if let Element::Text(t) = el {
                let bound = t.data_field.as_deref().filter(|_| t.is_dynamic);
                for f in bound.into_iter().chain(t.text.fields()) {
                    if !fields.contains(&f) {
                        fields.push(f);
                    }
                }
            }
        }
        fields
    }

    /// True when any text element is bound to a data field.
    pub fn has_dynamic_fields(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, Element::Text(t) if t.is_dynamic))
    }
}

/// Define the Element enum and all dispatch methods from a single list.
///
/// Adding an element type: add one line here, then define the struct in
/// `types.rs` with `impl ElementKind`.
macro_rules! define_elements {
    ($($variant:ident($inner:ty)),+ $(,)?) => {
        /// One visual object of a template.
        ///
        /// `#[serde(tag = "type")]` gives JSON like `{"type": "text", "id": "t1", ...}`.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        pub enum Element {
            $($variant($inner),)+
        }

        impl Element {
            pub fn base(&self) -> &ElementBase {
                match self { $(Element::$variant(e) => &e.base,)+ }
            }

            pub fn base_mut(&mut self) -> &mut ElementBase {
                match self { $(Element::$variant(e) => &mut e.base,)+ }
            }

            /// Human-readable display label (from [`ElementKind::label`]).
            pub fn label(&self) -> &'static str {
                match self { $(Element::$variant(_) => <$inner>::label(),)+ }
            }

            /// Whether negative scale is kept as flip state.
            pub fn is_flippable(&self) -> bool {
                match self { $(Element::$variant(_) => <$inner as ElementKind>::FLIPPABLE,)+ }
            }

            /// Unscaled bounds relative to the element anchor.
            pub fn local_bounds(&self) -> Rect {
                match self { $(Element::$variant(e) => e.local_bounds(),)+ }
            }

            pub fn scale_dimensions(&mut self, f: &ScaleFactors) {
                match self { $(Element::$variant(e) => e.scale_dimensions(f),)+ }
            }

            pub fn fold_scale(&mut self, sx: f64, sy: f64) {
                match self { $(Element::$variant(e) => e.fold_scale(sx, sy),)+ }
            }

            /// Editor defaults for every element type.
            pub fn all_editor_defaults() -> Vec<Self> {
                vec![$(Element::$variant(<$inner>::editor_default()),)+]
            }
        }
    };
}

define_elements! {
    Text(TextElement),
    Rectangle(RectElement),
    Circle(CircleElement),
    Star(StarElement),
    Line(LineElement),
    Arrow(ArrowElement),
    Image(ImageElement),
}

impl Element {
    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn as_text(&self) -> Option<&TextElement> {
        match self {
            Element::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextElement> {
        match self {
            Element::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Extract the serde type tag of an element (the `"type"` field).
fn serde_type_name(el: &Element) -> Option<String> {
    serde_json::to_value(el)
        .ok()?
        .get("type")?
        .as_str()
        .map(str::to_string)
}

/// Element type metadata for the editor palette.
#[derive(Debug, Clone, Serialize)]
pub struct ElementTypeMeta {
    #[serde(rename = "type")]
    pub type_name: String,
    pub label: String,
}

/// Element palette, derived from [`Element::all_editor_defaults`].
pub fn element_types() -> Vec<ElementTypeMeta> {
    Element::all_editor_defaults()
        .iter()
        .filter_map(|e| {
            Some(ElementTypeMeta {
                type_name: serde_type_name(e)?,
                label: e.label().to_string(),
            })
        })
        .collect()
}

/// Create an element with editor defaults by type name.
pub fn default_element(type_name: &str) -> Option<Element> {
    Element::all_editor_defaults()
        .into_iter()
        .find(|e| serde_type_name(e).as_deref() == Some(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r##"{
        "name": "Sample",
        "orientation": "landscape",
        "format": "a4",
        "backgroundColor": "#fdfcf7",
        "stageWidth": 842,
        "stageHeight": 595,
        "elements": [
            {"type": "rectangle", "id": "border", "x": 5, "y": 5, "width": 287, "height": 200,
             "stroke": "#c9a227", "strokeWidth": 2},
            {"type": "text", "id": "title", "x": 60, "y": 30, "text": "Certificate",
             "fontSize": 18, "fontStyle": "bold", "align": "center", "width": 177},
            {"type": "text", "id": "recipient", "x": 60, "y": 90, "text": "{{name}}",
             "isDynamic": true, "dataField": "name"},
            {"type": "circle", "id": "seal", "x": 250, "y": 170, "radius": 15, "fill": "#c9a227"},
            {"type": "star", "id": "star", "x": 250, "y": 170, "innerRadius": 5, "outerRadius": 10},
            {"type": "line", "id": "sig", "x": 30, "y": 180, "points": [0, 0, 60, 0]},
            {"type": "arrow", "id": "arrow", "x": 10, "y": 10, "points": [0, 0, 20, 20]},
            {"type": "image", "id": "logo", "x": 20, "y": 20, "width": 30, "height": 30,
             "src": "asset:logo", "scaleX": -1}
        ],
        "version": 1
    }"##;

    #[test]
    fn test_parse_sample() {
        let t = Template::from_json(SAMPLE).unwrap();
        assert_eq!(t.elements.len(), 8);
        assert_eq!(t.page_size(), PageSize::new(297.0, 210.0));
        assert!(matches!(t.elements[2], Element::Text(ref e) if e.is_dynamic));
        assert_eq!(t.elements[7].base().scale_x, -1.0);
    }

    #[test]
    fn test_serialize_round_trip_idempotent() {
        let t = Template::from_json(SAMPLE).unwrap();
        let first = t.to_json().unwrap();
        let again = Template::from_json(&first).unwrap().to_json().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"elements": [
            {"type": "text", "id": "a", "text": "x"},
            {"type": "text", "id": "a", "text": "y"}
        ]}"#;
        let err = Template::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate id 'a'"));
    }

    #[test]
    fn test_element_error_has_index() {
        let json = r#"{"elements": [{"type": "text", "id": "a"}, {"type": "blob", "id": "b"}]}"#;
        let err = Template::from_json(json).unwrap_err();
        assert!(err.to_string().contains("elements[1]"), "{}", err);
    }

    #[test]
    fn test_custom_format_requires_size() {
        let json = r#"{"format": "custom"}"#;
        assert!(Template::from_json(json).is_err());
        let json = r#"{"format": "custom", "pageWidth": 100, "pageHeight": 150, "orientation": "portrait"}"#;
        let t = Template::from_json(json).unwrap();
        assert_eq!(t.page_size(), PageSize::new(100.0, 150.0));
    }

    #[test]
    fn test_referenced_fields() {
        let json = r#"{"elements": [
            {"type": "text", "id": "a", "text": "{{course}} by {{name}}"},
            {"type": "text", "id": "b", "text": "{{name}}", "isDynamic": true, "dataField": "name"},
            {"type": "text", "id": "c", "text": "", "isDynamic": true, "dataField": "date"}
        ]}"#;
        let t = Template::from_json(json).unwrap();
        assert_eq!(t.referenced_fields(), vec!["course", "name", "date"]);
        assert!(t.has_dynamic_fields());
    }

    #[test]
    fn test_editor_defaults_complete() {
        let types = element_types();
        assert_eq!(types.len(), Element::all_editor_defaults().len());
        let names: Vec<&str> = types.iter().map(|t| t.type_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["text", "rectangle", "circle", "star", "line", "arrow", "image"]
        );
        for meta in &types {
            assert!(default_element(&meta.type_name).is_some());
        }
        assert!(default_element("blob").is_none());
    }
}
