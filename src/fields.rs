//! # Dynamic Field Resolver
//!
//! Decides what a text element displays in each display mode.
//!
//! | Mode | Dynamic element shows |
//! |------|-----------------------|
//! | [`DisplayMode::Placeholder`] | its `{{field}}` tokens |
//! | [`DisplayMode::ActualData`] | values from the preview record, `[field - missing]` when absent |
//!
//! Built-in variables (`date`, `date_short`, `year`, `iso_date`, `time`)
//! fill in when the record has no such column. Record values always win.
//!
//! ```
//! use certforge::data::Record;
//! use certforge::fields::{DisplayMode, resolve_display_text};
//! use certforge::template::TextElement;
//!
//! let mut el = TextElement::new("Awarded to {{name}}");
//! el.bind_field("name");
//! let record = Record::from_pairs([("name", "Ada Lovelace")]);
//!
//! assert_eq!(resolve_display_text(&el, DisplayMode::Placeholder, None), "Awarded to {{name}}");
//! assert_eq!(
//!     resolve_display_text(&el, DisplayMode::ActualData, Some(&record)),
//!     "Awarded to Ada Lovelace"
//! );
//! ```

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::{Dataset, Record};
use crate::scene::Scene;
use crate::template::{Template, TextContent, TextElement, placeholder};

/// Names of the variables available without a CSV column.
pub const BUILTIN_VARIABLES: &[&str] = &["date", "date_short", "year", "iso_date", "time"];

/// How dynamic text is shown on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Placeholder,
    ActualData,
}

/// Marker shown for a field the record does not provide.
pub fn missing_marker(field: &str) -> String {
    format!("[{} - missing]", field)
}

/// Built-in variables for the current local time.
pub fn builtin_variables() -> HashMap<String, String> {
    builtin_variables_at(Local::now().naive_local())
}

/// Built-in variables for a fixed time.
pub fn builtin_variables_at(now: NaiveDateTime) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("date".to_string(), now.format("%B %-d, %Y").to_string());
    vars.insert("date_short".to_string(), now.format("%m/%d/%Y").to_string());
    vars.insert("year".to_string(), now.format("%Y").to_string());
    vars.insert("iso_date".to_string(), now.format("%Y-%m-%d").to_string());
    vars.insert("time".to_string(), now.format("%H:%M").to_string());
    vars
}

/// Value lookup for one record plus built-ins.
pub struct FieldValues<'a> {
    record: Option<&'a Record>,
    builtins: HashMap<String, String>,
}

impl<'a> FieldValues<'a> {
    pub fn new(record: Option<&'a Record>) -> Self {
        Self {
            record,
            builtins: builtin_variables(),
        }
    }

    /// Use a fixed set of built-ins (tests, reproducible batches).
    pub fn with_builtins(record: Option<&'a Record>, builtins: HashMap<String, String>) -> Self {
        Self { record, builtins }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.record
            .and_then(|r| r.get(field))
            .or_else(|| self.builtins.get(field).map(String::as_str))
    }

    /// Value, or the missing marker.
    pub fn resolve(&self, field: &str) -> String {
        self.get(field)
            .map(str::to_string)
            .unwrap_or_else(|| missing_marker(field))
    }

    /// Render content with every field substituted.
    pub fn render(&self, content: &TextContent) -> String {
        content.render_with(|f| self.resolve(f))
    }
}

/// The bound field of a dynamic element, if any.
fn bound_field(el: &TextElement) -> Option<&str> {
    el.data_field.as_deref().filter(|_| el.is_dynamic)
}

/// Text an element displays in `mode`.
pub fn resolve_display_text(el: &TextElement, mode: DisplayMode, record: Option<&Record>) -> String {
    resolve_with(el, mode, &FieldValues::new(record))
}

/// [`resolve_display_text`] with an explicit value lookup.
pub fn resolve_with(el: &TextElement, mode: DisplayMode, values: &FieldValues<'_>) -> String {
    let unbound = bound_field(el).filter(|f| !el.text.references(f));
    match mode {
        DisplayMode::Placeholder => match unbound {
            // Content drifted away from its binding; the placeholder wins
            Some(field) => placeholder(field),
            None => el.text.to_source(),
        },
        DisplayMode::ActualData => match unbound {
            Some(field) => values.resolve(field),
            None => values.render(&el.text),
        },
    }
}

/// Restore the field token in a dynamic element whose content lost it.
///
/// Literal occurrences of the previously shown value become the token; if
/// there are none, the content becomes the bare placeholder. Returns true
/// when the content changed.
pub fn normalize_to_placeholder(el: &mut TextElement, previous: Option<&Record>) -> bool {
    let Some(field) = bound_field(el).map(str::to_string) else {
        return false;
    };
    if el.text.references(&field) {
        return false;
    }
    let value = previous.and_then(|r| r.get(&field)).unwrap_or("");
    if el.text.replace_literal_with_field(value, &field) == 0 {
        el.text = TextContent::field(&field);
    }
    true
}

/// Switch a live scene between placeholder and actual-data display.
///
/// Going back to placeholder mode normalizes every dynamic element against
/// the record that was being shown.
pub fn apply_mode(scene: &mut Scene, mode: DisplayMode, record: Option<Record>) {
    if mode == DisplayMode::Placeholder {
        let previous = scene.preview_record().cloned();
        let mut changed = 0;
        for el in scene.elements_mut() {
            if let Some(text) = el.as_text_mut()
                && normalize_to_placeholder(text, previous.as_ref())
            {
                changed += 1;
            }
        }
        if changed > 0 {
            log::debug!("[fields] restored placeholders on {} element(s)", changed);
        }
    }
    scene.set_display(mode, record);
}

/// Column names available for binding.
pub fn available_fields(dataset: &Dataset) -> Vec<String> {
    dataset.headers.clone()
}

/// Fields the template references that neither the dataset nor the
/// built-ins provide.
pub fn missing_fields(template: &Template, dataset: &Dataset) -> Vec<String> {
    template
        .referenced_fields()
        .into_iter()
        .filter(|f| !dataset.has_column(f) && !BUILTIN_VARIABLES.contains(f))
        .map(str::to_string)
        .collect()
}
