//! Artifact file names.
//!
//! A pattern like `certificate_{{name}}_{{index}}` keeps its literal parts
//! verbatim and substitutes each `{{field}}` with the sanitized record value.
//! `{{index}}` is the 1-based record position.
//!
//! ```
//! use certforge::batch::filename::{FilenamePattern, sanitize};
//! use certforge::data::Record;
//!
//! assert_eq!(sanitize("  Dr. Ada   Lovelace! ", 50), "Dr_Ada_Lovelace");
//!
//! let pattern = FilenamePattern::new("certificate_{{name}}_{{index}}", 50, "pdf");
//! let record = Record::from_pairs([("name", "Ada Lovelace")]);
//! assert_eq!(pattern.render(&record, 1), "certificate_Ada_Lovelace_1.pdf");
//! ```

use std::collections::HashSet;

use crate::data::Record;
use crate::template::{TextContent, Token};

/// Name of the synthesized record position field.
pub const INDEX_FIELD: &str = "index";

/// Make a value safe for a file name.
///
/// Whitespace runs become one underscore, everything outside
/// `[A-Za-z0-9_-]` is dropped and the result is cut to `max_len`
/// characters. Never fails; unusable input gives an empty string.
pub fn sanitize(value: &str, max_len: usize) -> String {
    let mut out = String::new();
    let mut in_space = false;
    for ch in value.trim().chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        }
    }
    out.chars().take(max_len).collect()
}

/// A parsed filename pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenamePattern {
    content: TextContent,
    max_value_len: usize,
    /// Appended when the pattern carries no extension of its own.
    extension: Option<String>,
}

impl FilenamePattern {
    pub fn new(pattern: &str, max_value_len: usize, default_extension: &str) -> Self {
        let content = TextContent::parse(pattern.trim());
        let has_extension = content
            .tokens()
            .last()
            .is_some_and(|t| matches!(t, Token::Literal(s) if has_extension(s)));
        Self {
            content,
            max_value_len,
            extension: (!has_extension).then(|| default_extension.to_string()),
        }
    }

    /// Whether the pattern numbers its output.
    pub fn has_index(&self) -> bool {
        self.content.references(INDEX_FIELD)
    }

    /// File name for the record at 1-based `index`.
    pub fn render(&self, record: &Record, index: usize) -> String {
        let stem = self.content.render_with(|field| {
            if field == INDEX_FIELD {
                index.to_string()
            } else {
                sanitize(record.get(field).unwrap_or(""), self.max_value_len)
            }
        });
        match &self.extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        }
    }
}

fn has_extension(literal: &str) -> bool {
    literal
        .rsplit_once('.')
        .is_some_and(|(_, ext)| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Hands out names that are unique within one batch.
#[derive(Debug, Default)]
pub struct FilenameAllocator {
    used: HashSet<String>,
}

impl FilenameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`. A taken name gets `_<index>` before the extension,
    /// then `_<index>_<n>` until the result is unused.
    pub fn claim(&mut self, name: String, index: usize) -> String {
        if self.used.insert(name.clone()) {
            return name;
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (name.as_str(), None),
        };
        let with_suffix = |suffix: String| match ext {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
            None => format!("{}_{}", stem, suffix),
        };

        let mut unique = with_suffix(index.to_string());
        let mut n = 2;
        while self.used.contains(&unique) {
            unique = with_suffix(format!("{}_{}", index, n));
            n += 1;
        }
        log::debug!("[batch] duplicate file name '{}', using '{}'", name, unique);
        self.used.insert(unique.clone());
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_rules() {
        assert_eq!(sanitize("Ada Lovelace", 50), "Ada_Lovelace");
        assert_eq!(sanitize("O'Brien, Jr.", 50), "OBrien_Jr");
        assert_eq!(sanitize("tab\tand\n\nnewline", 50), "tab_and_newline");
        assert_eq!(sanitize("Zoë", 50), "Zo");
        assert_eq!(sanitize("!!!", 50), "");
        assert_eq!(sanitize("", 50), "");
        assert_eq!(sanitize(&"x".repeat(80), 50).len(), 50);
    }

    #[test]
    fn test_literal_parts_kept() {
        let p = FilenamePattern::new("Award - {{name}}", 50, "pdf");
        let r = Record::from_pairs([("name", "Grace Hopper")]);
        assert_eq!(p.render(&r, 3), "Award - Grace_Hopper.pdf");
    }

    #[test]
    fn test_explicit_extension_not_doubled() {
        let p = FilenamePattern::new("{{name}}.pdf", 50, "pdf");
        let r = Record::from_pairs([("name", "Ada")]);
        assert_eq!(p.render(&r, 1), "Ada.pdf");
        assert!(!p.has_index());
    }

    #[test]
    fn test_missing_column_is_empty() {
        let p = FilenamePattern::new("cert_{{grade}}_{{index}}", 50, "png");
        assert_eq!(p.render(&Record::new(), 7), "cert__7.png");
    }

    #[test]
    fn test_allocator_suffixes_duplicates() {
        let mut names = FilenameAllocator::new();
        assert_eq!(names.claim("Ada.pdf".into(), 1), "Ada.pdf");
        assert_eq!(names.claim("Ada.pdf".into(), 2), "Ada_2.pdf");
        assert_eq!(names.claim("Bob.pdf".into(), 3), "Bob.pdf");
    }

    #[test]
    fn test_allocator_skips_suffix_already_taken() {
        let mut names = FilenameAllocator::new();
        assert_eq!(names.claim("X.pdf".into(), 1), "X.pdf");
        assert_eq!(names.claim("X_3.pdf".into(), 2), "X_3.pdf");
        assert_eq!(names.claim("X.pdf".into(), 3), "X_3_2.pdf");
        assert_eq!(names.claim("X.pdf".into(), 3), "X_3_3.pdf");
        assert_eq!(names.claim("notes".into(), 4), "notes");
        assert_eq!(names.claim("notes".into(), 5), "notes_5");
    }
}
