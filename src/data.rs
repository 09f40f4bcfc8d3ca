//! # Batch Data Loader
//!
//! Parses CSV text into an ordered list of field → value records.
//!
//! The format is deliberately simple: lines split on newline, cells split on
//! comma and trimmed. There is no quoting, so a cell cannot contain a comma.
//!
//! ```
//! use certforge::data::parse_csv;
//!
//! let data = parse_csv("name,course\nAda Lovelace,Algorithms\nGrace Hopper\n");
//! assert_eq!(data.headers, vec!["name", "course"]);
//! assert_eq!(data.records[0].get("course"), Some("Algorithms"));
//! // Missing trailing cells become empty strings
//! assert_eq!(data.records[1].get("course"), Some(""));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::CertforgeError;

/// One CSV row: column name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(HashMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered records plus the original header order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record's values in header order.
    pub fn row_values<'a>(&self, record: &'a Record) -> Vec<&'a str> {
        self.headers
            .iter()
            .map(|h| record.get(h).unwrap_or(""))
            .collect()
    }

    /// Record used for previews: the chosen index, else the first record.
    pub fn preview_record(&self, index: Option<usize>) -> Option<&Record> {
        index
            .and_then(|i| self.records.get(i))
            .or_else(|| self.records.first())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// Parse CSV text. Never fails: malformed rows are padded or truncated.
pub fn parse_csv(text: &str) -> Dataset {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Dataset::default();
    };

    let mut headers: Vec<String> = Vec::new();
    // Column positions that feed a header; duplicates keep the first column
    let mut columns: Vec<Option<usize>> = Vec::new();
    for cell in header_line.split(',') {
        let name = cell.trim().to_string();
        if headers.contains(&name) {
            log::warn!("[csv] duplicate header '{}' ignored", name);
            columns.push(None);
        } else {
            columns.push(Some(headers.len()));
            headers.push(name);
        }
    }

    let mut records = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() > columns.len() {
            log::warn!(
                "[csv] row {} has {} cells, expected {}; extra cells ignored",
                line_no + 1,
                cells.len(),
                columns.len()
            );
        }

        let mut record = Record::new();
        for (pos, slot) in columns.iter().enumerate() {
            if let Some(h) = slot {
                let value = cells.get(pos).copied().unwrap_or("");
                record.insert(headers[*h].clone(), value);
            }
        }
        records.push(record);
    }

    log::debug!(
        "[csv] parsed {} record(s) with {} column(s)",
        records.len(),
        headers.len()
    );
    Dataset { headers, records }
}

/// Read and parse a CSV file.
pub fn load_csv(path: &Path) -> Result<Dataset, CertforgeError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CertforgeError::Csv(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(parse_csv(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_parse() {
        let d = parse_csv("name,course\nAda Lovelace,Algorithms\n");
        assert_eq!(d.headers, vec!["name", "course"]);
        assert_eq!(d.len(), 1);
        assert_eq!(d.records[0].get("name"), Some("Ada Lovelace"));
        assert_eq!(d.records[0].get("course"), Some("Algorithms"));
    }

    #[test]
    fn test_trims_cells_and_skips_blank_lines() {
        let d = parse_csv("\n\n  name , score \n\n  Ada ,  99 \n   \nGrace,100");
        assert_eq!(d.headers, vec!["name", "score"]);
        assert_eq!(d.len(), 2);
        assert_eq!(d.records[0].get("score"), Some("99"));
        assert_eq!(d.records[1].get("name"), Some("Grace"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let d = parse_csv("name,course\r\nAda,Math\r\n");
        assert_eq!(d.headers, vec!["name", "course"]);
        assert_eq!(d.records[0].get("course"), Some("Math"));
    }

    #[test]
    fn test_short_rows_pad_with_empty() {
        let d = parse_csv("a,b,c\n1\n1,2\n");
        assert_eq!(d.row_values(&d.records[0]), vec!["1", "", ""]);
        assert_eq!(d.row_values(&d.records[1]), vec!["1", "2", ""]);
    }

    #[test]
    fn test_long_rows_truncate() {
        let d = parse_csv("a,b\n1,2,3,4\n");
        assert_eq!(d.records[0].len(), 2);
        assert_eq!(d.row_values(&d.records[0]), vec!["1", "2"]);
    }

    #[test]
    fn test_no_quote_support() {
        // Quotes are kept verbatim and commas still split
        let d = parse_csv("name,city\n\"Lovelace, Ada\",London\n");
        assert_eq!(d.records[0].get("name"), Some("\"Lovelace"));
        assert_eq!(d.records[0].get("city"), Some("Ada\""));
    }

    #[test]
    fn test_duplicate_header_keeps_first() {
        let d = parse_csv("name,name,x\nfirst,second,3\n");
        assert_eq!(d.headers, vec!["name", "x"]);
        assert_eq!(d.records[0].get("name"), Some("first"));
        assert_eq!(d.records[0].get("x"), Some("3"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_csv(""), Dataset::default());
        assert_eq!(parse_csv("\n \n"), Dataset::default());
        let headers_only = parse_csv("name,course");
        assert_eq!(headers_only.headers.len(), 2);
        assert!(headers_only.is_empty());
    }

    #[test]
    fn test_preview_record_falls_back_to_first() {
        let d = parse_csv("n\na\nb\n");
        assert_eq!(d.preview_record(Some(1)).unwrap().get("n"), Some("b"));
        assert_eq!(d.preview_record(Some(9)).unwrap().get("n"), Some("a"));
        assert_eq!(d.preview_record(None).unwrap().get("n"), Some("a"));
    }
}
