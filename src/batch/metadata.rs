//! Batch metadata CSV and upload bundles.
//!
//! The metadata CSV repeats each record's columns plus the `filename` of the
//! artifact generated for it. The upload contract pairs it with the PDFs:
//!
//! | Field | Parts |
//! |-------|-------|
//! | `certificates` | one per artifact, named by its generated filename |
//! | `metadata` | `metadata.csv` |

use serde::Serialize;

use crate::data::Record;

/// Column appended to the dataset headers.
pub const FILENAME_COLUMN: &str = "filename";

/// Metadata rows for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MetadataCsv {
    /// Start a CSV with the dataset headers plus `filename`.
    pub fn new(dataset_headers: &[String]) -> Self {
        let mut headers = dataset_headers.to_vec();
        headers.push(FILENAME_COLUMN.to_string());
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, record: &Record, filename: &str) {
        let fields = &self.headers[..self.headers.len().saturating_sub(1)];
        let mut row: Vec<String> = fields
            .iter()
            .map(|h| record.get(h).unwrap_or("").to_string())
            .collect();
        row.push(filename.to_string());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the `filename` column, in row order.
    pub fn filenames(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.last().map(String::as_str))
            .collect()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_row(&mut out, &self.headers);
        for row in &self.rows {
            write_row(&mut out, row);
        }
        out
    }
}

fn write_row(out: &mut String, cells: &[String]) {
    let line: Vec<String> = cells.iter().map(|c| quote(c)).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn quote(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// One multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Parts for a batch upload request. Building a bundle sends nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadBundle {
    pub parts: Vec<UploadPart>,
}

impl UploadBundle {
    pub fn new<'a>(
        artifacts: impl IntoIterator<Item = (&'a str, &'a [u8], &'a str)>,
        metadata: &MetadataCsv,
    ) -> Self {
        let mut parts: Vec<UploadPart> = artifacts
            .into_iter()
            .map(|(filename, bytes, content_type)| UploadPart {
                field: "certificates".into(),
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            })
            .collect();
        parts.push(UploadPart {
            field: "metadata".into(),
            filename: "metadata.csv".into(),
            content_type: "text/csv".into(),
            bytes: metadata.to_csv().into_bytes(),
        });
        Self { parts }
    }

    /// Parts sent under `field`.
    pub fn field(&self, field: &str) -> impl Iterator<Item = &UploadPart> {
        self.parts.iter().filter(move |p| p.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_quotes_commas_and_quotes() {
        let mut csv = MetadataCsv::new(&["name".to_string(), "note".to_string()]);
        csv.push(
            &Record::from_pairs([("name", "Ada"), ("note", "said \"hi\", twice")]),
            "Ada.pdf",
        );
        csv.push(&Record::from_pairs([("name", "Bob")]), "Bob.pdf");
        assert_eq!(
            csv.to_csv(),
            "name,note,filename\nAda,\"said \"\"hi\"\", twice\",Ada.pdf\nBob,,Bob.pdf\n"
        );
        assert_eq!(csv.filenames(), vec!["Ada.pdf", "Bob.pdf"]);
    }

    #[test]
    fn test_bundle_parts() {
        let mut csv = MetadataCsv::new(&["name".to_string()]);
        csv.push(&Record::from_pairs([("name", "Ada")]), "Ada.pdf");
        let bundle = UploadBundle::new([("Ada.pdf", b"%PDF".as_slice(), "application/pdf")], &csv);

        assert_eq!(bundle.field("certificates").count(), 1);
        let meta: Vec<_> = bundle.field("metadata").collect();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].filename, "metadata.csv");
        assert_eq!(meta[0].bytes, b"name,filename\nAda,Ada.pdf\n".to_vec());
    }
}
