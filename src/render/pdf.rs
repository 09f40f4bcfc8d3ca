//! PDF composition.
//!
//! Each page is one raster embedded as a Flate-compressed RGB image
//! XObject, scaled to fill a MediaBox equal to the template's page size.
//!
//! ```text
//! Catalog ─▶ Pages ─▶ Page ─┬─ MediaBox [0 0 w_pt h_pt]
//!                           ├─ Resources /XObject /Im0 ─▶ Image (FlateDecode)
//!                           └─ Contents: q w 0 0 h 0 0 cm /Im0 Do Q
//! ```

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::io::Write;
use thiserror::Error;

use crate::config::{Orientation, PageSize};

/// Errors that can occur while composing a PDF.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF structure error: {0}")]
    Lopdf(#[from] lopdf::Error),

    #[error("PDF write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page: {0}")]
    InvalidPage(String),

    #[error("Document has no pages")]
    NoPages,
}

/// Builds a multi-page PDF from rasters.
pub struct PdfComposer {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    title: String,
}

impl PdfComposer {
    pub fn new(title: impl Into<String>) -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
            title: title.into(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page showing `raster` stretched over `page`.
    pub fn add_page(&mut self, raster: &RgbaImage, page: PageSize) -> Result<(), PdfError> {
        if !page.is_valid() {
            return Err(PdfError::InvalidPage(format!(
                "page size {}x{} mm",
                page.width_mm, page.height_mm
            )));
        }
        let (w, h) = raster.dimensions();
        if w == 0 || h == 0 {
            return Err(PdfError::InvalidPage("empty raster".into()));
        }

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&flatten_rgb(raster))?,
        );
        let image_id = self.document.add_object(image);

        let (width_pt, height_pt) = (page.width_pt() as f32, page.height_pt() as f32);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_stream = Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            deflate(&content.encode()?)?,
        );
        let content_id = self.document.add_object(content_stream);

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.0f32.into(), 0.0f32.into(), width_pt.into(), height_pt.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>, PdfError> {
        if self.page_ids.is_empty() {
            return Err(PdfError::NoPages);
        }
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let info_id = self.document.add_object(dictionary! {
            "Title" => Object::string_literal(self.title.as_str()),
            "Producer" => Object::string_literal(concat!("certforge ", env!("CARGO_PKG_VERSION"))),
        });
        self.document.trailer.set("Info", info_id);

        let mut out = Vec::new();
        self.document.save_to(&mut out)?;
        log::debug!(
            "[pdf] wrote '{}': {} page(s), {} bytes",
            self.title,
            self.page_ids.len(),
            out.len()
        );
        Ok(out)
    }
}

/// Single-page PDF for one raster.
pub fn to_pdf(
    raster: &RgbaImage,
    page: PageSize,
    orientation: Orientation,
    title: &str,
) -> Result<Vec<u8>, PdfError> {
    let mut composer = PdfComposer::new(title);
    composer.add_page(raster, page.oriented(orientation))?;
    composer.finish()
}

/// Drop alpha by compositing over white.
fn flatten_rgb(raster: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(raster.width() as usize * raster.height() as usize * 3);
    for px in raster.pixels() {
        let a = px[3] as u32;
        for c in 0..3 {
            rgb.push(((px[c] as u32 * a + 255 * (255 - a)) / 255) as u8);
        }
    }
    rgb
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageFormat;
    use image::Rgba;

    fn page_box(doc: &Document, page_id: ObjectId) -> Vec<f32> {
        doc.get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    }

    #[test]
    fn test_media_box_is_page_size_in_points() {
        let raster = RgbaImage::from_pixel(20, 14, Rgba([255, 0, 0, 255]));
        let page = PageFormat::A4.size(Orientation::Landscape);
        let bytes = to_pdf(&raster, page, Orientation::Landscape, "Award").unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let mb = page_box(&doc, pages[&1]);
        assert!((mb[2] - 841.89).abs() < 0.01, "width {}", mb[2]);
        assert!((mb[3] - 595.28).abs() < 0.01, "height {}", mb[3]);
    }

    #[test]
    fn test_info_title() {
        let raster = RgbaImage::new(2, 2);
        let bytes = to_pdf(&raster, PageSize::new(100.0, 50.0), Orientation::Landscape, "Award").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_object(info_id).unwrap().as_dict().unwrap();
        assert_eq!(info.get(b"Title").unwrap().as_str().unwrap(), b"Award");
    }

    #[test]
    fn test_multi_page() {
        let mut composer = PdfComposer::new("Batch");
        let page = PageFormat::A4.size(Orientation::Portrait);
        for _ in 0..3 {
            composer.add_page(&RgbaImage::new(4, 6), page).unwrap();
        }
        assert_eq!(composer.page_count(), 3);
        let doc = Document::load_mem(&composer.finish().unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(matches!(PdfComposer::new("x").finish(), Err(PdfError::NoPages)));
        let mut composer = PdfComposer::new("x");
        assert!(composer
            .add_page(&RgbaImage::new(2, 2), PageSize::new(0.0, 10.0))
            .is_err());
    }

    #[test]
    fn test_flatten_over_white() {
        let raster = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten_rgb(&raster), vec![255, 255, 255]);
    }
}
