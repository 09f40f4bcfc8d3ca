//! # certforge - Certificate Design and Batch Generation
//!
//! certforge loads certificate templates designed in millimeters, lets an
//! editor manipulate them on a pixel canvas, and renders them to PNG and PDF,
//! one certificate per CSV record.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use certforge::{
//!     batch::{BatchGenerator, BatchOptions},
//!     config::RenderConfig,
//!     data::load_csv,
//!     render::ImageStore,
//!     scene::Scene,
//!     template::Template,
//! };
//!
//! # async fn example() -> Result<(), certforge::CertforgeError> {
//! let template = Template::from_json(&std::fs::read_to_string("award.json")?)?;
//! let dataset = load_csv(std::path::Path::new("students.csv"))?;
//!
//! let config = RenderConfig::default();
//! let mut scene = Scene::from_template(&template, &config)?;
//! let mut generator = BatchGenerator::new(config, Arc::new(ImageStore::new()?));
//! let report = generator
//!     .generate(&mut scene, &dataset, &BatchOptions::default())
//!     .await?;
//!
//! for artifact in &report.artifacts {
//!     std::fs::write(&artifact.filename, &artifact.bytes)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Portable template format (mm) and element types |
//! | [`geometry`] | Points, rectangles, affine transforms, mm ↔ px conversion |
//! | [`scene`] | Editable canvas model: selection, transforms, z-order |
//! | [`history`] | Undo/redo snapshots |
//! | [`fields`] | Placeholder and actual-data display of dynamic text |
//! | [`data`] | CSV records |
//! | [`render`] | Offscreen stage, rasterizer, PNG and PDF output |
//! | [`batch`] | Per-record generation, file names, metadata CSV |
//! | [`credit`] | Credit gate for billable operations |
//! | [`server`] | HTTP API |
//! | [`config`] | Page formats and engine settings |
//! | [`error`] | Error types |

pub mod batch;
pub mod config;
pub mod credit;
pub mod data;
pub mod error;
pub mod fields;
pub mod geometry;
pub mod history;
pub mod render;
pub mod scene;
pub mod server;
pub mod template;

// Re-exports for convenience
pub use config::{EngineConfig, RenderConfig};
pub use error::CertforgeError;
pub use scene::Scene;
pub use template::Template;
