//! # Batch Generator
//!
//! Renders one certificate per record, strictly in record order.
//!
//! ```text
//! credit check ─▶ for each record:
//!                   cancelled? ──yes──▶ stop (artifacts so far)
//!                   substitute ─▶ commit_frame().await ─▶ rasterize ─▶ restore
//!                   encode ─▶ name ─▶ metadata row ─▶ progress(done, total)
//!                ─▶ confirm credits for the records that rendered
//! ```
//!
//! A record that fails to render or encode is reported in
//! [`BatchReport::failures`] and the batch moves on.

pub mod filename;
pub mod metadata;

pub use filename::{FilenameAllocator, FilenamePattern, sanitize};
pub use metadata::{MetadataCsv, UploadBundle, UploadPart};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{BatchConfig, RenderConfig};
use crate::credit::{CreditGate, CreditOperation, UnmeteredGate, ensure_allowed};
use crate::data::Dataset;
use crate::error::CertforgeError;
use crate::render::pdf::PdfComposer;
use crate::render::{
    ImageSource, RasterImage, Rasterizer, SoftwareRasterizer, Stage, encode_png, render_stage,
};
use crate::scene::Scene;

/// One file per record, or every record as a page of one PDF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    #[default]
    PerRecord,
    Merged,
}

/// Output encoding of per-record artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Pdf,
    Png,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Png => "image/png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
    pub filename_pattern: String,
    pub mode: BatchMode,
    pub kind: ArtifactKind,
    pub max_value_len: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            filename_pattern: config.filename_pattern.clone(),
            mode: BatchMode::PerRecord,
            kind: ArtifactKind::Pdf,
            max_value_len: config.max_value_len,
        }
    }
}

/// A generated file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// 1-based record position; `None` for a merged document.
    pub record_index: Option<usize>,
    pub kind: ArtifactKind,
}

/// A record that produced no artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub record_index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub artifacts: Vec<BatchArtifact>,
    pub failures: Vec<BatchFailure>,
    /// Skipped elements (failed images), prefixed with the record index.
    pub warnings: Vec<String>,
    pub metadata: MetadataCsv,
    pub outcome: BatchOutcome,
    /// Records in the dataset.
    pub total: usize,
    /// Records that rendered.
    pub rendered: usize,
}

impl BatchReport {
    /// Parts for the batch upload contract.
    pub fn upload_bundle(&self) -> UploadBundle {
        UploadBundle::new(
            self.artifacts
                .iter()
                .map(|a| (a.filename.as_str(), a.bytes.as_slice(), a.kind.content_type())),
            &self.metadata,
        )
    }
}

/// Credit-check an upload of `report`'s artifacts and build its parts.
///
/// Confirming the `BatchUpload` charge is up to the caller once the
/// transport succeeded.
pub async fn prepare_upload(
    report: &BatchReport,
    gate: &dyn CreditGate,
) -> Result<UploadBundle, CertforgeError> {
    ensure_allowed(gate, CreditOperation::BatchUpload, report.artifacts.len()).await?;
    Ok(report.upload_bundle())
}

/// Cooperative cancellation, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Called with `(done, total)` after each record.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Runs batches against one image source, credit gate and rasterizer.
pub struct BatchGenerator {
    render: RenderConfig,
    images: Arc<dyn ImageSource>,
    gate: Arc<dyn CreditGate>,
    rasterizer: Box<dyn Rasterizer>,
    cancel: CancelToken,
    progress: Option<ProgressFn>,
    builtins: Option<HashMap<String, String>>,
}

impl BatchGenerator {
    pub fn new(render: RenderConfig, images: Arc<dyn ImageSource>) -> Self {
        Self {
            render,
            images,
            gate: Arc::new(UnmeteredGate),
            rasterizer: Box::new(SoftwareRasterizer::default()),
            cancel: CancelToken::new(),
            progress: None,
            builtins: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn CreditGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fix the built-in date variables instead of reading the clock.
    pub fn with_builtins(mut self, builtins: HashMap<String, String>) -> Self {
        self.builtins = Some(builtins);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Render every record of `dataset` from `scene`.
    ///
    /// Fails up front when the dataset is empty or the credit gate refuses.
    /// Otherwise returns a report, even if individual records failed.
    pub async fn generate(
        &mut self,
        scene: &mut Scene,
        dataset: &Dataset,
        options: &BatchOptions,
    ) -> Result<BatchReport, CertforgeError> {
        let total = dataset.len();
        if total == 0 {
            return Err(CertforgeError::Csv("batch needs at least one record".into()));
        }
        ensure_allowed(self.gate.as_ref(), CreditOperation::BatchGenerate, total).await?;

        let export = scene.begin_export();
        let mut stage = Stage::from_scene(&export, &self.render, self.images.clone());
        if let Some(builtins) = &self.builtins {
            stage = stage.with_builtins(builtins.clone());
        }
        let page = stage.page_size();
        let title = stage.name().to_string();

        let pattern = FilenamePattern::new(
            &options.filename_pattern,
            options.max_value_len,
            options.kind.extension(),
        );
        let mut names = FilenameAllocator::new();
        let mut metadata = MetadataCsv::new(&dataset.headers);
        let mut merged = (options.mode == BatchMode::Merged).then(|| PdfComposer::new(title.clone()));
        let mut merged_records = Vec::new();

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();
        let mut outcome = BatchOutcome::Completed;

        log::info!(
            "[batch] generating {} record(s) from '{}' ({:?})",
            total,
            title,
            options.mode
        );

        for (i, record) in dataset.records.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("[batch] cancelled after {} of {} record(s)", i, total);
                outcome = BatchOutcome::Cancelled;
                break;
            }
            let index = i + 1;

            let rendered = {
                let guard = stage.substitute(record);
                render_stage(&guard, self.rasterizer.as_mut()).await
            };

            let result = match rendered {
                Ok(output) => {
                    warnings.extend(
                        output
                            .warnings
                            .into_iter()
                            .map(|w| format!("record {}: {}", index, w)),
                    );
                    match merged.as_mut() {
                        Some(composer) => composer
                            .add_page(&output.image, page)
                            .map(|_| merged_records.push(record))
                            .map_err(CertforgeError::from),
                        None => encode(&output.image, options.kind, page, &title).map(|bytes| {
                            let filename = names.claim(pattern.render(record, index), index);
                            metadata.push(record, &filename);
                            artifacts.push(BatchArtifact {
                                filename,
                                bytes,
                                record_index: Some(index),
                                kind: options.kind,
                            });
                        }),
                    }
                }
                Err(e) => Err(e.into()),
            };

            if let Err(e) = result {
                log::warn!("[batch] record {} failed: {}", index, e);
                failures.push(BatchFailure {
                    record_index: index,
                    error: e.to_string(),
                });
            }

            if let Some(progress) = &self.progress {
                progress(index, total);
            }
        }

        let mut rendered = artifacts.len();
        if let Some(composer) = merged
            && composer.page_count() > 0
        {
            rendered = composer.page_count();
            let filename = merged_filename(&title, options.max_value_len);
            for record in merged_records {
                metadata.push(record, &filename);
            }
            artifacts.push(BatchArtifact {
                filename,
                bytes: composer.finish()?,
                record_index: None,
                kind: ArtifactKind::Pdf,
            });
        }

        if rendered > 0 {
            self.gate
                .confirm(CreditOperation::BatchGenerate, rendered)
                .await?;
        }

        log::info!(
            "[batch] done: {} rendered, {} failed, {:?}",
            rendered,
            failures.len(),
            outcome
        );
        Ok(BatchReport {
            artifacts,
            failures,
            warnings,
            metadata,
            outcome,
            total,
            rendered,
        })
    }
}

fn encode(
    image: &RasterImage,
    kind: ArtifactKind,
    page: crate::config::PageSize,
    title: &str,
) -> Result<Vec<u8>, CertforgeError> {
    match kind {
        ArtifactKind::Pdf => {
            let mut composer = PdfComposer::new(title);
            composer.add_page(image, page)?;
            Ok(composer.finish()?)
        }
        ArtifactKind::Png => Ok(encode_png(image)?),
    }
}

fn merged_filename(title: &str, max_len: usize) -> String {
    let stem = sanitize(title, max_len);
    if stem.is_empty() {
        "certificates.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

/// Render a batch with the default rasterizer and no credit metering.
pub async fn generate_batch(
    scene: &mut Scene,
    dataset: &Dataset,
    options: &BatchOptions,
    render: &RenderConfig,
    images: Arc<dyn ImageSource>,
) -> Result<BatchReport, CertforgeError> {
    BatchGenerator::new(render.clone(), images)
        .generate(scene, dataset, options)
        .await
}
