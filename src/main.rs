//! # certforge CLI
//!
//! Command-line interface for certificate rendering and batch generation.
//!
//! ## Usage
//!
//! ```bash
//! # Render a template with the first CSV record to PNG
//! certforge render award.json --record-csv students.csv --png award.png
//!
//! # One PDF per record into out/
//! certforge batch award.json students.csv --out out/
//!
//! # All records as pages of one PDF, with a credit budget
//! certforge batch award.json students.csv --out out/ --merged --credits 100
//!
//! # Show CSV columns and which template fields they cover
//! certforge fields students.csv --template award.json
//!
//! # Run the HTTP API
//! certforge serve --listen 0.0.0.0:8080
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use certforge::{
    CertforgeError, EngineConfig, Scene, Template,
    batch::{ArtifactKind, BatchGenerator, BatchMode, BatchOptions, BatchOutcome},
    credit::{CreditGate, LedgerGate, UnmeteredGate},
    data::load_csv,
    fields::{available_fields, missing_fields},
    render::{self, ImageStore, SoftwareRasterizer, pdf::to_pdf, text::FontBook},
    server::{self, ServerConfig},
};

/// certforge - Certificate template rendering and batch generation
#[derive(Parser, Debug)]
#[command(name = "certforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the rasterization pixel ratio
    #[arg(long, global = true)]
    pixel_ratio: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render one certificate to PNG or PDF
    Render {
        /// Template JSON file
        template: PathBuf,

        /// CSV file supplying the record
        #[arg(long, value_name = "FILE")]
        record_csv: Option<PathBuf>,

        /// 1-based record number in the CSV
        #[arg(long, default_value = "1")]
        row: usize,

        /// Write a PNG
        #[arg(long, value_name = "FILE", required_unless_present = "pdf")]
        png: Option<PathBuf>,

        /// Write a PDF
        #[arg(long, value_name = "FILE")]
        pdf: Option<PathBuf>,
    },

    /// Render one certificate per CSV record
    Batch {
        /// Template JSON file
        template: PathBuf,

        /// CSV data file
        data: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Filename pattern, e.g. "certificate_{{name}}_{{index}}"
        #[arg(long)]
        pattern: Option<String>,

        /// Write a single multi-page PDF
        #[arg(long)]
        merged: bool,

        /// Write PNGs instead of PDFs
        #[arg(long, conflicts_with = "merged")]
        png: bool,

        /// Credit balance; one credit per certificate
        #[arg(long)]
        credits: Option<f64>,
    },

    /// List CSV columns and record count
    Fields {
        /// CSV data file
        data: PathBuf,

        /// Also report template fields the CSV does not provide
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Let templates reference http(s) images
        #[arg(long)]
        allow_remote_images: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CertforgeError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ratio) = cli.pixel_ratio {
        config.render.pixel_ratio = ratio;
    }

    match cli.command {
        Commands::Render {
            template,
            record_csv,
            row,
            png,
            pdf,
        } => {
            let template = load_template(&template)?;
            let record = match record_csv {
                Some(path) => {
                    let dataset = load_csv(&path)?;
                    let record = dataset
                        .records
                        .get(row.saturating_sub(1))
                        .cloned()
                        .ok_or_else(|| {
                            CertforgeError::Csv(format!(
                                "row {} out of range ({} record(s))",
                                row,
                                dataset.len()
                            ))
                        })?;
                    Some(record)
                }
                None => None,
            };

            let mut scene = Scene::from_template(&template, &config.render)?;
            let mut rasterizer = rasterizer(&config)?;
            let output = render::render(
                &mut scene,
                record.as_ref(),
                &mut rasterizer,
                Arc::new(ImageStore::new()?),
                &config.render,
            )
            .await?;
            for warning in &output.warnings {
                eprintln!("warning: {}", warning);
            }

            if let Some(path) = png {
                std::fs::write(&path, output.png()?)?;
                println!("Saved {}", path.display());
            }
            if let Some(path) = pdf {
                let bytes = to_pdf(
                    &output.image,
                    template.page_size(),
                    template.orientation,
                    &template.name,
                )?;
                std::fs::write(&path, bytes)?;
                println!("Saved {}", path.display());
            }
            Ok(())
        }

        Commands::Batch {
            template,
            data,
            out,
            pattern,
            merged,
            png,
            credits,
        } => {
            let template = load_template(&template)?;
            let dataset = load_csv(&data)?;

            let mut options = BatchOptions::from_config(&config.batch);
            if let Some(pattern) = pattern {
                options.filename_pattern = pattern;
            }
            if merged {
                options.mode = BatchMode::Merged;
            }
            if png {
                options.kind = ArtifactKind::Png;
            }

            let gate: Arc<dyn CreditGate> = match credits {
                Some(balance) => Arc::new(LedgerGate::new(balance)),
                None => Arc::new(UnmeteredGate),
            };

            let mut scene = Scene::from_template(&template, &config.render)?;
            let mut generator =
                BatchGenerator::new(config.render.clone(), Arc::new(ImageStore::new()?))
                    .with_gate(gate)
                    .with_rasterizer(Box::new(rasterizer(&config)?))
                    .on_progress(Arc::new(|done: usize, total: usize| {
                        eprintln!("[{}/{}]", done, total);
                    }));

            // Ctrl-C stops after the record in progress
            let cancel = generator.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let report = generator.generate(&mut scene, &dataset, &options).await?;

            std::fs::create_dir_all(&out)?;
            for artifact in &report.artifacts {
                std::fs::write(out.join(&artifact.filename), &artifact.bytes)?;
            }
            std::fs::write(out.join("metadata.csv"), report.metadata.to_csv())?;

            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            for failure in &report.failures {
                eprintln!("record {} failed: {}", failure.record_index, failure.error);
            }
            println!(
                "Wrote {} file(s) for {} of {} record(s) to {}",
                report.artifacts.len(),
                report.rendered,
                report.total,
                out.display()
            );

            if report.outcome == BatchOutcome::Cancelled {
                return Err(CertforgeError::Cancelled);
            }
            Ok(())
        }

        Commands::Fields { data, template } => {
            let dataset = load_csv(&data)?;
            println!("{} record(s)", dataset.len());
            println!("Columns:");
            for name in available_fields(&dataset) {
                println!("  {}", name);
            }
            if let Some(path) = template {
                let template = load_template(&path)?;
                let missing = missing_fields(&template, &dataset);
                if missing.is_empty() {
                    println!("All template fields are covered.");
                } else {
                    println!("Missing from CSV:");
                    for name in missing {
                        println!("  {}", name);
                    }
                }
            }
            Ok(())
        }

        Commands::Serve {
            listen,
            allow_remote_images,
        } => {
            let server_config = ServerConfig {
                listen_addr: listen,
                engine: config,
                allow_remote_images,
            };
            server::serve(server_config, Arc::new(UnmeteredGate)).await
        }
    }
}

fn load_template(path: &Path) -> Result<Template, CertforgeError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CertforgeError::Template(format!("failed to read {}: {}", path.display(), e))
    })?;
    Template::from_json(&text)
}

fn rasterizer(config: &EngineConfig) -> Result<SoftwareRasterizer, CertforgeError> {
    let fonts = FontBook::from_sources(&config.render.fonts)?;
    Ok(SoftwareRasterizer::new(Arc::new(fonts)))
}
