//! # Error Types
//!
//! This module defines error types used throughout the certforge library.
//! Subsystems with their own failure domain ([`RenderError`], [`PdfError`])
//! convert into [`CertforgeError`] with `?`.

use thiserror::Error;

use crate::credit::CreditOperation;
use crate::render::pdf::PdfError;
use crate::render::RenderError;

/// Main error type for certforge operations
#[derive(Debug, Error)]
pub enum CertforgeError {
    /// Template could not be loaded, validated or edited
    #[error("Template error: {0}")]
    Template(String),

    /// CSV input could not be used
    #[error("CSV error: {0}")]
    Csv(String),

    /// Rasterization failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// PDF composition failed
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Image fetch or decode error
    #[error("Image error: {0}")]
    Image(String),

    /// The credit gate refused a billable operation
    #[error("Insufficient credits for {operation}: cost {cost}, balance {balance}")]
    CreditDenied {
        operation: CreditOperation,
        cost: f64,
        balance: f64,
    },

    /// The credit gate itself failed
    #[error("Credit gate error: {0}")]
    CreditGate(String),

    /// A batch run was cancelled before producing anything usable
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport-level errors (binding the HTTP listener)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
