//! Error types for the receipt-ingredients library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReceiptError`] — **Setup**: something went wrong before a pipeline
//!   invocation could start (the upload could not be staged, no LLM provider
//!   is configured, the builder was given nonsense). Returned as
//!   `Err(ReceiptError)` from the builder and staging functions.
//!
//! * [`StageError`] — **Stage**: one step of an analysis invocation failed
//!   (OCR, classifier call, response parsing, validation). These never escape
//!   [`crate::analyze::ReceiptAnalyzer::analyze`]; they are mapped to an
//!   [`ErrorCode`] and folded into [`crate::output::AnalysisResult::Failure`].
//!
//! Collaborator failures ([`OcrError`], [`ClassifierError`]) and the
//! structural check on the model output ([`ValidationError`]) are wrapped by
//! the matching `StageError` variant so the stage that failed is never lost.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Public code returned for every failure that is not a missing upload.
pub const EXTERNAL_ANALYSIS_ERROR: &str = "RECEIPT_ANALYSIS_ERROR";

/// Message returned when an invocation has no usable receipt image.
pub const NO_FILE_MESSAGE: &str = "No receipt image provided";

// ── Error codes ──────────────────────────────────────────────────────────

/// Internal, stage-specific error code.
///
/// Every code except [`ErrorCode::NoFile`] collapses to
/// [`EXTERNAL_ANALYSIS_ERROR`] in the caller-facing response; the detailed
/// code only shows up in logs and in [`crate::output::AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No image attached, or the attached path does not exist.
    NoFile,
    /// The OCR session could not be started (missing language data, engine absent).
    OcrInitFailure,
    /// The OCR session started but recognising the image failed.
    OcrExtractionFailure,
    /// The classifier call itself failed (network, auth, quota).
    ClassifierCallFailure,
    /// The classifier answered with something that is not JSON.
    ResponseParseFailure,
    /// The classifier answered with JSON of the wrong shape.
    ResponseNotArray,
    /// Deleting the uploaded image failed. Logged only, never returned.
    CleanupFailure,
}

impl ErrorCode {
    /// Stable machine-readable name of the internal code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoFile => "NO_FILE",
            ErrorCode::OcrInitFailure => "OCR_INIT_FAILURE",
            ErrorCode::OcrExtractionFailure => "OCR_EXTRACTION_FAILURE",
            ErrorCode::ClassifierCallFailure => "CLASSIFIER_CALL_FAILURE",
            ErrorCode::ResponseParseFailure => "RESPONSE_PARSE_FAILURE",
            ErrorCode::ResponseNotArray => "RESPONSE_NOT_ARRAY",
            ErrorCode::CleanupFailure => "CLEANUP_FAILURE",
        }
    }

    /// Code exposed to callers of the public response.
    pub fn external(self) -> &'static str {
        match self {
            ErrorCode::NoFile => "NO_FILE",
            _ => EXTERNAL_ANALYSIS_ERROR,
        }
    }

    /// `true` when the fault lies with the caller's input rather than the server.
    pub fn is_client_fault(self) -> bool {
        matches!(self, ErrorCode::NoFile)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Setup errors ─────────────────────────────────────────────────────────

/// Errors raised before an analysis invocation starts.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input staging ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Receipt image not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input bytes are not an image format we recognise.
    #[error("'{path}' is not a supported image (PNG or JPEG expected)")]
    NotAnImage { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Could not create the invocation-scoped copy of the upload.
    #[error("Failed to stage upload '{path}': {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Collaborators ─────────────────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A collaborator failed its health check.
    #[error("{component} health check failed: {detail}")]
    Unhealthy {
        component: &'static str,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// ── Stage errors ─────────────────────────────────────────────────────────

/// A failure inside one analysis invocation.
///
/// Each variant corresponds to exactly one [`ErrorCode`]; see
/// [`StageError::code`].
#[derive(Debug, Error)]
pub enum StageError {
    /// No image attached to the invocation.
    #[error("{}", NO_FILE_MESSAGE)]
    NoFile,

    #[error("OCR initialisation failed for '{languages}': {source}")]
    OcrInit {
        languages: String,
        #[source]
        source: OcrError,
    },

    #[error("OCR extraction failed for '{path}': {source}")]
    OcrExtraction {
        path: PathBuf,
        #[source]
        source: OcrError,
    },

    #[error(transparent)]
    ClassifierCall(#[from] ClassifierError),

    /// Parse failure of the trimmed classifier output.
    #[error("Classifier response is not valid JSON: {source}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    ResponseNotArray(#[from] ValidationError),
}

impl StageError {
    /// The internal error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            StageError::NoFile => ErrorCode::NoFile,
            StageError::OcrInit { .. } => ErrorCode::OcrInitFailure,
            StageError::OcrExtraction { .. } => ErrorCode::OcrExtractionFailure,
            StageError::ClassifierCall(_) => ErrorCode::ClassifierCallFailure,
            StageError::ResponseParse { .. } => ErrorCode::ResponseParseFailure,
            StageError::ResponseNotArray(_) => ErrorCode::ResponseNotArray,
        }
    }
}

// ── Collaborator errors ──────────────────────────────────────────────────

/// Failure reported by an OCR engine or session.
#[derive(Debug, Error)]
pub enum OcrError {
    /// A requested language has no trained data installed.
    #[error("language '{lang}' is not available (installed: {available})")]
    LanguageUnavailable { lang: String, available: String },

    /// The engine itself could not be reached or started.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine ran but produced an error for this image.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The image could not be read or decoded.
    #[error("cannot read image '{path}': {detail}")]
    UnreadableImage { path: PathBuf, detail: String },
}

/// Failure reported by the ingredient classifier.
///
/// The upstream cause (network, auth, rate limit) is opaque to the pipeline
/// and carried as text only.
#[derive(Debug, Error)]
#[error("classifier call failed: {0}")]
pub struct ClassifierError(pub String);

/// Structural rejection of a parsed classifier response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Top-level value is not a JSON array.
    #[error("Response is not an array (got {found})")]
    NotArray { found: &'static str },

    /// An array element is not a JSON string.
    #[error("Response element {index} is not a string (got {found})")]
    NonStringElement { index: usize, found: &'static str },

    /// An array element is an empty or whitespace-only string.
    #[error("Response element {index} is an empty string")]
    EmptyElement { index: usize },
}
