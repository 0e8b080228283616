//! # receipt-ingredients
//!
//! Turn a photographed or scanned store receipt into a list of food
//! ingredient names.
//!
//! OCR reads the receipt, a language model picks out the food items, and the
//! model's answer is validated as a JSON array of strings before it is
//! returned. Every invocation owns exactly one temporary image file and
//! deletes it before returning, whether the analysis worked or not.
//!
//! ## Pipeline Overview
//!
//! ```text
//! receipt photo
//!  │
//!  ├─ 1. Stage     copy the upload to an invocation-scoped temp file
//!  ├─ 2. OCR       tesseract (eng+kor) or a vision LLM → raw text
//!  ├─ 3. Classify  one chat completion at temperature 0.3
//!  ├─ 4. Validate  trimmed JSON, must be an array of non-empty strings
//!  ├─ 5. Cleanup   delete the temp file (always, exactly once)
//!  └─ 6. Respond   {success, data | error} + HTTP status
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_ingredients::{stage_upload, AnalysisConfig, ReceiptAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AnalysisConfig::default();
//!     let analyzer = ReceiptAnalyzer::builder(config).build()?;
//!     analyzer.health_check().await?;
//!
//!     let image = stage_upload("receipt.jpg", 60).await?;
//!     let response = analyzer.analyze_response(Some(image)).await;
//!     println!("{} {}", response.status, response.to_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2ingredients` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod response;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{resolve_provider, ReceiptAnalyzer, ReceiptAnalyzerBuilder};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, OcrLanguages};
pub use error::{ClassifierError, ErrorCode, OcrError, ReceiptError, StageError, ValidationError};
pub use output::{AnalysisResult, ExtractedText, IngredientList};
pub use pipeline::classify::{Completion, IngredientClassifier, LlmClassifier};
pub use pipeline::input::{stage_bytes, stage_upload};
pub use pipeline::ocr::{OcrEngine, OcrSession, TesseractOcr};
pub use pipeline::upload::{Release, TempFileManager, UploadedImage};
pub use pipeline::vision::VisionOcr;
pub use response::{build_response, AnalysisResponse, ResponseBody};
