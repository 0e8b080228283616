//! Pipeline stages for receipt analysis.
//!
//! Each submodule implements exactly one step or one collaborator boundary,
//! so every stage can be tested in isolation and collaborators can be
//! swapped (Tesseract for a vision model, a real LLM for a stub) without
//! touching the orchestration in [`crate::analyze`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ classify ──▶ validate ──▶ upload::release
//! (stage)  (text)   (LLM JSON)   (shape)      (delete image)
//! ```
//!
//! 1. [`input`]    — stage a path, URL or byte buffer as an invocation-owned temp file
//! 2. [`ocr`]      — OCR engine/session traits and the Tesseract engine
//! 3. [`vision`]   — OCR engine backed by a vision LLM
//! 4. [`classify`] — classifier trait and the edgequake-llm implementation
//! 5. [`validate`] — parse and structurally check the classifier answer
//! 6. [`upload`]   — delete the staged image exactly once

pub mod classify;
pub mod input;
pub mod ocr;
pub mod upload;
pub mod validate;
pub mod vision;
