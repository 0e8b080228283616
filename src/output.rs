//! Values produced by one analysis invocation.

use crate::error::{ErrorCode, StageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw text read off a receipt image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Text exactly as the OCR engine returned it.
    pub content: String,
    /// Path of the image the text was read from.
    pub source: PathBuf,
}

impl ExtractedText {
    pub fn new(content: impl Into<String>, source: impl AsRef<Path>) -> Self {
        Self {
            content: content.into(),
            source: source.as_ref().to_path_buf(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

/// Ordered ingredient names returned by the classifier.
///
/// Every element is a non-empty string. Order and duplicates are preserved
/// and case is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientList(Vec<String>);

impl IngredientList {
    /// Wrap already-validated names. Use
    /// [`crate::pipeline::validate::validate`] for untrusted input.
    pub(crate) fn from_validated(items: Vec<String>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a IngredientList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Outcome of one [`crate::analyze::ReceiptAnalyzer::analyze`] call.
///
/// Exactly one variant is produced per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Success {
        ingredients: IngredientList,
        raw_text: ExtractedText,
    },
    Failure {
        code: ErrorCode,
        message: String,
    },
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }

    /// Internal error code, if the invocation failed.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AnalysisResult::Success { .. } => None,
            AnalysisResult::Failure { code, .. } => Some(*code),
        }
    }

    /// Ingredient list, if the invocation succeeded.
    pub fn ingredients(&self) -> Option<&IngredientList> {
        match self {
            AnalysisResult::Success { ingredients, .. } => Some(ingredients),
            AnalysisResult::Failure { .. } => None,
        }
    }
}

impl From<StageError> for AnalysisResult {
    fn from(err: StageError) -> Self {
        AnalysisResult::Failure {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
