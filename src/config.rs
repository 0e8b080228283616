//! Configuration types for receipt analysis.
//!
//! Every knob the pipeline reads lives in [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. The config is cheap to clone and is shared by
//! every invocation an analyzer runs; it never changes after `build()`.

use crate::error::ReceiptError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Configuration for a receipt analyzer.
///
/// # Example
/// ```rust
/// use receipt_ingredients::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .temperature(0.2)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.languages.joined(), "eng+kor");
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Languages the OCR session must load. Default: `eng` + `kor`.
    pub languages: OcrLanguages,

    /// Sampling temperature for the classifier completion. Default: 0.3.
    ///
    /// Low values keep the model literal: it should copy item names off the
    /// receipt, not invent a shopping list.
    pub temperature: f32,

    /// Maximum tokens the classifier may generate. Default: 1024.
    pub max_tokens: usize,

    /// LLM model identifier, e.g. "gpt-4", "gpt-4.1-mini".
    /// If None, [`DEFAULT_MODEL`] is used when a provider has to be created.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom classifier instruction. If None, uses
    /// [`crate::prompts::INGREDIENT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Remove an outer ```` ```json ```` fence before parsing. Default: false.
    ///
    /// Off by default: a fenced answer violates the instruction and is
    /// reported as `RESPONSE_PARSE_FAILURE` unless the caller opts in.
    pub strip_code_fences: bool,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            languages: OcrLanguages::default(),
            temperature: 0.3,
            max_tokens: 1024,
            model: None,
            provider_name: None,
            provider: None,
            system_prompt: None,
            strip_code_fences: false,
            download_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("languages", &self.languages)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("strip_code_fences", &self.strip_code_fences)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name to request when a provider has to be created.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn languages(mut self, languages: OcrLanguages) -> Self {
        self.config.languages = languages;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn strip_code_fences(mut self, v: bool) -> Self {
        self.config.strip_code_fences = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ReceiptError> {
        let c = &self.config;
        c.languages.validate()?;
        if c.max_tokens == 0 {
            return Err(ReceiptError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(ref prompt) = c.system_prompt {
            if prompt.trim().is_empty() {
                return Err(ReceiptError::InvalidConfig(
                    "system prompt must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── OCR languages ────────────────────────────────────────────────────────

/// The pair of alphabets an OCR session must be able to read.
///
/// Receipts mix a Latin-script brand/product vocabulary with the local
/// script, so both must load or the session is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrLanguages {
    /// Latin-script language code (Tesseract naming). Default: `eng`.
    pub primary: String,
    /// Local-script language code. Default: `kor`.
    pub secondary: String,
}

impl Default for OcrLanguages {
    fn default() -> Self {
        Self {
            primary: "eng".to_string(),
            secondary: "kor".to_string(),
        }
    }
}

impl OcrLanguages {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Tesseract `-l` argument form: `eng+kor`.
    pub fn joined(&self) -> String {
        format!("{}+{}", self.primary, self.secondary)
    }

    /// Both codes, primary first.
    pub fn codes(&self) -> [&str; 2] {
        [self.primary.as_str(), self.secondary.as_str()]
    }

    fn validate(&self) -> Result<(), ReceiptError> {
        for code in self.codes() {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ReceiptError::InvalidConfig(format!(
                    "invalid OCR language code '{code}'"
                )));
            }
        }
        if self.primary == self.secondary {
            return Err(ReceiptError::InvalidConfig(format!(
                "primary and secondary OCR languages are both '{}'",
                self.primary
            )));
        }
        Ok(())
    }
}

impl fmt::Display for OcrLanguages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.languages, OcrLanguages::new("eng", "kor"));
        assert!((c.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(c.model_or_default(), "gpt-4");
        assert!(!c.strip_code_fences);
    }

    #[test]
    fn temperature_is_clamped() {
        let c = AnalysisConfig::builder().temperature(9.0).build().unwrap();
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_identical_languages() {
        let err = AnalysisConfig::builder()
            .languages(OcrLanguages::new("eng", "eng"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_language_code() {
        let err = AnalysisConfig::builder()
            .languages(OcrLanguages::new("eng", "k or"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("k or"), "got: {err}");
    }

    #[test]
    fn rejects_blank_prompt_and_zero_tokens() {
        assert!(AnalysisConfig::builder().system_prompt("  ").build().is_err());
        assert!(AnalysisConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn joined_languages() {
        assert_eq!(OcrLanguages::new("eng", "jpn").to_string(), "eng+jpn");
    }
}
