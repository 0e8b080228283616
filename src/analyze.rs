//! The receipt analysis pipeline.
//!
//! [`ReceiptAnalyzer::analyze`] runs one invocation end to end:
//!
//! ```text
//! precondition ─▶ OCR session ─▶ recognize ─▶ terminate ─▶ classify ─▶ parse ─▶ validate
//!      │                                                                            │
//!      └─ NO_FILE (nothing acquired, nothing deleted)          release upload ◀─────┘
//! ```
//!
//! Stages thread `Result<_, StageError>`; the first failure short-circuits.
//! Whatever happens, the upload is released exactly once by the finalizer
//! after the stages return, and the error is folded into
//! [`AnalysisResult::Failure`] so nothing escapes as a raw error.
//!
//! Collaborators are constructed by the caller (or by the builder from the
//! config) and injected; the analyzer keeps no state between invocations, so
//! one instance can serve many concurrent requests.

use crate::config::AnalysisConfig;
use crate::error::{ReceiptError, StageError};
use crate::output::{AnalysisResult, ExtractedText, IngredientList};
use crate::pipeline::classify::{IngredientClassifier, LlmClassifier};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::upload::{TempFileManager, UploadGuard, UploadedImage};
use crate::pipeline::validate;
use crate::prompts::INGREDIENT_SYSTEM_PROMPT;
use crate::response::{build_response, AnalysisResponse};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Orchestrates OCR, classification, validation and cleanup.
pub struct ReceiptAnalyzer {
    config: AnalysisConfig,
    ocr: Arc<dyn OcrEngine>,
    classifier: Arc<dyn IngredientClassifier>,
    files: TempFileManager,
}

impl ReceiptAnalyzer {
    /// Start building an analyzer from `config`.
    pub fn builder(config: AnalysisConfig) -> ReceiptAnalyzerBuilder {
        ReceiptAnalyzerBuilder {
            config,
            ocr: None,
            classifier: None,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Verify both collaborators are reachable.
    pub async fn health_check(&self) -> Result<(), ReceiptError> {
        self.ocr
            .health_check()
            .await
            .map_err(|e| ReceiptError::Unhealthy {
                component: "OCR engine",
                detail: e.to_string(),
            })?;
        self.classifier
            .health_check()
            .await
            .map_err(|e| ReceiptError::Unhealthy {
                component: "classifier",
                detail: e.to_string(),
            })?;
        info!("Collaborators healthy (ocr: {})", self.ocr.name());
        Ok(())
    }

    /// Analyze one uploaded receipt image.
    ///
    /// `None`, or an image whose file does not exist, yields `NO_FILE`
    /// without touching any collaborator or the file system. Otherwise the
    /// image is deleted before this returns, on every path.
    pub async fn analyze(&self, image: Option<UploadedImage>) -> AnalysisResult {
        let image = match image {
            Some(image) if image.exists() => image,
            Some(image) => {
                warn!("Uploaded image missing on disk: {}", image.path().display());
                return StageError::NoFile.into();
            }
            None => return StageError::NoFile.into(),
        };

        let start = Instant::now();
        info!("Analyzing receipt image: {}", image.original_name());

        let upload = UploadGuard::new(image, &self.files);
        let outcome = self.run_stages(upload.image().path()).await;
        upload.release().await;

        match outcome {
            Ok((ingredients, raw_text)) => {
                info!(
                    "Receipt analysed: {} ingredients in {}ms",
                    ingredients.len(),
                    start.elapsed().as_millis()
                );
                AnalysisResult::Success {
                    ingredients,
                    raw_text,
                }
            }
            Err(e) => {
                error!(code = %e.code(), "Receipt analysis error: {e}");
                e.into()
            }
        }
    }

    /// [`Self::analyze`] followed by [`build_response`].
    pub async fn analyze_response(&self, image: Option<UploadedImage>) -> AnalysisResponse {
        build_response(&self.analyze(image).await)
    }

    async fn run_stages(&self, path: &Path) -> Result<(IngredientList, ExtractedText), StageError> {
        let text = self.extract_text(path).await?;
        let ingredients = self.classify(&text).await?;
        Ok((ingredients, text))
    }

    /// OCR stage. The session is terminated whether or not recognition worked.
    async fn extract_text(&self, path: &Path) -> Result<ExtractedText, StageError> {
        let languages = &self.config.languages;
        let mut session =
            self.ocr
                .initialize(languages)
                .await
                .map_err(|source| StageError::OcrInit {
                    languages: languages.joined(),
                    source,
                })?;

        info!("Starting OCR processing...");
        let recognized = session.recognize(path).await;
        session.terminate().await;

        match recognized {
            Ok(text) => {
                info!("OCR Result: {}", text);
                Ok(ExtractedText::new(text, path))
            }
            Err(source) => {
                warn!("OCR produced no text: {}", source);
                Err(StageError::OcrExtraction {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Classifier call, parse and structural validation.
    async fn classify(&self, text: &ExtractedText) -> Result<IngredientList, StageError> {
        let instruction = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(INGREDIENT_SYSTEM_PROMPT);

        let completion = self
            .classifier
            .complete(instruction, text.as_str(), self.config.temperature)
            .await?;

        let parsed = validate::parse_completion(&completion.content, self.config.strip_code_fences)
            .inspect_err(|e| warn!("Unparseable classifier output: {e}"))?;
        let ingredients = validate::validate(parsed)
            .inspect_err(|e| warn!("Classifier output has wrong shape: {e}"))?;

        info!(
            "Identified ingredients: {}",
            serde_json::to_string(&ingredients).unwrap_or_default()
        );
        Ok(ingredients)
    }
}

/// Builder for [`ReceiptAnalyzer`].
///
/// Unset collaborators fall back to [`TesseractOcr`] and an
/// [`LlmClassifier`] over the provider resolved from the config.
pub struct ReceiptAnalyzerBuilder {
    config: AnalysisConfig,
    ocr: Option<Arc<dyn OcrEngine>>,
    classifier: Option<Arc<dyn IngredientClassifier>>,
}

impl ReceiptAnalyzerBuilder {
    pub fn ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn IngredientClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn build(self) -> Result<ReceiptAnalyzer, ReceiptError> {
        let classifier = match self.classifier {
            Some(c) => c,
            None => {
                let provider = resolve_provider(&self.config)?;
                Arc::new(LlmClassifier::new(provider, self.config.max_tokens))
            }
        };
        let ocr = self
            .ocr
            .unwrap_or_else(|| Arc::new(TesseractOcr::new()));

        Ok(ReceiptAnalyzer {
            config: self.config,
            ocr,
            classifier,
            files: TempFileManager::new(),
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is.
/// 2. `config.provider_name` + model.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is present.
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, ReceiptError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ReceiptError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReceiptError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ReceiptError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
