//! Classification: the language-model collaborator boundary.
//!
//! The pipeline hands the classifier a fixed instruction and the receipt
//! text, and gets back one completion. Nothing about the answer is trusted
//! here; [`crate::pipeline::validate`] decides whether it is usable.
//!
//! There is no retry loop: a failed call surfaces as
//! `CLASSIFIER_CALL_FAILURE` and any retry policy belongs to the caller.

use crate::error::ClassifierError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Raw text completion returned by a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A generative model that answers one instruction + one user turn.
#[async_trait]
pub trait IngredientClassifier: Send + Sync {
    /// Request a single non-streaming completion.
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<Completion, ClassifierError>;

    /// Cheap reachability check run at startup.
    async fn health_check(&self) -> Result<(), ClassifierError> {
        Ok(())
    }
}

/// Classifier backed by any edgequake-llm provider.
pub struct LlmClassifier {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    fn options(&self, temperature: f32) -> CompletionOptions {
        build_options(temperature, self.max_tokens)
    }
}

#[async_trait]
impl IngredientClassifier for LlmClassifier {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<Completion, ClassifierError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(system_instruction),
            ChatMessage::user(user_text),
        ];
        let options = self.options(temperature);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ClassifierError(format!("{e}")))?;

        debug!(
            "Classifier: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(Completion::new(response.content))
    }

    async fn health_check(&self) -> Result<(), ClassifierError> {
        ping_provider(self.provider.as_ref())
            .await
            .map_err(|e| ClassifierError(format!("{} unreachable: {e}", self.provider.name())))
    }
}

/// One-token round trip proving the provider accepts our credentials.
pub(crate) async fn ping_provider(provider: &dyn LLMProvider) -> Result<(), LlmError> {
    let options = CompletionOptions {
        max_tokens: Some(1),
        ..Default::default()
    };
    provider
        .chat(&[ChatMessage::user("ping")], Some(&options))
        .await?;
    debug!("Provider {} ({}) reachable", provider.name(), provider.model());
    Ok(())
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}
