//! OCR through a vision-capable LLM.
//!
//! An alternative to Tesseract for hosts without trained data installed, or
//! for crumpled, low-contrast photos where a VLM reads better than classic
//! OCR. The photo is downscaled, PNG-encoded and sent as a base64 image
//! attachment with a transcription-only instruction.

use crate::config::OcrLanguages;
use crate::error::OcrError;
use crate::pipeline::classify::ping_provider;
use crate::pipeline::ocr::{OcrEngine, OcrSession};
use crate::prompts::vision_ocr_prompt;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Longest edge sent to the model, in pixels.
///
/// Phone photos are routinely 4000 px tall; beyond ~2000 px the model reads
/// no better and the request just gets slower and pricier.
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;

/// Tesseract-style codes the vision prompt knows how to name.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("eng", "English"),
    ("kor", "Korean"),
    ("jpn", "Japanese"),
    ("chi_sim", "Simplified Chinese"),
    ("chi_tra", "Traditional Chinese"),
    ("fra", "French"),
    ("deu", "German"),
    ("spa", "Spanish"),
    ("ita", "Italian"),
    ("por", "Portuguese"),
    ("vie", "Vietnamese"),
    ("tha", "Thai"),
];

fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// OCR engine backed by an [`LLMProvider`] with image input.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    max_dimension: u32,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_tokens: 2048,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n.max(1);
        self
    }

    pub fn with_max_dimension(mut self, px: u32) -> Self {
        self.max_dimension = px.max(100);
        self
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn initialize(&self, languages: &OcrLanguages) -> Result<Box<dyn OcrSession>, OcrError> {
        let mut names = Vec::with_capacity(2);
        for code in languages.codes() {
            let name = language_name(code).ok_or_else(|| OcrError::LanguageUnavailable {
                lang: code.to_string(),
                available: LANGUAGE_NAMES
                    .iter()
                    .map(|(c, _)| *c)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
            names.push(name);
        }

        Ok(Box::new(VisionSession {
            provider: Arc::clone(&self.provider),
            prompt: vision_ocr_prompt(&names.join(", ")),
            max_tokens: self.max_tokens,
            max_dimension: self.max_dimension,
        }))
    }

    async fn health_check(&self) -> Result<(), OcrError> {
        ping_provider(self.provider.as_ref())
            .await
            .map_err(|e| OcrError::EngineUnavailable(format!("{}: {e}", self.provider.name())))
    }
}

struct VisionSession {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    max_tokens: usize,
    max_dimension: u32,
}

#[async_trait]
impl OcrSession for VisionSession {
    async fn recognize(&mut self, image: &Path) -> Result<String, OcrError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| OcrError::UnreadableImage {
                path: image.to_path_buf(),
                detail: e.to_string(),
            })?;

        // Decoding and re-encoding a 12 MP photo is CPU-bound.
        let max_dimension = self.max_dimension;
        let image_data = tokio::task::spawn_blocking(move || encode_receipt(&bytes, max_dimension))
            .await
            .map_err(|e| OcrError::Recognition(format!("encode task panicked: {e}")))?
            .map_err(|e| OcrError::UnreadableImage {
                path: image.to_path_buf(),
                detail: e.to_string(),
            })?;

        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| OcrError::Recognition(format!("{e}")))?;

        debug!(
            "Vision OCR: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    async fn terminate(self: Box<Self>) {
        debug!("Vision OCR session terminated");
    }
}

/// Decode, downscale and PNG-encode a receipt photo for the VLM API.
///
/// `detail: "high"` keeps small print legible; at `low` the model sees a
/// single 512 px tile and prices blur together.
fn encode_receipt(bytes: &[u8], max_dimension: u32) -> Result<ImageData, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let img = fit_within(img, max_dimension);

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded receipt → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width() <= max_dimension && img.height() <= max_dimension {
        img
    } else {
        img.resize(max_dimension, max_dimension, image::imageops::FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::tests::RejectingProvider;
    use crate::pipeline::input::stage_bytes;
    use edgequake_llm::MockProvider;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encode_small_receipt() {
        let data = encode_receipt(&png_bytes(10, 30), 2000).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (10, 30));
    }

    #[test]
    fn tall_receipt_is_downscaled_keeping_aspect() {
        let data = encode_receipt(&png_bytes(100, 400), 200).unwrap();
        let img = image::load_from_memory(&STANDARD.decode(&data.data).unwrap()).unwrap();
        assert_eq!(img.height(), 200);
        assert_eq!(img.width(), 50);
    }

    #[test]
    fn garbage_bytes_fail_to_encode() {
        assert!(encode_receipt(b"not an image", 2000).is_err());
    }

    #[test]
    fn known_language_names() {
        assert_eq!(language_name("kor"), Some("Korean"));
        assert_eq!(language_name("xx"), None);
    }

    #[tokio::test]
    async fn recognize_sends_staged_png_and_returns_transcript() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response("TOFU 1,200\n두부 1,200").await;
        let engine = VisionOcr::new(provider);

        let image = stage_bytes(&png_bytes(40, 120), "receipt.png").unwrap();
        let mut session = engine.initialize(&OcrLanguages::default()).await.unwrap();
        let text = session.recognize(image.path()).await.unwrap();
        session.terminate().await;

        assert_eq!(text, "TOFU 1,200\n두부 1,200");
        std::fs::remove_file(image.path()).unwrap();
    }

    #[tokio::test]
    async fn recognize_rejects_corrupt_image() {
        let engine = VisionOcr::new(Arc::new(MockProvider::new()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

        let mut session = engine.initialize(&OcrLanguages::default()).await.unwrap();
        let err = session.recognize(&path).await.unwrap_err();
        assert!(matches!(err, OcrError::UnreadableImage { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn initialize_rejects_unknown_language() {
        let engine = VisionOcr::new(Arc::new(MockProvider::new()));
        let err = engine
            .initialize(&OcrLanguages::new("eng", "xyz"))
            .await
            .err()
            .expect("unknown language must fail");
        match err {
            OcrError::LanguageUnavailable { lang, available } => {
                assert_eq!(lang, "xyz");
                assert!(available.contains("kor"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_reaches_the_provider() {
        assert!(VisionOcr::new(Arc::new(MockProvider::new()))
            .health_check()
            .await
            .is_ok());

        let err = VisionOcr::new(Arc::new(RejectingProvider))
            .health_check()
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable(_)), "got: {err:?}");
    }
}
