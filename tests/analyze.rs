//! Pipeline integration tests with in-process OCR and classifier stand-ins.
//!
//! No network, no Tesseract: the collaborators below replay scripted
//! answers and record how the analyzer drove them.

use async_trait::async_trait;
use receipt_ingredients::{
    stage_bytes, AnalysisConfig, AnalysisResult, ClassifierError, Completion, ErrorCode,
    IngredientClassifier, OcrEngine, OcrError, OcrLanguages, OcrSession, ReceiptAnalyzer,
    ReceiptError, Release, TempFileManager, UploadedImage,
};
use reqwest::StatusCode;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ── Stand-ins ────────────────────────────────────────────────────────────────

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Clone)]
enum OcrScript {
    Text(&'static str),
    InitFails,
    RecognizeFails,
    Unhealthy,
    /// Replace the upload with a non-empty directory so deletion fails.
    SwapForDirectory(&'static str),
}

struct ScriptedOcr {
    script: OcrScript,
    events: Events,
}

struct ScriptedSession {
    script: OcrScript,
    events: Events,
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn initialize(&self, languages: &OcrLanguages) -> Result<Box<dyn OcrSession>, OcrError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("initialize {}", languages.joined()));
        if let OcrScript::InitFails = self.script {
            return Err(OcrError::LanguageUnavailable {
                lang: languages.secondary.clone(),
                available: languages.primary.clone(),
            });
        }
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            events: Arc::clone(&self.events),
        }))
    }

    async fn health_check(&self) -> Result<(), OcrError> {
        match self.script {
            OcrScript::Unhealthy => Err(OcrError::EngineUnavailable("not installed".into())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl OcrSession for ScriptedSession {
    async fn recognize(&mut self, image: &Path) -> Result<String, OcrError> {
        assert!(image.is_file(), "image must exist while OCR runs");
        self.events.lock().unwrap().push("recognize".into());
        match self.script {
            OcrScript::Text(t) => Ok(t.to_string()),
            OcrScript::SwapForDirectory(t) => {
                std::fs::remove_file(image).unwrap();
                std::fs::create_dir(image).unwrap();
                std::fs::write(image.join("pinned"), b"x").unwrap();
                Ok(t.to_string())
            }
            _ => Err(OcrError::Recognition("image too blurry".into())),
        }
    }

    async fn terminate(self: Box<Self>) {
        self.events.lock().unwrap().push("terminate".into());
    }
}

#[derive(Clone)]
enum Reply {
    Content(&'static str),
    Fails,
    Hangs,
}

#[derive(Debug, Clone, PartialEq)]
struct Request {
    system: String,
    user: String,
    temperature: f32,
}

struct ScriptedClassifier {
    reply: Reply,
    calls: AtomicUsize,
    last: Mutex<Option<Request>>,
}

impl ScriptedClassifier {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngredientClassifier for ScriptedClassifier {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<Completion, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(Request {
            system: system_instruction.to_string(),
            user: user_text.to_string(),
            temperature,
        });
        match self.reply {
            Reply::Content(c) => Ok(Completion::new(c)),
            Reply::Fails => Err(ClassifierError("429 Too Many Requests".into())),
            Reply::Hangs => std::future::pending().await,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const RECEIPT_TEXT: &str = "rice 3000\nkimchi 2000";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

struct Harness {
    analyzer: ReceiptAnalyzer,
    classifier: Arc<ScriptedClassifier>,
    events: Events,
}

fn harness(ocr: OcrScript, reply: Reply) -> Harness {
    harness_with(AnalysisConfig::default(), ocr, reply)
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(config: AnalysisConfig, ocr: OcrScript, reply: Reply) -> Harness {
    init_tracing();
    let events: Events = Arc::default();
    let classifier = ScriptedClassifier::new(reply);
    let analyzer = assert_ok!(ReceiptAnalyzer::builder(config)
        .ocr(Arc::new(ScriptedOcr {
            script: ocr,
            events: Arc::clone(&events),
        }))
        .classifier(classifier.clone())
        .build());
    Harness {
        analyzer,
        classifier,
        events,
    }
}

fn upload() -> UploadedImage {
    stage_bytes(PNG_MAGIC, "receipt.png").expect("stage image")
}

fn events(h: &Harness) -> Vec<String> {
    h.events.lock().unwrap().clone()
}

fn failure(result: &AnalysisResult) -> (ErrorCode, String) {
    match result {
        AnalysisResult::Failure { code, message } => (*code, message.clone()),
        other => panic!("expected failure, got {other:?}"),
    }
}

// ── Success ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn receipt_text_becomes_ingredients() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(r#"["rice","kimchi"]"#));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    match &result {
        AnalysisResult::Success {
            ingredients,
            raw_text,
        } => {
            assert_eq!(ingredients.as_slice(), ["rice", "kimchi"]);
            assert_eq!(raw_text.as_str(), RECEIPT_TEXT);
            assert_eq!(raw_text.source.as_path(), image.path());
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(!image.exists(), "temp file must be deleted on success");
    assert_eq!(
        events(&h),
        ["initialize eng+kor", "recognize", "terminate"]
    );
}

#[tokio::test]
async fn classifier_gets_fixed_instruction_and_only_the_text() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content("[]"));

    let result = h.analyzer.analyze(Some(upload())).await;
    assert!(result.is_success());

    let request = h.classifier.last.lock().unwrap().clone().unwrap();
    assert_eq!(request.system, receipt_ingredients::prompts::INGREDIENT_SYSTEM_PROMPT);
    assert_eq!(request.user, RECEIPT_TEXT);
    assert!((request.temperature - 0.3).abs() < f32::EPSILON);
    assert_eq!(h.classifier.calls(), 1);
}

#[tokio::test]
async fn success_response_shape() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(r#"  ["rice","kimchi"]  "#));

    let response = h.analyzer.analyze_response(Some(upload())).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.to_json(),
        serde_json::json!({
            "success": true,
            "data": {"ingredients": ["rice", "kimchi"], "rawText": RECEIPT_TEXT}
        })
    );
}

#[tokio::test]
async fn custom_prompt_and_fence_stripping() {
    let config = assert_ok!(AnalysisConfig::builder()
        .system_prompt("List groceries as JSON.")
        .strip_code_fences(true)
        .temperature(0.0)
        .build());
    let h = harness_with(
        config,
        OcrScript::Text(RECEIPT_TEXT),
        Reply::Content("```json\n[\"rice\"]\n```"),
    );

    let result = h.analyzer.analyze(Some(upload())).await;

    assert_eq!(result.ingredients().unwrap().as_slice(), ["rice"]);
    let request = h.classifier.last.lock().unwrap().clone().unwrap();
    assert_eq!(request.system, "List groceries as JSON.");
    assert_eq!(request.temperature, 0.0);
}

// ── Missing input ────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_file_short_circuits() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content("[]"));

    let result = h.analyzer.analyze(None).await;

    assert_eq!(
        failure(&result),
        (ErrorCode::NoFile, "No receipt image provided".to_string())
    );
    assert!(events(&h).is_empty(), "no OCR session may be opened");
    assert_eq!(h.classifier.calls(), 0);

    let response = receipt_ingredients::build_response(&result);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body.error.unwrap().code, "NO_FILE");
}

#[tokio::test]
async fn vanished_upload_is_no_file_and_nothing_is_deleted() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content("[]"));
    let dir = tempfile::tempdir().unwrap();
    // A directory at the upload path: not a usable file, and must survive.
    let image = UploadedImage::new(dir.path(), "receipt.png");

    let result = h.analyzer.analyze(Some(image)).await;

    assert_eq!(result.code(), Some(ErrorCode::NoFile));
    assert!(dir.path().is_dir());
    assert!(events(&h).is_empty());
}

// ── Classifier output ────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_json_is_parse_failure() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content("not json"));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    let (code, message) = failure(&result);
    assert_eq!(code, ErrorCode::ResponseParseFailure);
    assert!(message.contains("not valid JSON"), "got: {message}");
    assert!(!image.exists());

    let response = receipt_ingredients::build_response(&result);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body.error.unwrap().code, "RECEIPT_ANALYSIS_ERROR");
}

#[tokio::test]
async fn object_answer_is_not_array() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(r#"{"items":["egg"]}"#));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    assert_eq!(
        failure(&result),
        (
            ErrorCode::ResponseNotArray,
            "Response is not an array (got object)".to_string()
        )
    );
    assert!(!image.exists());
}

#[tokio::test]
async fn every_non_array_json_shape_is_rejected() {
    for answer in ["42", r#""rice""#, "null", "true", r#"["rice", 7]"#, r#"["rice", ""]"#] {
        let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(answer));
        let image = upload();

        let result = h.analyzer.analyze(Some(image.clone())).await;

        assert_eq!(result.code(), Some(ErrorCode::ResponseNotArray), "answer: {answer}");
        assert!(!image.exists(), "answer: {answer}");
    }
}

#[tokio::test]
async fn fenced_answer_fails_without_opt_in() {
    let h = harness(
        OcrScript::Text(RECEIPT_TEXT),
        Reply::Content("```json\n[\"rice\"]\n```"),
    );
    let result = h.analyzer.analyze(Some(upload())).await;
    assert_eq!(result.code(), Some(ErrorCode::ResponseParseFailure));
}

#[tokio::test]
async fn classifier_call_failure_keeps_upstream_message() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Fails);
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    let (code, message) = failure(&result);
    assert_eq!(code, ErrorCode::ClassifierCallFailure);
    assert!(message.contains("429"), "got: {message}");
    assert_eq!(h.classifier.calls(), 1, "no retries");
    assert!(!image.exists());
}

// ── OCR failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_init_failure_skips_classifier_and_still_cleans_up() {
    let h = harness(OcrScript::InitFails, Reply::Content("[]"));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    let (code, message) = failure(&result);
    assert_eq!(code, ErrorCode::OcrInitFailure);
    assert!(message.contains("kor"), "got: {message}");
    assert_eq!(h.classifier.calls(), 0);
    assert_eq!(events(&h), ["initialize eng+kor"]);
    assert!(!image.exists());
    assert_eq!(
        receipt_ingredients::build_response(&result)
            .body
            .error
            .unwrap()
            .code,
        "RECEIPT_ANALYSIS_ERROR"
    );
}

#[tokio::test]
async fn recognition_failure_still_terminates_session() {
    let h = harness(OcrScript::RecognizeFails, Reply::Content("[]"));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    assert_eq!(result.code(), Some(ErrorCode::OcrExtractionFailure));
    assert_eq!(events(&h), ["initialize eng+kor", "recognize", "terminate"]);
    assert_eq!(h.classifier.calls(), 0);
    assert!(!image.exists());
}

#[tokio::test]
async fn configured_languages_reach_the_session() {
    let config = assert_ok!(AnalysisConfig::builder()
        .languages(OcrLanguages::new("eng", "jpn"))
        .build());
    let h = harness_with(config, OcrScript::Text("tofu 120"), Reply::Content(r#"["tofu"]"#));

    assert!(h.analyzer.analyze(Some(upload())).await.is_success());
    assert_eq!(events(&h)[0], "initialize eng+jpn");
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn releasing_again_after_analysis_is_harmless() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(r#"["rice"]"#));
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;
    let before = result.clone();

    assert_eq!(TempFileManager::new().release(&image).await, Release::AlreadyGone);
    assert_eq!(result, before);
}

#[tokio::test]
async fn cleanup_failure_does_not_change_success() {
    let h = harness(
        OcrScript::SwapForDirectory(RECEIPT_TEXT),
        Reply::Content(r#"["rice","kimchi"]"#),
    );
    let image = upload();

    let result = h.analyzer.analyze(Some(image.clone())).await;

    assert_eq!(result.ingredients().unwrap().as_slice(), ["rice", "kimchi"]);
    assert!(image.path().is_dir(), "undeletable upload stays behind");
    assert_eq!(
        receipt_ingredients::build_response(&result).status,
        StatusCode::OK
    );

    std::fs::remove_dir_all(image.path()).unwrap();
}

#[tokio::test]
async fn abandoned_invocation_still_deletes_upload() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Hangs);
    let image = upload();

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        h.analyzer.analyze(Some(image.clone())),
    )
    .await;

    assert_err!(outcome);
    assert!(!image.exists(), "dropping the invocation must remove the file");
}

#[tokio::test]
async fn concurrent_invocations_do_not_interfere() {
    let h = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content(r#"["rice","kimchi"]"#));
    let analyzer = Arc::new(h.analyzer);

    let images: Vec<UploadedImage> = (0..8).map(|_| upload()).collect();
    let handles: Vec<_> = images
        .iter()
        .cloned()
        .map(|image| {
            let analyzer = Arc::clone(&analyzer);
            tokio::spawn(async move { analyzer.analyze(Some(image)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    for image in &images {
        assert!(!image.exists());
    }
    assert_eq!(h.classifier.calls(), 8);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_reports_unhealthy_ocr() {
    let h = harness(OcrScript::Unhealthy, Reply::Content("[]"));
    let err = assert_err!(h.analyzer.health_check().await);
    assert!(matches!(
        err,
        ReceiptError::Unhealthy {
            component: "OCR engine",
            ..
        }
    ));

    let healthy = harness(OcrScript::Text(RECEIPT_TEXT), Reply::Content("[]"));
    assert_ok!(healthy.analyzer.health_check().await);
}
