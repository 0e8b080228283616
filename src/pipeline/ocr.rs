//! Text extraction: the OCR collaborator boundary.
//!
//! The pipeline talks to OCR through two traits. An [`OcrEngine`] is the
//! long-lived client, constructed once and shared by every invocation. Each
//! invocation asks it for a fresh [`OcrSession`] bound to the languages it
//! needs, uses it for one image and then terminates it, success or not.
//!
//! [`TesseractOcr`] drives the `tesseract` executable. The vision-model
//! engine lives in [`crate::pipeline::vision`].

use crate::config::OcrLanguages;
use crate::error::OcrError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// A client able to open OCR sessions.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs and health reports.
    fn name(&self) -> &'static str;

    /// Open a session able to read both `languages`.
    ///
    /// Fails if either language cannot be loaded.
    async fn initialize(&self, languages: &OcrLanguages) -> Result<Box<dyn OcrSession>, OcrError>;

    /// Cheap reachability check run at startup.
    async fn health_check(&self) -> Result<(), OcrError> {
        Ok(())
    }
}

/// One initialised OCR session.
#[async_trait]
pub trait OcrSession: Send {
    /// Read all text from the image at `image`.
    async fn recognize(&mut self, image: &Path) -> Result<String, OcrError>;

    /// Release the session. Must not fail; problems are logged.
    async fn terminate(self: Box<Self>);
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// OCR via the `tesseract` command-line program.
///
/// Every call spawns a short-lived process, so a "session" is just the
/// validated language set plus the command template.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            tessdata_dir: None,
        }
    }
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `tesseract` on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pass `--tessdata-dir` to every invocation.
    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref dir) = self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, cmd: &mut Command) -> Result<Output, OcrError> {
        cmd.output().await.map_err(|e| {
            OcrError::EngineUnavailable(format!("cannot run '{}': {e}", self.binary.display()))
        })
    }

    /// Languages with trained data installed.
    pub async fn installed_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = self.run(self.command().arg("--list-langs")).await?;
        if !output.status.success() {
            return Err(OcrError::EngineUnavailable(stderr_summary(&output)));
        }
        // Tesseract 3 printed the list on stderr, 4+ on stdout.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_list_langs(&listing))
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn initialize(&self, languages: &OcrLanguages) -> Result<Box<dyn OcrSession>, OcrError> {
        let installed = self.installed_languages().await?;
        for lang in languages.codes() {
            if !installed.iter().any(|l| l == lang) {
                return Err(OcrError::LanguageUnavailable {
                    lang: lang.to_string(),
                    available: installed.join(", "),
                });
            }
        }
        debug!("Tesseract session ready for {}", languages);
        Ok(Box::new(TesseractSession {
            engine: self.clone(),
            languages: languages.joined(),
        }))
    }

    async fn health_check(&self) -> Result<(), OcrError> {
        let output = self.run(self.command().arg("--version")).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(OcrError::EngineUnavailable(stderr_summary(&output)))
        }
    }
}

struct TesseractSession {
    engine: TesseractOcr,
    languages: String,
}

#[async_trait]
impl OcrSession for TesseractSession {
    async fn recognize(&mut self, image: &Path) -> Result<String, OcrError> {
        let mut cmd = self.engine.command();
        cmd.arg(image).arg("stdout").arg("-l").arg(&self.languages);
        let output = self.engine.run(&mut cmd).await?;
        if !output.status.success() {
            return Err(OcrError::Recognition(stderr_summary(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn terminate(self: Box<Self>) {
        debug!("Tesseract session for {} terminated", self.languages);
    }
}

/// Parse `tesseract --list-langs` output into language codes.
fn parse_list_langs(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .filter(|l| !l.contains(' '))
        .map(str::to_string)
        .collect()
}

fn stderr_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}
