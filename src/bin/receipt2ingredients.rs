//! CLI binary for receipt-ingredients.
//!
//! A thin shim over the library crate: maps CLI flags to `AnalysisConfig`,
//! stages the input image, runs one analysis and prints the JSON response.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt_ingredients::{
    resolve_provider, stage_upload, AnalysisConfig, OcrEngine, OcrLanguages, ReceiptAnalyzer,
    ReceiptError, TesseractOcr, UploadedImage, VisionOcr,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a receipt photo with Tesseract (eng+kor) and OpenAI
  receipt2ingredients receipt.jpg

  # Pretty-printed JSON
  receipt2ingredients --pretty receipt.jpg

  # Let a vision model read the receipt instead of Tesseract
  receipt2ingredients --ocr vision --model gpt-4.1-mini receipt.jpg

  # Japanese receipts
  receipt2ingredients --secondary-lang jpn receipt.png

  # Check Tesseract and the LLM provider are usable
  receipt2ingredients --check

EXIT STATUS:
  0  ingredients identified
  1  analysis failed (RECEIPT_ANALYSIS_ERROR)
  2  no usable receipt image (NO_FILE)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Identify food ingredients on a store receipt.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2ingredients",
    version,
    about = "Identify food ingredients on a store receipt using OCR and an LLM",
    long_about = "Reads a receipt photo with OCR (Tesseract or a vision LLM), asks a language \
model which lines are food items, validates the answer and prints a JSON response. \
The input file is never modified; a private temporary copy is analysed and deleted.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Receipt image: local PNG/JPEG path or HTTP/HTTPS URL.
    input: Option<String>,

    /// OCR engine: tesseract or vision.
    #[arg(long, env = "RECEIPT_OCR", value_enum, default_value = "tesseract")]
    ocr: OcrArg,

    /// LLM model ID (e.g. gpt-4, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Classifier temperature (0.0–2.0).
    #[arg(long, env = "RECEIPT_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max classifier output tokens.
    #[arg(long, env = "RECEIPT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Latin-script OCR language (Tesseract code).
    #[arg(long, env = "RECEIPT_PRIMARY_LANG", default_value = "eng")]
    primary_lang: String,

    /// Local-script OCR language (Tesseract code).
    #[arg(long, env = "RECEIPT_SECONDARY_LANG", default_value = "kor")]
    secondary_lang: String,

    /// Tesseract executable.
    #[arg(long, env = "RECEIPT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory holding Tesseract *.traineddata files.
    #[arg(long, env = "RECEIPT_TESSDATA_DIR")]
    tessdata_dir: Option<PathBuf>,

    /// Path to a text file containing a custom classifier instruction.
    #[arg(long, env = "RECEIPT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Accept answers wrapped in a ```json fence.
    #[arg(long, env = "RECEIPT_STRIP_FENCES")]
    strip_fences: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "RECEIPT_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Run collaborator health checks and exit.
    #[arg(long)]
    check: bool,

    /// Pretty-print the JSON response.
    #[arg(long)]
    pretty: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "RECEIPT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the JSON response and errors.
    #[arg(short, long, env = "RECEIPT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Tesseract,
    Vision,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level progress logs unless --verbose.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build analyzer ───────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let ocr: Arc<dyn OcrEngine> = match cli.ocr {
        OcrArg::Tesseract => {
            let mut engine = TesseractOcr::new().with_binary(&cli.tesseract);
            if let Some(ref dir) = cli.tessdata_dir {
                engine = engine.with_tessdata_dir(dir);
            }
            Arc::new(engine)
        }
        OcrArg::Vision => {
            let provider =
                resolve_provider(&config).context("Vision OCR needs an LLM provider")?;
            Arc::new(VisionOcr::new(provider))
        }
    };
    let analyzer = ReceiptAnalyzer::builder(config)
        .ocr(ocr)
        .build()
        .context("Failed to set up receipt analyzer")?;

    if cli.check {
        analyzer.health_check().await.context("Health check failed")?;
        if !cli.quiet {
            eprintln!("{} OCR engine and classifier are ready", green("✔"));
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Stage input ──────────────────────────────────────────────────────
    let image = stage_input(&cli).await?;

    // ── Analyze ──────────────────────────────────────────────────────────
    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message("Reading receipt…");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let response = analyzer.analyze_response(image).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let json = if cli.pretty {
        serde_json::to_string_pretty(&response.body)
    } else {
        serde_json::to_string(&response.body)
    }
    .context("Failed to serialise response")?;
    println!("{json}");

    if !cli.quiet {
        match (&response.body.data, &response.body.error) {
            (Some(data), _) => eprintln!(
                "{} {} ingredients  {}",
                green("✔"),
                data.ingredients.len(),
                dim(&response.status.to_string())
            ),
            (_, Some(err)) => eprintln!(
                "{} {}  {}",
                red("✘"),
                red(&err.message),
                dim(&response.status.to_string())
            ),
            _ => {}
        }
    }

    Ok(if response.status.is_success() {
        ExitCode::SUCCESS
    } else if response.status.is_client_error() {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    })
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .languages(OcrLanguages::new(&cli.primary_lang, &cli.secondary_lang))
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .strip_code_fences(cli.strip_fences)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Stage the input as a private temp copy.
///
/// An unusable local file becomes "no upload", which the analyzer reports
/// as `NO_FILE`; network and I/O failures abort the run.
async fn stage_input(cli: &Cli) -> Result<Option<UploadedImage>> {
    let Some(ref input) = cli.input else {
        return Ok(None);
    };
    match stage_upload(input, cli.download_timeout).await {
        Ok(image) => Ok(Some(image)),
        Err(
            e @ (ReceiptError::FileNotFound { .. }
            | ReceiptError::PermissionDenied { .. }
            | ReceiptError::NotAnImage { .. }),
        ) => {
            if !cli.quiet {
                eprintln!("{} {e}", red("✘"));
            }
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to stage receipt image"),
    }
}
