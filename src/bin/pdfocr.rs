//! CLI binary for edgequake-pdfocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! runs one extraction and prints where the output was saved.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfocr::{
    extract_to_file, DocumentSource, ErrorKind, Mode, OcrConfig, OcrError, OcrProgressCallback,
    PageSelection, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per merged page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading pages…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_page_complete(&self, page_num: usize, total: usize, rows: usize) {
        let detail = if rows > 0 {
            dim(&format!("{rows:>4} rows"))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            detail
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize, reason: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            yellow("⚠"),
            page_num,
            total,
            yellow(reason)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, skipped_pages: usize) {
        self.bar.finish_and_clear();
        if skipped_pages == 0 {
            eprintln!("{} {} pages extracted", green("✔"), bold(&total_pages.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} skipped)",
                yellow("⚠"),
                bold(&(total_pages - skipped_pages).to_string()),
                total_pages,
                skipped_pages
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Table extraction (mode inferred from "table" in the prompt)
  pdfocr invoices.pdf --prompt "Extract the line items table"

  # Text extraction to an explicit file
  pdfocr report.pdf --prompt "Transcribe this report" -o report.md

  # Page images instead of a PDF, mode forced
  pdfocr --images scan1.png scan2.png --prompt "Read the ledger" --mode table

  # From a URL, selected pages, a specific provider
  pdfocr https://example.org/q3.pdf --pages 2-5 --provider anthropic \
         --model claude-sonnet-4-20250514 --prompt "Extract the balance sheet as CSV"

OUTPUT:
  Table mode writes <stem>.csv, Text mode writes <stem>.md, next to a local
  source or in the working directory for URLs. Per-call usage lines and
  warnings go to stderr; only the final "Saved OCR output to …" line goes
  to stdout.

EXIT CODES:
  0 success, 2 configuration, 3 extraction, 4 output, 1 other, 130 interrupted

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

  When no API key is set, a .env file in the working directory, the
  executable's directory or its parent is loaded.
"#;

/// OCR PDF documents page by page into one CSV or Markdown file.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "OCR PDF documents page by page into one CSV or Markdown file using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "images", conflicts_with = "images")]
    input: Option<String>,

    /// Page image paths or URLs, in page order, instead of a PDF.
    #[arg(long, num_args = 1..)]
    images: Vec<String>,

    /// Instruction sent with every page.
    #[arg(short, long, env = "PDFOCR_PROMPT")]
    prompt: String,

    /// Output mode. Inferred from the prompt ("table"/"csv" → table) if not set.
    #[arg(short, long, env = "PDFOCR_MODE", value_enum)]
    mode: Option<ModeArg>,

    /// Output file. Defaults to <stem>.csv or <stem>.md.
    #[arg(short, long, env = "PDFOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFOCR_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDFOCR_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFOCR_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Cap on the longest rendered edge in pixels.
    #[arg(long, env = "PDFOCR_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFOCR_PAGES", default_value = "all", value_parser = parse_pages)]
    pages: PageSelection,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFOCR_PASSWORD")]
    password: Option<String>,

    /// Pages extracted concurrently (merge order is unaffected).
    #[arg(short, long, env = "PDFOCR_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per page on a failed or timed-out call (at most 10).
    #[arg(long, env = "PDFOCR_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles per retry).
    #[arg(long, env = "PDFOCR_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDFOCR_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFOCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Tidy Text-mode Markdown (fences, whitespace, blank lines).
    #[arg(long, env = "PDFOCR_TIDY")]
    tidy: bool,

    /// Show a progress bar (suppresses per-call log lines unless -v).
    #[arg(long, env = "PDFOCR_PROGRESS")]
    progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all diagnostics except errors.
    #[arg(short, long, env = "PDFOCR_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Table,
    Text,
}

impl From<ModeArg> for Mode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Table => Mode::Table,
            ModeArg::Text => Mode::Text,
        }
    }
}

fn parse_pages(s: &str) -> Result<PageSelection, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = cli.progress && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    tokio::select! {
        result = run(&cli, show_progress) => match result {
            Ok(path) => {
                println!("Saved OCR output to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                let kind = e.downcast_ref::<OcrError>().map(OcrError::kind);
                let label = kind.map_or_else(|| "error".to_string(), |k| format!("{k} error"));
                eprintln!("Error ({label}): {e:#}");
                ExitCode::from(exit_code(kind))
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted; no output written.");
            ExitCode::from(130)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<PathBuf> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn OcrProgressCallback>)
    } else {
        None
    };

    let source = match cli.input {
        Some(ref input) => DocumentSource::Pdf(input.clone()),
        None => DocumentSource::Images(cli.images.clone()),
    };
    let config = build_config(cli, progress)?;

    let saved = extract_to_file(&source, &config)
        .await
        .context("OCR run failed")?;

    if !cli.quiet {
        for warning in &saved.warnings {
            eprintln!("{} {}", yellow("⚠"), warning);
        }
        if saved.stats.processed_pages > 0
            && saved.stats.skipped_pages == saved.stats.processed_pages
        {
            eprintln!(
                "{} all {} pages skipped: no parseable table, wrote an empty table",
                yellow("⚠"),
                saved.stats.processed_pages
            );
        }
        eprintln!(
            "   {} pages  {} rows  {} tokens in  /  {} tokens out  —  {}ms total",
            saved.stats.processed_pages,
            saved.stats.total_rows,
            dim(&saved.stats.total_prompt_tokens.to_string()),
            dim(&saved.stats.total_completion_tokens.to_string()),
            saved.stats.total_duration_ms,
        );
    }

    Ok(saved.path)
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .prompt(cli.prompt.clone())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .pages(cli.pages.clone())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .tidy_markdown(cli.tidy);

    if let Some(mode) = cli.mode {
        builder = builder.mode(mode.into());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref output) = cli.output {
        builder = builder.output(output.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn exit_code(kind: Option<ErrorKind>) -> u8 {
    match kind {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Extraction) => 3,
        Some(ErrorKind::Sink) => 4,
        Some(ErrorKind::Internal) | None => 1,
    }
}
