//! # edgequake-pdfocr
//!
//! Page-by-page OCR of PDF documents (or page images) with Vision Language
//! Models, aggregated into one CSV table or one Markdown file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / images
//!  │
//!  ├─ 1. Mode     table or text, explicit or inferred from the prompt
//!  ├─ 2. Input    resolve local files or download URLs into a run temp dir
//!  ├─ 3. Render   rasterise PDF pages via pdfium (spawn_blocking)
//!  ├─ 4. Extract  one bounded VLM call per page, page-qualified prompt
//!  ├─ 5. Merge    fold pages in order: first table fixes the schema,
//!  │              later pages are projected onto it
//!  └─ 6. Sink     write <stem>.csv or <stem>.md once
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfocr::{extract_to_file, DocumentSource, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = OcrConfig::builder()
//!         .prompt("Extract the invoice line items as a table")
//!         .build()?;
//!     let source = DocumentSource::Pdf("invoices.pdf".into());
//!     let saved = extract_to_file(&source, &config).await?;
//!     println!("{} rows → {}", saved.stats.total_rows, saved.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod error;
pub mod mode;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder, PageSelection};
pub use error::{ErrorKind, ExtractionError, OcrError};
pub use mode::{resolve_mode, Mode};
pub use ocr::{extract, extract_sync, extract_to_file};
pub use output::{PageWarning, RunOutput, RunStats, SavedOutput};
pub use pipeline::aggregate::{Aggregate, AggregateResult, Merged, PageOutcome, PageSection};
pub use pipeline::input::DocumentSource;
pub use pipeline::llm::{LlmBackend, TransportError, VisionBackend, VisionReply, VisionRequest};
pub use pipeline::payload::PayloadError;
pub use pipeline::sink::{default_destination, write_output};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
