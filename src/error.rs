//! Error types for the edgequake-pdfocr library.
//!
//! Three layers of failure, from most to least severe:
//!
//! * [`OcrError`] (fatal): the run cannot produce an output file. Every
//!   variant maps onto one [`ErrorKind`] (configuration, extraction, sink)
//!   so the CLI can report the failure class and pick an exit code.
//!
//! * [`ExtractionError`]: a single page's remote call failed, returned no
//!   content, or timed out. Wrapped into [`OcrError::Extraction`] and treated
//!   as run-fatal: a transport failure means the model never saw the page.
//!
//! * [`crate::pipeline::payload::PayloadError`]: the model answered, but the
//!   answer is not a usable table. Recovered locally by the aggregator as a
//!   [`crate::output::PageWarning`]; the page contributes zero rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure class of an [`OcrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input, missing credentials, unusable document. Raised before any
    /// remote call is made.
    Configuration,
    /// A remote extraction call failed, or nothing usable was extracted.
    Extraction,
    /// The destination could not be created or written.
    Sink,
    /// Unexpected internal failure (task panics and the like).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Sink => "sink",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the edgequake-pdfocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document or image was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Image mode was requested with an empty image list.
    #[error("At least one page image must be supplied.")]
    NoImages,

    /// The image extension does not map to a MIME type the model accepts.
    #[error("Unsupported image type for '{path}'\nUse a .png, .jpg, .jpeg, .gif or .webp file.")]
    UnsupportedImage { path: PathBuf },

    /// A page image could not be read back from disk.
    #[error("Failed to read page image '{path}': {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection matched no pages (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// A page's remote call failed. Aborts the run.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    // ── Sink errors ───────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::FileNotFound { .. }
            | OcrError::PermissionDenied { .. }
            | OcrError::InvalidInput { .. }
            | OcrError::DownloadFailed { .. }
            | OcrError::DownloadTimeout { .. }
            | OcrError::NotAPdf { .. }
            | OcrError::NoImages
            | OcrError::UnsupportedImage { .. }
            | OcrError::UnreadableImage { .. }
            | OcrError::CorruptPdf { .. }
            | OcrError::PasswordRequired { .. }
            | OcrError::WrongPassword { .. }
            | OcrError::NoPagesSelected { .. }
            | OcrError::RasterisationFailed { .. }
            | OcrError::PdfiumBindingFailed(_)
            | OcrError::ProviderNotConfigured { .. }
            | OcrError::InvalidConfig(_) => ErrorKind::Configuration,
            OcrError::Extraction(_) => ErrorKind::Extraction,
            OcrError::OutputWriteFailed { .. } => ErrorKind::Sink,
            OcrError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A single page's extraction call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    /// Transport, authentication or API-level failure.
    #[error("Page {page}: remote call failed after {retries} retries: {detail}")]
    Transport {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The call succeeded but carried no message content.
    #[error("Page {page}: empty response received from the model")]
    EmptyResponse { page: usize },

    /// The call exceeded the per-call timeout.
    #[error("Page {page}: remote call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

impl ExtractionError {
    /// 1-indexed page the failure belongs to.
    pub fn page(&self) -> usize {
        match self {
            ExtractionError::Transport { page, .. }
            | ExtractionError::EmptyResponse { page }
            | ExtractionError::Timeout { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_errors_are_extraction_kind() {
        let e: OcrError = ExtractionError::EmptyResponse { page: 1 }.into();
        assert_eq!(e.kind(), ErrorKind::Extraction);
        assert!(e.to_string().contains("Page 1"), "got: {e}");
    }

    #[test]
    fn missing_provider_is_configuration_kind() {
        let e = OcrError::ProviderNotConfigured {
            provider: "auto".into(),
            hint: "set OPENAI_API_KEY".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn write_failure_is_sink_kind() {
        let e = OcrError::OutputWriteFailed {
            path: PathBuf::from("/readonly/out.csv"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(e.kind(), ErrorKind::Sink);
        assert_eq!(e.kind().to_string(), "sink");
    }

    #[test]
    fn timeout_display() {
        let e = ExtractionError::Timeout { page: 3, secs: 60 };
        assert_eq!(e.page(), 3);
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn transport_display_mentions_retries() {
        let e = ExtractionError::Transport {
            page: 2,
            retries: 0,
            detail: "401 unauthorized".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"), "got: {msg}");
        assert!(msg.contains("401 unauthorized"), "got: {msg}");
    }
}
