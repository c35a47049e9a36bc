//! Sink: serialise a finalised [`AggregateResult`] and write it once.
//!
//! Serialisation is pure ([`render`]) and deterministic, so writing the same
//! result twice produces byte-identical files. Writing goes through a
//! uniquely named temp file in the destination directory that is persisted
//! by rename, so a destination is either absent, the previous file, or the
//! complete new output. A temp file that is not persisted is deleted.

use crate::error::OcrError;
use crate::mode::Mode;
use crate::pipeline::aggregate::{AggregateResult, PageSection};
use crate::pipeline::input::{is_url, DocumentSource};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Separator placed between Text-mode page sections.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Serialise `result` to the bytes written to disk.
pub fn render(result: &AggregateResult) -> Result<Vec<u8>, OcrError> {
    match result {
        AggregateResult::Table { columns, rows } => render_csv(columns, rows),
        AggregateResult::Text { sections } => Ok(render_markdown(sections).into_bytes()),
    }
}

/// Header row then one record per row, RFC 4180 quoting, `\n` terminators.
///
/// An empty table (no page parsed) renders as an empty file.
fn render_csv(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, OcrError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let to_internal = |e: csv::Error| OcrError::Internal(format!("CSV serialisation failed: {e}"));
    if !columns.is_empty() {
        writer.write_record(columns).map_err(to_internal)?;
    }
    for row in rows {
        writer.write_record(row).map_err(to_internal)?;
    }
    writer
        .into_inner()
        .map_err(|e| OcrError::Internal(format!("CSV serialisation failed: {e}")))
}

/// `# Page N` heading + body per section, sections separated by a rule.
pub fn render_markdown(sections: &[PageSection]) -> String {
    let body = sections
        .iter()
        .map(|s| format!("# Page {}\n\n{}", s.page_num, s.body.trim_end()))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);
    format!("{body}\n")
}

/// Write `result` to `path`, creating missing parent directories.
///
/// # Errors
/// [`OcrError::OutputWriteFailed`] if the directory or file cannot be
/// created, written or renamed into place.
pub async fn write_output(result: &AggregateResult, path: &Path) -> Result<(), OcrError> {
    let bytes = render(result)?;
    let write_failed = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let target = path.to_path_buf();
    let size = bytes.len();
    tokio::task::spawn_blocking(move || persist_atomically(&dir, &target, &bytes))
        .await
        .map_err(|e| OcrError::Internal(format!("Write task panicked: {e}")))?
        .map_err(write_failed)?;

    debug!("Wrote {} bytes to {}", size, path.display());
    info!("Saved {} output to {}", result.mode(), path.display());
    Ok(())
}

/// Write `bytes` to a fresh temp file in `dir`, then rename it onto `target`.
///
/// On any error the temp file is dropped, which deletes it.
fn persist_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".pdfocr-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Destination used when no explicit output path is configured.
///
/// `<stem>.csv` / `<stem>.md` next to a local source; in the working
/// directory for URL sources, with the stem taken from the URL's last path
/// segment (`ocr_result` when there is none). For image lists the first
/// image names the output.
pub fn default_destination(source: &DocumentSource, mode: Mode) -> PathBuf {
    let first = match source {
        DocumentSource::Pdf(input) => Some(input.as_str()),
        DocumentSource::Images(images) => images.first().map(String::as_str),
    };

    let (dir, stem) = match first {
        Some(input) if is_url(input) => (PathBuf::new(), url_stem(input)),
        Some(input) => {
            let path = Path::new(input);
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "ocr_result".to_string());
            (dir, stem)
        }
        None => (PathBuf::new(), "ocr_result".to_string()),
    };

    dir.join(format!("{stem}.{}", mode.extension()))
}

fn url_stem(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .and_then(|last| {
            Path::new(&last)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "ocr_result".to_string())
}
