//! Input resolution: turn a user-supplied source into an ordered page set.
//!
//! Two kinds of source:
//!
//! * a PDF (local path or URL): downloaded if needed, validated by its
//!   `%PDF` magic bytes, then rasterised into the run's scratch directory by
//!   [`crate::pipeline::render`];
//! * a list of page images (local paths or URLs): validated up front and
//!   used in the given order; remote images are downloaded into scratch.
//!
//! The scratch directory is a [`TempDir`] owned by [`PageSet`]. Dropping the
//! page set deletes every rendered or downloaded file, whether the run
//! succeeded, failed, or was cancelled.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::pipeline::encode::mime_for_path;
use crate::pipeline::render;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// What a run reads pages from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A PDF file path or HTTP/HTTPS URL.
    Pdf(String),
    /// Already-rasterised page images (paths or URLs), in page order.
    Images(Vec<String>),
}

/// One page image on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-indexed position within the document.
    pub page_num: usize,
    /// Image file, inside the scratch directory or supplied by the user.
    pub path: PathBuf,
}

/// Ordered pages of one run plus the scratch directory backing them.
#[derive(Debug)]
pub struct PageSet {
    pages: Vec<Page>,
    scratch: TempDir,
}

impl PageSet {
    /// Pages in ascending page order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Scratch directory; deleted when the page set is dropped.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `source` into local page images.
///
/// Every failure here is a configuration error and happens before any
/// model call.
pub async fn load_pages(source: &DocumentSource, config: &OcrConfig) -> Result<PageSet, OcrError> {
    let scratch = tempfile::Builder::new()
        .prefix("pdfocr-")
        .tempdir()
        .map_err(|e| OcrError::Internal(format!("Failed to create scratch directory: {e}")))?;
    debug!("Scratch directory: {}", scratch.path().display());

    let pages = match source {
        DocumentSource::Pdf(input) => {
            let pdf_path = if is_url(input) {
                download_pdf(input, scratch.path(), config.download_timeout_secs).await?
            } else {
                resolve_local_pdf(input)?
            };
            render::render_pages(&pdf_path, scratch.path(), config).await?
        }
        DocumentSource::Images(images) => {
            resolve_images(images, scratch.path(), config.download_timeout_secs).await?
        }
    };

    info!("Prepared {} page image(s)", pages.len());
    Ok(PageSet { pages, scratch })
}

/// Validate a local PDF: exists, readable, `%PDF` magic.
fn resolve_local_pdf(path_str: &str) -> Result<PathBuf, OcrError> {
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(OcrError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(OcrError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrError::PermissionDenied { path });
        }
        Err(_) => return Err(OcrError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Validate local images and download remote ones, keeping input order.
async fn resolve_images(
    images: &[String],
    scratch: &Path,
    timeout_secs: u64,
) -> Result<Vec<Page>, OcrError> {
    if images.is_empty() {
        return Err(OcrError::NoImages);
    }

    let mut pages = Vec::with_capacity(images.len());
    for (i, raw) in images.iter().enumerate() {
        let raw = raw.trim();
        let page_num = i + 1;
        let path = if is_url(raw) {
            let (bytes, content_type) = download(raw, timeout_secs).await?;
            let ext = image_extension(raw, content_type.as_deref()).ok_or_else(|| {
                OcrError::UnsupportedImage {
                    path: PathBuf::from(raw),
                }
            })?;
            let target = scratch.join(format!("page_{page_num}.{ext}"));
            tokio::fs::write(&target, &bytes)
                .await
                .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {e}")))?;
            target
        } else {
            let path = PathBuf::from(raw);
            if !path.is_file() {
                return Err(OcrError::FileNotFound { path });
            }
            if mime_for_path(&path).is_none() {
                return Err(OcrError::UnsupportedImage { path });
            }
            path
        };
        pages.push(Page { page_num, path });
    }
    Ok(pages)
}

/// Pick a file extension for a downloaded image: URL path first, then the
/// `Content-Type` header.
fn image_extension(url: &str, content_type: Option<&str>) -> Option<&'static str> {
    let from_url = reqwest::Url::parse(url).ok().and_then(|u| {
        let path = PathBuf::from(u.path());
        mime_for_path(&path).map(|mime| extension_for_mime(mime))
    });
    from_url.or_else(|| {
        let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "image/png" => Some("png"),
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/gif" => Some("gif"),
            "image/webp" => Some("webp"),
            _ => None,
        }
    })
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Download a PDF URL into `scratch` and validate its magic bytes.
async fn download_pdf(url: &str, scratch: &Path, timeout_secs: u64) -> Result<PathBuf, OcrError> {
    info!("Downloading PDF from: {}", url);
    let (bytes, _) = download(url, timeout_secs).await?;

    let file_path = scratch.join(pdf_filename(url));
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(OcrError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {e}")))?;
    info!("Downloaded to: {}", file_path.display());
    Ok(file_path)
}

/// GET `url`, returning the body and its `Content-Type`.
async fn download(url: &str, timeout_secs: u64) -> Result<(Vec<u8>, Option<String>), OcrError> {
    let failed = |reason: String| OcrError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    Ok((bytes.to_vec(), content_type))
}

/// Filename for a downloaded PDF, from the URL's last path segment.
fn pdf_filename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OcrConfig {
        OcrConfig::builder().prompt("x").build().unwrap()
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn pdf_filename_from_url() {
        assert_eq!(pdf_filename("https://x.org/a/report.pdf"), "report.pdf");
        assert_eq!(pdf_filename("https://arxiv.org/pdf/1706"), "downloaded.pdf");
    }

    #[test]
    fn image_extension_prefers_url_then_header() {
        assert_eq!(image_extension("https://x.org/p.JPG", None), Some("jpg"));
        assert_eq!(
            image_extension("https://x.org/render?id=3", Some("image/webp; q=1")),
            Some("webp")
        );
        assert_eq!(image_extension("https://x.org/blob", Some("text/html")), None);
    }

    #[tokio::test]
    async fn empty_image_list_is_rejected() {
        let err = load_pages(&DocumentSource::Images(vec![]), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::NoImages));
    }

    #[tokio::test]
    async fn missing_and_unsupported_images_are_rejected() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.png");
        let err = load_pages(
            &DocumentSource::Images(vec![missing.to_string_lossy().into()]),
            &config(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));

        let txt = dir.path().join("page.txt");
        std::fs::write(&txt, "hello").unwrap();
        let err = load_pages(
            &DocumentSource::Images(vec![txt.to_string_lossy().into()]),
            &config(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedImage { .. }));
    }

    #[tokio::test]
    async fn local_images_keep_order_and_scratch_is_cleaned() {
        let dir = TempDir::new().unwrap();
        let names = ["b.png", "a.jpg"];
        for n in names {
            std::fs::write(dir.path().join(n), b"img").unwrap();
        }
        let images = names
            .iter()
            .map(|n| dir.path().join(n).to_string_lossy().into_owned())
            .collect();

        let set = load_pages(&DocumentSource::Images(images), &config())
            .await
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.pages()[0].page_num, 1);
        assert!(set.pages()[0].path.ends_with("b.png"));
        assert!(set.pages()[1].path.ends_with("a.jpg"));

        let scratch = set.scratch_dir().to_path_buf();
        assert!(scratch.exists());
        drop(set);
        assert!(!scratch.exists());
    }

    #[test]
    fn non_pdf_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake.pdf");
        std::fs::write(&fake, b"PK\x03\x04zip").unwrap();
        let err = resolve_local_pdf(&fake.to_string_lossy()).unwrap_err();
        assert!(matches!(err, OcrError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
        assert!(matches!(
            resolve_local_pdf("/definitely/not/here.pdf"),
            Err(OcrError::FileNotFound { .. })
        ));
    }
}
