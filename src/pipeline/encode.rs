//! Image encoding: page image file → base64 `ImageData`.
//!
//! Files are sent as-is; only the MIME type is derived, from the extension.
//! `detail: "high"` keeps fine print and small table cells legible to
//! GPT-4-class models.

use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// MIME type for a supported page image, or `None`.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Read a page image and wrap it for the vision API.
pub async fn encode_page(path: &Path) -> Result<ImageData, OcrError> {
    let mime = mime_for_path(path).ok_or_else(|| OcrError::UnsupportedImage {
        path: path.to_path_buf(),
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| OcrError::UnreadableImage {
            path: path.to_path_buf(),
            source,
        })?;

    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());

    Ok(ImageData::new(b64, mime).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn mime_types_by_extension() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(mime_for_path(Path::new("a.tiff")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }

    #[test]
    fn encode_small_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page_1.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
            .save(&path)
            .unwrap();

        let data = tokio_test::block_on(encode_page(&path)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, std::fs::read(&path).unwrap());
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = tokio_test::block_on(encode_page(Path::new("/no/such/page.png"))).unwrap_err();
        assert!(matches!(err, OcrError::UnreadableImage { .. }));
    }
}
