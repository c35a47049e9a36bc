//! PDF rasterisation: render selected pages to PNG files via pdfium.
//!
//! pdfium is not safe to drive from async worker threads, so the whole
//! load-and-render pass runs inside `tokio::task::spawn_blocking`. Each page
//! is rendered at `dpi`, then capped so neither edge exceeds
//! `max_rendered_pixels`, and written as `page_<n>.png` into the run's
//! scratch directory.

use crate::config::{OcrConfig, PageSelection};
use crate::error::OcrError;
use crate::pipeline::input::Page;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the pdfium shared library (or its directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise the selected pages of `pdf_path` into `scratch`.
pub async fn render_pages(
    pdf_path: &Path,
    scratch: &Path,
    config: &OcrConfig,
) -> Result<Vec<Page>, OcrError> {
    let path = pdf_path.to_path_buf();
    let out_dir = scratch.to_path_buf();
    let selection = config.pages.clone();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(
            &path,
            &out_dir,
            &selection,
            dpi,
            max_pixels,
            password.as_deref(),
        )
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` (file or directory) first, then the
/// system library.
fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(raw) if !raw.trim().is_empty() => {
            let candidate = PathBuf::from(raw.trim());
            let lib = if candidate.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&candidate)
            } else {
                candidate
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
                .map_err(|e| OcrError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)))?
        }
        _ => Pdfium::bind_to_system_library()
            .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?,
    };
    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    selection: &PageSelection,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<Page>, OcrError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(OcrError::NoPagesSelected { total: total_pages });
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(indices.len());
    for idx in indices {
        let page_num = idx + 1;
        let rasterisation_failed = |detail: String| OcrError::RasterisationFailed {
            page: page_num,
            detail,
        };

        let page = pages
            .get(idx as u16)
            .map_err(|e| rasterisation_failed(format!("{:?}", e)))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| rasterisation_failed(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        let target = out_dir.join(format!("page_{page_num}.png"));
        image
            .save_with_format(&target, ImageFormat::Png)
            .map_err(|e| rasterisation_failed(e.to_string()))?;
        debug!(
            "Rendered page {} → {}x{} px ({})",
            page_num,
            image.width(),
            image.height(),
            target.display()
        );

        rendered.push(Page {
            page_num,
            path: target,
        });
    }

    Ok(rendered)
}

/// Map a pdfium load failure onto the password / corrupt-file errors.
fn load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> OcrError {
    let detail = format!("{:?}", e);
    let path = pdf_path.to_path_buf();
    if detail.to_lowercase().contains("password") {
        if password.is_some() {
            OcrError::WrongPassword { path }
        } else {
            OcrError::PasswordRequired { path }
        }
    } else {
        OcrError::CorruptPdf { path, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_classified() {
        let path = Path::new("locked.pdf");
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            load_error(path, None, err),
            OcrError::PasswordRequired { .. }
        ));

        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            load_error(path, Some("guess"), err),
            OcrError::WrongPassword { .. }
        ));

        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(matches!(
            load_error(path, None, err),
            OcrError::CorruptPdf { .. }
        ));
    }
}
