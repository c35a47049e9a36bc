//! Pipeline stages for page-by-page OCR.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ page/llm ──▶ aggregate ──▶ sink
//! (path/URL) (pdfium)  (base64)   (VLM call)  (schema/merge) (CSV/MD)
//! ```
//!
//! 1. [`input`]: resolve a PDF or image list into local page images
//! 2. [`render`]: rasterise selected PDF pages; runs in `spawn_blocking`
//! 3. [`encode`]: base64-wrap each page image for the request body
//! 4. [`page`] / [`llm`]: one bounded, optionally retried model call per
//!    page; the only stage with model I/O
//! 5. [`aggregate`]: fold page outputs in page order; [`payload`] decodes
//!    Table-mode JSON, [`postprocess`] tidies Text-mode Markdown
//! 6. [`sink`]: serialise the result and write it once

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod llm;
pub mod page;
pub mod payload;
pub mod postprocess;
pub mod render;
pub mod sink;
