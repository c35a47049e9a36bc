//! System prompts and per-page prompt qualification.
//!
//! Every instruction sent to the model lives here so prompt changes never
//! touch retry or aggregation logic, and unit tests can inspect the exact
//! strings without a live model.

use crate::mode::Mode;

/// System instruction for [`Mode::Table`].
///
/// The aggregator accepts the `{columns, rows}` object this prompt asks for,
/// and also a bare list of records, which some models return regardless.
pub const TABLE_SYSTEM_PROMPT: &str = "You are an OCR specialist. Extract the tabular data visible in the \
image and respond with a single JSON object holding a 'columns' array of column names and a 'rows' array. \
Every entry in 'rows' must be an array with exactly the same length and ordering as 'columns'. \
Use strings for all cell values and an empty string for empty cells. Output JSON only.";

/// System instruction for [`Mode::Text`].
pub const TEXT_SYSTEM_PROMPT: &str = "You are an OCR specialist. Extract the textual content of the image \
and respond in clean Markdown, using headings, lists, tables and code fences where the layout calls for \
them. Preserve the reading order. Output only the Markdown content, without commentary.";

/// Pick the system instruction for a mode.
pub fn system_prompt(mode: Mode) -> &'static str {
    match mode {
        Mode::Table => TABLE_SYSTEM_PROMPT,
        Mode::Text => TEXT_SYSTEM_PROMPT,
    }
}

/// Qualify the run-wide prompt with the page ordinal (1-indexed).
pub fn page_prompt(page_num: usize, prompt: &str) -> String {
    format!("This is page {page_num} of a document. {prompt}")
}
