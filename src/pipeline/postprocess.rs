//! Post-processing: deterministic cleanup of model output.
//!
//! Two consumers:
//!
//! * Table mode calls [`strip_code_fences`] before JSON decoding. Models wrap
//!   JSON in ```` ```json ```` fences even when asked for a JSON object.
//! * Text mode calls [`tidy_markdown`] on each page when
//!   [`crate::config::OcrConfig::tidy_markdown`] is set. Without it the page
//!   body is kept verbatim.
//!
//! Each rule is a pure `&str → String` function so it can be tested on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the Markdown tidy rules, in order:
///
/// 1. Strip an outer code fence wrapping the whole page
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. End with exactly one newline
pub fn tidy_markdown(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n```\s*$").expect("valid fence regex")
});

/// Remove a single code fence (```` ``` ````, ```` ```json ````,
/// ```` ```markdown ````, …) wrapping the entire input. Inner fences and
/// unfenced input are returned unchanged.
pub fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Ensure a single final newline ────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    format!("{}\n", input.trim_end())
}
