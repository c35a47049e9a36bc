//! Output mode: structured table (CSV) or free text (Markdown).
//!
//! The mode is decided once per run, before any page is rendered, and never
//! changes afterwards. It selects the system prompt, the response format
//! requested from the model, the aggregation algorithm and the output format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Run-wide extraction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// JSON table per page, aggregated into one CSV file.
    Table,
    /// Markdown per page, concatenated into one Markdown file.
    Text,
}

impl Mode {
    /// File extension of the output written for this mode.
    pub fn extension(self) -> &'static str {
        match self {
            Mode::Table => "csv",
            Mode::Text => "md",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Table => f.write_str("table"),
            Mode::Text => f.write_str("text"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "csv" => Ok(Mode::Table),
            "text" | "markdown" | "md" => Ok(Mode::Text),
            other => Err(format!("unknown mode '{other}' (expected 'table' or 'text')")),
        }
    }
}

/// Decide the run's mode.
///
/// An explicit override always wins. Otherwise the prompt is scanned: any
/// mention of "table" or "csv" (case-insensitive) selects [`Mode::Table`],
/// everything else falls back to [`Mode::Text`].
pub fn resolve_mode(explicit: Option<Mode>, prompt: &str) -> Mode {
    if let Some(mode) = explicit {
        return mode;
    }
    let lowered = prompt.to_lowercase();
    if lowered.contains("table") || lowered.contains("csv") {
        Mode::Table
    } else {
        Mode::Text
    }
}
