//! Output types returned by the extraction entry points.

use crate::mode::Mode;
use crate::pipeline::aggregate::AggregateResult;
use crate::pipeline::payload::PayloadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result of a completed run, before it is written anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Mode the run executed in.
    pub mode: Mode,

    /// Aggregated table or page sections.
    pub result: AggregateResult,

    /// Table-mode pages whose payload was skipped, in page order.
    pub warnings: Vec<PageWarning>,

    /// Run statistics.
    pub stats: RunStats,
}

/// A page that answered but contributed no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWarning {
    /// 1-indexed page number.
    pub page: usize,
    pub error: PayloadError,
}

impl fmt::Display for PageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} skipped: {}", self.page, self.error)
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages sent to the model.
    pub processed_pages: usize,

    /// Table-mode pages whose payload was rejected.
    pub skipped_pages: usize,

    /// Rows in the final table (0 in Text mode).
    pub total_rows: usize,

    /// Prompt tokens over every page that reported them.
    pub total_prompt_tokens: u64,

    /// Completion tokens over every page that reported them.
    pub total_completion_tokens: u64,

    /// Retries spent across all pages.
    pub total_retries: u32,

    /// Time spent preparing page images (download + rasterise).
    pub prepare_duration_ms: u64,

    /// Wall-clock time for the whole run.
    pub total_duration_ms: u64,
}

/// Where a run's output landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedOutput {
    pub path: PathBuf,
    pub mode: Mode,
    pub warnings: Vec<PageWarning>,
    pub stats: RunStats,
}
