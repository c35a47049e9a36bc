//! Aggregation: fold per-page model output into one result.
//!
//! The running state is a plain value threaded through [`Aggregate::merge`]:
//! each call consumes the previous state and returns the next one, so the
//! merge step can be tested page by page and the caller decides the order
//! (always ascending page number).
//!
//! ## Table mode
//!
//! The schema is a two-state machine:
//!
//! ```text
//!            first parseable page
//!  Unset ───────────────────────────▶ Set(columns)   (never changes again)
//! ```
//!
//! Every page's rows are projected onto the schema (see
//! [`TablePayload::project`]); later pages can neither widen nor reorder it.
//! A page whose payload does not decode contributes zero rows and yields
//! [`PageOutcome::Skipped`]; the run goes on. If no page parses at all the
//! schema stays unset and the run finishes with an empty table.
//!
//! ## Text mode
//!
//! Each page becomes one [`PageSection`], kept in merge order.

use crate::error::ExtractionError;
use crate::mode::Mode;
use crate::pipeline::payload::{decode_table, PayloadError, TablePayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Schema of a Table-mode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaState {
    /// No page has produced a parseable table yet.
    Unset,
    /// Established by the first parseable page; fixed for the run.
    Set(Vec<String>),
}

/// Running state of a Table-mode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAccumulator {
    schema: SchemaState,
    rows: Vec<Vec<String>>,
}

impl TableAccumulator {
    pub fn schema(&self) -> &SchemaState {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn merge(self, page_num: usize, raw: &str) -> (Self, PageOutcome) {
        let TableAccumulator { schema, mut rows } = self;

        let payload: TablePayload = match decode_table(raw) {
            Ok(payload) => payload,
            Err(e) => {
                return (TableAccumulator { schema, rows }, PageOutcome::Skipped(e))
            }
        };

        let columns = match schema {
            SchemaState::Unset => {
                let columns = payload.columns();
                debug!("Page {}: table schema established {:?}", page_num, columns);
                columns
            }
            SchemaState::Set(columns) => columns,
        };

        let projected = payload.project(&columns);
        let added = projected.len();
        rows.extend(projected);

        (
            TableAccumulator {
                schema: SchemaState::Set(columns),
                rows,
            },
            PageOutcome::Rows(added),
        )
    }
}

/// One page of a Text-mode result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSection {
    /// 1-indexed page number shown in the section heading.
    pub page_num: usize,
    /// Markdown body as returned by the model.
    pub body: String,
}

/// Running state of a Text-mode run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAccumulator {
    sections: Vec<PageSection>,
}

impl TextAccumulator {
    pub fn sections(&self) -> &[PageSection] {
        &self.sections
    }

    fn merge(mut self, page_num: usize, body: &str) -> (Self, PageOutcome) {
        self.sections.push(PageSection {
            page_num,
            body: body.to_string(),
        });
        (self, PageOutcome::Section)
    }
}

/// What a single merge did with its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Table mode: this many rows were added.
    Rows(usize),
    /// Text mode: one section was appended.
    Section,
    /// Table mode: payload rejected, zero rows added.
    Skipped(PayloadError),
}

/// Result of [`Aggregate::merge`]: the next state plus the page's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub state: Aggregate,
    pub outcome: PageOutcome,
}

/// Running aggregation state for a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Table(TableAccumulator),
    Text(TextAccumulator),
}

impl Aggregate {
    /// Empty state for `mode`.
    pub fn new(mode: Mode) -> Self {
        match mode {
            Mode::Table => Aggregate::Table(TableAccumulator {
                schema: SchemaState::Unset,
                rows: Vec::new(),
            }),
            Mode::Text => Aggregate::Text(TextAccumulator::default()),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Aggregate::Table(_) => Mode::Table,
            Aggregate::Text(_) => Mode::Text,
        }
    }

    /// Fold one page's raw model output into the state.
    ///
    /// Callers must merge pages in ascending page order: the first parseable
    /// page fixes the table schema.
    ///
    /// # Errors
    /// [`ExtractionError::EmptyResponse`] for an empty or whitespace-only
    /// payload, in either mode.
    pub fn merge(self, page_num: usize, raw: &str) -> Result<Merged, ExtractionError> {
        if raw.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse { page: page_num });
        }
        let (state, outcome) = match self {
            Aggregate::Table(acc) => {
                let (acc, outcome) = acc.merge(page_num, raw);
                (Aggregate::Table(acc), outcome)
            }
            Aggregate::Text(acc) => {
                let (acc, outcome) = acc.merge(page_num, raw);
                (Aggregate::Text(acc), outcome)
            }
        };
        Ok(Merged { state, outcome })
    }

    /// Freeze the state into the result handed to the sink.
    ///
    /// A Table-mode run that never established a schema yields an empty
    /// table: no columns and no rows.
    pub fn finish(self) -> AggregateResult {
        match self {
            Aggregate::Table(TableAccumulator { schema, rows }) => match schema {
                SchemaState::Set(columns) => AggregateResult::Table { columns, rows },
                SchemaState::Unset => AggregateResult::Table {
                    columns: Vec::new(),
                    rows,
                },
            },
            Aggregate::Text(TextAccumulator { sections }) => AggregateResult::Text { sections },
        }
    }
}

/// Finalised, read-only result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AggregateResult {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Text {
        sections: Vec<PageSection>,
    },
}

impl AggregateResult {
    pub fn mode(&self) -> Mode {
        match self {
            AggregateResult::Table { .. } => Mode::Table,
            AggregateResult::Text { .. } => Mode::Text,
        }
    }

    /// Table rows, or 0 in Text mode.
    pub fn row_count(&self) -> usize {
        match self {
            AggregateResult::Table { rows, .. } => rows.len(),
            AggregateResult::Text { .. } => 0,
        }
    }
}
