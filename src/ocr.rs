//! Run entry points: one source document in, one aggregated result out.
//!
//! [`extract`] drives the whole pipeline and returns the aggregate in memory;
//! [`extract_to_file`] additionally hands it to the sink. Pages may be
//! extracted concurrently, but results are always merged in ascending page
//! order, and the first extraction failure aborts the run before anything
//! is written.

use crate::config::OcrConfig;
use crate::credentials;
use crate::error::OcrError;
use crate::mode::{resolve_mode, Mode};
use crate::output::{PageWarning, RunOutput, RunStats, SavedOutput};
use crate::pipeline::aggregate::{Aggregate, PageOutcome};
use crate::pipeline::input::{self, DocumentSource, Page};
use crate::pipeline::llm::{ExtractionClient, LlmBackend, VisionBackend};
use crate::pipeline::page::{ExtractionResult, PageProcessor};
use crate::pipeline::{encode, postprocess, sink};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Run OCR over every page of `source` and aggregate the results.
///
/// # Errors
/// * configuration errors (bad input, missing credentials, unusable PDF),
///   raised before any model call;
/// * [`OcrError::Extraction`] for the first page whose call failed, timed
///   out, or came back empty.
///
/// A Table-mode run in which no page parses still succeeds: the result is
/// an empty table and every page is listed in [`RunOutput::warnings`].
pub async fn extract(source: &DocumentSource, config: &OcrConfig) -> Result<RunOutput, OcrError> {
    let total_start = Instant::now();
    let mode = resolve_mode(config.mode, &config.prompt);
    info!("Starting {} extraction", mode);

    // ── Step 1: Resolve backend ──────────────────────────────────────────
    let backend = resolve_backend(config)?;
    debug!("Using backend: {}", backend.name());

    // ── Step 2: Prepare page images ──────────────────────────────────────
    let prepare_start = Instant::now();
    let page_set = input::load_pages(source, config).await?;
    let prepare_duration_ms = prepare_start.elapsed().as_millis() as u64;
    let total_pages = page_set.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total_pages);
    }

    // ── Step 3: Extract and merge in page order ──────────────────────────
    let client = ExtractionClient::new(
        backend,
        config.model.clone(),
        config.temperature,
        config.max_tokens,
    );
    let processor = PageProcessor::new(client, config.prompt.clone(), mode)
        .with_timeout_secs(config.api_timeout_secs)
        .with_retries(config.max_retries, config.retry_backoff_ms);
    let processor = &processor;

    let mut results = stream::iter(page_set.pages())
        .map(|page| async move { extract_page(processor, page).await })
        .buffered(config.concurrency.max(1));

    let mut state = Aggregate::new(mode);
    let mut warnings = Vec::new();
    let mut stats = RunStats {
        prepare_duration_ms,
        ..Default::default()
    };

    while let Some(result) = results.next().await {
        let result = result?;
        let page_num = result.page_num();
        stats.processed_pages += 1;
        stats.total_retries += result.retries;
        stats.total_prompt_tokens += result.prompt_tokens.unwrap_or(0) as u64;
        stats.total_completion_tokens += result.completion_tokens.unwrap_or(0) as u64;

        let body = page_body(&result, config.tidy_markdown);
        let merged = state.merge(page_num, &body)?;
        state = merged.state;

        match merged.outcome {
            PageOutcome::Rows(rows) => {
                debug!("Page {}: {} row(s) merged", page_num, rows);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_complete(page_num, total_pages, rows);
                }
            }
            PageOutcome::Section => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_complete(page_num, total_pages, 0);
                }
            }
            PageOutcome::Skipped(error) => {
                warn!("Page {}: table payload skipped: {}", page_num, error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_skipped(page_num, total_pages, &error.to_string());
                }
                warnings.push(PageWarning {
                    page: page_num,
                    error,
                });
            }
        }
    }

    stats.skipped_pages = warnings.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total_pages, stats.skipped_pages);
    }

    // ── Step 4: Finalise ─────────────────────────────────────────────────
    let result = state.finish();
    stats.total_rows = result.row_count();
    if stats.processed_pages > 0 && stats.skipped_pages == stats.processed_pages {
        warn!(
            "No page produced a parseable table ({} skipped); writing an empty table",
            stats.skipped_pages
        );
    }
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {} page(s), {} skipped, {} row(s), {}ms total",
        stats.processed_pages, stats.skipped_pages, stats.total_rows, stats.total_duration_ms
    );

    Ok(RunOutput {
        mode,
        result,
        warnings,
        stats,
    })
}

/// Run [`extract`] and write the result.
///
/// The destination is `config.output`, or
/// [`sink::default_destination`] for the source and resolved mode. Nothing
/// is written when the run fails.
pub async fn extract_to_file(
    source: &DocumentSource,
    config: &OcrConfig,
) -> Result<SavedOutput, OcrError> {
    let output = extract(source, config).await?;
    let path = config
        .output
        .clone()
        .unwrap_or_else(|| sink::default_destination(source, output.mode));

    sink::write_output(&output.result, &path).await?;

    Ok(SavedOutput {
        path,
        mode: output.mode,
        warnings: output.warnings,
        stats: output.stats,
    })
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(source: &DocumentSource, config: &OcrConfig) -> Result<RunOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(source, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn extract_page(processor: &PageProcessor, page: &Page) -> Result<ExtractionResult, OcrError> {
    let image = encode::encode_page(&page.path).await?;
    Ok(processor.process(page.page_num, image).await?)
}

/// Text handed to the aggregator. Tidying only applies to Text mode and
/// never turns a non-empty page into an empty one.
fn page_body(result: &ExtractionResult, tidy: bool) -> String {
    if tidy && result.mode() == Mode::Text {
        let tidied = postprocess::tidy_markdown(result.text());
        if !tidied.trim().is_empty() {
            return tidied;
        }
    }
    result.text().to_string()
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn VisionBackend>, OcrError> {
    let provider: Arc<dyn LLMProvider> = ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| OcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        })?;
    Ok(Arc::new(LlmBackend::new(
        provider,
        format!("{provider_name}/{model}"),
    )))
}

/// Resolve the extraction backend, from most-specific to least-specific:
///
/// 1. `config.backend`, used as-is;
/// 2. `config.provider_name` + `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI, when `OPENAI_API_KEY` is set;
/// 5. `ProviderFactory::from_env` auto-detection.
///
/// Steps 2–5 first load a nearby `.env` if no credentials are configured.
fn resolve_backend(config: &OcrConfig) -> Result<Arc<dyn VisionBackend>, OcrError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(path) = credentials::load_env_fallback() {
        info!("Loaded credentials from {}", path.display());
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, config.model.as_deref().unwrap_or(&env_model));
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(LlmBackend::new(llm_provider, "auto")))
}
