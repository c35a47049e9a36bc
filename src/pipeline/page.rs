//! Page processor: qualify the prompt, bound the call, retry if configured.
//!
//! ## Retry strategy
//!
//! Retries are off by default (`max_retries = 0`). When enabled, a failed or
//! timed-out call is retried after `retry_backoff_ms * 2^(attempt-1)`, so with
//! a 500 ms base the waits are 500 ms → 1 s → 2 s. A single wait never
//! exceeds [`MAX_BACKOFF_MS`]. The aggregator never sees retries: it receives
//! either one [`ExtractionResult`] or the last error.

use crate::error::ExtractionError;
use crate::mode::Mode;
use crate::pipeline::llm::ExtractionClient;
use crate::prompts::page_prompt;
use edgequake_llm::ImageData;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Upper bound for one backoff wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// The model's raw answer for one page.
///
/// Construction goes through [`ExtractionResult::new`], which refuses an
/// empty or whitespace-only payload, so every value of this type carries text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    page_num: usize,
    mode: Mode,
    text: String,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    pub duration_ms: u64,
    pub retries: u32,
}

impl ExtractionResult {
    /// Wrap raw text for `page_num`, rejecting empty payloads.
    pub fn new(page_num: usize, mode: Mode, text: impl Into<String>) -> Result<Self, ExtractionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyResponse { page: page_num });
        }
        Ok(Self {
            page_num,
            mode,
            text,
            prompt_tokens: None,
            completion_tokens: None,
            duration_ms: 0,
            retries: 0,
        })
    }

    /// 1-indexed page ordinal.
    pub fn page_num(&self) -> usize {
        self.page_num
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Raw model text, never empty.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Drives the [`ExtractionClient`] for each page of a run.
#[derive(Clone)]
pub struct PageProcessor {
    client: ExtractionClient,
    prompt: String,
    mode: Mode,
    api_timeout_secs: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl PageProcessor {
    pub fn new(client: ExtractionClient, prompt: impl Into<String>, mode: Mode) -> Self {
        Self {
            client,
            prompt: prompt.into(),
            mode,
            api_timeout_secs: 60,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.api_timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Wait before retry number `attempt` (1-based), saturating at
    /// [`MAX_BACKOFF_MS`].
    fn backoff_ms(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.retry_backoff_ms.checked_mul(factor))
            .unwrap_or(if self.retry_backoff_ms == 0 { 0 } else { u64::MAX })
            .min(MAX_BACKOFF_MS)
    }

    /// Extract one page.
    ///
    /// Propagates the last [`ExtractionError`] once retries are exhausted.
    pub async fn process(
        &self,
        page_num: usize,
        image: ImageData,
    ) -> Result<ExtractionResult, ExtractionError> {
        let prompt = page_prompt(page_num, &self.prompt);
        let limit = Duration::from_secs(self.api_timeout_secs);

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let backoff = self.backoff_ms(attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let outcome = match timeout(
                limit,
                self.client.extract(page_num, image.clone(), &prompt, self.mode),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::Timeout {
                    page: page_num,
                    secs: self.api_timeout_secs,
                }),
            };

            match outcome {
                Ok(extraction) => {
                    debug!(
                        "Page {}: {} bytes of {} output",
                        page_num,
                        extraction.text.len(),
                        self.mode
                    );
                    let mut result = ExtractionResult::new(page_num, self.mode, extraction.text)?;
                    result.prompt_tokens = extraction.prompt_tokens;
                    result.completion_tokens = extraction.completion_tokens;
                    result.duration_ms = extraction.duration_ms;
                    result.retries = attempt;
                    return Ok(result);
                }
                Err(e) if attempt < self.max_retries => {
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                    attempt += 1;
                }
                Err(ExtractionError::Transport { page, detail, .. }) => {
                    return Err(ExtractionError::Transport {
                        page,
                        retries: attempt,
                        detail,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }
}
