//! Extraction client: one page image + prompt → raw model text.
//!
//! [`ExtractionClient`] owns the mode-specific request shape (system prompt,
//! JSON response format, sampling options) and the per-call diagnostics line.
//! The actual network call goes through the [`VisionBackend`] trait so the
//! pipeline can be driven by any edgequake-llm provider ([`LlmBackend`]) or by
//! a scripted backend in tests.
//!
//! The client makes exactly one backend call per [`ExtractionClient::extract`].
//! Timeouts and retries belong to [`crate::pipeline::page`].

use crate::error::ExtractionError;
use crate::mode::Mode;
use crate::prompts::system_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Everything a backend needs for one page.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// Mode-specific system instruction.
    pub system: &'static str,
    /// Page-qualified user prompt.
    pub prompt: String,
    /// Base64 page image.
    pub image: ImageData,
    /// Mode of the run.
    pub mode: Mode,
    /// Model identifier, for backends that select the model per call.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask for a JSON-object response (Table mode).
    pub json_response: bool,
}

/// A backend's answer. Token counters are `None` when the API omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisionReply {
    pub content: Option<String>,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

/// Transport-level failure reported by a backend.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A vision-capable chat endpoint.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Send one request. Must not retry internally.
    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply, TransportError>;
}

/// [`VisionBackend`] over an edgequake-llm provider.
///
/// The provider is created for a specific model, so
/// [`VisionRequest::model`] is informational here.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl VisionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &VisionRequest) -> Result<VisionReply, TransportError> {
        let messages = vec![
            ChatMessage::system(request.system),
            ChatMessage::user_with_images(&request.prompt, vec![request.image.clone()]),
        ];
        let options = build_options(request);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(VisionReply {
            content: Some(response.content),
            prompt_tokens: Some(response.prompt_tokens as usize),
            completion_tokens: Some(response.completion_tokens as usize),
        })
    }
}

/// Build `CompletionOptions` for a request.
fn build_options(request: &VisionRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        response_format: request.json_response.then(|| "json_object".to_string()),
        ..Default::default()
    }
}

/// Raw text returned for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
    pub duration_ms: u64,
}

/// Mode-aware client around a [`VisionBackend`].
#[derive(Clone)]
pub struct ExtractionClient {
    backend: Arc<dyn VisionBackend>,
    model: Option<String>,
    temperature: f32,
    max_tokens: usize,
}

impl ExtractionClient {
    pub fn new(
        backend: Arc<dyn VisionBackend>,
        model: Option<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            backend,
            model,
            temperature,
            max_tokens,
        }
    }

    /// Send one page image with `prompt` and return the model's text.
    ///
    /// `page_num` only labels errors and diagnostics.
    ///
    /// # Errors
    /// [`ExtractionError::Transport`] when the backend fails,
    /// [`ExtractionError::EmptyResponse`] when the reply has no content or
    /// only whitespace.
    pub async fn extract(
        &self,
        page_num: usize,
        image: ImageData,
        prompt: &str,
        mode: Mode,
    ) -> Result<Extraction, ExtractionError> {
        let request = VisionRequest {
            system: system_prompt(mode),
            prompt: prompt.to_string(),
            image,
            mode,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_response: mode == Mode::Table,
        };

        let start = Instant::now();
        let reply = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| ExtractionError::Transport {
                page: page_num,
                retries: 0,
                detail: e.to_string(),
            })?;
        let elapsed = start.elapsed();

        let total_tokens = match (reply.prompt_tokens, reply.completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        };
        info!(
            "Page {}: {} call completed in {:.2}s | total_tokens={} prompt_tokens={} completion_tokens={}",
            page_num,
            self.backend.name(),
            elapsed.as_secs_f64(),
            fmt_tokens(total_tokens),
            fmt_tokens(reply.prompt_tokens),
            fmt_tokens(reply.completion_tokens),
        );

        match reply.content {
            Some(text) if !text.trim().is_empty() => Ok(Extraction {
                text,
                prompt_tokens: reply.prompt_tokens,
                completion_tokens: reply.completion_tokens,
                duration_ms: elapsed.as_millis() as u64,
            }),
            _ => Err(ExtractionError::EmptyResponse { page: page_num }),
        }
    }
}

fn fmt_tokens(n: Option<usize>) -> String {
    n.map_or_else(|| "N/A".to_string(), |n| n.to_string())
}
