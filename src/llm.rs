//! LLM Gateway: a capability for producing an assistant turn, streamed or
//! whole, optionally with tool definitions. The one concrete implementation
//! here speaks the OpenAI-compatible chat-completions wire format over
//! HTTP/SSE.

use crate::domain::ChatMessage;
use crate::error::{Error, Result};
use crate::retry::{retry_with_backoff_conditional, RetryConfig};
use crate::wire::{build_request, LlmStreamChunk, ToolCallAggregator, WireChunk};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<LlmStreamChunk>> + Send>>;

/// Wraps an already-assembled assistant message as a one-chunk stream, for
/// `LlmProvider` implementations (test doubles, non-streaming backends) that
/// only ever produce a whole turn at once.
pub fn stream_from_message(message: &ChatMessage) -> ChunkStream {
    let is_tool_call = message.tool_calls.is_some();
    let chunk = LlmStreamChunk {
        content: message.content.clone(),
        tool_calls: message.tool_calls.clone().unwrap_or_default(),
        finish_reason: Some(if is_tool_call { "tool_calls" } else { "stop" }.to_string()),
        is_complete: true,
    };
    Box::pin(futures::stream::once(async move { Ok(chunk) }))
}

/// Capability boundary for "something that can produce an LLM turn". Two
/// instances are constructed by the orchestrator: the Planner LLM (tool
/// calling, streamed) and the Validator LLM (single-shot, used by the LLM
/// Block Validator, Summarizer, and Referencing Agent).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<serde_json::Value>>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChunkStream>;

    /// Single fully-assembled assistant turn; implementations are free to
    /// build this atop `generate_stream` or a dedicated non-streaming call.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<serde_json::Value>>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChatMessage>;

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str;
}

/// HTTP client for one OpenAI-compatible endpoint.
pub struct HttpLlmProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RetryConfig::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_builder(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(self.endpoint()).json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<serde_json::Value>>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChunkStream> {
        let request = build_request(&self.model, messages, tools, temperature, max_tokens, true);
        let body = serde_json::to_value(&request)?;

        let response = retry_with_backoff_conditional(self.retry.clone(), || async {
            let response = self
                .request_builder(&body)
                .send()
                .await
                .map_err(|e| Error::llm_provider(&self.model, e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                tracing::warn!(model = %self.model, %status, "llm gateway returned an error response");
                return Err(Error::llm_provider(
                    &self.model,
                    format!("status {status}: {text}"),
                ));
            }
            Ok(response)
        })
        .await?;

        Ok(parse_sse_stream(response))
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<serde_json::Value>>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChatMessage> {
        let mut stream = self
            .generate_stream(messages, tools, temperature, max_tokens)
            .await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(ref text) = chunk.content {
                content.push_str(&text);
            }
            if chunk.has_tool_calls() {
                tool_calls = chunk.tool_calls;
            }
        }

        Ok(crate::wire::assistant_message_from_parts(
            if content.is_empty() { None } else { Some(content) },
            tool_calls,
        ))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Parses an SSE response body into a stream of assembled [`LlmStreamChunk`]s,
/// maintaining one [`ToolCallAggregator`] across the whole response.
fn parse_sse_stream(response: reqwest::Response) -> ChunkStream {
    let mut aggregator = ToolCallAggregator::new();
    let stream = response.bytes_stream().filter_map(move |result| {
        let chunk_result = (|| -> Result<Option<LlmStreamChunk>> {
            let bytes = result.map_err(Error::Http)?;
            let text = String::from_utf8_lossy(&bytes).to_string();

            for line in text.lines() {
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                let chunk: WireChunk = serde_json::from_str(data)
                    .map_err(|e| Error::llm_provider("stream", format!("failed to parse chunk: {e}")))?;
                return Ok(Some(aggregator.process_chunk(chunk)));
            }
            Ok(None)
        })();

        async move {
            match chunk_result {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let provider = HttpLlmProvider::new("http://localhost:8000/v1/", "key", "model");
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn model_name_reports_constructed_model() {
        let provider = HttpLlmProvider::new("http://x", "", "my-model");
        assert_eq!(provider.model_name(), "my-model");
    }
}
