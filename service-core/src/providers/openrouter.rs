//! OpenRouter provider implementation.
//!
//! Speaks the OpenAI-compatible `/chat/completions` API, so any compatible
//! gateway works by pointing `OPENROUTER_BASE_URL` at it. Streaming responses
//! arrive as server-sent events (`data: {chunk}` lines, `data: [DONE]` last).

use super::{
    ChatCompletion, ChatMessage, ChatProvider, ChatStream, FinishReason, GenerationParams,
    ProviderError, StreamChunk,
};
use crate::config::{get_env, get_optional_env, get_optional_parsed, is_prod};
use crate::error::AppError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// OpenRouter API base URL.
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Placeholder key the story app runs with when none is configured.
pub const DEMO_API_KEY: &str = "demo";

const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_REFERER: &str = "http://localhost:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    pub model: String,
    /// Sent as `HTTP-Referer`; OpenRouter uses it for app attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub app_title: Option<String>,
    pub timeout_secs: u64,
}

impl OpenRouterConfig {
    /// Load from the environment.
    ///
    /// `model_key` names the variable holding the model id. When
    /// `OPENROUTER_API_KEY` is unset, `placeholder_key` (if any) is used instead.
    pub fn from_env(
        model_key: &str,
        app_title: &str,
        placeholder_key: Option<&str>,
    ) -> Result<Self, AppError> {
        let is_prod = is_prod();

        let api_key = get_optional_env("OPENROUTER_API_KEY")
            .or_else(|| placeholder_key.map(str::to_string))
            .map(Secret::new);

        Ok(Self {
            base_url: get_env("OPENROUTER_BASE_URL", Some(OPENROUTER_API_BASE), is_prod)?,
            api_key,
            model: get_env(model_key, Some(DEFAULT_MODEL), is_prod)?,
            referer: Some(get_env("OPENROUTER_REFERER", Some(DEFAULT_REFERER), is_prod)?),
            app_title: Some(get_env("OPENROUTER_APP_TITLE", Some(app_title), is_prod)?),
            timeout_secs: get_optional_parsed("UPSTREAM_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_request(&self, body: &ChatCompletionRequest<'_>) -> Result<RequestBuilder, ProviderError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured("OPENROUTER_API_KEY is not set".to_string())
        })?;

        let mut request = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key.expose_secret())
            .json(body);

        if let Some(referer) = &self.config.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.app_title {
            request = request.header("X-Title", title);
        }

        Ok(request)
    }

    async fn send(&self, body: &ChatCompletionRequest<'_>) -> Result<Response, ProviderError> {
        let response = self
            .build_request(body)?
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "OpenRouter API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatCompletion, ProviderError> {
        let request = ChatCompletionRequest::new(&self.config.model, messages, params, false);

        tracing::debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "Sending request to OpenRouter"
        );

        let body = self.send(&request).await?.text().await.map_err(|e| {
            ProviderError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        let api_response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        // OpenRouter reports some upstream failures with a 200 and an error body.
        if let Some(error) = api_response.error {
            return Err(ProviderError::ApiError(error.message));
        }

        let choice = api_response.choices.into_iter().next();
        let finish_reason = FinishReason::from_api(
            choice.as_ref().and_then(|c| c.finish_reason.as_deref()),
        );
        let text = choice.and_then(|c| c.message).and_then(|m| m.content);
        let usage = api_response.usage.unwrap_or_default();

        Ok(ChatCompletion {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatStream, ProviderError> {
        let request = ChatCompletionRequest::new(&self.config.model, messages, params, true);

        tracing::debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "Starting streaming request to OpenRouter"
        );

        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut input_tokens = 0u32;
            let mut output_tokens = 0u32;
            let mut finish_reason = FinishReason::Complete;

            while let Some(chunk_result) = stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::NetworkError(e.to_string()))).await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    let data = match event {
                        SseEvent::Done => {
                            let _ = tx
                                .send(Ok(StreamChunk::Complete {
                                    input_tokens,
                                    output_tokens,
                                    finish_reason,
                                }))
                                .await;
                            return;
                        }
                        SseEvent::Data(data) => data,
                    };

                    let chunk: ChatCompletionChunk = match serde_json::from_str(&data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::InvalidResponse(format!(
                                    "Failed to parse stream chunk: {}",
                                    e
                                ))))
                                .await;
                            return;
                        }
                    };

                    if let Some(error) = chunk.error {
                        let _ = tx.send(Err(ProviderError::ApiError(error.message))).await;
                        return;
                    }

                    if let Some(usage) = chunk.usage {
                        input_tokens = usage.prompt_tokens;
                        output_tokens = usage.completion_tokens;
                    }

                    for choice in chunk.choices {
                        if let Some(reason) = choice.finish_reason.as_deref() {
                            finish_reason = FinishReason::from_api(Some(reason));
                        }

                        let text = choice.delta.and_then(|d| d.content).unwrap_or_default();
                        if !text.is_empty() && tx.send(Ok(StreamChunk::Text(text))).await.is_err() {
                            // Consumer went away.
                            return;
                        }
                    }
                }
            }

            // Body ended without [DONE]; treat what we have as complete.
            let _ = tx
                .send(Ok(StreamChunk::Complete {
                    input_tokens,
                    output_tokens,
                    finish_reason,
                }))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as ChatStream)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}

/// One decoded server-sent event payload.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Incremental `data:` line decoder. Network chunks may split lines (and
/// multi-byte characters) anywhere, so bytes are held until a newline arrives.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            // Blank lines separate events; `:` lines are keep-alive comments.
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }

        events
    }
}

// ============================================================================
// OpenAI-compatible Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(
        model: &'a str,
        messages: &'a [ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Self {
        Self {
            model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();

        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let events = decoder.push(b"1}\n\ndata: [DONE]\n\n");

        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_skips_comments_and_other_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": OPENROUTER PROCESSING\r\nevent: ping\r\ndata: x\r\n\r\n");

        assert_eq!(events, vec![SseEvent::Data("x".to_string())]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_intact() {
        let mut decoder = SseDecoder::default();
        let line = "data: dragón\n".as_bytes();
        // Split inside the two-byte 'ó'.
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(
            decoder.push(&line[split..]),
            vec![SseEvent::Data("dragón".to_string())]
        );
    }

    #[test]
    fn request_omits_stream_flag_when_not_streaming() {
        let messages = vec![ChatMessage::user("hi")];
        let params = GenerationParams::new(50, 0.9);
        let request = ChatCompletionRequest::new("m", &messages, &params, false);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 50);
        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let provider = OpenRouterProvider::new(OpenRouterConfig {
            // Unroutable on purpose; the call must not get this far.
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            model: "m".to_string(),
            referer: None,
            app_title: None,
            timeout_secs: 1,
        })
        .unwrap();

        let err = provider
            .complete(&[ChatMessage::user("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(!provider.is_configured());
    }
}
