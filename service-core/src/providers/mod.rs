//! Upstream chat-completion provider abstraction.
//!
//! Services depend on [`ChatProvider`] only; the concrete client is built once
//! at startup and injected through application state.

pub mod mock;
pub mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

pub use mock::{MockBehavior, MockChatProvider};
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// The upstream answered, but with something unusable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProviderError::InvalidResponse(_))
    }

    /// The upstream could not be reached, refused the call, or is not configured.
    pub fn is_unavailable(&self) -> bool {
        !self.is_malformed()
    }

    /// Metric label for the failure class.
    pub fn category(&self) -> &'static str {
        if self.is_malformed() {
            "malformed"
        } else {
            "unavailable"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
}

impl FinishReason {
    pub(crate) fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Complete,
        }
    }
}

/// A single, non-streamed completion.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    /// Content of the first choice, if any.
    pub text: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Stream chunk for streaming responses.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental content delta.
    Text(String),

    /// Upstream finished cleanly.
    Complete {
        input_tokens: u32,
        output_tokens: u32,
        finish_reason: FinishReason,
    },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Sampling parameters for a request.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Request a complete response.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatCompletion, ProviderError>;

    /// Request an incremental response. Errors after the stream is opened are
    /// delivered as stream items.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatStream, ProviderError>;

    /// Model identifier sent upstream.
    fn model(&self) -> &str;

    /// Whether credentials are present. Says nothing about their validity.
    fn is_configured(&self) -> bool;
}
