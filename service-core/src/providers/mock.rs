//! Scriptable provider for tests and offline runs.

use super::{
    ChatCompletion, ChatMessage, ChatProvider, ChatStream, FinishReason, GenerationParams,
    ProviderError, StreamChunk,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the mock does on every call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Answer with this text (streamed as a single chunk).
    Completion(String),
    /// Refuse every call as if the upstream were unreachable.
    Unavailable,
    /// Stream these chunks, then complete. `complete` returns them joined.
    Chunks(Vec<String>),
    /// Stream these chunks, then fail mid-stream.
    ChunksThenError(Vec<String>),
}

pub struct MockChatProvider {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_request: Mutex<Option<(Vec<ChatMessage>, GenerationParams)>>,
}

impl MockChatProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn completion(text: impl Into<String>) -> Self {
        Self::new(MockBehavior::Completion(text.into()))
    }

    pub fn unavailable() -> Self {
        Self::new(MockBehavior::Unavailable)
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockBehavior::Chunks(chunks.into_iter().map(Into::into).collect()))
    }

    pub fn chunks_then_error<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockBehavior::ChunksThenError(
            chunks.into_iter().map(Into::into).collect(),
        ))
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages and parameters of the most recent call.
    pub fn last_request(&self) -> Option<(Vec<ChatMessage>, GenerationParams)> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, messages: &[ChatMessage], params: &GenerationParams) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((messages.to_vec(), params.clone()));
    }

    fn unavailable_error() -> ProviderError {
        ProviderError::NetworkError("mock upstream unavailable".to_string())
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatCompletion, ProviderError> {
        self.record(messages, params);

        let text = match &self.behavior {
            MockBehavior::Completion(text) => text.clone(),
            MockBehavior::Chunks(chunks) => chunks.concat(),
            MockBehavior::Unavailable | MockBehavior::ChunksThenError(_) => {
                return Err(Self::unavailable_error());
            }
        };

        Ok(ChatCompletion {
            output_tokens: text.split_whitespace().count() as u32,
            text: Some(text),
            input_tokens: 0,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatStream, ProviderError> {
        self.record(messages, params);

        let (texts, fail) = match &self.behavior {
            MockBehavior::Unavailable => return Err(Self::unavailable_error()),
            MockBehavior::Completion(text) => (vec![text.clone()], false),
            MockBehavior::Chunks(chunks) => (chunks.clone(), false),
            MockBehavior::ChunksThenError(chunks) => (chunks.clone(), true),
        };

        let output_tokens = texts.len() as u32;
        let mut items: Vec<Result<StreamChunk, ProviderError>> =
            texts.into_iter().map(|t| Ok(StreamChunk::Text(t))).collect();

        if fail {
            items.push(Err(ProviderError::NetworkError(
                "mock stream interrupted".to_string(),
            )));
        } else {
            items.push(Ok(StreamChunk::Complete {
                input_tokens: 0,
                output_tokens,
                finish_reason: FinishReason::Complete,
            }));
        }

        Ok(Box::pin(tokio_stream::iter(items)))
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        !matches!(self.behavior, MockBehavior::Unavailable)
    }
}
