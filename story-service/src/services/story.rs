//! Streaming story relay.
//!
//! A spawned producer reads the upstream delta stream and writes each piece
//! into a bounded channel whose receiver is the HTTP response body. Every write
//! waits for channel capacity, so a slow client slows the producer instead of
//! growing a buffer.

use axum::body::Bytes;
use futures::StreamExt;
use service_core::observability::{record_fallback, record_upstream_error};
use service_core::providers::{
    ChatMessage, ChatProvider, GenerationParams, ProviderError, StreamChunk,
};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

pub const STORY_MAX_TOKENS: u32 = 400;
pub const STORY_TEMPERATURE: f32 = 0.8;

/// Written in place of (or after) the story when the upstream fails.
pub const STORY_ERROR_MESSAGE: &str = "Sorry, there was an error generating your story.";

const CHANNEL_CAPACITY: usize = 16;

pub fn story_prompt(title: &str) -> String {
    format!(
        "Write a creative children's story titled \"{}\". Make it engaging, \
         age-appropriate, and around 200-300 words. Start the story immediately \
         without repeating the title.",
        title
    )
}

/// Wire framing of the story body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFormat {
    /// Chunks written back to back. What existing clients read.
    #[default]
    Raw,
    /// Every chunk as a `data:` server-sent event.
    Sse,
}

impl StreamFormat {
    pub fn encode(&self, text: &str) -> Bytes {
        match self {
            StreamFormat::Raw => Bytes::copy_from_slice(text.as_bytes()),
            StreamFormat::Sse => {
                let mut framed = String::with_capacity(text.len() + 8);
                for line in text.split('\n') {
                    framed.push_str("data: ");
                    framed.push_str(line);
                    framed.push('\n');
                }
                framed.push('\n');
                Bytes::from(framed)
            }
        }
    }
}

impl FromStr for StreamFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(StreamFormat::Raw),
            "sse" => Ok(StreamFormat::Sse),
            other => Err(anyhow::anyhow!(
                "unknown story stream format '{}', expected 'raw' or 'sse'",
                other
            )),
        }
    }
}

#[derive(Debug, Error)]
enum RelayError {
    #[error("upstream failed: {0}")]
    Upstream(#[from] ProviderError),

    #[error("client disconnected")]
    ConsumerGone,
}

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream finished; `chunks` pieces were forwarded.
    Completed { chunks: usize },
    /// Upstream failed after `chunks` pieces; the apology followed them.
    Apologized { chunks: usize },
    /// The client went away; nothing more could be written.
    Disconnected,
}

/// Writing half of the story channel.
pub struct StorySink {
    tx: mpsc::Sender<Bytes>,
    format: StreamFormat,
}

impl StorySink {
    pub fn new(tx: mpsc::Sender<Bytes>, format: StreamFormat) -> Self {
        Self { tx, format }
    }

    async fn write(&self, text: &str) -> Result<(), RelayError> {
        let permit = self.tx.reserve().await.map_err(|_| RelayError::ConsumerGone)?;
        permit.send(self.format.encode(text));
        Ok(())
    }

    /// Ends the body. Dropping the last sender is what the receiver observes as EOF.
    fn close(self) {
        drop(self.tx);
    }
}

/// Start generating the story for `title` in the background and return the
/// body stream the client reads from.
pub fn spawn_story_stream(
    provider: Arc<dyn ChatProvider>,
    title: String,
    format: StreamFormat,
) -> ReceiverStream<Bytes> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let sink = StorySink::new(tx, format);

    let span = tracing::info_span!("story_stream", title = %title);
    tokio::spawn(
        async move {
            relay_story(provider.as_ref(), &title, sink).await;
        }
        .instrument(span),
    );

    ReceiverStream::new(rx)
}

/// Forward the upstream story into `sink`. On upstream failure the apology is
/// written; the sink is closed on every path.
pub async fn relay_story(provider: &dyn ChatProvider, title: &str, sink: StorySink) -> RelayOutcome {
    let mut forwarded = 0usize;

    let outcome = match forward_story(provider, title, &sink, &mut forwarded).await {
        Ok(()) => {
            tracing::info!(chunks = forwarded, "Story stream completed");
            RelayOutcome::Completed { chunks: forwarded }
        }
        Err(RelayError::ConsumerGone) => {
            tracing::warn!(chunks = forwarded, "Client disconnected before the story finished");
            RelayOutcome::Disconnected
        }
        Err(RelayError::Upstream(e)) => {
            tracing::error!(error = %e, chunks = forwarded, "Error in story generation");
            record_upstream_error("story", e.category());
            record_fallback("story");

            match sink.write(STORY_ERROR_MESSAGE).await {
                Ok(()) => RelayOutcome::Apologized { chunks: forwarded },
                Err(e) => {
                    tracing::warn!(error = %e, "Error closing story stream");
                    RelayOutcome::Disconnected
                }
            }
        }
    };

    sink.close();
    outcome
}

async fn forward_story(
    provider: &dyn ChatProvider,
    title: &str,
    sink: &StorySink,
    forwarded: &mut usize,
) -> Result<(), RelayError> {
    let messages = [ChatMessage::user(story_prompt(title))];
    let params = GenerationParams::new(STORY_MAX_TOKENS, STORY_TEMPERATURE);

    let mut stream = provider.complete_stream(&messages, &params).await?;

    while let Some(item) = stream.next().await {
        match item? {
            StreamChunk::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                sink.write(&text).await?;
                *forwarded += 1;
            }
            StreamChunk::Complete {
                output_tokens,
                finish_reason,
                ..
            } => {
                tracing::debug!(output_tokens, ?finish_reason, "Upstream story finished");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::providers::MockChatProvider;

    async fn run(provider: &MockChatProvider, format: StreamFormat) -> (RelayOutcome, Vec<Bytes>) {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let outcome = relay_story(provider, "The Brave Dragon's Adventure", StorySink::new(tx, format)).await;

        let mut received = Vec::new();
        while let Some(bytes) = rx.recv().await {
            received.push(bytes);
        }
        (outcome, received)
    }

    fn concat(chunks: &[Bytes]) -> String {
        chunks
            .iter()
            .map(|b| std::str::from_utf8(b).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn chunks_are_forwarded_in_order() {
        let provider = MockChatProvider::chunks(["Once ", "upon ", "a time..."]);
        let (outcome, received) = run(&provider, StreamFormat::Raw).await;

        assert_eq!(outcome, RelayOutcome::Completed { chunks: 3 });
        assert_eq!(received.len(), 3);
        assert_eq!(concat(&received), "Once upon a time...");
    }

    #[tokio::test]
    async fn prompt_embeds_title_and_limits() {
        let provider = MockChatProvider::chunks(["x"]);
        run(&provider, StreamFormat::Raw).await;

        let (messages, params) = provider.last_request().unwrap();
        assert!(messages[0]
            .content
            .contains("titled \"The Brave Dragon's Adventure\""));
        assert_eq!(params.max_tokens, Some(STORY_MAX_TOKENS));
        assert_eq!(params.temperature, Some(STORY_TEMPERATURE));
    }

    #[tokio::test]
    async fn failure_before_output_sends_only_the_apology() {
        let provider = MockChatProvider::unavailable();
        let (outcome, received) = run(&provider, StreamFormat::Raw).await;

        assert_eq!(outcome, RelayOutcome::Apologized { chunks: 0 });
        assert_eq!(concat(&received), STORY_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_partial_output() {
        let provider = MockChatProvider::chunks_then_error(["Once ", "upon "]);
        let (outcome, received) = run(&provider, StreamFormat::Raw).await;

        assert_eq!(outcome, RelayOutcome::Apologized { chunks: 2 });
        assert_eq!(
            concat(&received),
            format!("Once upon {}", STORY_ERROR_MESSAGE)
        );
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported_not_raised() {
        let provider = MockChatProvider::chunks(["Once ", "upon "]);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        drop(rx);

        let outcome = relay_story(&provider, "t", StorySink::new(tx, StreamFormat::Raw)).await;
        assert_eq!(outcome, RelayOutcome::Disconnected);
    }

    #[tokio::test]
    async fn writes_wait_for_a_slow_consumer() {
        let chunks: Vec<String> = (0..10).map(|i| format!("{i} ")).collect();
        let provider = Arc::new(MockChatProvider::chunks(chunks.clone()));
        let (tx, mut rx) = mpsc::channel(1);

        let producer = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                relay_story(provider.as_ref(), "t", StorySink::new(tx, StreamFormat::Raw)).await
            })
        };

        let mut received = String::new();
        while let Some(bytes) = rx.recv().await {
            tokio::task::yield_now().await;
            received.push_str(std::str::from_utf8(&bytes).unwrap());
        }

        assert_eq!(producer.await.unwrap(), RelayOutcome::Completed { chunks: 10 });
        assert_eq!(received, chunks.concat());
    }

    #[tokio::test]
    async fn spawned_stream_ends_after_last_chunk() {
        let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::chunks(["a", "b"]));
        let body: Vec<Bytes> = spawn_story_stream(provider, "t".into(), StreamFormat::Raw)
            .collect()
            .await;

        assert_eq!(concat(&body), "ab");
    }

    #[test]
    fn sse_framing_prefixes_every_line() {
        let framed = StreamFormat::Sse.encode("Once\nupon");
        assert_eq!(&framed[..], b"data: Once\ndata: upon\n\n");
    }

    #[test]
    fn raw_framing_is_identity() {
        assert_eq!(&StreamFormat::Raw.encode("a time...")[..], b"a time...");
    }

    #[test]
    fn stream_format_parses_case_insensitively() {
        assert_eq!("SSE".parse::<StreamFormat>().unwrap(), StreamFormat::Sse);
        assert_eq!(" raw ".parse::<StreamFormat>().unwrap(), StreamFormat::Raw);
        assert!("ndjson".parse::<StreamFormat>().is_err());
    }
}
