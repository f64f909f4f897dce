use crate::services::{make_story_title, spawn_story_stream};
use crate::startup::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use std::convert::Infallible;

/// Body of `POST /api`. Fields are free-form JSON: clients send numbers and
/// booleans as well as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryApiRequest {
    #[serde(default)]
    pub subject: Option<Value>,
    #[serde(default)]
    pub story_title: Option<Value>,
}

impl StoryApiRequest {
    /// The title to tell a story about. Only a truthy `storyTitle` (not null,
    /// `false`, `0` or `""`) asks for the story.
    pub fn story_title(&self) -> Option<String> {
        self.story_title.as_ref().and_then(truthy_text)
    }

    /// Subject as text; absent or null is empty.
    pub fn subject(&self) -> String {
        self.subject.as_ref().and_then(value_text).unwrap_or_default()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        other => value_text(other),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TitleResponse {
    pub data: String,
}

pub async fn story_api(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    // Parsed by hand: a malformed body is reported as a 500 with details,
    // not as the extractor's 4xx rejection.
    let request: StoryApiRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse story request");
        AppError::InternalError(anyhow::Error::new(e))
    })?;

    tracing::info!(
        subject = ?request.subject,
        story_title = ?request.story_title,
        "Story API called"
    );

    if let Some(title) = request.story_title() {
        tracing::info!(title = %title, "Returning story stream");
        return Ok(story_stream_response(&state, title));
    }

    // Missing subject: the title generator answers from the fallback table.
    let subject = request.subject();
    let title = make_story_title(state.provider.as_ref(), &state.picker, &subject).await;

    Ok(Json(TitleResponse { data: title }).into_response())
}

fn story_stream_response(state: &AppState, title: String) -> Response {
    let chunks = spawn_story_stream(state.provider.clone(), title, state.stream_format);
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}
