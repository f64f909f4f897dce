//! Story title generation with a canned fallback.

use service_core::fallback::FallbackPicker;
use service_core::observability::{record_fallback, record_upstream_error};
use service_core::providers::{ChatMessage, ChatProvider, GenerationParams, ProviderError};

pub const TITLE_MAX_TOKENS: u32 = 50;
pub const TITLE_TEMPERATURE: f32 = 0.9;

/// Subject whose titles are used when the requested one is unknown.
pub const DEFAULT_SUBJECT: &str = "dragons";

const DRAGON_TITLES: [&str; 5] = [
    "The Brave Dragon's Adventure",
    "A Dragon's First Flight",
    "The Friendly Dragon Next Door",
    "Dragon School Days",
    "The Dragon Who Loved Flowers",
];

const SQUIRREL_TITLES: [&str; 5] = [
    "The Squirrel's Secret Stash",
    "A Squirrel's Winter Preparation",
    "The Squirrel Family Tree",
    "Squirrel's First Acorn",
    "The Squirrel Who Could Fly",
];

const ALIEN_TITLES: [&str; 5] = [
    "My Alien Best Friend",
    "The Alien's Earth Vacation",
    "Alien School on Earth",
    "The Alien Who Loved Pizza",
    "Alien's First Day at School",
];

/// Canned titles for `subject`, defaulting to dragons.
pub fn fallback_titles(subject: &str) -> &'static [&'static str] {
    match subject {
        "squirrels" => &SQUIRREL_TITLES,
        "aliens" => &ALIEN_TITLES,
        _ => &DRAGON_TITLES,
    }
}

pub fn title_prompt(subject: &str) -> String {
    format!(
        "Generate a creative and engaging story title about {}. \
         Make it suitable for children and keep it under 10 words.",
        subject
    )
}

/// Ask the upstream model for a title; never fails.
#[tracing::instrument(skip(provider, picker))]
pub async fn make_story_title(
    provider: &dyn ChatProvider,
    picker: &FallbackPicker,
    subject: &str,
) -> String {
    // A prompt about nothing is not worth a round trip.
    if subject.trim().is_empty() {
        record_fallback("title");
        let title = fallback_title(picker, subject);
        tracing::info!(title = %title, "No subject given, using fallback title");
        return title;
    }

    match request_title(provider, subject).await {
        Ok(title) => {
            tracing::info!(title = %title, "Generated AI title");
            title
        }
        Err(e) => {
            tracing::warn!(error = %e, "Title generation failed, using fallback title");
            record_upstream_error("title", e.category());
            record_fallback("title");

            let title = fallback_title(picker, subject);
            tracing::info!(title = %title, "Generated fallback title");
            title
        }
    }
}

async fn request_title(provider: &dyn ChatProvider, subject: &str) -> Result<String, ProviderError> {
    let messages = [ChatMessage::user(title_prompt(subject))];
    let params = GenerationParams::new(TITLE_MAX_TOKENS, TITLE_TEMPERATURE);

    let completion = provider.complete(&messages, &params).await?;

    completion
        .text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("No text generated".to_string()))
}

pub fn fallback_title(picker: &FallbackPicker, subject: &str) -> String {
    picker
        .pick(fallback_titles(subject))
        .copied()
        .unwrap_or(DRAGON_TITLES[0])
        .to_string()
}
