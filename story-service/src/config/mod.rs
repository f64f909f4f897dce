use crate::services::story::StreamFormat;
use service_core::config::{self as core_config, get_optional_env, get_optional_parsed, ObservabilityConfig};
use service_core::error::AppError;
use service_core::providers::openrouter::DEMO_API_KEY;
use service_core::providers::OpenRouterConfig;

const APP_TITLE: &str = "Story Maker App";

#[derive(Debug, Clone)]
pub struct StoryConfig {
    pub common: core_config::Config,
    pub upstream: OpenRouterConfig,
    pub stream_format: StreamFormat,
    /// Seed for fallback title selection; unset means OS entropy.
    pub fallback_seed: Option<u64>,
    pub observability: ObservabilityConfig,
}

impl StoryConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        // Without a key the service still runs: the placeholder is rejected
        // upstream and every title comes from the fallback table.
        let upstream = OpenRouterConfig::from_env("STORY_MODEL", APP_TITLE, Some(DEMO_API_KEY))?;

        let stream_format = match get_optional_env("STORY_STREAM_FORMAT") {
            Some(raw) => raw.parse().map_err(AppError::ConfigError)?,
            None => StreamFormat::default(),
        };

        Ok(StoryConfig {
            common,
            upstream,
            stream_format,
            fallback_seed: get_optional_parsed("FALLBACK_SEED")?,
            observability: ObservabilityConfig::from_env(),
        })
    }
}
