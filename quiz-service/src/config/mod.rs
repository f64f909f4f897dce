use service_core::config::{self as core_config, get_optional_parsed, ObservabilityConfig};
use service_core::error::AppError;
use service_core::providers::OpenRouterConfig;

const APP_TITLE: &str = "Geography Quiz App";

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub common: core_config::Config,
    pub upstream: OpenRouterConfig,
    pub fallback_seed: Option<u64>,
    pub observability: ObservabilityConfig,
}

impl QuizConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        // No placeholder key: an unconfigured provider short-circuits to the
        // fallback questions without a network round trip.
        let upstream = OpenRouterConfig::from_env("QUIZ_MODEL", APP_TITLE, None)?;

        Ok(QuizConfig {
            common,
            upstream,
            fallback_seed: get_optional_parsed("FALLBACK_SEED")?,
            observability: ObservabilityConfig::from_env(),
        })
    }
}
