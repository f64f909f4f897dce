//! HTTP handlers for the story service.

pub mod health;
pub mod story;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use story::story_api;
