//! HTTP handlers for the quiz service.

pub mod health;
pub mod quiz;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use quiz::quiz_api;
