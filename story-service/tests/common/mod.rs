#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use service_core::config::{Config as CoreConfig, ObservabilityConfig};
use service_core::fallback::FallbackPicker;
use service_core::providers::{ChatProvider, OpenRouterConfig};
use std::sync::Arc;
use std::time::Duration;
use story_service::config::StoryConfig;
use story_service::services::StreamFormat;
use story_service::{build_router, AppState, Application};

pub const TEST_SEED: u64 = 7;

pub fn router_with(provider: Arc<dyn ChatProvider>, format: StreamFormat) -> Router {
    build_router(AppState::new(
        provider,
        FallbackPicker::seeded(TEST_SEED),
        format,
    ))
}

pub fn post_api(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

pub fn test_config() -> StoryConfig {
    StoryConfig {
        common: CoreConfig { port: 0 },
        upstream: OpenRouterConfig {
            base_url: "http://127.0.0.1:9/api/v1".to_string(),
            api_key: None,
            model: "test/model".to_string(),
            referer: None,
            app_title: None,
            timeout_secs: 1,
        },
        stream_format: StreamFormat::Raw,
        fallback_seed: Some(TEST_SEED),
        observability: ObservabilityConfig {
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Serve the real application on a random port.
    pub async fn spawn(provider: Arc<dyn ChatProvider>) -> Self {
        let app = Application::build_with_provider(test_config(), provider)
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.http_port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Self { address, client }
    }
}
