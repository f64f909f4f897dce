#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use quiz_service::config::QuizConfig;
use quiz_service::{build_router, AppState, Application};
use service_core::config::{Config as CoreConfig, ObservabilityConfig};
use service_core::fallback::FallbackPicker;
use service_core::providers::{ChatProvider, OpenRouterConfig};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SEED: u64 = 11;

pub const VALID_QUESTION: &str = r#"{"question":"Which ocean is the largest?","answers":[{"text":"Atlantic","correct":false},{"text":"Pacific","correct":true},{"text":"Indian","correct":false},{"text":"Arctic","correct":false}]}"#;

pub fn router_with(provider: Arc<dyn ChatProvider>) -> Router {
    build_router(AppState {
        provider,
        picker: FallbackPicker::seeded(TEST_SEED),
    })
}

pub fn get_api() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/api")
        .body(Body::empty())
        .unwrap()
}

pub fn test_config() -> QuizConfig {
    QuizConfig {
        common: CoreConfig { port: 0 },
        upstream: OpenRouterConfig {
            base_url: "http://127.0.0.1:9/api/v1".to_string(),
            api_key: None,
            model: "test/model".to_string(),
            referer: None,
            app_title: None,
            timeout_secs: 1,
        },
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
    pub async fn spawn_with(app: Application) -> Self {
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
