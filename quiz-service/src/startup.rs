//! Application startup and lifecycle management.

use crate::config::QuizConfig;
use crate::handlers::{health_check, metrics_endpoint, quiz_api, readiness_check};
use axum::{routing::get, Router};
use service_core::error::AppError;
use service_core::fallback::FallbackPicker;
use service_core::middleware::with_standard_layers;
use service_core::providers::{ChatProvider, OpenRouterProvider};
use service_core::server::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ChatProvider>,
    pub picker: FallbackPicker,
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api", get(quiz_api))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint));

    with_standard_layers(router).with_state(state)
}

pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: QuizConfig) -> Result<Self, AppError> {
        let provider = OpenRouterProvider::new(config.upstream.clone())
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        if config.upstream.api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set, serving fallback questions only");
        }

        Self::build_with_provider(config, Arc::new(provider)).await
    }

    pub async fn build_with_provider(
        config: QuizConfig,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AppError> {
        let state = AppState {
            provider,
            picker: FallbackPicker::from_seed(config.fallback_seed),
        };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(model = %config.upstream.model, "Quiz service: HTTP on port {}", http_port);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.http_listener, build_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}
