//! Application startup and lifecycle management.

use crate::config::StoryConfig;
use crate::handlers::{health_check, metrics_endpoint, readiness_check, story_api};
use crate::services::StreamFormat;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::fallback::FallbackPicker;
use service_core::middleware::with_standard_layers;
use service_core::providers::{ChatProvider, OpenRouterProvider};
use service_core::server::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ChatProvider>,
    pub picker: FallbackPicker,
    pub stream_format: StreamFormat,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        picker: FallbackPicker,
        stream_format: StreamFormat,
    ) -> Self {
        Self {
            provider,
            picker,
            stream_format,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api", post(story_api))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint));

    with_standard_layers(router).with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the OpenRouter provider from `config`.
    pub async fn build(config: StoryConfig) -> Result<Self, AppError> {
        let provider = OpenRouterProvider::new(config.upstream.clone())
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        tracing::info!(
            model = %config.upstream.model,
            base_url = %config.upstream.base_url,
            "Initialized OpenRouter provider"
        );

        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build the application around an already constructed provider.
    pub async fn build_with_provider(
        config: StoryConfig,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(
            provider,
            FallbackPicker::from_seed(config.fallback_seed),
            config.stream_format,
        );

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            stream_format = ?config.stream_format,
            "Story service: HTTP on port {}",
            http_port
        );

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.http_listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}
