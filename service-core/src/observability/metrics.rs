//! Prometheus exposition for the `metrics` facade.

use crate::error::AppError;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    // Another thread may have won the race; its handle is equally valid.
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Count a response served from canned content. `kind` is e.g. `title`, `story`, `quiz`.
pub fn record_fallback(kind: &'static str) {
    counter!("fallback_responses_total", "kind" => kind).increment(1);
}

/// Count a failed upstream call. `category` is `unavailable` or `malformed`.
pub fn record_upstream_error(operation: &'static str, category: &'static str) {
    counter!(
        "upstream_errors_total",
        "operation" => operation,
        "category" => category
    )
    .increment(1);
}
