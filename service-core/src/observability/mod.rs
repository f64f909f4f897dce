pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{init_metrics, record_fallback, record_upstream_error, render_metrics};
