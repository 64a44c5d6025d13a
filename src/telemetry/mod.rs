//! Telemetry module
//!
//! Structured logging and the Prometheus metrics exporter

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;

use crate::config::TelemetryConfig;

/// Guard that cleans up telemetry on drop
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems
///
/// A failed metrics install (port already bound by another instance)
/// degrades to logging only rather than refusing to start.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level)?;
    if let Err(e) = init_metrics(config.metrics_port) {
        tracing::warn!(error = %e, "Metrics exporter unavailable; continuing without it");
    }

    Ok(TelemetryGuard { _priv: () })
}
