//! # Observability Infrastructure
//!
//! Structured logging and metrics for the trust and credential layer.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_settings_info};
pub use metrics::MetricsRecorder;

use crate::config::TrustSettings;

/// Install logging from settings, register metric descriptions and log
/// the effective configuration.
pub fn init_observability(settings: &TrustSettings) -> MetricsRecorder {
    let installed = init_logging(&settings.logging);

    let recorder = MetricsRecorder::new();
    recorder.register();

    ::tracing::info!(
        level = %settings.logging.level,
        json = settings.logging.json,
        subscriber_installed = installed,
        "Observability initialized"
    );
    log_settings_info(settings);

    recorder
}
