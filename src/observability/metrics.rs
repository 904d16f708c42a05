//! # Metrics Collection
//!
//! Records trust and credential metrics through the `metrics` facade; the
//! embedding process chooses the exporter.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

/// Metrics recorder that tracks trust and credential metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed recorder
    pub fn register(&self) {
        describe_gauge!(
            "trust_config_state",
            Unit::Count,
            "1 when an identity runs with verification disabled, 0 when verified"
        );
        describe_counter!(
            "secret_watch_events_total",
            Unit::Count,
            "Change events delivered to subscription handlers"
        );
        describe_counter!(
            "secret_watch_terminated_total",
            Unit::Count,
            "Subscriptions ended by a broken or closed watch"
        );
        describe_counter!(
            "credential_operations_total",
            Unit::Count,
            "Credential manager operations by outcome"
        );
    }

    /// Record the current trust state of an identity
    pub fn record_trust_state(&self, identity: &str, insecure: bool) {
        let labels = [("identity", identity.to_string())];
        gauge!("trust_config_state", &labels).set(if insecure { 1.0 } else { 0.0 });
    }

    /// Record a change event handed to a subscription handler
    pub fn record_watch_event(&self, secret: &str, kind: &str) {
        let labels = [("secret", secret.to_string()), ("kind", kind.to_string())];
        counter!("secret_watch_events_total", &labels).increment(1);
    }

    /// Record a subscription terminated by its watch
    pub fn record_watch_terminated(&self, secret: &str) {
        let labels = [("secret", secret.to_string())];
        counter!("secret_watch_terminated_total", &labels).increment(1);
    }

    /// Record a credential operation outcome
    pub fn record_credential_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("outcome", outcome.to_string())];
        counter!("credential_operations_total", &labels).increment(1);
    }
}
