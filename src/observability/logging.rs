//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//! Secret payloads never appear in fields; identities and secret names do.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, TrustSettings};

/// Create a tracing span for one secret subscription.
///
/// ```rust,ignore
/// let span = watch_span!("workflowtrigger-tls", "default");
/// let span = watch_span!("workflowtrigger-tls", "default", identity = "workflow-trigger");
/// ```
#[macro_export]
macro_rules! watch_span {
    ($secret:expr, $namespace:expr) => {
        tracing::info_span!(
            "secret_watch",
            secret = %$secret,
            namespace = %$namespace,
            watch_id = %uuid::Uuid::new_v4()
        )
    };
    ($secret:expr, $namespace:expr, $($field:tt)*) => {
        tracing::info_span!(
            "secret_watch",
            secret = %$secret,
            namespace = %$namespace,
            watch_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for credential operations
#[macro_export]
macro_rules! credential_span {
    ($operation:expr, $name:expr) => {
        tracing::debug_span!(
            "credential_operation",
            operation = %$operation,
            credential = %$name,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Returns `false` if another
/// subscriber was already installed (tests, embedding binaries); that is
/// not an error.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.is_ok()
}

/// Log configuration at startup
pub fn log_settings_info(settings: &TrustSettings) {
    tracing::info!(
        namespace = %settings.namespace,
        credential_namespace = %settings.credential_namespace,
        identities = settings.identities.len(),
        required = settings.required.len(),
        fetch_timeout_ms = settings.fetch_timeout_ms,
        retry = ?settings.watch_retry,
        "Atlas trust layer configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = watch_span!("workflowtrigger-tls", "default");
        let _span = watch_span!("workflowtrigger-tls", "default", identity = "workflow-trigger");
        let _span = credential_span!("issue", "atlas-workflow-trigger-api-key");
    }

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();

        // The second install always loses to whichever came first.
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[test]
    fn test_log_settings_info() {
        log_settings_info(&TrustSettings::default());
    }
}
