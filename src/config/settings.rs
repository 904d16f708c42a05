//! # Configuration Settings
//!
//! Defines the injected configuration of the trust and credential layer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use super::identities::{ClientIdentity, IdentityTable};
use crate::errors::{Error, Result};

/// Prefix of environment variables read by [`TrustSettings::load`].
pub const ENV_PREFIX: &str = "ATLAS";

/// Main configuration of the trust and credential layer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrustSettings {
    /// Namespace holding TLS secrets
    #[validate(length(min = 1, message = "Namespace cannot be empty"))]
    pub namespace: String,

    /// Namespace holding API key secrets
    #[validate(length(min = 1, message = "Credential namespace cannot be empty"))]
    pub credential_namespace: String,

    /// Bound on a single secret store call, in milliseconds
    #[validate(range(
        min = 1,
        max = 60000,
        message = "Fetch timeout must be between 1 and 60000 milliseconds"
    ))]
    pub fetch_timeout_ms: u64,

    /// Identity to secret table; replaces the defaults wholesale when set
    pub identities: IdentityTable,

    /// Identities whose secrets must exist when the trust manager starts
    pub required: Vec<ClientIdentity>,

    /// Policy applied by the watch supervisor when a subscription ends
    pub watch_retry: RetryPolicyConfig,

    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            credential_namespace: "atlas".to_string(),
            fetch_timeout_ms: 5000,
            identities: IdentityTable::atlas_defaults(),
            required: Vec::new(),
            watch_retry: RetryPolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TrustSettings {
    /// Load settings from an optional TOML file overlaid with `ATLAS_*`
    /// environment variables (`__` separates nested keys), then validate.
    ///
    /// ```text
    /// ATLAS_NAMESPACE=pipelines
    /// ATLAS_FETCH_TIMEOUT_MS=2000
    /// ATLAS_REQUIRED=workflow-trigger,kafka
    /// ATLAS_LOGGING__JSON=true
    /// ```
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("required")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Load settings from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        for identity in &self.required {
            if !self.identities.contains(identity) {
                return Err(Error::configuration(format!(
                    "Required identity '{}' has no entry in the identity table",
                    identity
                )));
            }
        }

        for (identity, entry) in self.identities.iter() {
            if entry.secret_name.is_empty() {
                return Err(Error::configuration(format!(
                    "Identity '{}' maps to an empty secret name",
                    identity
                )));
            }
        }

        self.watch_retry.validate()
    }

    /// Get the store call timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Retry behaviour of a supervised watch.
///
/// `none` is the default: a broken watch is logged and the
/// subscription ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetryPolicyConfig {
    #[default]
    None,
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        #[serde(default)]
        max_attempts: Option<u32>,
    },
}

impl RetryPolicyConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Exponential { initial_ms, max_ms, .. } => {
                if *initial_ms == 0 {
                    return Err(Error::configuration("Retry initial delay must be positive"));
                }
                if max_ms < initial_ms {
                    return Err(Error::configuration(
                        "Retry max delay cannot be shorter than the initial delay",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_validation() {
        let settings = TrustSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(settings.watch_retry, RetryPolicyConfig::None);
    }

    #[test]
    fn test_settings_validation_errors() {
        let settings = TrustSettings { fetch_timeout_ms: 0, ..Default::default() };
        assert!(matches!(settings.validate(), Err(Error::Configuration { .. })));

        let settings = TrustSettings { namespace: String::new(), ..Default::default() };
        assert!(settings.validate().is_err());

        let settings =
            TrustSettings { required: vec!["billing".into()], ..Default::default() };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("billing"));

        let settings = TrustSettings {
            watch_retry: RetryPolicyConfig::Exponential {
                initial_ms: 500,
                max_ms: 100,
                max_attempts: None,
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    // File and environment loading share one test: environment variables are
    // process-global and tests run in parallel.
    #[test]
    fn test_load_from_file_and_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
namespace = "pipelines"
required = ["workflow-trigger"]

[identities.workflow-trigger]
secret_name = "wt-tls"

[watch_retry]
policy = "exponential"
initial_ms = 100
max_ms = 2000
"#
        )
        .unwrap();

        let settings = TrustSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.namespace, "pipelines");
        assert_eq!(settings.credential_namespace, "atlas");
        assert_eq!(settings.identities.len(), 1);
        assert_eq!(settings.required, vec![ClientIdentity::new("workflow-trigger")]);
        assert_eq!(
            settings.watch_retry,
            RetryPolicyConfig::Exponential { initial_ms: 100, max_ms: 2000, max_attempts: None }
        );

        std::env::set_var("ATLAS_FETCH_TIMEOUT_MS", "2500");
        std::env::set_var("ATLAS_LOGGING__JSON", "true");
        let settings = TrustSettings::load(Some(file.path()));
        std::env::remove_var("ATLAS_FETCH_TIMEOUT_MS");
        std::env::remove_var("ATLAS_LOGGING__JSON");

        let settings = settings.unwrap();
        assert_eq!(settings.fetch_timeout_ms, 2500);
        assert!(settings.logging.json);
        assert_eq!(settings.namespace, "pipelines");

        let defaults = TrustSettings::from_env().unwrap();
        assert_eq!(defaults.identities, IdentityTable::atlas_defaults());
    }
}
