//! # Error Types
//!
//! Crate-level error type using `thiserror`. Every public operation returns
//! [`Result`]; nothing in the core panics on a failed lookup.

use super::TlsError;
use crate::secrets::SecretsError;

/// Custom result type for trust and credential operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trust and credential layer
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Unknown identity, unmapped secret name or invalid settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A record that had to exist is absent
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The secret store call itself failed
    #[error("Secret store error: {0}")]
    Store(#[source] SecretsError),

    /// A subscription's connection ended; fatal for that subscription only
    #[error("Watch on secret '{secret}' terminated: {reason}")]
    WatchTerminated { secret: String, reason: String },

    /// Certificate or key material could not be turned into a TLS config
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Internal errors (task failures and the like)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a not found error for a secret
    pub fn secret_not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { kind: "Secret", name: name.into() }
    }

    /// Create a not found error for a credential
    pub fn credential_not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { kind: "Credential", name: name.into() }
    }

    /// Create a watch terminated error
    pub fn watch_terminated<S: Into<String>, R: Into<String>>(secret: S, reason: R) -> Self {
        Self::WatchTerminated { secret: secret.into(), reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns true for the not-found case, whatever the record kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error may go away on its own
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(e) => e.is_transient(),
            Error::WatchTerminated { .. } => true,
            _ => false,
        }
    }
}

impl From<SecretsError> for Error {
    fn from(error: SecretsError) -> Self {
        match error {
            SecretsError::NotFound { key } => Self::secret_not_found(key),
            other => Self::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::configuration(format!("Validation failed: {}", message))
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(format!("Configuration loading failed: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::configuration("unknown identity 'nope'");
        assert!(matches!(error, Error::Configuration { .. }));
        assert_eq!(error.to_string(), "Configuration error: unknown identity 'nope'");

        let error = Error::credential_not_found("svc-a");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "Credential not found: svc-a");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let error: Error = SecretsError::not_found("workflowtrigger-tls").into();
        assert!(error.is_not_found());

        let error: Error = SecretsError::connection_failed("refused").into();
        assert!(matches!(error, Error::Store(_)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::from(SecretsError::timeout("fetch", 5000)).is_retryable());
        assert!(Error::watch_terminated("kafka-tls", "stream closed").is_retryable());
        assert!(!Error::configuration("bad").is_retryable());
        assert!(!Error::credential_not_found("svc-a").is_retryable());
    }
}
