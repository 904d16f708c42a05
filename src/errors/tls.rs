use thiserror::Error;

/// TLS-specific error variants surfaced while turning secret material into configs.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The secret exists but lacks a field the config needs.
    #[error("Secret '{secret}' has no '{field}' field")]
    MissingField { secret: String, field: String },

    /// No certificates were found in the supplied PEM field.
    #[error("Secret '{secret}' field '{field}' does not contain any certificates")]
    EmptyCertificateChain { secret: String, field: String },

    /// The certificate PEM contents were invalid or unreadable.
    #[error("Secret '{secret}' field '{field}' is not a valid PEM: {source}")]
    InvalidCertificatePem {
        secret: String,
        field: String,
        #[source]
        source: anyhow::Error,
    },

    /// The private key PEM contents were invalid or unsupported.
    #[error("Secret '{secret}' does not contain a supported private key")]
    InvalidPrivateKey {
        secret: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Generating the self-signed fallback failed.
    #[error("Failed to generate self-signed certificate for '{identity}': {source}")]
    SelfSigned {
        identity: String,
        #[source]
        source: rcgen::Error,
    },

    /// rustls refused the assembled configuration (for example a cert/key mismatch).
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}
