use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::sync::Arc;

use super::verifier::SkipServerVerification;
use crate::errors::TlsError;

/// Derived TLS trust state of one identity.
///
/// Values are immutable once built; an update publishes a new value and
/// consumers swap their transport to it wholesale.
#[derive(Clone)]
pub enum TrustConfig {
    /// Verify peers against this pool (platform anchors plus the identity's certificate).
    Verified { roots: Arc<RootCertStore> },
    /// Skip peer verification. Chosen when the identity's secret does not exist.
    Insecure,
}

impl TrustConfig {
    pub fn verified(roots: RootCertStore) -> Self {
        Self::Verified { roots: Arc::new(roots) }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, Self::Insecure)
    }

    pub fn roots(&self) -> Option<&Arc<RootCertStore>> {
        match self {
            Self::Verified { roots } => Some(roots),
            Self::Insecure => None,
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "verified",
            Self::Insecure => "insecure",
        }
    }

    /// Build a ready rustls client configuration for this trust state.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let config = match self {
            Self::Verified { roots } => {
                builder.with_root_certificates(roots.clone()).with_no_client_auth()
            }
            Self::Insecure => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new(provider)))
                .with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

impl fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified { roots } => {
                f.debug_struct("Verified").field("anchors", &roots.len()).finish()
            }
            Self::Insecure => f.write_str("Insecure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states() {
        let verified = TrustConfig::verified(RootCertStore::empty());
        assert!(verified.is_verified());
        assert_eq!(verified.state(), "verified");
        assert_eq!(verified.roots().map(|r| r.len()), Some(0));
        assert_eq!(format!("{:?}", verified), "Verified { anchors: 0 }");

        assert!(TrustConfig::Insecure.is_insecure());
        assert!(TrustConfig::Insecure.roots().is_none());
    }

    #[test]
    fn test_client_configs_build() {
        assert!(TrustConfig::verified(RootCertStore::empty()).client_config().is_ok());
        assert!(TrustConfig::Insecure.client_config().is_ok());
    }
}
