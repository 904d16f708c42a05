//! # Atlas Trust
//!
//! Trust and credential lifecycle for the Atlas delivery control plane.
//! Every Atlas service that talks TLS to a peer, serves TLS, or checks a
//! bearer API key goes through this crate.
//!
//! ## Architecture
//!
//! ```text
//! SecretStore ──watch──► Change Dispatcher ──► Trust Manager ──► rustls configs
//!      │                        │
//!      └──fetch/apply──► Credential Manager ──► role key caches
//! ```
//!
//! ## Core Components
//!
//! - **Secret Change Dispatcher** ([`watch`]): turns a store's raw events for
//!   one secret into ordered Added/Updated/Deleted notifications
//! - **Trust Manager** ([`tls`]): per-identity client trust (`Verified` or
//!   `Insecure`) and server certificates, hot reloaded on secret changes
//! - **Credential Manager** ([`apikeys`]): issue, verify and rotate bearer tokens
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use atlas_trust::config::{ClientIdentity, TrustSettings};
//! use atlas_trust::secrets::MemorySecretStore;
//! use atlas_trust::tls::TrustManager;
//! use atlas_trust::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = TrustSettings::from_env()?;
//!     let _metrics = atlas_trust::observability::init_observability(&settings);
//!
//!     let trust = TrustManager::from_settings(MemorySecretStore::new(), &settings).await?;
//!     let identity = ClientIdentity::from(atlas_trust::config::identities::REPO_SERVER);
//!     let client = trust.get_client_trust_config(&identity).await?.client_config()?;
//!     # let _ = client;
//!     trust.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod apikeys;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod tls;
pub mod watch;

// Re-export commonly used types and traits
pub use apikeys::CredentialManager;
pub use config::{ClientIdentity, TrustSettings};
pub use errors::{Error, Result};
pub use secrets::{SecretSnapshot, SecretStore, SecretString};
pub use tls::{ServerTrust, TrustConfig, TrustManager};
pub use watch::{ChangeEvent, ChangeKind};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "atlas-trust";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "atlas-trust");
    }
}
