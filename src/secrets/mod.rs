//! Secret store abstraction.
//!
//! The trust and credential managers never talk to a concrete backend;
//! they consume the [`SecretStore`] contract:
//! - **fetch**: current snapshot of one secret, or `None` when absent
//! - **apply** / **delete**: write paths used by the credential manager
//! - **watch**: live stream of raw add/update/delete signals
//!
//! # Composable Architecture Example
//!
//! ```rust,ignore
//! use atlas_trust::secrets::{MemorySecretStore, TimeoutSecretStore};
//! use std::time::Duration;
//!
//! // Any backend, bounded so a stalled call becomes SecretsError::Timeout
//! let store = TimeoutSecretStore::new(MemorySecretStore::new(), Duration::from_secs(5));
//! let snapshot = store.fetch("workflowtrigger-tls", "default").await?;
//! ```
//!
//! # Security Considerations
//!
//! - Secret payloads are never logged; [`SecretSnapshot`]'s `Debug` prints sizes only
//! - Token values travel as [`SecretString`]

pub mod error;
pub mod memory;
pub mod store;
pub mod timeout;
pub mod types;

pub use error::{Result, SecretsError};
pub use memory::MemorySecretStore;
pub use store::{RawSecretEvent, Secret, SecretEventStream, SecretStore};
pub use timeout::TimeoutSecretStore;
pub use types::{SecretSnapshot, SecretString};

/// PEM certificate field of TLS secrets.
pub const TLS_CERT_FIELD: &str = "tls.crt";

/// PEM private key field of TLS secrets.
pub const TLS_KEY_FIELD: &str = "tls.key";

/// Payload field of opaque secrets, API keys included.
pub const DATA_FIELD: &str = "data";
