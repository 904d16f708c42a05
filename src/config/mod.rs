//! # Configuration Management
//!
//! Namespaces, the identity to secret table and timeouts are injected
//! configuration, loaded from an optional file and `ATLAS_*` environment
//! variables and validated before use.

pub mod identities;
pub mod settings;

pub use identities::{ClientIdentity, IdentityEntry, IdentityTable};
pub use settings::{LoggingConfig, RetryPolicyConfig, TrustSettings};
