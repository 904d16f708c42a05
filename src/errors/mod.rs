//! # Error Handling
//!
//! Error taxonomy for the trust and credential layer. Store-level failures
//! live in [`crate::secrets::SecretsError`]; TLS material failures in
//! [`TlsError`]; both surface to callers through [`Error`].

pub mod tls;
pub mod types;

pub use tls::TlsError;
pub use types::{Error, Result};
