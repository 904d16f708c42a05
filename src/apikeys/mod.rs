//! # API Keys
//!
//! Bearer credentials shared between Atlas services:
//! - [`CredentialManager`]: issue, look up, verify, rotate and revoke tokens
//! - [`TokenGenerator`]: random (default) or HMAC-over-nonce minting
//! - [`roles`]: per-service facades that verify against a local cache

pub mod generator;
pub mod manager;
pub mod roles;

pub use generator::{HmacTokenGenerator, MintedToken, RandomTokenGenerator, TokenGenerator, TOKEN_LENGTH};
pub use manager::{CredentialManager, CredentialRecord};
pub use roles::{
    cluster_client_wrapper_key, ClientWrapperKey, WorkflowTriggerKeys, API_KEY_HEADER,
    CLIENT_WRAPPER_KEY, WORKFLOW_TRIGGER_KEY,
};
