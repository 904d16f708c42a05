//! Identity to secret-name mapping.
//!
//! Every trust configuration and credential is scoped by a [`ClientIdentity`].
//! The table mapping identities to secrets is injected configuration; the
//! well-known Atlas layout is available through [`IdentityTable::atlas_defaults`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Error, Result};
use crate::secrets::{TLS_CERT_FIELD, TLS_KEY_FIELD};

pub const WORKFLOW_TRIGGER: &str = "workflow-trigger";
pub const COMMAND_DELEGATOR: &str = "command-delegator";
pub const REPO_SERVER: &str = "repo-server";
pub const ARGOCD_REPO_SERVER: &str = "argocd-repo-server";
pub const CLIENT_WRAPPER: &str = "client-wrapper";
pub const KAFKA: &str = "kafka";

/// Logical name under which a trust configuration or credential is scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClientIdentity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

fn default_cert_field() -> String {
    TLS_CERT_FIELD.to_string()
}

fn default_key_field() -> String {
    TLS_KEY_FIELD.to_string()
}

/// Where an identity's material lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Name of the backing secret
    pub secret_name: String,

    /// Field holding the PEM certificate
    #[serde(default = "default_cert_field")]
    pub cert_field: String,

    /// Field holding the PEM private key (server configs only)
    #[serde(default = "default_key_field")]
    pub key_field: String,

    /// DNS name put in the self-signed fallback certificate
    #[serde(default)]
    pub dns_name: Option<String>,
}

impl IdentityEntry {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            cert_field: default_cert_field(),
            key_field: default_key_field(),
            dns_name: None,
        }
    }

    pub fn with_cert_field(mut self, field: impl Into<String>) -> Self {
        self.cert_field = field.into();
        self
    }

    pub fn with_dns_name(mut self, dns_name: impl Into<String>) -> Self {
        self.dns_name = Some(dns_name.into());
        self
    }
}

/// Static, injectable identity to secret table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityTable(BTreeMap<ClientIdentity, IdentityEntry>);

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The secret layout of a standard Atlas installation.
    pub fn atlas_defaults() -> Self {
        Self::new()
            .with(
                WORKFLOW_TRIGGER,
                IdentityEntry::new("workflowtrigger-tls")
                    .with_dns_name("workflowtrigger.default.svc.cluster.local"),
            )
            .with(
                COMMAND_DELEGATOR,
                IdentityEntry::new("commanddelegator-tls")
                    .with_dns_name("commanddelegator.default.svc.cluster.local"),
            )
            .with(
                REPO_SERVER,
                IdentityEntry::new("pipelinereposerver-tls")
                    .with_dns_name("reposerver.default.svc.cluster.local"),
            )
            .with(
                ARGOCD_REPO_SERVER,
                IdentityEntry::new("argocd-repo-server-tls")
                    .with_dns_name("argocd-server.argocd.svc.cluster.local"),
            )
            .with(CLIENT_WRAPPER, IdentityEntry::new("clientwrapper-tls"))
            .with(KAFKA, IdentityEntry::new("kafka-tls").with_cert_field("kafka.cert.pem"))
    }

    /// Builder-style insertion.
    pub fn with(mut self, identity: impl Into<ClientIdentity>, entry: IdentityEntry) -> Self {
        self.insert(identity, entry);
        self
    }

    pub fn insert(&mut self, identity: impl Into<ClientIdentity>, entry: IdentityEntry) {
        self.0.insert(identity.into(), entry);
    }

    /// Resolve an identity; unknown identities are a configuration error.
    pub fn lookup(&self, identity: &ClientIdentity) -> Result<&IdentityEntry> {
        self.0.get(identity).ok_or_else(|| {
            Error::configuration(format!("No secret is mapped for identity '{}'", identity))
        })
    }

    pub fn contains(&self, identity: &ClientIdentity) -> bool {
        self.0.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientIdentity, &IdentityEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
