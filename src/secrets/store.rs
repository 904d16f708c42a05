//! Secret store contract consumed by the trust and credential managers.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use super::error::Result;
use super::types::SecretSnapshot;

/// A named secret as reported by the store's watch mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    pub data: SecretSnapshot,
}

impl Secret {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, data: SecretSnapshot) -> Self {
        Self { name: name.into(), namespace: namespace.into(), data }
    }
}

/// The store's native change signal, before any filtering or classification.
///
/// `Applied` covers both creation and replacement; `existed` tells them
/// apart. Initial listings delivered when a watch starts arrive as
/// `Applied { existed: false }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSecretEvent {
    Applied { secret: Secret, existed: bool },
    Deleted { secret: Secret },
}

impl RawSecretEvent {
    pub fn secret(&self) -> &Secret {
        match self {
            Self::Applied { secret, .. } | Self::Deleted { secret } => secret,
        }
    }
}

/// Live stream of raw events. Ends or yields an error when the connection breaks.
pub type SecretEventStream = BoxStream<'static, Result<RawSecretEvent>>;

/// Trait for secret store backends.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret payloads
/// - `fetch` MUST distinguish "absent" (`Ok(None)`) from a failed call (`Err`)
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current snapshot of a secret, or `None` if it does not exist.
    async fn fetch(&self, name: &str, namespace: &str) -> Result<Option<SecretSnapshot>>;

    /// Create or replace a secret.
    async fn apply(&self, name: &str, namespace: &str, data: SecretSnapshot) -> Result<()>;

    /// Delete a secret.
    ///
    /// # Errors
    ///
    /// - [`super::SecretsError::NotFound`] if the secret doesn't exist
    async fn delete(&self, name: &str, namespace: &str) -> Result<()>;

    /// Open a watch for `name` in `namespace`.
    ///
    /// Implementations may deliver events for other secrets in the same
    /// namespace (an informer-style namespace watch); callers filter by name.
    async fn watch(&self, name: &str, namespace: &str) -> Result<SecretEventStream>;

    /// Check if a secret exists.
    async fn exists(&self, name: &str, namespace: &str) -> Result<bool> {
        Ok(self.fetch(name, namespace).await?.is_some())
    }
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    async fn fetch(&self, name: &str, namespace: &str) -> Result<Option<SecretSnapshot>> {
        (**self).fetch(name, namespace).await
    }

    async fn apply(&self, name: &str, namespace: &str, data: SecretSnapshot) -> Result<()> {
        (**self).apply(name, namespace, data).await
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        (**self).delete(name, namespace).await
    }

    async fn watch(&self, name: &str, namespace: &str) -> Result<SecretEventStream> {
        (**self).watch(name, namespace).await
    }
}
