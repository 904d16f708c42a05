//! Deadline-bounded secret store.
//!
//! Wraps any [`SecretStore`] so that a stalled backend turns into a typed
//! [`SecretsError::Timeout`] instead of stalling the request path that
//! missed the cache.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use atlas_trust::secrets::{MemorySecretStore, TimeoutSecretStore};
//!
//! let store = TimeoutSecretStore::new(MemorySecretStore::new(), Duration::from_secs(5));
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::error::{Result, SecretsError};
use super::store::{SecretEventStream, SecretStore};
use super::types::SecretSnapshot;

/// Secret store decorator that bounds every call with a timeout.
///
/// Opening a watch is bounded too; the long-lived stream it returns is not.
#[derive(Debug, Clone)]
pub struct TimeoutSecretStore<S: SecretStore> {
    inner: S,
    timeout: Duration,
}

impl<S: SecretStore> TimeoutSecretStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: &str, name: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let duration_ms = self.timeout.as_millis() as u64;
                warn!(operation, secret = %name, duration_ms, "Secret store call timed out");
                Err(SecretsError::timeout(operation, duration_ms))
            }
        }
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for TimeoutSecretStore<S> {
    async fn fetch(&self, name: &str, namespace: &str) -> Result<Option<SecretSnapshot>> {
        self.bounded("fetch", name, self.inner.fetch(name, namespace)).await
    }

    async fn apply(&self, name: &str, namespace: &str, data: SecretSnapshot) -> Result<()> {
        self.bounded("apply", name, self.inner.apply(name, namespace, data)).await
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        self.bounded("delete", name, self.inner.delete(name, namespace)).await
    }

    async fn watch(&self, name: &str, namespace: &str) -> Result<SecretEventStream> {
        self.bounded("watch", name, self.inner.watch(name, namespace)).await
    }
}
