//! In-process secret store.
//!
//! Holds secrets in memory and fans changes out to watchers over a
//! broadcast channel. Intended for local development and tests; a cluster
//! deployment plugs its own [`SecretStore`] in instead.
//!
//! Watches behave like a namespace-scoped informer: a new watch first
//! receives every existing secret in the namespace as
//! `Applied { existed: false }`, then live changes for the whole namespace.
//! Filtering by secret name is left to the dispatcher.
//!
//! Two fault-injection switches exist for exercising failure paths:
//! [`MemorySecretStore::fail_calls`] and [`MemorySecretStore::break_watches`].

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::error::{Result, SecretsError};
use super::store::{RawSecretEvent, Secret, SecretEventStream, SecretStore};
use super::types::SecretSnapshot;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum StoreMessage {
    Event(RawSecretEvent),
    Break { reason: String },
}

/// (namespace, name)
type SecretKey = (String, String);

struct Inner {
    secrets: RwLock<HashMap<SecretKey, SecretSnapshot>>,
    events: broadcast::Sender<StoreMessage>,
    fail_calls: AtomicBool,
}

/// In-memory [`SecretStore`]. Cloning shares the underlying state.
#[derive(Clone)]
pub struct MemorySecretStore {
    inner: Arc<Inner>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                secrets: RwLock::new(HashMap::new()),
                events,
                fail_calls: AtomicBool::new(false),
            }),
        }
    }

    /// While set, every call fails with `ConnectionFailed`, as an unreachable
    /// backend would. Already-open watches keep running.
    pub fn fail_calls(&self, fail: bool) {
        self.inner.fail_calls.store(fail, Ordering::SeqCst);
    }

    /// Breaks every open watch: each one yields a `WatchClosed` error.
    pub fn break_watches(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(reason = %reason, "Breaking open secret watches");
        let _ = self.inner.events.send(StoreMessage::Break { reason });
    }

    /// Number of watch streams currently open.
    pub fn watcher_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.fail_calls.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("memory store is marked unavailable"));
        }
        Ok(())
    }

    fn key(name: &str, namespace: &str) -> Result<SecretKey> {
        if name.is_empty() {
            return Err(SecretsError::invalid_key(name, "secret name cannot be empty"));
        }
        if namespace.is_empty() {
            return Err(SecretsError::invalid_key(name, "namespace cannot be empty"));
        }
        Ok((namespace.to_string(), name.to_string()))
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("watchers", &self.watcher_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch(&self, name: &str, namespace: &str) -> Result<Option<SecretSnapshot>> {
        self.check_available()?;
        let key = Self::key(name, namespace)?;
        Ok(self.inner.secrets.read().await.get(&key).cloned())
    }

    async fn apply(&self, name: &str, namespace: &str, data: SecretSnapshot) -> Result<()> {
        self.check_available()?;
        let key = Self::key(name, namespace)?;

        // Publish while holding the write lock so a concurrent watch either
        // lists this value or receives the event, never neither.
        let mut secrets = self.inner.secrets.write().await;
        let existed = secrets.insert(key, data.clone()).is_some();
        let event =
            RawSecretEvent::Applied { secret: Secret::new(name, namespace, data), existed };
        let _ = self.inner.events.send(StoreMessage::Event(event));

        debug!(secret = %name, namespace = %namespace, existed, "Applied secret");
        Ok(())
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        self.check_available()?;
        let key = Self::key(name, namespace)?;

        let mut secrets = self.inner.secrets.write().await;
        let data = secrets.remove(&key).ok_or_else(|| SecretsError::not_found(name))?;
        let event = RawSecretEvent::Deleted { secret: Secret::new(name, namespace, data) };
        let _ = self.inner.events.send(StoreMessage::Event(event));

        debug!(secret = %name, namespace = %namespace, "Deleted secret");
        Ok(())
    }

    async fn watch(&self, name: &str, namespace: &str) -> Result<SecretEventStream> {
        self.check_available()?;
        Self::key(name, namespace)?;

        let secrets = self.inner.secrets.read().await;
        let receiver = self.inner.events.subscribe();
        let initial: Vec<Result<RawSecretEvent>> = secrets
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((ns, secret_name), data)| {
                Ok(RawSecretEvent::Applied {
                    secret: Secret::new(secret_name.clone(), ns.clone(), data.clone()),
                    existed: false,
                })
            })
            .collect();
        drop(secrets);

        let namespace = namespace.to_string();
        let live = BroadcastStream::new(receiver).filter_map(move |message| {
            let item = match message {
                Ok(StoreMessage::Event(event)) => {
                    (event.secret().namespace == namespace).then_some(Ok(event))
                }
                Ok(StoreMessage::Break { reason }) => Some(Err(SecretsError::watch_closed(reason))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Err(
                    SecretsError::watch_closed(format!("watch lagged behind by {} events", skipped)),
                )),
            };
            futures::future::ready(item)
        });

        Ok(futures::stream::iter(initial).chain(live).boxed())
    }
}
