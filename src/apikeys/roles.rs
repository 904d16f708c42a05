//! Role-specific key facades.
//!
//! Services that check inbound API keys keep the current values in memory
//! and verify requests against that cache instead of querying the store
//! per request. The cache moves when the holder calls `refresh`/`rotate_*`
//! or when a `watch` sees the key's secret change; another process's
//! rotation is visible only after one of those.
//!
//! A record that fails the generator's consistency check never enters a
//! cache. `refresh` only publishes when the cached entry did not change
//! while it fetched, so a newer value from a watch is not overwritten.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::manager::CredentialManager;
use crate::errors::{Error, Result};
use crate::secrets::{SecretStore, SecretString, SecretsError};
use crate::watch::{ChangeEvent, Supervisor, WatchHandle};

/// Request header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Key the workflow trigger accepts from callers.
pub const WORKFLOW_TRIGGER_KEY: &str = "atlas-workflow-trigger-api-key";

/// Key the in-cluster client wrapper presents.
pub const CLIENT_WRAPPER_KEY: &str = "atlas-client-wrapper-api-key";

/// Key presented by the client wrapper running in a managed cluster.
pub fn cluster_client_wrapper_key(cluster: &str) -> String {
    format!("atlas-{}-cluster-client-wrapper-api-key", cluster)
}

/// Keys accepted by the workflow trigger.
pub struct WorkflowTriggerKeys<S: SecretStore + 'static> {
    credentials: CredentialManager<S>,
    keys: Arc<DashMap<String, SecretString>>,
    supervisor: Supervisor<S>,
}

impl<S: SecretStore + 'static> WorkflowTriggerKeys<S> {
    pub fn new(credentials: CredentialManager<S>) -> Self {
        let supervisor = Supervisor::new(credentials.store().clone());
        Self { credentials, keys: Arc::new(DashMap::new()), supervisor }
    }

    /// Issue the workflow trigger and client wrapper keys.
    pub async fn generate_default_keys(&self) -> Result<()> {
        for name in [WORKFLOW_TRIGGER_KEY, CLIENT_WRAPPER_KEY] {
            let token = self.credentials.issue(name).await?;
            self.keys.insert(name.to_string(), token);
        }
        info!("Generated default API keys");
        Ok(())
    }

    /// Issue the client wrapper key for a managed cluster.
    pub async fn generate_cluster_key(&self, cluster: &str) -> Result<SecretString> {
        let name = cluster_client_wrapper_key(cluster);
        let token = self.credentials.issue(&name).await?;
        self.keys.insert(name, token.clone());
        Ok(token)
    }

    /// Cached workflow trigger key, if loaded.
    pub fn workflow_trigger_key(&self) -> Option<SecretString> {
        self.keys.get(WORKFLOW_TRIGGER_KEY).map(|entry| entry.value().clone())
    }

    pub async fn rotate_workflow_trigger_key(&self) -> Result<SecretString> {
        self.rotate(WORKFLOW_TRIGGER_KEY).await
    }

    pub async fn rotate_cluster_key(&self, cluster: &str) -> Result<SecretString> {
        self.rotate(&cluster_client_wrapper_key(cluster)).await
    }

    /// Reload one key from the store. A missing or inconsistent record is
    /// dropped from the cache.
    pub async fn refresh(&self, name: &str) -> Result<SecretString> {
        let before = self.keys.get(name).map(|entry| entry.value().clone());

        match self.credentials.get(name).await {
            Ok(token) => {
                self.publish_if_unchanged(name, before, Some(token.clone()));
                Ok(token)
            }
            Err(e) => {
                if e.is_not_found() || matches!(e, Error::Store(SecretsError::InvalidValue { .. })) {
                    self.publish_if_unchanged(name, before, None);
                }
                Err(e)
            }
        }
    }

    /// Whether `candidate` equals any cached key. Every key is compared.
    pub fn verify_request(&self, candidate: &str) -> bool {
        self.keys.iter().fold(false, |accepted, entry| entry.value().matches(candidate) | accepted)
    }

    /// Keep the cached value of `name` in step with its secret.
    pub fn watch(&self, name: &str) -> WatchHandle {
        let keys = self.keys.clone();
        let credentials = self.credentials.clone();
        let key_name = name.to_string();

        self.supervisor.spawn(name, self.credentials.namespace(), move |event| {
            match event.data().and_then(|data| credentials.token_from_snapshot(&key_name, data)) {
                Some(token) => {
                    debug!(credential = %key_name, kind = %event.kind(), "Refreshed cached API key");
                    keys.insert(key_name.clone(), token);
                }
                None => {
                    warn!(credential = %key_name, kind = %event.kind(), "API key no longer available");
                    keys.remove(&key_name);
                }
            }
        })
    }

    /// Stop every watch started by [`WorkflowTriggerKeys::watch`].
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    pub fn credentials(&self) -> &CredentialManager<S> {
        &self.credentials
    }

    async fn rotate(&self, name: &str) -> Result<SecretString> {
        let token = self.credentials.rotate(name).await?;
        self.keys.insert(name.to_string(), token.clone());
        Ok(token)
    }

    fn publish_if_unchanged(&self, name: &str, before: Option<SecretString>, next: Option<SecretString>) {
        let unchanged = match self.keys.entry(name.to_string()) {
            Entry::Occupied(mut entry) if before.as_ref() == Some(entry.get()) => {
                match next {
                    Some(token) => {
                        entry.insert(token);
                    }
                    None => {
                        entry.remove();
                    }
                }
                true
            }
            Entry::Vacant(entry) if before.is_none() => {
                if let Some(token) = next {
                    entry.insert(token);
                }
                true
            }
            _ => false,
        };

        if !unchanged {
            debug!(credential = %name, "Cached API key changed during refresh, keeping it");
        }
    }
}

/// The single key a client wrapper presents to the workflow trigger.
pub struct ClientWrapperKey<S: SecretStore + 'static> {
    name: String,
    current: watch::Sender<Option<SecretString>>,
    supervisor: Supervisor<S>,
    credentials: CredentialManager<S>,
}

impl<S: SecretStore + 'static> ClientWrapperKey<S> {
    /// Load `name` once; fails with `NotFound` when it has not been issued.
    pub async fn load(credentials: &CredentialManager<S>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let token = credentials.get(&name).await?;

        Ok(Self {
            name,
            current: watch::Sender::new(Some(token)),
            supervisor: Supervisor::new(credentials.store().clone()),
            credentials: credentials.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current key, for the [`API_KEY_HEADER`] of outgoing requests.
    pub fn api_key(&self) -> Result<SecretString> {
        self.current.borrow().clone().ok_or_else(|| Error::credential_not_found(&self.name))
    }

    /// Receiver notified on every key change; `None` after deletion.
    pub fn subscribe(&self) -> watch::Receiver<Option<SecretString>> {
        self.current.subscribe()
    }

    /// Follow the key's secret until cancelled.
    pub fn watch(&self) -> WatchHandle {
        let current = self.current.clone();
        let credentials = self.credentials.clone();
        let name = self.name.clone();

        self.supervisor.spawn(self.name.as_str(), self.credentials.namespace(), move |event: ChangeEvent| {
            let token = event.data().and_then(|data| credentials.token_from_snapshot(&name, data));
            if token.is_none() {
                warn!(credential = %name, kind = %event.kind(), "Client wrapper API key removed");
            }
            current.send_replace(token);
        })
    }

    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}
