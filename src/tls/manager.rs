//! # Trust Manager
//!
//! Produces, caches and keeps live one [`TrustConfig`] per client identity
//! and one [`ServerTrust`] per server identity.
//!
//! ## Cache discipline
//!
//! - Caches are `DashMap`s keyed by identity; a value is replaced as a whole,
//!   never mutated in place
//! - No map guard is held across a secret store call
//! - A cache miss fetches once and publishes with `or_insert`, so a value a
//!   watch published meanwhile wins over the older fetch
//! - Watch handlers replace the cache entry before the caller's handler runs
//!
//! ## Fail-open
//!
//! A missing or empty TLS secret yields [`TrustConfig::Insecure`] for clients
//! and a self-signed certificate for servers. Both are logged and exported
//! through the `trust_config_state` gauge so the state can be alerted on.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::roots::{append_pem, best_effort_trust_pool, NativeRoots, RootSource};
use super::server::ServerTrust;
use super::trust::TrustConfig;
use crate::config::{ClientIdentity, IdentityEntry, IdentityTable, TrustSettings};
use crate::errors::{Error, Result, TlsError};
use crate::observability::MetricsRecorder;
use crate::secrets::{SecretSnapshot, SecretStore, TimeoutSecretStore};
use crate::watch::{ChangeEvent, RetryPolicy, Supervisor, WatchHandle};

/// Client trust plus the certificate it was built from, published together.
#[derive(Debug, Clone)]
struct ClientTrust {
    config: TrustConfig,
    certificate_pem: Option<Bytes>,
}

struct Inner<S: SecretStore + 'static> {
    store: Arc<S>,
    namespace: String,
    identities: IdentityTable,
    roots: Arc<dyn RootSource>,
    clients: DashMap<ClientIdentity, ClientTrust>,
    servers: DashMap<ClientIdentity, ServerTrust>,
    self_signed: DashMap<ClientIdentity, ServerTrust>,
    supervisor: Supervisor<S>,
    cache_watches: Mutex<Vec<WatchHandle>>,
    metrics: MetricsRecorder,
}

/// Per-identity TLS trust, hot-reloaded from secrets.
pub struct TrustManager<S: SecretStore + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: SecretStore + 'static> Clone for TrustManager<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S: SecretStore + 'static> std::fmt::Debug for TrustManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustManager")
            .field("namespace", &self.inner.namespace)
            .field("identities", &self.inner.identities.len())
            .field("cached_clients", &self.inner.clients.len())
            .field("cached_servers", &self.inner.servers.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TrustManager`].
pub struct TrustManagerBuilder<S: SecretStore + 'static> {
    store: Arc<S>,
    namespace: String,
    identities: IdentityTable,
    required: Vec<ClientIdentity>,
    roots: Arc<dyn RootSource>,
    policy: Option<Arc<dyn RetryPolicy>>,
    cancel: CancellationToken,
}

impl<S: SecretStore + 'static> TrustManagerBuilder<S> {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn identities(mut self, identities: IdentityTable) -> Self {
        self.identities = identities;
        self
    }

    /// Identities whose secret must exist at construction. Each gets a
    /// cache watch before `build` returns.
    pub fn required(mut self, required: impl IntoIterator<Item = ClientIdentity>) -> Self {
        self.required = required.into_iter().collect();
        self
    }

    /// Source of platform anchors; defaults to the OS trust store.
    pub fn roots(mut self, roots: Arc<dyn RootSource>) -> Self {
        self.roots = roots;
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Parent cancellation token for every watch the manager starts.
    /// Cancelling it stops the manager's watches; [`TrustManager::shutdown`]
    /// and a failed `build` never cancel it.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve required identities and start their watches.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if a required identity is not in the table
    /// - [`Error::NotFound`] if a required identity's secret is absent
    /// - [`Error::Store`] if a fetch fails
    pub async fn build(self) -> Result<TrustManager<S>> {
        let mut supervisor = Supervisor::new(self.store.clone()).with_cancellation(self.cancel);
        if let Some(policy) = self.policy {
            supervisor = supervisor.with_policy(policy);
        }

        let manager = TrustManager {
            inner: Arc::new(Inner {
                store: self.store,
                namespace: self.namespace,
                identities: self.identities,
                roots: self.roots,
                clients: DashMap::new(),
                servers: DashMap::new(),
                self_signed: DashMap::new(),
                supervisor,
                cache_watches: Mutex::new(Vec::new()),
                metrics: MetricsRecorder::new(),
            }),
        };

        for identity in &self.required {
            if let Err(e) = manager.start_required(identity).await {
                manager.inner.supervisor.shutdown();
                return Err(e);
            }
        }

        info!(
            namespace = %manager.inner.namespace,
            identities = manager.inner.identities.len(),
            required = self.required.len(),
            "Trust manager initialized"
        );

        Ok(manager)
    }
}

impl<S: SecretStore + 'static> TrustManager<S> {
    pub fn builder(store: Arc<S>) -> TrustManagerBuilder<S> {
        TrustManagerBuilder {
            store,
            namespace: "default".to_string(),
            identities: IdentityTable::atlas_defaults(),
            required: Vec::new(),
            roots: Arc::new(NativeRoots::new()),
            policy: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Build from settings; every store call is bounded by `fetch_timeout_ms`.
    pub async fn from_settings(
        store: S,
        settings: &TrustSettings,
    ) -> Result<TrustManager<TimeoutSecretStore<S>>> {
        settings.validate()?;

        let store = TimeoutSecretStore::new(store, settings.fetch_timeout());
        TrustManager::builder(Arc::new(store))
            .namespace(settings.namespace.clone())
            .identities(settings.identities.clone())
            .required(settings.required.clone())
            .retry_policy(settings.watch_retry.build())
            .build()
            .await
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn identities(&self) -> &IdentityTable {
        &self.inner.identities
    }

    /// Cached client trust for `identity`, fetching once on a miss.
    ///
    /// An absent secret is not an error: the result is [`TrustConfig::Insecure`].
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn get_client_trust_config(&self, identity: &ClientIdentity) -> Result<TrustConfig> {
        Ok(self.client_trust(identity).await?.config)
    }

    /// Certificate PEM behind `identity`'s client trust; `None` when the
    /// secret or its certificate field is absent.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn get_client_certificate_pem(&self, identity: &ClientIdentity) -> Result<Option<Bytes>> {
        Ok(self.client_trust(identity).await?.certificate_pem)
    }

    /// Follow `identity`'s secret. On every change the cache is replaced,
    /// then `handler` receives the new configuration (`Insecure` on delete).
    pub fn watch_client_trust_config<H>(&self, identity: &ClientIdentity, mut handler: H) -> Result<WatchHandle>
    where
        H: FnMut(TrustConfig) + Send + 'static,
    {
        self.watch_client(identity, move |trust| handler(trust.config))
    }

    /// Like [`Self::watch_client_trust_config`] but hands out the raw
    /// certificate PEM (`None` on delete).
    pub fn watch_client_certificate_pem<H>(&self, identity: &ClientIdentity, mut handler: H) -> Result<WatchHandle>
    where
        H: FnMut(Option<Bytes>) + Send + 'static,
    {
        self.watch_client(identity, move |trust| handler(trust.certificate_pem))
    }

    /// Server configuration for `identity`.
    ///
    /// Built from the certificate and key fields when the secret exists,
    /// otherwise a self-signed fallback generated once per identity.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn get_server_tls_config(&self, identity: &ClientIdentity) -> Result<ServerTrust> {
        if let Some(cached) = self.inner.servers.get(identity) {
            return Ok(cached.value().clone());
        }

        let entry = self.inner.identities.lookup(identity)?;
        let snapshot = self.inner.store.fetch(&entry.secret_name, &self.inner.namespace).await?;
        let built = self.inner.build_server(identity, entry, snapshot.as_ref())?;

        let published = self.inner.servers.entry(identity.clone()).or_insert(built).value().clone();
        Ok(published)
    }

    /// Follow `identity`'s secret for server use. `handler` receives the new
    /// configuration, the self-signed fallback on delete, or the error when
    /// the new material is unusable (the cache then keeps the last good value).
    pub fn watch_server_tls_config<H>(&self, identity: &ClientIdentity, mut handler: H) -> Result<WatchHandle>
    where
        H: FnMut(Result<ServerTrust>) + Send + 'static,
    {
        let entry = self.inner.identities.lookup(identity)?.clone();
        let inner = self.inner.clone();
        let identity = identity.clone();

        Ok(self.inner.supervisor.spawn(
            entry.secret_name.clone(),
            self.inner.namespace.clone(),
            move |event| {
                let result = inner.build_server(&identity, &entry, event.data());
                if let Ok(server) = &result {
                    inner.servers.insert(identity.clone(), server.clone());
                    info!(
                        identity = %identity,
                        kind = %event.kind(),
                        self_signed = server.is_self_signed(),
                        "Server TLS configuration replaced"
                    );
                }
                handler(result);
            },
        ))
    }

    /// Stop every watch started by this manager and wait for the cache
    /// watches to finish. Handles returned to callers end as well.
    pub async fn shutdown(&self) {
        self.inner.supervisor.shutdown();

        let handles = match self.inner.cache_watches.lock() {
            Ok(mut watches) => std::mem::take(&mut *watches),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            let secret = handle.secret().to_string();
            if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle.join()).await {
                warn!(secret = %secret, error = %e, "Cache watch did not stop in time");
            }
        }

        debug!("Trust manager shut down");
    }

    async fn client_trust(&self, identity: &ClientIdentity) -> Result<ClientTrust> {
        if let Some(cached) = self.inner.clients.get(identity) {
            return Ok(cached.value().clone());
        }

        let entry = self.inner.identities.lookup(identity)?;
        let snapshot = self.inner.store.fetch(&entry.secret_name, &self.inner.namespace).await?;
        let built = self.inner.build_client(identity, entry, snapshot.as_ref());

        let published = self.inner.clients.entry(identity.clone()).or_insert(built).value().clone();
        self.inner.metrics.record_trust_state(identity.as_str(), published.config.is_insecure());

        Ok(published)
    }

    fn watch_client<H>(&self, identity: &ClientIdentity, mut handler: H) -> Result<WatchHandle>
    where
        H: FnMut(ClientTrust) + Send + 'static,
    {
        let entry = self.inner.identities.lookup(identity)?.clone();
        let inner = self.inner.clone();
        let identity = identity.clone();

        Ok(self.inner.supervisor.spawn(
            entry.secret_name.clone(),
            self.inner.namespace.clone(),
            move |event| {
                let trust = inner.replace_client(&identity, &entry, &event);
                handler(trust);
            },
        ))
    }

    async fn start_required(&self, identity: &ClientIdentity) -> Result<()> {
        let entry = self.inner.identities.lookup(identity)?.clone();
        let snapshot = self
            .inner
            .store
            .fetch(&entry.secret_name, &self.inner.namespace)
            .await?
            .filter(|snapshot| !snapshot.is_empty())
            .ok_or_else(|| Error::secret_not_found(entry.secret_name.clone()))?;

        let trust = self.inner.build_client(identity, &entry, Some(&snapshot));
        self.inner.metrics.record_trust_state(identity.as_str(), trust.config.is_insecure());
        self.inner.clients.insert(identity.clone(), trust);

        let handle = self.watch_client(identity, |_| {})?;
        match self.inner.cache_watches.lock() {
            Ok(mut watches) => watches.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }

        debug!(identity = %identity, secret = %entry.secret_name, "Required identity resolved");
        Ok(())
    }
}

impl<S: SecretStore + 'static> Inner<S> {
    fn build_client(
        &self,
        identity: &ClientIdentity,
        entry: &IdentityEntry,
        snapshot: Option<&SecretSnapshot>,
    ) -> ClientTrust {
        let Some(snapshot) = snapshot.filter(|snapshot| !snapshot.is_empty()) else {
            warn!(
                identity = %identity,
                secret = %entry.secret_name,
                "TLS secret not found, peer verification disabled"
            );
            return ClientTrust { config: TrustConfig::Insecure, certificate_pem: None };
        };

        let mut pool = best_effort_trust_pool(self.roots.as_ref());
        let certificate_pem = snapshot.non_empty(&entry.cert_field).cloned();

        match &certificate_pem {
            Some(pem) => match append_pem(&mut pool, &entry.secret_name, &entry.cert_field, pem) {
                Ok(added) => debug!(identity = %identity, added, "Built verified trust pool"),
                Err(e) => warn!(
                    identity = %identity,
                    error = %e,
                    "Certificate not appended, trusting platform roots only"
                ),
            },
            None => warn!(
                identity = %identity,
                secret = %entry.secret_name,
                field = %entry.cert_field,
                "TLS secret has no certificate, trusting platform roots only"
            ),
        }

        ClientTrust { config: TrustConfig::verified(pool), certificate_pem }
    }

    fn replace_client(
        &self,
        identity: &ClientIdentity,
        entry: &IdentityEntry,
        event: &ChangeEvent,
    ) -> ClientTrust {
        let trust = self.build_client(identity, entry, event.data());
        self.clients.insert(identity.clone(), trust.clone());
        self.metrics.record_trust_state(identity.as_str(), trust.config.is_insecure());

        info!(
            identity = %identity,
            kind = %event.kind(),
            state = trust.config.state(),
            "Client trust configuration replaced"
        );
        trust
    }

    fn build_server(
        &self,
        identity: &ClientIdentity,
        entry: &IdentityEntry,
        snapshot: Option<&SecretSnapshot>,
    ) -> Result<ServerTrust> {
        let Some(snapshot) = snapshot.filter(|snapshot| !snapshot.is_empty()) else {
            warn!(
                identity = %identity,
                secret = %entry.secret_name,
                "TLS secret not found, serving a self-signed certificate"
            );
            return self.self_signed(identity, entry);
        };

        let missing = |field: &str| TlsError::MissingField {
            secret: entry.secret_name.clone(),
            field: field.to_string(),
        };
        let cert = snapshot.non_empty(&entry.cert_field).ok_or_else(|| missing(&entry.cert_field))?;
        let key = snapshot.non_empty(&entry.key_field).ok_or_else(|| missing(&entry.key_field))?;

        Ok(ServerTrust::from_pem(&entry.secret_name, &entry.cert_field, cert, key)?)
    }

    fn self_signed(&self, identity: &ClientIdentity, entry: &IdentityEntry) -> Result<ServerTrust> {
        let generated = self
            .self_signed
            .entry(identity.clone())
            .or_try_insert_with(|| ServerTrust::self_signed(identity.as_str(), entry.dns_name.as_deref()))?
            .value()
            .clone();
        Ok(generated)
    }
}
