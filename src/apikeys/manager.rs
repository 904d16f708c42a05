//! # Credential Manager
//!
//! Issues, stores, verifies and rotates bearer tokens. Each token lives in
//! its own secret, named after the credential, under the `data` field of
//! the credential namespace.
//!
//! Rotation has no grace window: once `rotate` returns, only the new token
//! verifies. Nothing is pushed to holders of the old token; they learn of
//! the change through `get` or by watching the credential's secret.

use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::generator::{RandomTokenGenerator, TokenGenerator};
use crate::config::TrustSettings;
use crate::credential_span;
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::secrets::{SecretSnapshot, SecretStore, SecretString, SecretsError, TimeoutSecretStore, DATA_FIELD};

/// The current token of one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub name: String,
    pub token: SecretString,
}

/// Bearer token lifecycle against the secret store.
pub struct CredentialManager<S: SecretStore + 'static> {
    store: Arc<S>,
    namespace: String,
    generator: Arc<dyn TokenGenerator>,
    metrics: MetricsRecorder,
}

impl<S: SecretStore + 'static> Clone for CredentialManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            generator: self.generator.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: SecretStore + 'static> std::fmt::Debug for CredentialManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("namespace", &self.namespace)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore + 'static> CredentialManager<S> {
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            generator: Arc::new(RandomTokenGenerator),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Build from settings; every store call is bounded by `fetch_timeout_ms`.
    pub fn from_settings(
        store: S,
        settings: &TrustSettings,
    ) -> Result<CredentialManager<TimeoutSecretStore<S>>> {
        settings.validate()?;

        let store = TimeoutSecretStore::new(store, settings.fetch_timeout());
        Ok(CredentialManager::new(Arc::new(store), settings.credential_namespace.clone()))
    }

    pub fn with_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Mint a token and store it under `name`, replacing any previous one.
    pub async fn issue(&self, name: &str) -> Result<SecretString> {
        let result = self.store_new_token(name).instrument(credential_span!("issue", name)).await;
        self.metrics.record_credential_operation("issue", result.is_ok());
        result
    }

    /// Current token for `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when no record exists
    /// - [`Error::Store`] when the lookup itself fails, or when the record
    ///   fails the generator's consistency check
    pub async fn get(&self, name: &str) -> Result<SecretString> {
        let result = self.get_record(name).await.map(|record| record.token);
        self.metrics.record_credential_operation("get", result.is_ok());
        result
    }

    /// Current record for `name`.
    pub async fn get_record(&self, name: &str) -> Result<CredentialRecord> {
        let (token, record) = self.load(name).instrument(credential_span!("get", name)).await?;
        if !self.generator.is_consistent(&token, &record) {
            warn!(credential = %name, "Stored credential does not match its nonce");
            return Err(SecretsError::invalid_value(format!(
                "credential '{}' does not match its nonce",
                name
            ))
            .into());
        }
        Ok(CredentialRecord { name: name.to_string(), token })
    }

    /// Token held by a watched credential secret, or `None` when the record
    /// has no usable token or fails the generator's consistency check.
    pub(crate) fn token_from_snapshot(&self, name: &str, snapshot: &SecretSnapshot) -> Option<SecretString> {
        let data = snapshot.non_empty(DATA_FIELD)?;
        let token = std::str::from_utf8(data).ok().map(SecretString::from)?;
        if !self.generator.is_consistent(&token, snapshot) {
            warn!(credential = %name, "Stored credential does not match its nonce");
            return None;
        }
        Some(token)
    }

    /// Compare `candidate` with the stored token in constant time.
    ///
    /// `Ok(false)` means the candidate is wrong. An `Err` means the answer
    /// is unknown (lookup failed or no record) and must not be read as
    /// "invalid credential".
    pub async fn verify(&self, candidate: &str, name: &str) -> Result<bool> {
        let result = self
            .load(name)
            .instrument(credential_span!("verify", name))
            .await
            .map(|(token, record)| {
                if !self.generator.is_consistent(&token, &record) {
                    warn!(credential = %name, "Stored credential does not match its nonce");
                    return false;
                }
                token.matches(candidate)
            });

        self.metrics.record_credential_operation("verify", result.is_ok());
        result
    }

    /// Replace the token under `name`. The old token stops verifying at once.
    pub async fn rotate(&self, name: &str) -> Result<SecretString> {
        let result = self.store_new_token(name).instrument(credential_span!("rotate", name)).await;
        self.metrics.record_credential_operation("rotate", result.is_ok());
        result
    }

    /// Delete the record for `name`; later lookups report `NotFound`.
    pub async fn revoke(&self, name: &str) -> Result<()> {
        let result = async {
            self.store.delete(name, &self.namespace).await.map_err(|e| match e {
                SecretsError::NotFound { .. } => Error::credential_not_found(name),
                other => Error::from(other),
            })?;
            info!(credential = %name, "Revoked credential");
            Ok(())
        }
        .instrument(credential_span!("revoke", name))
        .await;

        self.metrics.record_credential_operation("revoke", result.is_ok());
        result
    }

    async fn store_new_token(&self, name: &str) -> Result<SecretString> {
        let minted = self.generator.generate()?;

        let snapshot = minted
            .fields
            .into_iter()
            .collect::<SecretSnapshot>()
            .with_field(DATA_FIELD, minted.token.expose_secret().to_string());

        self.store.apply(name, &self.namespace, snapshot).await?;

        info!(credential = %name, namespace = %self.namespace, "Stored new credential");
        Ok(minted.token)
    }

    async fn load(&self, name: &str) -> Result<(SecretString, SecretSnapshot)> {
        let snapshot = self
            .store
            .fetch(name, &self.namespace)
            .await?
            .ok_or_else(|| Error::credential_not_found(name))?;

        let data = snapshot.non_empty(DATA_FIELD).ok_or_else(|| {
            debug!(credential = %name, "Credential secret has no token");
            Error::credential_not_found(name)
        })?;
        let token = std::str::from_utf8(data)
            .map(SecretString::from)
            .map_err(|_| SecretsError::invalid_value(format!("credential '{}' is not UTF-8", name)))?;

        Ok((token, snapshot))
    }
}
