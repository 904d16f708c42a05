//! Credential manager and role key behaviour against the in-memory store.

mod common;

use std::sync::Arc;

use atlas_trust::apikeys::{
    cluster_client_wrapper_key, ClientWrapperKey, CredentialManager, HmacTokenGenerator,
    WorkflowTriggerKeys, API_KEY_HEADER, CLIENT_WRAPPER_KEY, TOKEN_LENGTH, WORKFLOW_TRIGGER_KEY,
};
use atlas_trust::config::TrustSettings;
use atlas_trust::secrets::{MemorySecretStore, SecretSnapshot, SecretStore};
use atlas_trust::Error;
use common::{wait_for_watchers, wait_until};

const CREDENTIAL_NAMESPACE: &str = "atlas";

fn credentials(store: &MemorySecretStore) -> CredentialManager<MemorySecretStore> {
    CredentialManager::new(Arc::new(store.clone()), CREDENTIAL_NAMESPACE)
}

#[tokio::test]
async fn test_issue_then_get_returns_same_token() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store);

    for name in ["svc-a", "svc-b"] {
        let issued = manager.issue(name).await?;
        assert_eq!(manager.get(name).await?, issued);

        let record = manager.get_record(name).await?;
        assert_eq!(record.name, name);
        assert_eq!(record.token, issued);
    }

    assert_ne!(manager.get("svc-a").await?, manager.get("svc-b").await?);
    Ok(())
}

#[tokio::test]
async fn test_rotation_invalidates_old_token() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store);

    let k1 = manager.issue("svc-a").await?;
    assert_eq!(k1.len(), TOKEN_LENGTH);
    assert!(manager.verify(k1.expose_secret(), "svc-a").await?);

    let k2 = manager.rotate("svc-a").await?;
    assert_ne!(k1, k2);
    assert!(!manager.verify(k1.expose_secret(), "svc-a").await?);
    assert!(manager.verify(k2.expose_secret(), "svc-a").await?);
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_distinct_from_store_failure() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store);

    let missing = manager.get("svc-a").await.unwrap_err();
    assert!(matches!(missing, Error::NotFound { kind: "Credential", .. }));
    assert!(manager.verify("anything", "svc-a").await.unwrap_err().is_not_found());

    // A secret without a usable data field counts as absent.
    store
        .apply("svc-a", CREDENTIAL_NAMESPACE, SecretSnapshot::new().with_field("other", "value"))
        .await?;
    assert!(manager.get("svc-a").await.unwrap_err().is_not_found());

    store.fail_calls(true);
    let failed = manager.get("svc-a").await.unwrap_err();
    assert!(matches!(failed, Error::Store(_)));
    assert!(!failed.is_not_found());
    assert!(manager.issue("svc-b").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_revoke_removes_the_record() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store);
    let token = manager.issue("svc-a").await?;

    manager.revoke("svc-a").await?;
    assert!(!store.exists("svc-a", CREDENTIAL_NAMESPACE).await?);
    assert!(manager.verify(token.expose_secret(), "svc-a").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_hmac_generator_round_trip() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store)
        .with_generator(Arc::new(HmacTokenGenerator::new(b"cluster-signing-key".to_vec())?));

    let k1 = manager.issue("svc-a").await?;
    assert_eq!(k1.len(), TOKEN_LENGTH);
    assert!(manager.verify(k1.expose_secret(), "svc-a").await?);

    let k2 = manager.rotate("svc-a").await?;
    assert!(!manager.verify(k1.expose_secret(), "svc-a").await?);
    assert!(manager.verify(k2.expose_secret(), "svc-a").await?);

    // A verifier holding a different key rejects the record.
    let other = credentials(&store)
        .with_generator(Arc::new(HmacTokenGenerator::new(b"some-other-key".to_vec())?));
    assert!(!other.verify(k2.expose_secret(), "svc-a").await?);
    Ok(())
}

#[tokio::test]
async fn test_manager_from_settings_uses_credential_namespace() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let settings =
        TrustSettings { credential_namespace: "atlas-keys".to_string(), ..TrustSettings::default() };

    let manager = CredentialManager::from_settings(store.clone(), &settings)?;
    assert_eq!(manager.namespace(), "atlas-keys");

    manager.issue("svc-a").await?;
    assert!(store.exists("svc-a", "atlas-keys").await?);
    assert!(!store.exists("svc-a", CREDENTIAL_NAMESPACE).await?);
    Ok(())
}

#[tokio::test]
async fn test_workflow_trigger_keys_cache_and_rotation() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let keys = WorkflowTriggerKeys::new(credentials(&store));

    keys.generate_default_keys().await?;
    let cluster_key = keys.generate_cluster_key("edge").await?;
    assert!(store.exists(&cluster_client_wrapper_key("edge"), CREDENTIAL_NAMESPACE).await?);

    let trigger = keys.workflow_trigger_key().expect("trigger key cached");
    assert!(keys.verify_request(trigger.expose_secret()));
    assert!(keys.verify_request(cluster_key.expose_secret()));

    let rotated = keys.rotate_workflow_trigger_key().await?;
    assert!(!keys.verify_request(trigger.expose_secret()));
    assert!(keys.verify_request(rotated.expose_secret()));
    Ok(())
}

#[tokio::test]
async fn test_verifier_cache_lags_until_refresh() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let issuer = WorkflowTriggerKeys::new(credentials(&store));
    let verifier = WorkflowTriggerKeys::new(credentials(&store));

    issuer.generate_default_keys().await?;
    let old = verifier.refresh(WORKFLOW_TRIGGER_KEY).await?;

    // Rotation in another process is not seen until the verifier refreshes.
    let new = issuer.rotate_workflow_trigger_key().await?;
    assert!(verifier.verify_request(old.expose_secret()));
    assert!(!verifier.verify_request(new.expose_secret()));

    verifier.refresh(WORKFLOW_TRIGGER_KEY).await?;
    assert!(!verifier.verify_request(old.expose_secret()));
    assert!(verifier.verify_request(new.expose_secret()));
    Ok(())
}

#[tokio::test]
async fn test_watched_cache_follows_rotation() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let issuer = WorkflowTriggerKeys::new(credentials(&store));
    let verifier = WorkflowTriggerKeys::new(credentials(&store));
    issuer.generate_default_keys().await?;

    let handle = verifier.watch(WORKFLOW_TRIGGER_KEY);
    wait_for_watchers(&store, 1).await;

    let rotated = issuer.rotate_workflow_trigger_key().await?;
    wait_until(|| verifier.verify_request(rotated.expose_secret())).await;

    verifier.shutdown();
    handle.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_client_wrapper_key_tracks_its_secret() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store);

    let missing = ClientWrapperKey::load(&manager, CLIENT_WRAPPER_KEY).await.err();
    assert!(missing.is_some_and(|e| e.is_not_found()));

    let first = manager.issue(CLIENT_WRAPPER_KEY).await?;
    let key = ClientWrapperKey::load(&manager, CLIENT_WRAPPER_KEY).await?;
    assert_eq!(key.name(), CLIENT_WRAPPER_KEY);
    assert_eq!(key.api_key()?, first);

    let handle = key.watch();
    wait_for_watchers(&store, 1).await;

    let second = manager.rotate(CLIENT_WRAPPER_KEY).await?;
    wait_until(|| key.api_key().map(|current| current == second).unwrap_or(false)).await;

    assert_eq!(API_KEY_HEADER, "X-Api-Key");

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_role_cache_rejects_record_without_matching_nonce() -> anyhow::Result<()> {
    let store = MemorySecretStore::new();
    let manager = credentials(&store)
        .with_generator(Arc::new(HmacTokenGenerator::new(b"cluster-signing-key".to_vec())?));
    let keys = WorkflowTriggerKeys::new(manager);
    keys.generate_default_keys().await?;

    let forged = "f".repeat(TOKEN_LENGTH);
    let record = store
        .fetch(WORKFLOW_TRIGGER_KEY, CREDENTIAL_NAMESPACE)
        .await?
        .expect("trigger key stored")
        .with_field("data", forged.clone());
    store.apply(WORKFLOW_TRIGGER_KEY, CREDENTIAL_NAMESPACE, record).await?;

    assert!(!keys.credentials().verify(&forged, WORKFLOW_TRIGGER_KEY).await?);
    assert!(keys.refresh(WORKFLOW_TRIGGER_KEY).await.is_err());
    assert!(!keys.verify_request(&forged));
    assert!(keys.workflow_trigger_key().is_none());
    Ok(())
}
