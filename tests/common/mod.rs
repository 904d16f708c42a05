//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use atlas_trust::secrets::{MemorySecretStore, SecretSnapshot};
use atlas_trust::tls::{NoPlatformRoots, TrustManager};
use rcgen::{CertificateParams, DnType, KeyPair, SanType};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};

pub const NAMESPACE: &str = "default";

/// A generated certificate and its private key, both PEM encoded.
pub struct TestCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestCertificate {
    /// Self-signed certificate valid for `dns_name` and 127.0.0.1.
    pub fn for_host(dns_name: &str) -> anyhow::Result<Self> {
        let mut params =
            CertificateParams::new(vec![dns_name.to_string()]).context("build certificate params")?;
        params.distinguished_name.push(DnType::CommonName, dns_name);
        params.distinguished_name.push(DnType::OrganizationName, "Atlas Test");
        params.subject_alt_names.push(SanType::IpAddress(Ipv4Addr::LOCALHOST.into()));

        let key = KeyPair::generate().context("generate key pair")?;
        let cert = params.self_signed(&key).context("self-sign certificate")?;

        Ok(Self { cert_pem: cert.pem(), key_pem: key.serialize_pem() })
    }

    /// Snapshot with `tls.crt` and `tls.key`.
    pub fn tls_snapshot(&self) -> SecretSnapshot {
        SecretSnapshot::new()
            .with_field("tls.crt", self.cert_pem.clone())
            .with_field("tls.key", self.key_pem.clone())
    }
}

/// Trust manager over `store` that starts from an empty platform pool.
pub async fn trust_manager(store: &MemorySecretStore) -> TrustManager<MemorySecretStore> {
    TrustManager::builder(Arc::new(store.clone()))
        .namespace(NAMESPACE)
        .roots(Arc::new(NoPlatformRoots))
        .build()
        .await
        .expect("trust manager builds")
}

/// Poll `condition` until it holds; fails the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

pub async fn wait_for_watchers(store: &MemorySecretStore, count: usize) {
    wait_until(|| store.watcher_count() == count).await;
}

/// Full in-memory TLS handshake between the two configurations.
pub fn handshake(
    client: Arc<ClientConfig>,
    server: Arc<ServerConfig>,
    server_name: &str,
) -> Result<(), rustls::Error> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| rustls::Error::General(e.to_string()))?;
    let mut client = Connection::Client(ClientConnection::new(client, name)?);
    let mut server = Connection::Server(ServerConnection::new(server)?);

    for _ in 0..10 {
        transfer(&mut client, &mut server)?;
        transfer(&mut server, &mut client)?;
        if !client.is_handshaking() && !server.is_handshaking() {
            return Ok(());
        }
    }

    Err(rustls::Error::General("handshake did not complete".to_string()))
}

fn transfer(from: &mut Connection, to: &mut Connection) -> Result<(), rustls::Error> {
    let mut buffer = Vec::new();
    while from.wants_write() {
        from.write_tls(&mut buffer).map_err(|e| rustls::Error::General(e.to_string()))?;
    }

    let mut pending = &buffer[..];
    while !pending.is_empty() {
        to.read_tls(&mut pending).map_err(|e| rustls::Error::General(e.to_string()))?;
        to.process_new_packets()?;
    }

    Ok(())
}
