//! Server-side TLS material.
//!
//! A [`ServerTrust`] is built either from an identity's `tls.crt`/`tls.key`
//! pair or, while that secret is not provisioned, from a self-signed
//! certificate generated in process. Both forms accept TLS 1.3 only.

use bytes::Bytes;
use rcgen::{
    CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::info;

use crate::errors::TlsError;

const ORGANIZATION: &str = "Atlas";
const LOCALHOST: &str = "localhost";

/// A built server configuration plus the certificate it presents.
#[derive(Clone)]
pub struct ServerTrust {
    config: Arc<ServerConfig>,
    certificate_pem: Bytes,
    self_signed: bool,
}

impl ServerTrust {
    /// Build from a PEM certificate chain and private key.
    pub fn from_pem(secret: &str, field: &str, cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let chain: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<_, _>>()
            .map_err(|err| TlsError::InvalidCertificatePem {
                secret: secret.to_string(),
                field: field.to_string(),
                source: anyhow::anyhow!(err),
            })?;

        if chain.is_empty() {
            return Err(TlsError::EmptyCertificateChain {
                secret: secret.to_string(),
                field: field.to_string(),
            });
        }

        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|err| {
            TlsError::InvalidPrivateKey {
                secret: secret.to_string(),
                source: Some(anyhow::anyhow!(err)),
            }
        })?;

        Ok(Self {
            config: Arc::new(build_server_config(chain, key)?),
            certificate_pem: Bytes::copy_from_slice(cert_pem),
            self_signed: false,
        })
    }

    /// Generate a self-signed certificate for `dns_name` (when given),
    /// `localhost` and both loopback addresses.
    pub fn self_signed(identity: &str, dns_name: Option<&str>) -> Result<Self, TlsError> {
        let self_signed_error =
            |source: rcgen::Error| TlsError::SelfSigned { identity: identity.to_string(), source };

        let mut names: Vec<String> = dns_name.map(str::to_string).into_iter().collect();
        names.push(LOCALHOST.to_string());

        let mut params = CertificateParams::new(names).map_err(self_signed_error)?;
        params.subject_alt_names.push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        params.subject_alt_names.push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        params.distinguished_name.push(DnType::CommonName, dns_name.unwrap_or(identity));
        params.distinguished_name.push(DnType::OrganizationName, ORGANIZATION);
        params.key_usages =
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let key_pair = KeyPair::generate().map_err(self_signed_error)?;
        let cert = params.self_signed(&key_pair).map_err(self_signed_error)?;

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = build_server_config(vec![cert.der().clone()], key)?;

        info!(identity = %identity, dns_name = ?dns_name, "Generated self-signed server certificate");

        Ok(Self {
            config: Arc::new(config),
            certificate_pem: Bytes::from(cert.pem()),
            self_signed: true,
        })
    }

    /// The rustls configuration; swap it into a listener wholesale.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    /// PEM of the certificate this configuration presents.
    pub fn certificate_pem(&self) -> &Bytes {
        &self.certificate_pem
    }

    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }
}

impl fmt::Debug for ServerTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTrust")
            .field("self_signed", &self.self_signed)
            .field("certificate_pem_len", &self.certificate_pem.len())
            .finish_non_exhaustive()
    }
}

fn build_server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    let provider = rustls::crypto::ring::default_provider();
    let config = ServerConfig::builder_with_provider(provider.into())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(config)
}
