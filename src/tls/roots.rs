//! Trust pool sources.
//!
//! A trust pool starts from the platform's trust store when one can be
//! loaded and from an empty store otherwise. Every call hands out an owned
//! [`RootCertStore`], so appending an identity's certificate to one pool
//! never leaks into another identity's pool.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::errors::TlsError;

/// Source of platform trust anchors.
pub trait RootSource: Send + Sync + fmt::Debug {
    /// A fresh copy of the platform anchors, or `None` when unavailable.
    fn load(&self) -> Option<RootCertStore>;
}

/// The operating system's trust store, loaded once and copied per call.
#[derive(Debug, Default)]
pub struct NativeRoots {
    cached: OnceLock<Option<RootCertStore>>,
}

impl NativeRoots {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_platform() -> Option<RootCertStore> {
        let result = rustls_native_certs::load_native_certs();
        for error in &result.errors {
            warn!(error = %error, "Error while loading platform trust store");
        }

        if result.certs.is_empty() {
            debug!("Platform trust store not found");
            return None;
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(result.certs);
        debug!(added, ignored, "Platform trust store loaded");

        (!roots.is_empty()).then_some(roots)
    }
}

impl RootSource for NativeRoots {
    fn load(&self) -> Option<RootCertStore> {
        self.cached.get_or_init(Self::load_platform).clone()
    }
}

/// A source that never has platform anchors.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlatformRoots;

impl RootSource for NoPlatformRoots {
    fn load(&self) -> Option<RootCertStore> {
        None
    }
}

/// A fixed set of anchors standing in for the platform store.
#[derive(Debug, Clone)]
pub struct StaticRoots(RootCertStore);

impl StaticRoots {
    pub fn new(roots: RootCertStore) -> Self {
        Self(roots)
    }

    /// Build from PEM certificates; fails when none parse.
    pub fn from_pem(name: &str, pem: &[u8]) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        append_pem(&mut roots, name, "roots", pem)?;
        Ok(Self(roots))
    }
}

impl RootSource for StaticRoots {
    fn load(&self) -> Option<RootCertStore> {
        Some(self.0.clone())
    }
}

/// Platform pool when available, else a new empty pool. Never fails.
///
/// The returned store is owned by the caller.
pub fn best_effort_trust_pool(source: &dyn RootSource) -> RootCertStore {
    match source.load() {
        Some(roots) => roots,
        None => {
            debug!("No platform trust store, starting from an empty pool");
            RootCertStore::empty()
        }
    }
}

/// Append every PEM certificate in `pem` to `pool`; returns how many were added.
pub fn append_pem(
    pool: &mut RootCertStore,
    secret: &str,
    field: &str,
    pem: &[u8],
) -> Result<usize, TlsError> {
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<_, _>>()
        .map_err(|err| TlsError::InvalidCertificatePem {
            secret: secret.to_string(),
            field: field.to_string(),
            source: anyhow::anyhow!(err),
        })?;

    if certs.is_empty() {
        return Err(TlsError::EmptyCertificateChain {
            secret: secret.to_string(),
            field: field.to_string(),
        });
    }

    let count = certs.len();
    for cert in certs {
        log_subject(secret, &cert);
        pool.add(cert)?;
    }

    Ok(count)
}

fn log_subject(secret: &str, cert: &CertificateDer<'_>) {
    match x509_parser::parse_x509_certificate(cert.as_ref()) {
        Ok((_, parsed)) => debug!(
            secret = %secret,
            subject = %parsed.subject(),
            not_after = %parsed.validity().not_after,
            "Appending certificate to trust pool"
        ),
        Err(e) => debug!(secret = %secret, error = %e, "Appending unparsed certificate to trust pool"),
    }
}
