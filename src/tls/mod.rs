//! # TLS Trust
//!
//! Turns TLS secrets into live rustls configurations:
//! - [`TrustConfig`]: `Verified` pool or `Insecure`, per client identity
//! - [`ServerTrust`]: server certificate, or a self-signed fallback
//! - [`TrustManager`]: caching, fetch-on-miss and hot reload via secret watches
//! - [`best_effort_trust_pool`]: platform anchors when available, else empty

pub mod manager;
pub mod roots;
pub mod server;
pub mod trust;
pub mod verifier;

pub use manager::{TrustManager, TrustManagerBuilder};
pub use roots::{append_pem, best_effort_trust_pool, NativeRoots, NoPlatformRoots, RootSource, StaticRoots};
pub use server::ServerTrust;
pub use trust::TrustConfig;
pub use verifier::SkipServerVerification;

#[cfg(test)]
pub(crate) mod test_support {
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};
    use std::sync::Arc;

    /// Run a full in-memory handshake between the two configurations.
    pub(crate) fn handshake(
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
}
