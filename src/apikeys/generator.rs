//! Token generation schemes.
//!
//! Every scheme mints 64-character tokens. The random scheme is the
//! default; the HMAC scheme derives the token from a stored nonce so a
//! record can be checked for internal consistency at verification time.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::secrets::{SecretSnapshot, SecretString};

/// Length of every issued token.
pub const TOKEN_LENGTH: usize = 64;

/// Field holding the hex nonce of HMAC-derived tokens.
pub const NONCE_FIELD: &str = "nonce";

const NONCE_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// A freshly minted token and any extra fields to store next to it.
pub struct MintedToken {
    pub token: SecretString,
    pub fields: Vec<(String, Bytes)>,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintedToken")
            .field("token", &self.token)
            .field("fields", &self.fields.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish()
    }
}

/// A scheme for minting bearer tokens.
pub trait TokenGenerator: Send + Sync + fmt::Debug {
    fn generate(&self) -> Result<MintedToken>;

    /// Whether a stored token is consistent with the rest of its record.
    fn is_consistent(&self, token: &SecretString, record: &SecretSnapshot) -> bool;
}

/// 64 alphanumeric characters from the OS RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> Result<MintedToken> {
        let token: String =
            OsRng.sample_iter(&Alphanumeric).take(TOKEN_LENGTH).map(char::from).collect();
        Ok(MintedToken { token: SecretString::new(token), fields: Vec::new() })
    }

    fn is_consistent(&self, _token: &SecretString, _record: &SecretSnapshot) -> bool {
        true
    }
}

/// Hex HMAC-SHA256 over a fresh 32-byte nonce, keyed by a shared key.
///
/// The nonce is stored with the token; verification recomputes the digest
/// from it and rejects records that no longer match.
pub struct HmacTokenGenerator {
    key: Zeroizing<Vec<u8>>,
}

impl HmacTokenGenerator {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = Zeroizing::new(key.into());
        if key.is_empty() {
            return Err(Error::configuration("HMAC token key cannot be empty"));
        }
        Ok(Self { key })
    }

    fn digest(&self, nonce: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::internal(format!("Invalid HMAC key: {}", e)))?;
        mac.update(nonce);
        Ok(mac)
    }
}

impl fmt::Debug for HmacTokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacTokenGenerator").field("key", &"[REDACTED]").finish()
    }
}

impl TokenGenerator for HmacTokenGenerator {
    fn generate(&self) -> Result<MintedToken> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let token = hex::encode(self.digest(&nonce)?.finalize().into_bytes());

        Ok(MintedToken {
            token: SecretString::new(token),
            fields: vec![(NONCE_FIELD.to_string(), Bytes::from(hex::encode(nonce)))],
        })
    }

    fn is_consistent(&self, token: &SecretString, record: &SecretSnapshot) -> bool {
        let Some(nonce) = record.get(NONCE_FIELD).and_then(|hex_nonce| hex::decode(hex_nonce).ok())
        else {
            return false;
        };
        let Ok(expected) = hex::decode(token.expose_secret()) else {
            return false;
        };

        match self.digest(&nonce) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}
