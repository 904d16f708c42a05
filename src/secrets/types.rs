//! Value types exchanged with the secret store.
//!
//! [`SecretSnapshot`] is the immutable field map a store hands out for one
//! secret at one point in time. [`SecretString`] wraps token values so they
//! never reach logs, debug output or serialized payloads.

use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Immutable mapping from field name to byte payload.
///
/// Snapshots have no lifecycle of their own: they are built once, handed to
/// config builders and dropped. `Debug` lists field names and sizes only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretSnapshot {
    fields: BTreeMap<String, Bytes>,
}

impl SecretSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion, used before the snapshot is shared.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns the payload of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name)
    }

    /// Returns the payload of `name` when present and non-empty.
    pub fn non_empty(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name).filter(|value| !value.is_empty())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for SecretSnapshot
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl fmt::Debug for SecretSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter().map(|(k, v)| (k, v.len()))).finish()
    }
}

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// # Security
///
/// - Debug output shows `SecretString([REDACTED])` instead of the actual value
/// - Display output shows `[REDACTED]`
/// - Serialization outputs `"[REDACTED]"` (NEVER the actual value)
/// - Equality is constant time, so comparing a presented token against a
///   stored one does not leak the length of the matching prefix
/// - Memory is zeroed when dropped (via `zeroize`)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl SecretString {
    /// Creates a new SecretString from a string value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value.
    ///
    /// Only call this where the raw value is needed (writing it to the
    /// store, putting it on the wire). Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a candidate presented by a caller.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    /// Returns the length of the secret without exposing the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
