//! Content-addressed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors converting identifiers from their hex form.
#[derive(Debug, Error)]
pub enum IdError {
    /// Input was not valid hex
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Input decoded to the wrong number of bytes
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

fn decode32(s: &str) -> Result<[u8; 32], IdError> {
    let bytes = hex::decode(s)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| IdError::Length(len))
}

/// Identifier of an event: the 32-byte hash of its content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    /// Derive an id by hashing the given content.
    pub fn from_payload(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        decode32(s).map(Self)
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.short())
    }
}

/// Identifier of an author: the 32-byte public key fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorId(pub [u8; 32]);

impl AuthorId {
    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        decode32(s).map(Self)
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorId({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_hash_is_stable() {
        let a = EventId::from_payload(b"hello");
        let b = EventId::from_payload(b"hello");
        let c = EventId::from_payload(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hex_roundtrip() {
        let id = EventId::from_payload(b"roundtrip");
        let parsed = EventId::from_hex(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_short_hex() {
        assert!(matches!(EventId::from_hex("abcd"), Err(IdError::Length(2))));
        assert!(EventId::from_hex("zz").is_err());
    }
}
