//! Content identifiers and hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A content identifier: the SHA-256 of the content bytes.
///
/// Serialized everywhere (wire, database, storage keys) as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Compute the CID of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidCid(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| crate::Error::InvalidCid(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Storage key under the content root: `<hex[0:2]>/<hex>`.
    ///
    /// The two-character prefix shards the content directory so no single
    /// directory accumulates every object.
    pub fn storage_key(&self) -> String {
        let h = self.to_hex();
        format!("{}/{}", &h[..2], h)
    }

    /// Verify that `data` hashes to this CID.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.to_hex())
    }
}

impl FromStr for Cid {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_roundtrip() {
        let cid = Cid::compute(b"hello");
        let parsed = Cid::from_hex(&cid.to_hex()).unwrap();
        assert_eq!(cid, parsed);
        assert!(cid.matches(b"hello"));
        assert!(!cid.matches(b"goodbye"));
    }

    #[test]
    fn storage_key_is_sharded() {
        let cid = Cid::compute(b"sharded");
        let key = cid.storage_key();
        let hex = cid.to_hex();
        assert_eq!(key, format!("{}/{}", &hex[..2], hex));
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Cid::from_hex("abc").is_err());
        assert!(Cid::from_hex(&"z".repeat(64)).is_err());
    }
}
