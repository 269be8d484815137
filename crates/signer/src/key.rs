//! Ed25519 delegate key types and operations.

use crate::error::{SignerError, SignerResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;

/// A node's secret delegate key for signing inter-node requests.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from 64 hex characters (32 secret key bytes).
    pub fn from_hex(s: &str) -> SignerResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid hex: {e}")))?;
        let secret_bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            SignerError::KeyParsing(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self {
            inner: SigningKey::from_bytes(&secret_bytes),
        })
    }

    /// Encode as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A delegate public key for verification.
#[derive(Clone)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse from 64 hex characters (32 public key bytes).
    pub fn from_hex(s: &str) -> SignerResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid hex: {e}")))?;
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            SignerError::KeyParsing(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let inner = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;
        Ok(Self { inner })
    }

    /// Encode as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..8])
    }
}

/// A delegate key pair.
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Parse from a hex-encoded secret key.
    pub fn from_secret_hex(s: &str) -> SignerResult<Self> {
        let secret = SecretKey::from_hex(s)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_hex_roundtrip() {
        let keypair = KeyPair::generate();
        let parsed = KeyPair::from_secret_hex(&keypair.secret.to_hex()).unwrap();
        assert_eq!(parsed.public.to_hex(), keypair.public.to_hex());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(SecretKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex("abcd").is_err());
    }
}
