//! Wallet public key identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user's wallet public key: `0x`-prefixed hex, normalized to lowercase.
///
/// The wallet is the cross-node identity of a user; every replica addresses
/// the same user by the same normalized key, so normalization happens at
/// parse time rather than at comparison sites.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletKey(String);

impl WalletKey {
    /// Parse and normalize a wallet public key.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| crate::Error::InvalidWallet(format!("missing 0x prefix: {s}")))?;
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidWallet(format!("not hex: {s}")));
        }
        Ok(Self(format!("0x{}", body.to_lowercase())))
    }

    /// The normalized key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletKey({})", self.0)
    }
}

impl FromStr for WalletKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for WalletKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
