//! Delegate-key signing for inter-node requests.
//!
//! Every chorus node holds an ed25519 delegate key whose public half is
//! registered on chain. Sync triggers between nodes carry a signature over
//! the sender's sp id, a timestamp, and the body hash, verified against the
//! chain-registered key.

pub mod error;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{MAX_TIMESTAMP_AGE_SECS, RequestSigner};
