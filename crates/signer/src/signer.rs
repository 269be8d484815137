//! Inter-node request signing and verification.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use base64::Engine;
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// How far a request timestamp may lag (or lead, for clock skew) before the
/// signature is rejected as a replay.
pub const MAX_TIMESTAMP_AGE_SECS: i64 = 600;

/// Signs outbound inter-node requests with this node's delegate key and
/// verifies inbound ones against a peer's advertised delegate key.
///
/// The signed message binds the sender, the moment of signing, and the body:
/// `"{sp_id}:{unix_timestamp}:{sha256_hex(body)}"`.
pub struct RequestSigner {
    keypair: KeyPair,
}

impl RequestSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// This node's delegate public key, hex-encoded for chain registration.
    pub fn public_key_hex(&self) -> String {
        self.keypair.public.to_hex()
    }

    /// Sign a request body on behalf of `sp_id` at `timestamp`.
    /// Returns the base64 signature.
    pub fn sign(&self, sp_id: u64, timestamp: OffsetDateTime, body: &[u8]) -> String {
        let message = signed_message(sp_id, timestamp, body);
        let signature = self.keypair.secret.signing_key().sign(message.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    }

    /// Verify a peer's signature over a request body.
    pub fn verify(
        public_key: &PublicKey,
        sp_id: u64,
        timestamp: OffsetDateTime,
        body: &[u8],
        signature_b64: &str,
        now: OffsetDateTime,
    ) -> SignerResult<()> {
        let age = (now - timestamp).whole_seconds();
        if age.abs() > MAX_TIMESTAMP_AGE_SECS {
            return Err(SignerError::StaleTimestamp(format!(
                "request signed {age}s away from now"
            )));
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;
        let sig_bytes: [u8; 64] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            SignerError::InvalidSignature(format!("expected 64 bytes, got {}", bytes.len()))
        })?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        let message = signed_message(sp_id, timestamp, body);
        public_key
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .map_err(|_| SignerError::VerificationFailed)
    }
}

fn signed_message(sp_id: u64, timestamp: OffsetDateTime, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let body_hash = hex::encode(hasher.finalize());
    format!("{sp_id}:{}:{body_hash}", timestamp.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn sign_verify_roundtrip() {
        let signer = RequestSigner::new(KeyPair::generate());
        let now = OffsetDateTime::now_utc();
        let sig = signer.sign(7, now, b"{\"wallet\":[]}");

        let public = PublicKey::from_hex(&signer.public_key_hex()).unwrap();
        RequestSigner::verify(&public, 7, now, b"{\"wallet\":[]}", &sig, now).unwrap();
    }

    #[test]
    fn rejects_tampered_body() {
        let signer = RequestSigner::new(KeyPair::generate());
        let now = OffsetDateTime::now_utc();
        let sig = signer.sign(7, now, b"original");

        let public = PublicKey::from_hex(&signer.public_key_hex()).unwrap();
        let err = RequestSigner::verify(&public, 7, now, b"tampered", &sig, now).unwrap_err();
        assert!(matches!(err, SignerError::VerificationFailed));
    }

    #[test]
    fn rejects_wrong_sender() {
        let signer = RequestSigner::new(KeyPair::generate());
        let now = OffsetDateTime::now_utc();
        let sig = signer.sign(7, now, b"body");

        let public = PublicKey::from_hex(&signer.public_key_hex()).unwrap();
        let err = RequestSigner::verify(&public, 8, now, b"body", &sig, now).unwrap_err();
        assert!(matches!(err, SignerError::VerificationFailed));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let signer = RequestSigner::new(KeyPair::generate());
        let then = OffsetDateTime::now_utc() - Duration::seconds(MAX_TIMESTAMP_AGE_SECS + 60);
        let sig = signer.sign(7, then, b"body");

        let public = PublicKey::from_hex(&signer.public_key_hex()).unwrap();
        let err = RequestSigner::verify(
            &public,
            7,
            then,
            b"body",
            &sig,
            OffsetDateTime::now_utc(),
        )
        .unwrap_err();
        assert!(matches!(err, SignerError::StaleTimestamp(_)));
    }
}
