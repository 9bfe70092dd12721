//! Ephemeral P-256 key pairs and session key derivation.

use std::fmt;

use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use tracing::debug;
use zeroize::Zeroize;

use crate::{IV_LEN, SESSION_KEY_LEN};

/// A key pair that lives for exactly one transfer attempt.
///
/// The private half never leaves this struct and cannot be serialized.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a fresh key pair on P-256 from the OS random source.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key();
        debug!(fingerprint = %fingerprint(&public), "ephemeral key pair generated");
        Self { secret, public }
    }

    /// Returns the public half, suitable for sending to the peer.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Runs ECDH against the peer's key and compresses the result into the
    /// session secret.
    ///
    /// The peer key is already a validated P-256 point (see
    /// [`decode_public_key`](crate::decode_public_key)), so the agreement
    /// itself cannot fail.
    pub fn agree(&self, peer: &PublicKey, iv: [u8; IV_LEN]) -> SessionSecret {
        let shared = self.secret.diffie_hellman(peer);
        let key = derive_session_key(&shared.raw_secret_bytes()[..]);
        SessionSecret::new(key, iv)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &fingerprint(&self.public))
            .finish_non_exhaustive()
    }
}

/// Compresses raw ECDH output into an AES-128 key.
///
/// Both peers must apply exactly this: SHA3-256 over the shared
/// x-coordinate, keep the first 16 bytes.
pub fn derive_session_key(shared_secret: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let digest = Sha3_256::digest(shared_secret);
    let mut key = [0u8; SESSION_KEY_LEN];
    key.copy_from_slice(&digest[..SESSION_KEY_LEN]);
    key
}

/// Hex SHA3-256 digest of the uncompressed public point, for log output.
pub fn fingerprint(public: &PublicKey) -> String {
    let point = public.to_encoded_point(false);
    hex::encode(Sha3_256::digest(point.as_bytes()))
}

/// Symmetric key and IV for one session.
///
/// The key is wiped from memory when the secret is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret {
    key: [u8; SESSION_KEY_LEN],
    iv: [u8; IV_LEN],
}

impl SessionSecret {
    pub fn new(key: [u8; SESSION_KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl Drop for SessionSecret {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSecret")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(self.iv))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::SecretKey;

    const SCALAR_A: &str = "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";
    const SCALAR_B: &str = "2122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f40";
    const PUBLIC_A: &str = "04515c3d6eb9e396b904d3feca7f54fdcd0cc1e997bf375dca515ad0a6c3b4035f\
                            4536be3a50f318fbf9a5475902a221502bef0d57e08c53b2cc0a56f17d9f9354";
    const SHARED_X: &str = "4fe243908f378aa1c2a69538822e6ed908c3225d8692575507c649901245150a";
    const SESSION_KEY: &str = "066586ecb2cc93abeef9974824496870";

    fn secret_key(hex_scalar: &str) -> SecretKey {
        SecretKey::from_slice(&hex::decode(hex_scalar).unwrap()).unwrap()
    }

    #[test]
    fn both_sides_derive_same_key() {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();
        let iv = [7u8; IV_LEN];

        let a = alice.agree(bob.public_key(), iv);
        let b = bob.agree(alice.public_key(), iv);
        assert_eq!(a.key(), b.key());
        assert_eq!(a, b);
    }

    #[test]
    fn different_peers_give_different_keys() {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();
        let carol = EphemeralKeyPair::generate();
        let iv = [0u8; IV_LEN];

        let ab = alice.agree(bob.public_key(), iv);
        let ac = alice.agree(carol.public_key(), iv);
        assert_ne!(ab.key(), ac.key());
    }

    #[test]
    fn fresh_pairs_are_distinct() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn known_answer_shared_secret_and_key() {
        let a = secret_key(SCALAR_A);
        let b = secret_key(SCALAR_B);

        let expected_public = PublicKey::from_sec1_bytes(&hex::decode(PUBLIC_A).unwrap()).unwrap();
        assert_eq!(a.public_key(), expected_public);

        let shared = p256::ecdh::diffie_hellman(a.to_nonzero_scalar(), b.public_key().as_affine());
        assert_eq!(hex::encode(shared.raw_secret_bytes()), SHARED_X);

        let key = derive_session_key(&shared.raw_secret_bytes()[..]);
        assert_eq!(hex::encode(key), SESSION_KEY);
    }

    #[test]
    fn derivation_is_truncated_sha3() {
        // SHA3-256("") = a7ffc6f8bf1ed76651c14756a061d662f580ff4d...
        let key = derive_session_key(b"");
        assert_eq!(hex::encode(key), "a7ffc6f8bf1ed76651c14756a061d662");
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let pair = EphemeralKeyPair::generate();
        let fp = fingerprint(pair.public_key());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint(pair.public_key()));
    }

    #[test]
    fn debug_output_redacts_key() {
        let secret = SessionSecret::new([0xAB; SESSION_KEY_LEN], [0x01; IV_LEN]);
        let out = format!("{secret:?}");
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("abab"));
        assert!(out.contains(&"01".repeat(IV_LEN)));
    }
}
