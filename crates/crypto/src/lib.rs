//! Session cryptography for peer-to-peer photo transfers.
//!
//! Each transfer attempt generates a fresh P-256 key pair, exchanges public
//! keys in PEM form, and compresses the ECDH shared secret into a 16-byte
//! AES-128 key:
//!
//! ```text
//! session_key = SHA3-256(ecdh_x_coordinate)[..16]
//! ```
//!
//! Payloads are then encrypted with AES-128-CBC (PKCS#7 padding) under that
//! key and a random 16-byte IV chosen by the initiator. Nothing here is
//! persisted; all key material lives for one session.

pub mod cipher;
pub mod codec;
pub mod error;
pub mod keys;

pub use cipher::{CipherMode, SessionCipher, ciphertext_len, generate_iv};
pub use codec::{decode_public_key, encode_public_key};
pub use error::CryptoError;
pub use keys::{EphemeralKeyPair, SessionSecret, derive_session_key, fingerprint};

/// Re-exported so callers can name the peer key type without depending on `p256`.
pub use p256::PublicKey;

/// Length of the derived AES-128 session key in bytes.
pub const SESSION_KEY_LEN: usize = 16;

/// Length of the CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;
