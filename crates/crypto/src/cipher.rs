//! AES-128-CBC session cipher with PKCS#7 padding.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;

use crate::error::CryptoError;
use crate::keys::SessionSecret;
use crate::{BLOCK_LEN, IV_LEN};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Symmetric mode announced in cleartext at the start of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// AES-128 in cipher block chaining mode.
    Cbc,
}

impl CipherMode {
    /// The mode used by this implementation.
    pub const DEFAULT: CipherMode = CipherMode::Cbc;

    /// ASCII tag sent on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            CipherMode::Cbc => "cbc",
        }
    }

    /// Parses a wire tag. Returns `None` for modes we do not speak.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"cbc" => Some(CipherMode::Cbc),
            _ => None,
        }
    }
}

/// Generates a random 16-byte IV.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill(&mut iv);
    iv
}

/// Length of the ciphertext produced for `plaintext_len` bytes.
///
/// PKCS#7 always adds between 1 and 16 bytes, so an aligned input gains a
/// whole block.
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN
}

/// Encrypts and decrypts whole messages under one session key and IV.
///
/// Every message restarts the chain from the session IV, matching the peer,
/// which initializes a fresh cipher per frame.
#[derive(Debug, Clone)]
pub struct SessionCipher {
    secret: SessionSecret,
}

impl SessionCipher {
    pub fn new(secret: SessionSecret) -> Self {
        Self { secret }
    }

    pub fn secret(&self) -> &SessionSecret {
        &self.secret
    }

    /// Encrypts `plaintext`, padding it to the block size.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(self.secret.key().into(), self.secret.iv().into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypts `ciphertext` and strips the padding.
    ///
    /// Fails on a length that is not a positive multiple of the block size
    /// or on invalid padding, which is what a key/IV disagreement between
    /// peers looks like.
    ///
    /// This is not an integrity check. CBC without a MAC is malleable: a
    /// tampered frame is only rejected when the damage reaches the padding
    /// block; anywhere else it decrypts to altered plaintext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::Cipher(format!(
                "ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
                ciphertext.len()
            )));
        }
        Aes128CbcDec::new(self.secret.key().into(), self.secret.iv().into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Cipher("invalid padding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SESSION_KEY_LEN;

    // NIST SP 800-38A F.2.1 key and IV.
    const NIST_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
    const NIST_IV: &str = "000102030405060708090a0b0c0d0e0f";

    fn nist_cipher() -> SessionCipher {
        let mut key = [0u8; SESSION_KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        key.copy_from_slice(&hex::decode(NIST_KEY).unwrap());
        iv.copy_from_slice(&hex::decode(NIST_IV).unwrap());
        SessionCipher::new(SessionSecret::new(key, iv))
    }

    fn random_cipher() -> SessionCipher {
        let mut key = [0u8; SESSION_KEY_LEN];
        rand::thread_rng().fill(&mut key);
        SessionCipher::new(SessionSecret::new(key, generate_iv()))
    }

    #[test]
    fn known_answer_cbc_blocks() {
        let plaintext = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51",
        )
        .unwrap();
        let ct = nist_cipher().encrypt(&plaintext);

        assert_eq!(ct.len(), 48);
        assert_eq!(
            hex::encode(&ct),
            "7649abac8119b246cee98e9b12e9197d\
             5086cb9b507219ee95db113a917678b2\
             55e21d7100b988ffec32feeafaf23538"
        );
    }

    #[test]
    fn known_answer_signal_token() {
        let ct = nist_cipher().encrypt(b"PHOTO");
        assert_eq!(hex::encode(&ct), "ace7b51fdf0194ce58987c5ca95c5f5b");
        assert_eq!(nist_cipher().decrypt(&ct).unwrap(), b"PHOTO");
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let cipher = random_cipher();
        for len in [0usize, 1, 15, 16, 17, 100, 4096, 10_001] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let ct = cipher.encrypt(&data);
            assert_eq!(ct.len(), ciphertext_len(len));
            assert_eq!(cipher.decrypt(&ct).unwrap(), data);
        }
    }

    #[test]
    fn ciphertext_len_adds_padding_block() {
        assert_eq!(ciphertext_len(0), 16);
        assert_eq!(ciphertext_len(4), 16);
        assert_eq!(ciphertext_len(15), 16);
        assert_eq!(ciphertext_len(16), 32);
        assert_eq!(ciphertext_len(100), 112);
    }

    #[test]
    fn rejects_unaligned_ciphertext() {
        let cipher = random_cipher();
        let mut ct = cipher.encrypt(b"hello");
        ct.pop();
        assert!(matches!(cipher.decrypt(&ct), Err(CryptoError::Cipher(_))));
        assert!(matches!(cipher.decrypt(&[]), Err(CryptoError::Cipher(_))));
    }

    #[test]
    fn corrupted_padding_is_rejected() {
        let cipher = random_cipher();
        let mut ct = cipher.encrypt(&[0x42; 100]);
        // Flipping the high bit of the byte in the previous block that XORs
        // into the final padding byte turns 0x0c into 0x8c.
        let idx = ct.len() - BLOCK_LEN - 1;
        ct[idx] ^= 0x80;
        assert!(matches!(cipher.decrypt(&ct), Err(CryptoError::Cipher(_))));
    }

    #[test]
    fn first_block_tampering_goes_undetected() {
        let cipher = random_cipher();
        let plaintext = [0x42u8; 100];
        let mut ct = cipher.encrypt(&plaintext);
        ct[0] ^= 0x01;

        // Block 0 is garbled and block 1 has bit 0 flipped; the padding
        // block is untouched, so decryption succeeds.
        let pt = cipher.decrypt(&ct).unwrap();
        assert_eq!(pt.len(), plaintext.len());
        assert_ne!(pt[..BLOCK_LEN], plaintext[..BLOCK_LEN]);
        assert_eq!(pt[BLOCK_LEN], plaintext[BLOCK_LEN] ^ 0x01);
        assert_eq!(pt[2 * BLOCK_LEN..], plaintext[2 * BLOCK_LEN..]);
    }

    #[test]
    fn mismatched_key_does_not_recover_plaintext() {
        let a = random_cipher();
        let b = random_cipher();
        let ct = a.encrypt(b"ACK");
        match b.decrypt(&ct) {
            Ok(pt) => assert_ne!(pt, b"ACK"),
            Err(e) => assert!(matches!(e, CryptoError::Cipher(_))),
        }
    }

    #[test]
    fn mode_tag_roundtrip() {
        assert_eq!(CipherMode::DEFAULT.tag(), "cbc");
        assert_eq!(CipherMode::from_tag(b"cbc"), Some(CipherMode::Cbc));
        assert_eq!(CipherMode::from_tag(b"gcm"), None);
    }

    #[test]
    fn generated_ivs_differ() {
        assert_ne!(generate_iv(), generate_iv());
    }
}
