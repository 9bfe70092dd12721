//! PEM wire encoding for public keys.
//!
//! ```text
//! -----BEGIN PUBLIC KEY-----
//! <base64 of X.509 SubjectPublicKeyInfo DER, 64 columns per line>
//! -----END PUBLIC KEY-----
//! ```

use p256::PublicKey;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding, spki};

use crate::error::CryptoError;

/// Opening marker of a public key block.
pub const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

/// Closing marker of a public key block.
pub const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

/// Base64 characters per line inside the block.
const PEM_LINE_WIDTH: usize = 64;

/// Encodes a public key as a PEM block terminated by a newline.
pub fn encode_public_key(key: &PublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

/// Decodes a PEM block produced by the peer.
///
/// Text around the markers is ignored, as is whitespace inside the block,
/// so CRLF line endings and re-wrapped bodies are accepted.
///
/// A key for another algorithm or curve is reported as
/// [`CryptoError::KeyAgreement`]; anything structurally broken (markers,
/// base64, DER, point bytes) as [`CryptoError::KeyEncoding`].
pub fn decode_public_key(text: &str) -> Result<PublicKey, CryptoError> {
    let start = text
        .find(PEM_HEADER)
        .ok_or_else(|| CryptoError::KeyEncoding("missing BEGIN PUBLIC KEY marker".into()))?
        + PEM_HEADER.len();
    let end = text[start..]
        .find(PEM_FOOTER)
        .ok_or_else(|| CryptoError::KeyEncoding("missing END PUBLIC KEY marker".into()))?
        + start;

    let body: String = text[start..end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(CryptoError::KeyEncoding("empty key block".into()));
    }
    if !body.is_ascii() {
        return Err(CryptoError::KeyEncoding("key block is not ASCII".into()));
    }

    PublicKey::from_public_key_pem(&canonical_block(&body)).map_err(|e| match e {
        spki::Error::OidUnknown { .. } => {
            CryptoError::KeyAgreement(format!("peer key is not a P-256 key: {e}"))
        }
        other => CryptoError::KeyEncoding(other.to_string()),
    })
}

/// Rebuilds a strict RFC 7468 block (LF, 64 columns) around a bare body.
fn canonical_block(body: &str) -> String {
    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str(PEM_HEADER);
    pem.push('\n');
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.extend(line.iter().copied().map(char::from));
        pem.push('\n');
    }
    pem.push_str(PEM_FOOTER);
    pem.push('\n');
    pem
}
