//! Error types for the data channel.

use photolink_crypto::CryptoError;

/// Errors produced while running a transfer session.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<CryptoError> for ChannelError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyAgreement(msg) => ChannelError::KeyAgreement(msg),
            CryptoError::KeyEncoding(msg) => ChannelError::Protocol(msg),
            CryptoError::Cipher(msg) => ChannelError::Cipher(msg),
        }
    }
}

impl ChannelError {
    /// True when the peer closed the connection before we got what we
    /// were waiting for.
    pub fn is_eof(&self) -> bool {
        matches!(self, ChannelError::Connection(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
