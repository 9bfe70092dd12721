//! Frame transport bound to an established session cipher.

use photolink_crypto::SessionCipher;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::ChannelError;
use crate::wire::{FrameKind, FrameTransport};

/// Sends and receives encrypted frames once the handshake is done.
pub struct SecureChannel<S> {
    transport: FrameTransport<S>,
    cipher: SessionCipher,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureChannel<S> {
    pub fn new(transport: FrameTransport<S>, cipher: SessionCipher) -> Self {
        Self { transport, cipher }
    }

    /// Encrypts `plaintext` and sends it as one frame.
    pub async fn send_sealed(
        &mut self,
        kind: FrameKind,
        plaintext: &[u8],
    ) -> Result<(), ChannelError> {
        let frame = self.cipher.encrypt(plaintext);
        self.transport.send(&frame).await?;
        debug!(
            %kind,
            plaintext_len = plaintext.len(),
            frame_len = frame.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Performs one bounded read and decrypts what arrived.
    pub async fn receive_sealed(&mut self) -> Result<Vec<u8>, ChannelError> {
        let frame = self.transport.receive().await?;
        Ok(self.cipher.decrypt(&frame)?)
    }

    /// Reads a frame of known ciphertext length without decrypting it.
    pub async fn receive_frame(&mut self, frame_len: usize) -> Result<Vec<u8>, ChannelError> {
        self.transport.receive_exact(frame_len).await
    }

    /// Reads a frame of known ciphertext length and decrypts it.
    pub async fn receive_sealed_exact(
        &mut self,
        frame_len: usize,
    ) -> Result<Vec<u8>, ChannelError> {
        let frame = self.transport.receive_exact(frame_len).await?;
        self.open(&frame)
    }

    /// Decrypts a frame obtained from [`receive_frame`](Self::receive_frame).
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        Ok(self.cipher.decrypt(frame)?)
    }

    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.transport.shutdown().await
    }

    pub fn cipher(&self) -> &SessionCipher {
        &self.cipher
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }
}
