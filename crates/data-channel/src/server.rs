//! Photo receiver (responder side).
//!
//! Accepts a single connection, completes the handshake and reads one
//! photo. Unlike the initiator, the receiver treats the size header as the
//! authoritative framing: it keeps reading until the full payload frame has
//! arrived, however many TCP segments that takes.

use std::net::SocketAddr;

use photolink_crypto::{SessionCipher, ciphertext_len};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::SecureChannel;
use crate::error::ChannelError;
use crate::handshake;
use crate::types::ReceiverConfig;
use crate::wire::{ACK, FrameKind, FrameTransport, SIGNAL, SIZE_HEADER_LEN, decode_size_header};

/// Receives one photo per accepted connection.
pub struct PhotoReceiver {
    config: ReceiverConfig,
    cancel: CancellationToken,
}

impl PhotoReceiver {
    pub fn new(config: ReceiverConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Binds a TCP listener.
    ///
    /// Returns the bound address (useful with port 0) and the listener, to
    /// be passed to [`accept_and_receive`](Self::accept_and_receive).
    pub async fn listen(
        &self,
        addr: impl ToSocketAddrs,
    ) -> Result<(SocketAddr, TcpListener), ChannelError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(%local, "photo receiver listening");
        Ok((local, listener))
    }

    /// Accepts one connection and returns the photo it carried.
    pub async fn accept_and_receive(&self, listener: TcpListener) -> Result<Vec<u8>, ChannelError> {
        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(ChannelError::Cancelled);
            }
            result = listener.accept() => {
                let (stream, addr) = result?;
                info!(%addr, "photo sender connected");
                stream
            }
        };

        // Only one connection per session.
        drop(listener);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChannelError::Cancelled),
            result = tokio::time::timeout(self.config.deadline, self.receive_from(stream)) => {
                result.unwrap_or(Err(ChannelError::Timeout))
            }
        }
    }

    /// Runs the full responder sequence on an already connected stream.
    pub async fn receive_from<S>(&self, stream: S) -> Result<Vec<u8>, ChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = ReceiverSession::establish(stream, &self.config).await?;
        session.read_signal().await?;
        let size = session.read_size().await?;
        let frame = session.read_payload_frame(size).await?;

        let photo = match session.open_payload(&frame, size) {
            Ok(photo) => photo,
            Err(e) => {
                // No ACK: the sender learns of the failure when we hang up.
                warn!(error = %e, "payload rejected");
                return Err(e);
            }
        };

        session.acknowledge().await?;
        info!(bytes = photo.len(), "photo received");
        Ok(photo)
    }
}

/// Responder state after a completed handshake, driven one frame at a time.
pub struct ReceiverSession<S> {
    channel: SecureChannel<S>,
    max_payload_size: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ReceiverSession<S> {
    /// Performs the responder half of the handshake.
    pub async fn establish(stream: S, config: &ReceiverConfig) -> Result<Self, ChannelError> {
        let mut transport = FrameTransport::new(stream, config.read_buffer_size);
        let secret = handshake::respond(&mut transport).await?;
        Ok(Self {
            channel: SecureChannel::new(transport, SessionCipher::new(secret)),
            max_payload_size: config.max_payload_size,
        })
    }

    /// Reads the signal frame and checks its token.
    pub async fn read_signal(&mut self) -> Result<(), ChannelError> {
        let token = self
            .channel
            .receive_sealed_exact(ciphertext_len(SIGNAL.len()))
            .await?;
        if token != SIGNAL {
            return Err(ChannelError::Protocol(format!(
                "unexpected signal {:?}",
                String::from_utf8_lossy(&token)
            )));
        }
        debug!("signal received");
        Ok(())
    }

    /// Reads the size header.
    pub async fn read_size(&mut self) -> Result<u32, ChannelError> {
        let header = self
            .channel
            .receive_sealed_exact(ciphertext_len(SIZE_HEADER_LEN))
            .await?;
        let size = decode_size_header(&header)?;
        if size > self.max_payload_size {
            return Err(ChannelError::Protocol(format!(
                "declared payload of {size} bytes exceeds limit of {}",
                self.max_payload_size
            )));
        }
        debug!(size, "size header received");
        Ok(size)
    }

    /// Reads the complete ciphertext of a `size`-byte payload, still encrypted.
    pub async fn read_payload_frame(&mut self, size: u32) -> Result<Vec<u8>, ChannelError> {
        self.channel.receive_frame(ciphertext_len(size as usize)).await
    }

    /// Decrypts a payload frame and checks it matches the declared size.
    pub fn open_payload(&self, frame: &[u8], size: u32) -> Result<Vec<u8>, ChannelError> {
        let photo = self.channel.open(frame)?;
        if photo.len() != size as usize {
            return Err(ChannelError::Protocol(format!(
                "payload is {} bytes, header declared {size}",
                photo.len()
            )));
        }
        Ok(photo)
    }

    /// Sends the encrypted ACK.
    pub async fn acknowledge(&mut self) -> Result<(), ChannelError> {
        self.reply(ACK).await
    }

    /// Sends an arbitrary encrypted token back to the sender.
    pub async fn reply(&mut self, token: &[u8]) -> Result<(), ChannelError> {
        self.channel.send_sealed(FrameKind::Token, token).await
    }

    pub fn into_inner(self) -> S {
        self.channel.into_inner()
    }
}
