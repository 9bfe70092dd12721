//! Upload session (initiator side).
//!
//! Connects to the receiving peer, runs the handshake and sends one photo.
//! The whole attempt runs under a single deadline; whatever happens, the
//! socket is dropped before [`UploadSession::run`] returns.

use photolink_crypto::SessionCipher;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::SecureChannel;
use crate::error::ChannelError;
use crate::handshake;
use crate::types::{Endpoint, SessionConfig, SessionState, TransferOutcome};
use crate::wire::{ACK, FrameKind, FrameTransport, SIGNAL, encode_size_header};

/// One attempt at sending one photo.
///
/// Sessions are single-use: [`run`](Self::run) consumes the session. A
/// failed attempt can be retried with a new session, which generates a new
/// key pair and IV.
pub struct UploadSession {
    config: SessionConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl UploadSession {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Init);
        Self {
            config,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Lets the caller abort the attempt through `cancel`.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a receiver that observes every state snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Sends `photo` to `endpoint` and waits for the peer's ACK.
    ///
    /// `photo` must already be encoded (JPEG, PNG, ...); it is sent as-is.
    pub async fn run(self, endpoint: &Endpoint, photo: &[u8]) -> TransferOutcome {
        self.transition(SessionState::Connecting);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChannelError::Cancelled),
            result = tokio::time::timeout(self.config.deadline, self.drive(endpoint, photo)) => {
                result.unwrap_or(Err(ChannelError::Timeout))
            }
        };

        let outcome = match result {
            Ok(()) => {
                info!(%endpoint, bytes = photo.len(), "photo delivered");
                TransferOutcome::Succeeded
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "photo upload failed");
                TransferOutcome::Failed(e.into())
            }
        };

        self.transition(outcome.clone().into());
        outcome
    }

    async fn drive(&self, endpoint: &Endpoint, photo: &[u8]) -> Result<(), ChannelError> {
        let size_header = encode_size_header(photo.len())?;

        let stream = TcpStream::connect((endpoint.host(), endpoint.port())).await?;
        stream.set_nodelay(true)?;
        info!(%endpoint, "connected to peer");

        let mut transport = FrameTransport::new(stream, self.config.read_buffer_size);

        self.transition(SessionState::Handshaking);
        let secret = handshake::initiate(&mut transport, self.config.iv_settle_delay).await?;
        let mut channel = SecureChannel::new(transport, SessionCipher::new(secret));

        self.transition(SessionState::SendingSignal);
        channel.send_sealed(FrameKind::Token, SIGNAL).await?;
        tokio::time::sleep(self.config.signal_delay).await;

        self.transition(SessionState::SendingSize);
        channel
            .send_sealed(FrameKind::LengthHeader, &size_header)
            .await?;

        self.transition(SessionState::SendingPayload);
        channel.send_sealed(FrameKind::Payload, photo).await?;

        self.transition(SessionState::AwaitingAck);
        let reply = channel.receive_sealed().await.map_err(ack_error)?;
        if reply != ACK {
            return Err(ChannelError::Protocol(format!(
                "expected ACK, got {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }
        debug!("ACK received");

        // Best effort; the stream is dropped right after either way.
        if let Err(e) = channel.shutdown().await {
            debug!(error = %e, "shutdown after ACK failed");
        }
        Ok(())
    }

    fn transition(&self, next: SessionState) {
        debug!(state = ?next, "upload session transition");
        self.state.send_replace(next);
    }
}

/// Anything other than a readable ACK while waiting for one is a protocol
/// failure, including the peer hanging up.
fn ack_error(err: ChannelError) -> ChannelError {
    match err {
        e if e.is_eof() => ChannelError::Protocol("peer closed without acknowledging".into()),
        ChannelError::Cipher(msg) => {
            ChannelError::Protocol(format!("acknowledgement did not decrypt: {msg}"))
        }
        other => other,
    }
}
