//! Public types for upload sessions.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::ChannelError;
use crate::{
    DEFAULT_READ_BUFFER_SIZE, IV_SETTLE_DELAY, MAX_PAYLOAD_SIZE, SESSION_DEADLINE, SIGNAL_DELAY,
};

/// Address of the receiving peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// `host` may be an IP literal or a name the system resolver knows.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Timing and buffer settings for an [`UploadSession`](crate::UploadSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline over the whole attempt, from connect to ACK.
    pub deadline: Duration,
    /// Pause between announcing the cipher mode and sending the IV.
    pub iv_settle_delay: Duration,
    /// Pause between the signal frame and the size header.
    pub signal_delay: Duration,
    /// Upper bound of one read.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline: SESSION_DEADLINE,
            iv_settle_delay: IV_SETTLE_DELAY,
            signal_delay: SIGNAL_DELAY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_delays(mut self, iv_settle_delay: Duration, signal_delay: Duration) -> Self {
        self.iv_settle_delay = iv_settle_delay;
        self.signal_delay = signal_delay;
        self
    }
}

/// Settings for a [`PhotoReceiver`](crate::PhotoReceiver).
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Deadline from accept to ACK.
    pub deadline: Duration,
    /// Upper bound of one read.
    pub read_buffer_size: usize,
    /// Declared sizes above this are rejected before anything is allocated.
    pub max_payload_size: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            deadline: SESSION_DEADLINE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum FailureReason {
    /// Refused, unreachable, reset or closed mid-handshake.
    Connection(String),
    /// The session deadline expired.
    Timeout,
    /// The caller cancelled the session.
    Cancelled,
    /// A frame did not decrypt.
    Cipher(String),
    /// The peer's key is not usable for agreement on our curve.
    KeyAgreement(String),
    /// Unexpected token, malformed key block, missing or wrong ACK.
    Protocol(String),
}

impl From<ChannelError> for FailureReason {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Connection(e) => FailureReason::Connection(e.to_string()),
            ChannelError::Timeout => FailureReason::Timeout,
            ChannelError::Cancelled => FailureReason::Cancelled,
            ChannelError::Cipher(msg) => FailureReason::Cipher(msg),
            ChannelError::KeyAgreement(msg) => FailureReason::KeyAgreement(msg),
            ChannelError::Protocol(msg) => FailureReason::Protocol(msg),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Connection(msg) => write!(f, "connection error: {msg}"),
            FailureReason::Timeout => f.write_str("deadline exceeded"),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Cipher(msg) => write!(f, "cipher error: {msg}"),
            FailureReason::KeyAgreement(msg) => write!(f, "key agreement failed: {msg}"),
            FailureReason::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

/// Terminal result of one upload attempt.
///
/// Carries no partial progress: the photo was either acknowledged or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "camelCase")]
pub enum TransferOutcome {
    Succeeded,
    Failed(FailureReason),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TransferOutcome::Succeeded => None,
            TransferOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Snapshot of where an upload session is.
///
/// Each transition publishes a whole new value; observers never see a
/// half-updated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum SessionState {
    Init,
    Connecting,
    Handshaking,
    SendingSignal,
    SendingSize,
    SendingPayload,
    AwaitingAck,
    Succeeded,
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed(_))
    }
}

impl From<TransferOutcome> for SessionState {
    fn from(outcome: TransferOutcome) -> Self {
        match outcome {
            TransferOutcome::Succeeded => SessionState::Succeeded,
            TransferOutcome::Failed(reason) => SessionState::Failed(reason),
        }
    }
}
