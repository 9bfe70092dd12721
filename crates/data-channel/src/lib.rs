//! Encrypted TCP channel for sending a single photo to a peer.
//!
//! One connection carries one photo. The initiator announces the cipher
//! mode, sends a fresh IV, swaps ephemeral public keys with the peer and
//! derives a session key; everything after that is AES-128-CBC.
//!
//! # Wire format
//!
//! See the [`wire`] module for the frame sequence.

pub mod channel;
pub mod client;
pub mod error;
pub mod handshake;
pub mod server;
pub mod types;
pub mod wire;

pub use channel::SecureChannel;
pub use client::UploadSession;
pub use error::ChannelError;
pub use server::{PhotoReceiver, ReceiverSession};
pub use types::{
    Endpoint, FailureReason, ReceiverConfig, SessionConfig, SessionState, TransferOutcome,
};
pub use wire::{FrameKind, FrameTransport};

use std::time::Duration;

/// Upper bound of a single `receive()` call.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Deadline covering connect, handshake and transfer.
pub const SESSION_DEADLINE: Duration = Duration::from_secs(120);

/// Pause before the IV is sent, giving the peer time to set up after
/// reading the mode tag.
pub const IV_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause after the signal frame, before the size header.
pub const SIGNAL_DELAY: Duration = Duration::from_secs(1);

/// Largest photo a [`PhotoReceiver`] accepts by default (64 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Largest public key block the responder buffers while looking for the
/// END marker.
pub const MAX_KEY_BLOCK_LEN: usize = 4096;
