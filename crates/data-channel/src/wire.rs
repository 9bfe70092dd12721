//! TCP wire format and raw frame transport.
//!
//! # Wire format
//!
//! ```text
//! HANDSHAKE (cleartext):
//!   Initiator -> Peer:  [ASCII mode tag, "cbc"]
//!   Initiator -> Peer:  [16 bytes: IV]                      (after a settle delay)
//!   Initiator -> Peer:  [PEM public key block]
//!   Peer -> Initiator:  [PEM public key block]
//!
//! TRANSFER (AES-128-CBC under the derived key and the IV):
//!   Initiator -> Peer:  [E("PHOTO")]                        16 bytes
//!   Initiator -> Peer:  [E(4 bytes BE: photo length)]       16 bytes (after a delay)
//!   Initiator -> Peer:  [E(photo)]                          ciphertext_len(photo length)
//!   Peer -> Initiator:  [E("ACK")]                          16 bytes
//! ```
//!
//! Frames carry no length prefix of their own. The size header is the only
//! framing information for the payload; a receiver must keep reading until
//! the ciphertext length it implies has arrived.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;

/// Plaintext of the signal frame that opens the transfer.
pub const SIGNAL: &[u8] = b"PHOTO";

/// Plaintext of the peer's acknowledgement.
pub const ACK: &[u8] = b"ACK";

/// Length of the plaintext size header.
pub const SIZE_HEADER_LEN: usize = 4;

/// The three kinds of frame exchanged after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Fixed literal token (signal, ACK).
    Token,
    /// Encrypted 4-byte big-endian payload length.
    LengthHeader,
    /// Encrypted photo bytes.
    Payload,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameKind::Token => "token",
            FrameKind::LengthHeader => "length-header",
            FrameKind::Payload => "payload",
        })
    }
}

/// Encodes a payload length as the 4-byte big-endian size header.
pub fn encode_size_header(len: usize) -> Result<[u8; SIZE_HEADER_LEN], ChannelError> {
    let len = u32::try_from(len).map_err(|_| {
        ChannelError::Protocol(format!("payload too large: {len} bytes (max {})", u32::MAX))
    })?;
    Ok(len.to_be_bytes())
}

/// Decodes a size header.
pub fn decode_size_header(bytes: &[u8]) -> Result<u32, ChannelError> {
    let header: [u8; SIZE_HEADER_LEN] = bytes.try_into().map_err(|_| {
        ChannelError::Protocol(format!(
            "size header must be {SIZE_HEADER_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(u32::from_be_bytes(header))
}

/// Raw frame I/O over one connection.
///
/// `receive` is a single bounded read: it returns whatever one read call
/// produced, up to the buffer size, and makes no attempt to reassemble a
/// larger logical message. Use [`receive_exact`](Self::receive_exact) when
/// the length is known.
pub struct FrameTransport<S> {
    stream: S,
    read_buffer_size: usize,
    /// Bytes read past a marker by `receive_until`, served first by later reads.
    pending: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameTransport<S> {
    pub fn new(stream: S, read_buffer_size: usize) -> Self {
        Self {
            stream,
            read_buffer_size: read_buffer_size.max(1),
            pending: Vec::new(),
        }
    }

    /// Writes `bytes` and flushes.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Performs one bounded read.
    ///
    /// End of stream is reported as an `UnexpectedEof` connection error.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        if !self.pending.is_empty() {
            let take = self.pending.len().min(self.read_buffer_size);
            return Ok(self.pending.drain(..take).collect());
        }

        let mut buf = vec![0u8; self.read_buffer_size];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(eof("peer closed the connection"));
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads exactly `len` bytes.
    pub async fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>, ChannelError> {
        let from_pending = self.pending.len().min(len);
        let mut out: Vec<u8> = self.pending.drain(..from_pending).collect();
        if out.len() < len {
            let start = out.len();
            out.resize(len, 0);
            self.stream.read_exact(&mut out[start..]).await?;
        }
        Ok(out)
    }

    /// Reads until `marker` has been seen, returning everything up to and
    /// including it.
    ///
    /// Fails with a protocol error if `limit` bytes arrive without the marker.
    pub async fn receive_until(
        &mut self,
        marker: &[u8],
        limit: usize,
    ) -> Result<Vec<u8>, ChannelError> {
        let mut acc = std::mem::take(&mut self.pending);
        loop {
            if let Some(pos) = find(&acc, marker) {
                let end = pos + marker.len();
                self.pending = acc.split_off(end);
                return Ok(acc);
            }
            if acc.len() >= limit {
                return Err(ChannelError::Protocol(format!(
                    "no end marker within {limit} bytes"
                )));
            }

            let mut buf = vec![0u8; self.read_buffer_size];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(eof("peer closed the connection before the end marker"));
            }
            acc.extend_from_slice(&buf[..n]);
        }
    }

    /// Shuts down the write half so the peer sees end of stream.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn eof(msg: &str) -> ChannelError {
    ChannelError::Connection(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        msg.to_string(),
    ))
}
