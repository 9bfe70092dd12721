//! Session setup: cipher mode, IV and public key exchange.
//!
//! Nothing in the handshake is authenticated. The mode tag and IV travel in
//! cleartext and the public keys are neither signed nor pinned, so an
//! active man in the middle can substitute its own key on both legs. The
//! session key only protects against passive observers.
//!
//! The frames that follow carry no MAC either. AES-CBC is malleable: a bit
//! flipped in any ciphertext block except the one feeding the padding
//! decrypts to a frame of the right length with corrupted bytes, and the
//! receiver cannot tell. Only corruption that reaches the PKCS#7 padding is
//! detected.

use std::time::Duration;

use photolink_crypto::codec::PEM_FOOTER;
use photolink_crypto::{
    CipherMode, EphemeralKeyPair, IV_LEN, PublicKey, SessionSecret, decode_public_key,
    encode_public_key, fingerprint, generate_iv,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::MAX_KEY_BLOCK_LEN;
use crate::error::ChannelError;
use crate::wire::FrameTransport;

/// Runs the initiator side and returns the session secret.
///
/// Any failure aborts the handshake; there is no retry at this level.
pub async fn initiate<S>(
    transport: &mut FrameTransport<S>,
    settle_delay: Duration,
) -> Result<SessionSecret, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let pair = EphemeralKeyPair::generate();

    let mode = CipherMode::DEFAULT;
    transport.send(mode.tag().as_bytes()).await?;
    info!(mode = mode.tag(), "cipher mode announced");

    let iv = generate_iv();
    tokio::time::sleep(settle_delay).await;
    transport.send(&iv).await?;
    debug!(iv = %hex::encode(iv), "session IV sent");

    let own_block = encode_public_key(pair.public_key())?;
    transport.send(own_block.as_bytes()).await?;
    debug!(fingerprint = %fingerprint(pair.public_key()), "public key sent");

    // The peer answers with a single short block; one bounded read is enough.
    let reply = transport.receive().await?;
    let peer = parse_key_block(&reply)?;
    info!(peer = %fingerprint(&peer), "peer public key received");

    let secret = pair.agree(&peer, iv);
    info!("session key derived");
    Ok(secret)
}

/// Runs the responder side and returns the session secret.
///
/// Reads exact lengths for the mode tag and IV, and reads the initiator's
/// key block up to its END line, so it does not depend on how the
/// initiator's writes were split into segments.
pub async fn respond<S>(transport: &mut FrameTransport<S>) -> Result<SessionSecret, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tag = transport
        .receive_exact(CipherMode::DEFAULT.tag().len())
        .await?;
    let mode = CipherMode::from_tag(&tag).ok_or_else(|| {
        ChannelError::Protocol(format!(
            "unsupported cipher mode {:?}",
            String::from_utf8_lossy(&tag)
        ))
    })?;
    debug!(mode = mode.tag(), "cipher mode received");

    let iv_bytes = transport.receive_exact(IV_LEN).await?;
    let iv: [u8; IV_LEN] = iv_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ChannelError::Protocol("short IV".into()))?;

    let end_line = format!("{PEM_FOOTER}\n");
    let block = transport
        .receive_until(end_line.as_bytes(), MAX_KEY_BLOCK_LEN)
        .await?;
    let peer = parse_key_block(&block)?;
    info!(peer = %fingerprint(&peer), "initiator public key received");

    let pair = EphemeralKeyPair::generate();
    let own_block = encode_public_key(pair.public_key())?;
    transport.send(own_block.as_bytes()).await?;

    Ok(pair.agree(&peer, iv))
}

fn parse_key_block(bytes: &[u8]) -> Result<PublicKey, ChannelError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ChannelError::Protocol("public key block is not valid UTF-8".into()))?;
    Ok(decode_public_key(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// A valid SPKI block on P-384.
    const P384_PEM: &str = "-----BEGIN PUBLIC KEY-----\n\
        MHYwEAYHKoZIzj0CAQYFK4EEACIDYgAE6GuZXjUOTTEqlaa31djNzbRoL1iIAKHN\n\
        bJcuHcsqWsONkARpUbA8yzsXmon9qIsbSFufLB9EsN1Bzm48OmkLv6q+weH/Su+y\n\
        Rh/dpmKb7L1Dz3TBPYwaFiVhIkPwBGFI\n\
        -----END PUBLIC KEY-----\n";

    fn pipe() -> (FrameTransport<DuplexStream>, FrameTransport<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (FrameTransport::new(a, 4096), FrameTransport::new(b, 4096))
    }

    /// Reads the initiator's cleartext preamble (tag, IV, key block).
    async fn read_preamble(peer: &mut FrameTransport<DuplexStream>) -> [u8; IV_LEN] {
        assert_eq!(peer.receive_exact(3).await.unwrap(), b"cbc");
        let iv = peer.receive_exact(IV_LEN).await.unwrap();
        peer.receive_until(b"-----END PUBLIC KEY-----\n", 4096)
            .await
            .unwrap();
        iv.try_into().unwrap()
    }

    #[tokio::test]
    async fn both_roles_agree_on_secret() {
        let (mut init, mut resp) = pipe();

        let (a, b) = tokio::join!(
            initiate(&mut init, Duration::ZERO),
            respond(&mut resp)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.key(), b.key());
        assert_eq!(a.iv(), b.iv());
    }

    #[tokio::test]
    async fn each_handshake_uses_fresh_material() {
        let (mut i1, mut r1) = pipe();
        let (mut i2, mut r2) = pipe();

        let (a, _) = tokio::join!(initiate(&mut i1, Duration::ZERO), respond(&mut r1));
        let (b, _) = tokio::join!(initiate(&mut i2, Duration::ZERO), respond(&mut r2));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.key(), b.key());
        assert_ne!(a.iv(), b.iv());
    }

    #[tokio::test]
    async fn responder_rejects_unknown_mode() {
        let (mut init, mut resp) = pipe();
        init.send(b"gcm").await.unwrap();

        let result = respond(&mut resp).await;
        assert!(matches!(result, Err(ChannelError::Protocol(_))));
    }

    #[tokio::test]
    async fn initiator_rejects_garbage_key_block() {
        let (mut init, mut peer) = pipe();

        let fake_peer = async {
            read_preamble(&mut peer).await;
            peer.send(b"this is not a key").await.unwrap();
        };
        let (result, _) = tokio::join!(initiate(&mut init, Duration::ZERO), fake_peer);

        assert!(matches!(result, Err(ChannelError::Protocol(_))));
    }

    #[tokio::test]
    async fn initiator_rejects_key_on_other_curve() {
        let (mut init, mut peer) = pipe();

        let fake_peer = async {
            read_preamble(&mut peer).await;
            peer.send(P384_PEM.as_bytes()).await.unwrap();
        };
        let (result, _) = tokio::join!(initiate(&mut init, Duration::ZERO), fake_peer);

        assert!(matches!(result, Err(ChannelError::KeyAgreement(_))));
    }

    #[tokio::test]
    async fn peer_hangup_aborts_handshake() {
        let (mut init, mut peer) = pipe();

        let fake_peer = async move {
            read_preamble(&mut peer).await;
            drop(peer);
        };
        let (result, _) = tokio::join!(initiate(&mut init, Duration::ZERO), fake_peer);

        let err = result.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test(start_paused = true)]
    async fn iv_waits_for_settle_delay() {
        let (mut init, mut peer) = pipe();

        let observer = async {
            assert_eq!(peer.receive_exact(3).await.unwrap(), b"cbc");
            let before = tokio::time::Instant::now();
            peer.receive_exact(IV_LEN).await.unwrap();
            before.elapsed()
        };

        tokio::select! {
            _ = initiate(&mut init, Duration::from_millis(500)) => panic!("handshake cannot finish without a peer key"),
            waited = observer => assert!(waited >= Duration::from_millis(500)),
        }
    }
}
