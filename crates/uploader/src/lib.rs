//! Photo upload entry points for UI hosts.
//!
//! A host captures a photo, checks the user's address and port with
//! [`validate_ip_address`] and [`validate_port`], then calls
//! [`upload_photo`] (or [`upload_photo_blocking`] outside an async
//! runtime). Each call is an independent attempt with fresh key material,
//! so retrying after a failure is always safe.

mod validation;

pub use photolink_data_channel::{
    Endpoint, FailureReason, SessionConfig, SessionState, TransferOutcome, UploadSession,
};
pub use validation::{validate_ip_address, validate_port};

use tracing::{info, warn};

/// Sends `image_bytes` to `target_ip:target_port` with default timings.
///
/// `target_ip` may also be a host name; see [`validate_ip_address`].
pub async fn upload_photo(target_ip: &str, target_port: u16, image_bytes: &[u8]) -> TransferOutcome {
    upload_photo_with(SessionConfig::default(), target_ip, target_port, image_bytes).await
}

/// Like [`upload_photo`] with explicit session settings.
pub async fn upload_photo_with(
    config: SessionConfig,
    target_ip: &str,
    target_port: u16,
    image_bytes: &[u8],
) -> TransferOutcome {
    let endpoint = Endpoint::new(target_ip, target_port);
    info!(%endpoint, bytes = image_bytes.len(), "starting photo upload");
    UploadSession::new(config).run(&endpoint, image_bytes).await
}

/// Blocks the calling thread until the upload finishes.
///
/// Builds a single-threaded runtime for the duration of the call. Called
/// from inside a tokio runtime it fails immediately instead of blocking a
/// worker; use [`upload_photo`] there.
pub fn upload_photo_blocking(target_ip: &str, target_port: u16, image_bytes: &[u8]) -> TransferOutcome {
    if tokio::runtime::Handle::try_current().is_ok() {
        warn!("blocking upload called from inside an async runtime");
        return TransferOutcome::Failed(FailureReason::Connection(
            "upload_photo_blocking called from inside an async runtime".into(),
        ));
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!(error = %e, "failed to build upload runtime");
            return TransferOutcome::Failed(FailureReason::Connection(e.to_string()));
        }
    };

    runtime.block_on(upload_photo(target_ip, target_port, image_bytes))
}
