//! Connection handler
//!
//! One connection carries exactly one exchange: read a full request frame,
//! dispatch it, write the response, close. A peer that disconnects mid-frame
//! gets no response. The peer stays in the connected set for the lifetime
//! of the exchange, so interrupts raised meanwhile reach it too.

use std::sync::Arc;

use regmodel_protocol::{FramingError, ProtocolMessage, FRAME_LEN};
use regmodel_sim::{lock_device, SharedDevice};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tracing::debug;

use crate::dispatch::dispatch;
use crate::error::ConnectionError;
use crate::peers::{PeerId, PeerSet};

/// Resolve once shutdown has been signalled or the signal sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // The borrow guard returned by wait_for is not Send; drop it here
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Read one complete frame, retrying partial reads until EOF
pub async fn read_frame<R>(reader: &mut R) -> Result<ProtocolMessage, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = [0u8; FRAME_LEN];
    let mut filled = 0;

    while filled < FRAME_LEN {
        let n = reader.read(&mut frame[filled..]).await?;
        if n == 0 {
            return Err(FramingError::Truncated {
                expected: FRAME_LEN,
                actual: filled,
            }
            .into());
        }
        filled += n;
    }

    Ok(ProtocolMessage::decode(&frame)?)
}

/// Service one request/response exchange for `peer`
///
/// The response goes out through the peer's writer in `peers`. Whatever the
/// outcome, the peer is removed from the set and closed before returning.
pub async fn handle_connection<R, W>(
    peer: PeerId,
    mut reader: R,
    device: SharedDevice,
    peers: Arc<PeerSet<W>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ProtocolMessage, ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let outcome = async {
        let request = tokio::select! {
            frame = read_frame(&mut reader) => frame?,
            _ = shutdown_requested(&mut shutdown) => return Err(ConnectionError::Shutdown),
        };
        debug!(
            "Peer {} request: cmd={} addr=0x{:08X}",
            peer, request.command, request.address
        );

        let response = {
            let mut dev = lock_device(&device);
            dispatch(&mut *dev, &request)
        };

        peers.send_to(peer, &response).await?;
        debug!("Peer {} response: result={}", peer, response.result);
        Ok::<_, ConnectionError>(response)
    }
    .await;

    peers.close(peer).await;
    outcome
}
