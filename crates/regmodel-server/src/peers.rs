//! Connected peer bookkeeping
//!
//! The peer set holds the write half of every live connection so that
//! interrupts can be pushed to all of them. Each writer has its own async
//! lock: a response and an interrupt bound for the same peer are written
//! whole, one after the other, never interleaved.
//!
//! A failed send means the peer is gone. It is removed and its writer shut
//! down; callers never see the error. A send that does not complete within
//! the send timeout counts as failed, so a peer that stops reading cannot
//! stall delivery to the others.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regmodel_protocol::ProtocolMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ConnectionError;

/// Default bound on writing one frame to a peer
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Identifier assigned to a peer on accept
pub type PeerId = u64;

type SharedWriter<W> = Arc<Mutex<W>>;

/// The set of currently connected peers
#[derive(Debug)]
pub struct PeerSet<W = OwnedWriteHalf> {
    next_id: AtomicU64,
    peers: Mutex<HashMap<PeerId, SharedWriter<W>>>,
    send_timeout: Duration,
}

impl<W> Default for PeerSet<W> {
    fn default() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }
}

impl<W> PeerSet<W> {
    /// Create an empty peer set whose sends give up after `send_timeout`
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            peers: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl<W> PeerSet<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create an empty peer set
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted peer
    pub async fn register(&self, writer: W) -> PeerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(writer)));
        id
    }

    /// Number of connected peers
    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }

    /// Whether `id` is still tracked
    pub async fn contains(&self, id: PeerId) -> bool {
        self.peers.lock().await.contains_key(&id)
    }

    /// Send one frame to a single peer
    ///
    /// On failure or timeout the peer is removed and closed.
    pub async fn send_to(&self, id: PeerId, msg: &ProtocolMessage) -> Result<(), ConnectionError> {
        let writer = self
            .peers
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConnectionError::PeerClosed(id))?;

        if let Err(e) = write_frame(&writer, msg, self.send_timeout).await {
            self.close(id).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Send one frame to every connected peer
    ///
    /// Returns the number of peers the frame reached. Peers whose send fails
    /// or time out are removed and closed.
    pub async fn broadcast(&self, msg: &ProtocolMessage) -> usize {
        let snapshot: Vec<(PeerId, SharedWriter<W>)> = self
            .peers
            .lock()
            .await
            .iter()
            .map(|(id, w)| (*id, w.clone()))
            .collect();

        let mut delivered = 0;
        for (id, writer) in snapshot {
            match write_frame(&writer, msg, self.send_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Failed to send to peer {}: {}", id, e);
                    self.close(id).await;
                }
            }
        }
        delivered
    }

    /// Remove a peer and shut down its writer
    pub async fn close(&self, id: PeerId) {
        let removed = self.peers.lock().await.remove(&id);
        if let Some(writer) = removed {
            shutdown_writer(&writer, self.send_timeout).await;
            debug!("Peer {} closed", id);
        }
    }

    /// Remove and close every peer
    pub async fn close_all(&self) {
        let drained: Vec<(PeerId, SharedWriter<W>)> =
            self.peers.lock().await.drain().collect();
        for (id, writer) in drained {
            shutdown_writer(&writer, self.send_timeout).await;
            debug!("Peer {} closed", id);
        }
    }
}

async fn write_frame<W>(
    writer: &Mutex<W>,
    msg: &ProtocolMessage,
    limit: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let frame = msg.encode();
    let write = async {
        let mut w = writer.lock().await;
        w.write_all(&frame).await?;
        w.flush().await
    };

    match tokio::time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("frame not accepted within {:?}", limit),
        )),
    }
}

/// Shut down a writer, giving up if an in-flight send holds it past `limit`
async fn shutdown_writer<W>(writer: &Mutex<W>, limit: Duration)
where
    W: AsyncWrite + Unpin + Send,
{
    let shutdown = async {
        let _ = writer.lock().await.shutdown().await;
    };
    if tokio::time::timeout(limit, shutdown).await.is_err() {
        warn!("Peer writer busy past {:?}, dropping without shutdown", limit);
    }
}
