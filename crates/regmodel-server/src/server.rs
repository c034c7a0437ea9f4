//! Model server
//!
//! Owns the listening endpoint and the connected peer set for one device
//! model instance.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped -> Starting (bind) -> Running (accept loop) -> Stopping -> Stopped
//! ```
//!
//! `start()` binds the socket and spawns the accept loop and the interrupt
//! pump, returning once the server is `Running`. Every accepted connection
//! runs on its own task and exits after one exchange. `stop()` signals all
//! tasks, waits for the accept loop to drop the listener, closes every peer
//! and removes the socket file. Stopping a stopped server does nothing.
//!
//! If `accept` fails the run tears itself down to `Stopped` the same way,
//! and the server can be started again.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regmodel_protocol::ProtocolMessage;
use regmodel_sim::{lock_device, SharedDevice};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{handle_connection, shutdown_requested};
use crate::error::{ConnectionError, ServerError};
use crate::peers::PeerSet;

/// Capacity of the interrupt channel fed by the activity simulator
const INTERRUPT_QUEUE_DEPTH: usize = 64;

/// Server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening
    Stopped,
    /// Binding the endpoint
    Starting,
    /// Accepting connections
    Running,
    /// Shutdown requested
    Stopping,
}

/// State shared by one run of the server and its background tasks
struct Run {
    socket_path: PathBuf,
    peers: Arc<PeerSet>,
    state_tx: Arc<watch::Sender<ServerState>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Run {
    /// Tear the run down from inside after the accept loop fails
    ///
    /// Leaves the server `Stopped` with no peers and no socket file; the
    /// owning [`ModelServer`] reaps the finished tasks on its next
    /// `start()` or `stop()`.
    async fn halt(&self) {
        let _ = self.shutdown_tx.send(true);
        self.peers.close_all().await;
        remove_socket(&self.socket_path);
        self.state_tx.send_replace(ServerState::Stopped);
    }
}

/// Protocol server for one device model
pub struct ModelServer {
    config: ServerConfig,
    device: SharedDevice,
    device_id: u32,
    peers: Arc<PeerSet>,
    state_tx: Arc<watch::Sender<ServerState>>,
    run: Option<Arc<Run>>,
    irq_tx: mpsc::Sender<u32>,
    irq_rx: Arc<Mutex<mpsc::Receiver<u32>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ModelServer {
    /// Create a stopped server for `device`
    pub fn new(config: ServerConfig, device: SharedDevice) -> Self {
        let device_id = lock_device(&device).device_id();
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        let (irq_tx, irq_rx) = mpsc::channel(INTERRUPT_QUEUE_DEPTH);
        let peers = Arc::new(PeerSet::with_send_timeout(config.send_timeout()));

        Self {
            config,
            device,
            device_id,
            peers,
            state_tx: Arc::new(state_tx),
            run: None,
            irq_tx,
            irq_rx: Arc::new(Mutex::new(irq_rx)),
            tasks: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    /// Wait until the server reaches `state`
    pub async fn wait_for_state(&self, state: ServerState) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|s| *s == state).await;
    }

    /// Path of the listening socket
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// The device model served
    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// Number of currently connected peers
    pub async fn peer_count(&self) -> usize {
        self.peers.len().await
    }

    /// Sender for interrupt ids raised in the background
    ///
    /// Ids sent here are pushed to all peers while the server runs.
    pub fn interrupt_sender(&self) -> mpsc::Sender<u32> {
        self.irq_tx.clone()
    }

    /// Bind the endpoint and start accepting connections
    ///
    /// A server whose accept loop failed is `Stopped` and may be started
    /// again.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.run.is_some() {
            if self.state() != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning);
            }
            self.reap().await;
        }

        self.state_tx.send_replace(ServerState::Starting);
        let path = self.config.socket_path.clone();

        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove stale socket {}: {}", path.display(), e),
        }

        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(source) => {
                error!("Failed to bind {}: {}", path.display(), source);
                self.state_tx.send_replace(ServerState::Stopped);
                return Err(ServerError::Bind { path, source });
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = Arc::new(Run {
            socket_path: path,
            peers: self.peers.clone(),
            state_tx: self.state_tx.clone(),
            shutdown_tx,
        });

        self.state_tx.send_replace(ServerState::Running);
        info!(
            "Device model {} ({}) listening on {}",
            self.device_id,
            lock_device(&self.device).kind(),
            run.socket_path.display()
        );

        self.tasks.push(tokio::spawn(accept_loop(
            listener,
            self.device.clone(),
            run.clone(),
            Arc::new(Semaphore::new(self.config.max_connections.max(1))),
            shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(interrupt_pump(
            self.device_id,
            self.irq_rx.clone(),
            self.peers.clone(),
            shutdown_rx,
        )));
        self.run = Some(run);

        Ok(())
    }

    /// Stop accepting, close all peers and remove the endpoint
    pub async fn stop(&mut self) {
        if self.run.is_none() {
            debug!("Stop requested on stopped server");
            return;
        }

        if self.state() != ServerState::Stopped {
            self.state_tx.send_replace(ServerState::Stopping);
        }
        self.reap().await;

        self.state_tx.send_replace(ServerState::Stopped);
        info!("Device model {} stopped", self.device_id);
    }

    /// Signal the current run, wait for its tasks and release its resources
    async fn reap(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };

        let _ = run.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Server task failed: {}", e);
            }
        }

        self.peers.close_all().await;
        remove_socket(&run.socket_path);
    }

    /// Push an interrupt notification to every connected peer
    ///
    /// Returns the number of peers reached. Peers that cannot be written to
    /// within the send timeout are dropped from the set.
    pub async fn trigger_interrupt(&self, interrupt_id: u32) -> usize {
        let msg = ProtocolMessage::interrupt(self.device_id, interrupt_id);
        let delivered = self.peers.broadcast(&msg).await;
        info!(
            "Interrupt {} from device {} sent to {} peer(s)",
            interrupt_id, self.device_id, delivered
        );
        delivered
    }
}

impl Drop for ModelServer {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            let _ = run.shutdown_tx.send(true);
            remove_socket(&run.socket_path);
        }
    }
}

impl std::fmt::Debug for ModelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelServer")
            .field("socket_path", &self.config.socket_path)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove socket {}: {}", path.display(), e),
    }
}

async fn accept_loop(
    listener: UnixListener,
    device: SharedDevice,
    run: Arc<Run>,
    limit: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let permit = tokio::select! {
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown_requested(&mut shutdown) => break,
        };

        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown_requested(&mut shutdown) => break,
        };

        match accepted {
            Ok((stream, _)) => {
                let (reader, writer) = stream.into_split();
                let peer = run.peers.register(writer).await;
                debug!("Peer {} connected", peer);

                let device = device.clone();
                let peers = run.peers.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let handler = tokio::spawn(handle_connection(
                        peer,
                        reader,
                        device,
                        peers.clone(),
                        shutdown,
                    ));
                    match handler.await {
                        Ok(Ok(_)) => debug!("Peer {} exchange complete", peer),
                        Ok(Err(ConnectionError::Shutdown)) => {
                            debug!("Peer {} dropped at shutdown", peer)
                        }
                        Ok(Err(ConnectionError::Framing(e))) => {
                            debug!("Peer {} disconnected without a full request: {}", peer, e)
                        }
                        Ok(Err(e)) => warn!("Peer {} exchange aborted: {}", peer, e),
                        Err(e) => {
                            error!("Peer {} handler panicked: {}", peer, e);
                            peers.close(peer).await;
                        }
                    }
                });
            }
            Err(e) => {
                error!("Accept failed on {}: {}", run.socket_path.display(), e);
                drop(listener);
                run.halt().await;
                break;
            }
        }
    }

    debug!("Accept loop ended");
}

async fn interrupt_pump(
    device_id: u32,
    irq_rx: Arc<Mutex<mpsc::Receiver<u32>>>,
    peers: Arc<PeerSet>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut irq_rx = irq_rx.lock().await;

    loop {
        let interrupt_id = tokio::select! {
            id = irq_rx.recv() => match id {
                Some(interrupt_id) => interrupt_id,
                None => break,
            },
            _ = shutdown_requested(&mut shutdown) => break,
        };

        // A broadcast in progress is abandoned on shutdown; stop() closes every peer
        let msg = ProtocolMessage::interrupt(device_id, interrupt_id);
        tokio::select! {
            delivered = peers.broadcast(&msg) => debug!(
                "Interrupt {} from device {} sent to {} peer(s)",
                interrupt_id, device_id, delivered
            ),
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }
}
