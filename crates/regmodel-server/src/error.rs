//! Error types for the model server

use std::io;
use std::path::PathBuf;

use regmodel_protocol::FramingError;
use thiserror::Error;

use crate::peers::PeerId;

/// Errors that can occur while starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening endpoint could not be bound
    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        /// Endpoint path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// `start()` was called on a server that is already running
    #[error("server already running")]
    AlreadyRunning,
}

/// Errors that end a single request/response exchange
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Peer disconnected before a full frame arrived
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server is stopping
    #[error("server shutting down")]
    Shutdown,

    /// Peer was removed from the connected set (failed send or server stop)
    #[error("peer {0} is no longer connected")]
    PeerClosed(PeerId),
}
