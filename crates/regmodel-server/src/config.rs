//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Well-known endpoint the driver connects to
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/icd3_interface";

/// Default bound on concurrently serviced connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Default time a peer has to accept one frame before it is dropped
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 1000;

/// Configuration for one model server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Filesystem path of the listening socket
    pub socket_path: PathBuf,
    /// Connections serviced at once; further peers wait in the backlog
    pub max_connections: usize,
    /// A peer that does not accept a frame within this time is disconnected
    pub send_timeout_ms: u64,
}

impl ServerConfig {
    /// Default configuration listening on `path`
    pub fn with_socket_path(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
        }
    }
}
