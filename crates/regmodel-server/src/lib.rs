//! Device Model Protocol Server
//!
//! This crate serves a simulated peripheral over a local Unix socket so a
//! driver can be exercised without hardware.
//!
//! # Architecture
//!
//! - One accept loop per endpoint; every accepted connection runs on its
//!   own task and services exactly one request/response exchange.
//! - Every live connection is tracked in a [`PeerSet`] so interrupts can be
//!   pushed to all connected peers.
//! - The device model sits behind one lock shared by connection handlers,
//!   the activity simulator and the interrupt path.
//! - Peer-facing failures travel in the response `result`; only framing and
//!   transport failures close a connection without a response.
//!
//! # Example
//!
//! ```rust,no_run
//! use regmodel_server::{ModelClient, ModelServer, ServerConfig};
//! use regmodel_sim::{share, UartModel};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let device = share(UartModel::new(1, 0x4000_0000));
//! let mut server = ModelServer::new(ServerConfig::with_socket_path("/tmp/uart0"), device);
//! server.start().await?;
//!
//! let client = ModelClient::new("/tmp/uart0");
//! client.write(1, 0x4000_0000, 0x0F).await?;
//! let (_, status) = client.read(1, 0x4000_0004).await?;
//! assert_ne!(status & 0x01, 0);
//!
//! server.trigger_interrupt(0x01).await;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod peers;
pub mod server;

pub use client::{Exchange, ModelClient};
pub use config::{
    ServerConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_SEND_TIMEOUT_MS, DEFAULT_SOCKET_PATH,
};
pub use connection::{handle_connection, read_frame};
pub use dispatch::dispatch;
pub use error::{ConnectionError, ServerError};
pub use peers::{PeerId, PeerSet, DEFAULT_SEND_TIMEOUT};
pub use server::{ModelServer, ServerState};
