//! Minimal protocol client
//!
//! Speaks the same one-exchange-per-connection protocol a driver does.
//! Interrupts pushed to the connection before the response arrives are
//! collected rather than mistaken for the response.

use std::path::{Path, PathBuf};

use regmodel_protocol::{
    Command, FrameCodec, FramingError, ProtocolMessage, ResultCode, FRAME_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::ConnectionError;

/// Result of one request/response exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The response frame
    pub response: ProtocolMessage,
    /// Interrupt ids received before the response, in arrival order
    pub interrupts: Vec<u32>,
}

/// Client for a model server endpoint
#[derive(Debug, Clone)]
pub struct ModelClient {
    socket_path: PathBuf,
}

impl ModelClient {
    /// Create a client for the endpoint at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request on a fresh connection and wait for its response
    pub async fn request(&self, request: &ProtocolMessage) -> Result<Exchange, ConnectionError> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;
        stream.write_all(&request.encode()).await?;

        let mut codec = FrameCodec::new();
        let mut buf = [0u8; FRAME_LEN];
        let mut interrupts = Vec::new();
        // A response to an INTERRUPT request looks like a push; take the first frame
        let expect_push = request.command != Command::Interrupt;

        loop {
            while let Some(msg) = codec.next_message() {
                match msg.interrupt_id() {
                    Some(id) if expect_push => {
                        debug!("Interrupt {} received before response", id);
                        interrupts.push(id);
                    }
                    _ => {
                        return Ok(Exchange {
                            response: msg,
                            interrupts,
                        })
                    }
                }
            }

            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(FramingError::Truncated {
                    expected: FRAME_LEN,
                    actual: codec.pending(),
                }
                .into());
            }
            codec.push_bytes(&buf[..n]);
        }
    }

    /// Read a register, returning the result code and value
    pub async fn read(&self, device_id: u32, address: u32) -> Result<(ResultCode, u32), ConnectionError> {
        let exchange = self.request(&ProtocolMessage::read(device_id, address)).await?;
        Ok((exchange.response.result, exchange.response.value()))
    }

    /// Write a register, returning the result code
    pub async fn write(
        &self,
        device_id: u32,
        address: u32,
        value: u32,
    ) -> Result<ResultCode, ConnectionError> {
        let exchange = self
            .request(&ProtocolMessage::write(device_id, address, value))
            .await?;
        Ok(exchange.response.result)
    }

    /// Send INIT
    pub async fn init(&self, device_id: u32) -> Result<ResultCode, ConnectionError> {
        Ok(self.request(&ProtocolMessage::init(device_id)).await?.response.result)
    }

    /// Send DEINIT
    pub async fn deinit(&self, device_id: u32) -> Result<ResultCode, ConnectionError> {
        Ok(self.request(&ProtocolMessage::deinit(device_id)).await?.response.result)
    }
}
