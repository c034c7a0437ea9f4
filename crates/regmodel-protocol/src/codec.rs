//! Streaming frame codec
//!
//! Splits an arbitrary byte stream into fixed-size frames. A peer may see
//! interrupt pushes interleaved with its response on the same connection;
//! the codec hands them back one frame at a time in arrival order.

use tracing::trace;

use crate::message::{ProtocolMessage, FRAME_LEN};

/// Buffering decoder for a stream of [`ProtocolMessage`] frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
}

impl FrameCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_LEN * 2),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered
    pub fn next_message(&mut self) -> Option<ProtocolMessage> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }

        let frame: Vec<u8> = self.buffer.drain(..FRAME_LEN).collect();
        let msg = ProtocolMessage::decode(&frame).ok()?;
        trace!(
            "Decoded frame: device={} cmd={} addr=0x{:08X}",
            msg.device_id,
            msg.command,
            msg.address
        );
        Some(msg)
    }

    /// Number of bytes buffered towards the next frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
