//! The fixed-size protocol message
//!
//! # Frame Format
//! ```text
//! offset  size  field
//!      0     4  device_id   (u32 LE)
//!      4     4  command     (u32 LE)
//!      8     4  address     (u32 LE)
//!     12     4  length      (u32 LE, advisory; interrupt id for INTERRUPT)
//!     16     4  result      (u32 LE)
//!     20   256  data        (zero padded)
//! ```
//!
//! Requests and responses share this layout. Every frame is exactly
//! [`FRAME_LEN`] bytes in both directions.

use crate::command::{Command, ResultCode};
use crate::error::FramingError;

/// Size of the fixed header (five u32 fields)
pub const HEADER_LEN: usize = 20;

/// Size of the opaque payload
pub const PAYLOAD_LEN: usize = 256;

/// Total encoded size of one frame
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Advisory length used for single-register reads and writes
pub const REGISTER_WIDTH: u32 = 4;

/// One protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// Target device, opaque to the protocol
    pub device_id: u32,
    /// Requested operation
    pub command: Command,
    /// Absolute register address
    pub address: u32,
    /// Advisory payload length (interrupt id for INTERRUPT frames)
    pub length: u32,
    /// Outcome (meaningful in responses)
    pub result: ResultCode,
    /// Payload; register values occupy the first 4 bytes
    pub data: [u8; PAYLOAD_LEN],
}

impl ProtocolMessage {
    /// Create a message with a zeroed payload
    pub fn new(device_id: u32, command: Command, address: u32, length: u32) -> Self {
        Self {
            device_id,
            command,
            address,
            length,
            result: ResultCode::Success,
            data: [0u8; PAYLOAD_LEN],
        }
    }

    /// Build a READ request
    pub fn read(device_id: u32, address: u32) -> Self {
        Self::new(device_id, Command::Read, address, REGISTER_WIDTH)
    }

    /// Build a WRITE request carrying `value`
    pub fn write(device_id: u32, address: u32, value: u32) -> Self {
        let mut msg = Self::new(device_id, Command::Write, address, REGISTER_WIDTH);
        msg.set_value(value);
        msg
    }

    /// Build an INIT request
    pub fn init(device_id: u32) -> Self {
        Self::new(device_id, Command::Init, 0, 0)
    }

    /// Build a DEINIT request
    pub fn deinit(device_id: u32) -> Self {
        Self::new(device_id, Command::Deinit, 0, 0)
    }

    /// Build a server-initiated interrupt notification
    ///
    /// The interrupt id travels in `length`; the payload is always zero and
    /// never carries register contents.
    pub fn interrupt(device_id: u32, interrupt_id: u32) -> Self {
        Self::new(device_id, Command::Interrupt, 0, interrupt_id)
    }

    /// Build a response echoing the request header with a fresh payload
    pub fn response_to(request: &ProtocolMessage, result: ResultCode) -> Self {
        Self {
            device_id: request.device_id,
            command: request.command,
            address: request.address,
            length: request.length,
            result,
            data: [0u8; PAYLOAD_LEN],
        }
    }

    /// Interrupt identifier, if this is an INTERRUPT frame
    pub fn interrupt_id(&self) -> Option<u32> {
        (self.command == Command::Interrupt).then_some(self.length)
    }

    /// Register value in the first 4 payload bytes
    pub fn value(&self) -> u32 {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Store a register value in the first 4 payload bytes
    pub fn set_value(&mut self, value: u32) {
        self.data[..4].copy_from_slice(&value.to_le_bytes());
    }

    /// Builder-style variant of [`set_value`](Self::set_value)
    pub fn with_value(mut self, value: u32) -> Self {
        self.set_value(value);
        self
    }

    /// Encode to exactly [`FRAME_LEN`] bytes
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        let header = [
            self.device_id,
            self.command.code(),
            self.address,
            self.length,
            self.result.code(),
        ];
        for (i, field) in header.iter().enumerate() {
            frame[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
        frame[HEADER_LEN..].copy_from_slice(&self.data);
        frame
    }

    /// Decode one frame from the start of `bytes`
    ///
    /// Bytes past the first [`FRAME_LEN`] are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < FRAME_LEN {
            return Err(FramingError::Truncated {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let field = |i: usize| {
            u32::from_le_bytes([
                bytes[i * 4],
                bytes[i * 4 + 1],
                bytes[i * 4 + 2],
                bytes[i * 4 + 3],
            ])
        };

        let mut data = [0u8; PAYLOAD_LEN];
        data.copy_from_slice(&bytes[HEADER_LEN..FRAME_LEN]);

        Ok(Self {
            device_id: field(0),
            command: Command::from(field(1)),
            address: field(2),
            length: field(3),
            result: ResultCode::from(field(4)),
            data,
        })
    }
}
