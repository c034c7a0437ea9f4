//! Register Model Protocol Library
//!
//! This crate provides the wire format spoken between a device driver and a
//! simulated memory-mapped peripheral:
//!
//! - **ProtocolMessage**: one fixed 276-byte frame (five little-endian u32
//!   header fields plus a 256-byte zero-padded payload)
//! - **Command / ResultCode**: header codes, lossless for unknown values
//! - **FrameCodec**: streaming splitter for a byte stream of frames
//!
//! Requests and responses share one layout. Interrupts are server-initiated
//! frames with `command = INTERRUPT` and the interrupt id in `length`.
//!
//! # Example
//!
//! ```rust
//! use regmodel_protocol::{Command, ProtocolMessage, FRAME_LEN};
//!
//! let request = ProtocolMessage::write(1, 0x4000_0000, 0x0F);
//! let frame = request.encode();
//! assert_eq!(frame.len(), FRAME_LEN);
//!
//! let decoded = ProtocolMessage::decode(&frame).unwrap();
//! assert_eq!(decoded.command, Command::Write);
//! assert_eq!(decoded.value(), 0x0F);
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod message;

pub use codec::FrameCodec;
pub use command::{Command, ResultCode};
pub use error::FramingError;
pub use message::{ProtocolMessage, FRAME_LEN, HEADER_LEN, PAYLOAD_LEN, REGISTER_WIDTH};
