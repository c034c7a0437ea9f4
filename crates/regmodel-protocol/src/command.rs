//! Command and result codes carried in the frame header
//!
//! Both enums keep an `Unknown` variant so that any 32-bit code read off the
//! wire survives a decode/encode cycle unchanged. The dispatcher decides what
//! an unknown code means; the codec never rejects one.

use std::fmt;

/// Operation requested by a frame (header offset 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Read a 32-bit register
    Read,
    /// Write a 32-bit register (value in the first 4 payload bytes)
    Write,
    /// Server-initiated interrupt notification
    Interrupt,
    /// Initialize the device
    Init,
    /// Deinitialize the device
    Deinit,
    /// Any code outside the defined set
    Unknown(u32),
}

impl Command {
    /// Wire code for this command
    pub fn code(self) -> u32 {
        match self {
            Command::Read => 0x01,
            Command::Write => 0x02,
            Command::Interrupt => 0x03,
            Command::Init => 0x04,
            Command::Deinit => 0x05,
            Command::Unknown(code) => code,
        }
    }

    /// Returns true for the five defined commands
    pub fn is_known(self) -> bool {
        !matches!(self, Command::Unknown(_))
    }
}

impl From<u32> for Command {
    fn from(code: u32) -> Self {
        match code {
            0x01 => Command::Read,
            0x02 => Command::Write,
            0x03 => Command::Interrupt,
            0x04 => Command::Init,
            0x05 => Command::Deinit,
            other => Command::Unknown(other),
        }
    }
}

impl From<Command> for u32 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Read => write!(f, "READ"),
            Command::Write => write!(f, "WRITE"),
            Command::Interrupt => write!(f, "INTERRUPT"),
            Command::Init => write!(f, "INIT"),
            Command::Deinit => write!(f, "DEINIT"),
            Command::Unknown(code) => write!(f, "UNKNOWN(0x{:X})", code),
        }
    }
}

/// Outcome of a request (header offset 16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResultCode {
    /// Operation completed
    #[default]
    Success,
    /// Operation failed (unknown command, rejected write)
    Error,
    /// Operation timed out
    Timeout,
    /// Address not decoded by the device
    InvalidAddr,
    /// Any code outside the defined set
    Unknown(u32),
}

impl ResultCode {
    /// Wire code for this result
    pub fn code(self) -> u32 {
        match self {
            ResultCode::Success => 0x00,
            ResultCode::Error => 0x01,
            ResultCode::Timeout => 0x02,
            ResultCode::InvalidAddr => 0x03,
            ResultCode::Unknown(code) => code,
        }
    }

    /// Returns true if this is [`ResultCode::Success`]
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl From<u32> for ResultCode {
    fn from(code: u32) -> Self {
        match code {
            0x00 => ResultCode::Success,
            0x01 => ResultCode::Error,
            0x02 => ResultCode::Timeout,
            0x03 => ResultCode::InvalidAddr,
            other => ResultCode::Unknown(other),
        }
    }
}

impl From<ResultCode> for u32 {
    fn from(result: ResultCode) -> Self {
        result.code()
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "SUCCESS"),
            ResultCode::Error => write!(f, "ERROR"),
            ResultCode::Timeout => write!(f, "TIMEOUT"),
            ResultCode::InvalidAddr => write!(f, "INVALID_ADDR"),
            ResultCode::Unknown(code) => write!(f, "UNKNOWN(0x{:X})", code),
        }
    }
}
