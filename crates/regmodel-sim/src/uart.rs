//! UART peripheral model
//!
//! Four 32-bit registers relative to a configurable base address:
//!
//! ```text
//! offset  register
//!   0x00  CONTROL   ENABLE | TX_ENABLE | RX_ENABLE | IRQ_ENABLE
//!   0x04  STATUS    READY | TX_EMPTY | RX_FULL | TX_COMPLETE
//!   0x08  DATA      write: enqueue TX byte, read: dequeue RX byte
//!   0x0C  BAUD      stored verbatim
//! ```
//!
//! There is no explicit state tag. Behaviour is derived from the CONTROL
//! bits and the contents of the 16-entry TX and RX queues:
//!
//! - STATUS.READY follows CONTROL.ENABLE on every CONTROL write.
//! - STATUS.RX_FULL is set while the RX queue holds data.
//! - STATUS.TX_EMPTY and STATUS.TX_COMPLETE clear when a byte is queued for
//!   transmission and set again once the activity tick drains the queue.
//! - A byte written to a full TX queue is dropped; the write still succeeds.

use fastrand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fifo::{ByteFifo, FifoOverflow, FIFO_DEPTH};
use crate::model::{AccessError, DeviceModel};

/// Register offsets from the base address
pub mod offset {
    pub const CONTROL: u32 = 0x00;
    pub const STATUS: u32 = 0x04;
    pub const DATA: u32 = 0x08;
    pub const BAUD: u32 = 0x0C;
}

/// CONTROL register bits
pub mod control {
    /// Peripheral enabled
    pub const ENABLE: u32 = 0x01;
    /// Transmitter enabled
    pub const TX_ENABLE: u32 = 0x02;
    /// Receiver enabled
    pub const RX_ENABLE: u32 = 0x04;
    /// Interrupt delivery enabled
    pub const IRQ_ENABLE: u32 = 0x08;
}

/// STATUS register bits
pub mod status {
    /// Peripheral ready
    pub const READY: u32 = 0x01;
    /// TX queue empty
    pub const TX_EMPTY: u32 = 0x02;
    /// RX queue holds data
    pub const RX_FULL: u32 = 0x04;
    /// Last transmission finished
    pub const TX_COMPLETE: u32 = 0x08;
}

/// Interrupt identifiers raised by the UART
pub mod interrupt {
    /// A byte arrived in the RX queue
    pub const RX_READY: u32 = 0x01;
    /// The TX queue drained
    pub const TX_COMPLETE: u32 = 0x02;
}

/// Default base address of the UART register block
pub const DEFAULT_BASE_ADDRESS: u32 = 0x4000_0000;

/// Baud register value after reset
pub const DEFAULT_BAUD: u32 = 9600;

/// Configuration for creating a UART model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// Device id stamped on interrupts
    pub device_id: u32,
    /// Absolute address of the CONTROL register
    pub base_address: u32,
    /// Chance per tick that a synthetic byte arrives
    pub rx_probability: f64,
    /// Bytes the synthetic receiver picks from
    pub rx_pattern: Vec<u8>,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            base_address: DEFAULT_BASE_ADDRESS,
            rx_probability: 0.3,
            rx_pattern: b"Hello\r\n".to_vec(),
        }
    }
}

/// A simulated UART with TX/RX queues
#[derive(Debug, Clone)]
pub struct UartModel {
    device_id: u32,
    base_address: u32,
    control: u32,
    status: u32,
    data: u32,
    baud: u32,
    tx: ByteFifo,
    rx: ByteFifo,
    transmitted: u64,
    rx_probability: f64,
    rx_pattern: Vec<u8>,
}

impl UartModel {
    /// Create a UART with default settings at `base_address`
    pub fn new(device_id: u32, base_address: u32) -> Self {
        Self::from_config(UartConfig {
            device_id,
            base_address,
            ..Default::default()
        })
    }

    /// Create a UART from configuration
    pub fn from_config(config: UartConfig) -> Self {
        Self {
            device_id: config.device_id,
            base_address: config.base_address,
            control: 0,
            status: status::READY | status::TX_EMPTY,
            data: 0,
            baud: DEFAULT_BAUD,
            tx: ByteFifo::new(FIFO_DEPTH),
            rx: ByteFifo::new(FIFO_DEPTH),
            transmitted: 0,
            rx_probability: config.rx_probability.clamp(0.0, 1.0),
            rx_pattern: config.rx_pattern,
        }
    }

    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    pub fn control(&self) -> u32 {
        self.control
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// The transmit queue
    pub fn tx_fifo(&self) -> &ByteFifo {
        &self.tx
    }

    /// The receive queue
    pub fn rx_fifo(&self) -> &ByteFifo {
        &self.rx
    }

    /// Bytes moved off the TX queue since creation
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    /// Deliver a byte into the RX queue as if it arrived on the line
    pub fn receive(&mut self, byte: u8) -> Result<(), FifoOverflow> {
        self.rx.push(byte)?;
        self.status |= status::RX_FULL;
        Ok(())
    }

    /// Move one byte out of the TX queue onto the simulated line
    ///
    /// Returns the byte sent and whether the queue is now empty.
    pub fn transmit_one(&mut self) -> Option<(u8, bool)> {
        let byte = self.tx.pop()?;
        self.transmitted += 1;
        let drained = self.tx.is_empty();
        if drained {
            self.status |= status::TX_EMPTY | status::TX_COMPLETE;
        }
        Some((byte, drained))
    }

    fn irq_enabled(&self) -> bool {
        self.control & control::IRQ_ENABLE != 0
    }

    fn read_data(&mut self) -> u32 {
        if let Some(byte) = self.rx.pop() {
            self.data = u32::from(byte);
            if self.rx.is_empty() {
                self.status &= !status::RX_FULL;
            }
        }
        self.data
    }

    fn write_control(&mut self, value: u32) {
        self.control = value;
        if value & control::ENABLE != 0 {
            self.status |= status::READY;
        } else {
            self.status &= !status::READY;
        }
        info!("UART {} control set to 0x{:X}", self.device_id, value);
    }

    fn write_data(&mut self, value: u32) {
        let byte = (value & 0xFF) as u8;
        match self.tx.push(byte) {
            Ok(()) => {
                self.status &= !(status::TX_EMPTY | status::TX_COMPLETE);
                debug!("UART {} queued for transmission: 0x{:02X}", self.device_id, byte);
            }
            Err(e) => {
                warn!("UART {} TX {}", self.device_id, e);
            }
        }
    }
}

impl DeviceModel for UartModel {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn kind(&self) -> &'static str {
        "uart"
    }

    fn read(&mut self, address: u32) -> Result<u32, AccessError> {
        let value = match address.wrapping_sub(self.base_address) {
            offset::CONTROL => self.control,
            offset::STATUS => self.status,
            offset::DATA => self.read_data(),
            offset::BAUD => self.baud,
            _ => {
                warn!("UART {} invalid read address: 0x{:08X}", self.device_id, address);
                return Err(AccessError::InvalidAddress(address));
            }
        };
        debug!("UART {} read 0x{:08X} = 0x{:X}", self.device_id, address, value);
        Ok(value)
    }

    fn write(&mut self, address: u32, value: u32) -> Result<(), AccessError> {
        match address.wrapping_sub(self.base_address) {
            offset::CONTROL => self.write_control(value),
            offset::DATA => self.write_data(value),
            // Stored verbatim with no side effects
            offset::STATUS => self.status = value,
            offset::BAUD => self.baud = value,
            _ => {
                warn!("UART {} invalid write address: 0x{:08X}", self.device_id, address);
                return Err(AccessError::WriteRejected(address));
            }
        }
        debug!("UART {} write 0x{:08X} = 0x{:X}", self.device_id, address, value);
        Ok(())
    }

    /// Resets STATUS to READY|TX_EMPTY, then re-derives TX_EMPTY and RX_FULL
    /// from the queues it keeps, so those bits never contradict the queues.
    fn init(&mut self, device_id: u32) {
        self.status = status::READY | status::TX_EMPTY;
        if !self.tx.is_empty() {
            self.status &= !status::TX_EMPTY;
        }
        if !self.rx.is_empty() {
            self.status |= status::RX_FULL;
        }
        info!("UART device {} initialized", device_id);
    }

    fn deinit(&mut self, device_id: u32) {
        info!("UART device {} deinitialized", device_id);
    }

    fn tick(&mut self, rng: &mut Rng) -> Vec<u32> {
        let mut raised = Vec::new();

        if self.control & control::ENABLE == 0 {
            return raised;
        }

        if self.control & control::RX_ENABLE != 0
            && !self.rx.is_full()
            && !self.rx_pattern.is_empty()
            && rng.f64() < self.rx_probability
        {
            let byte = self.rx_pattern[rng.usize(..self.rx_pattern.len())];
            if self.receive(byte).is_ok() {
                debug!("UART {} received 0x{:02X}", self.device_id, byte);
                if self.irq_enabled() {
                    raised.push(interrupt::RX_READY);
                }
            }
        }

        if self.control & control::TX_ENABLE != 0 {
            if let Some((byte, drained)) = self.transmit_one() {
                debug!("UART {} transmitted 0x{:02X}", self.device_id, byte);
                if drained && self.irq_enabled() {
                    raised.push(interrupt::TX_COMPLETE);
                }
            }
        }

        raised
    }
}
