//! Register Model Simulation Library
//!
//! This crate provides the simulated peripherals served over the register
//! protocol, so a driver can be exercised without real hardware. It includes:
//!
//! - **RegisterMap**: a generic register file accepting any address
//! - **UartModel**: a UART with CONTROL/STATUS/DATA/BAUD registers and
//!   16-entry TX/RX queues
//! - **run_activity_task**: a background task that ticks a model and reports
//!   the interrupts it raises
//!
//! Every model sits behind its own lock ([`SharedDevice`]); separate
//! instances never contend with each other.
//!
//! # Example
//!
//! ```rust
//! use regmodel_sim::{DeviceModel, UartModel};
//! use regmodel_sim::uart::{control, status};
//!
//! let mut uart = UartModel::new(1, 0x4000_0000);
//! uart.write(0x4000_0000, control::ENABLE).unwrap();
//! assert_ne!(uart.read(0x4000_0004).unwrap() & status::READY, 0);
//!
//! // Queue a byte for transmission
//! uart.write(0x4000_0008, b'A' as u32).unwrap();
//! assert_eq!(uart.tx_fifo().len(), 1);
//! ```

pub mod activity;
pub mod fifo;
pub mod model;
pub mod register_map;
pub mod uart;

pub use activity::{run_activity_task, ActivityCommand, ActivityConfig};
pub use fifo::{ByteFifo, FifoOverflow, FIFO_DEPTH};
pub use model::{lock_device, share, AccessError, DeviceModel, SharedDevice};
pub use register_map::{RegisterMap, UNWRITTEN_SENTINEL};
pub use uart::{UartConfig, UartModel};
