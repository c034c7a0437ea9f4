//! The device model abstraction
//!
//! A device model owns the simulated register state of one peripheral. The
//! connection dispatcher and the activity simulator both reach it through a
//! [`SharedDevice`], which is the single lock serializing every access.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fastrand::Rng;
use regmodel_protocol::ResultCode;
use thiserror::Error;

/// Failed register access, reported to the peer through the result code
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// Address is not decoded by the device
    #[error("invalid address: 0x{0:08X}")]
    InvalidAddress(u32),

    /// Write targeted an address the device does not accept
    #[error("write rejected at 0x{0:08X}")]
    WriteRejected(u32),
}

impl AccessError {
    /// Wire result code for this failure
    pub fn result_code(self) -> ResultCode {
        match self {
            AccessError::InvalidAddress(_) => ResultCode::InvalidAddr,
            AccessError::WriteRejected(_) => ResultCode::Error,
        }
    }
}

/// A simulated peripheral reachable over the wire protocol
pub trait DeviceModel: fmt::Debug + Send {
    /// Device id stamped on interrupt notifications
    fn device_id(&self) -> u32;

    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Read the register at an absolute address
    fn read(&mut self, address: u32) -> Result<u32, AccessError>;

    /// Write the register at an absolute address
    fn write(&mut self, address: u32, value: u32) -> Result<(), AccessError>;

    /// Handle an INIT command
    fn init(&mut self, device_id: u32);

    /// Handle a DEINIT command
    fn deinit(&mut self, device_id: u32);

    /// Advance background activity by one step
    ///
    /// Returns the interrupt ids raised during the step, in order.
    fn tick(&mut self, _rng: &mut Rng) -> Vec<u32> {
        Vec::new()
    }
}

/// A device model shared between connections and the activity simulator
pub type SharedDevice = Arc<Mutex<dyn DeviceModel>>;

/// Wrap a model for sharing
pub fn share<M: DeviceModel + 'static>(model: M) -> SharedDevice {
    Arc::new(Mutex::new(model))
}

/// Lock a shared device
///
/// A panic while holding the lock leaves the register state as it was at the
/// panic point, which is still a valid register state, so poisoning is
/// cleared rather than propagated.
pub fn lock_device(device: &SharedDevice) -> MutexGuard<'_, dyn DeviceModel + 'static> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}
