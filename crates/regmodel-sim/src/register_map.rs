//! Generic register file
//!
//! Any 32-bit address is accepted. Addresses never written read back as
//! [`UNWRITTEN_SENTINEL`] so uninitialized reads stand out in tests.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::model::{AccessError, DeviceModel};

/// Value returned for an address that was never written
pub const UNWRITTEN_SENTINEL: u32 = 0xDEAD_BEEF;

/// A flat address → value register file
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    device_id: u32,
    registers: HashMap<u32, u32>,
}

impl RegisterMap {
    /// Create an empty register file
    pub fn new(device_id: u32) -> Self {
        Self {
            device_id,
            registers: HashMap::new(),
        }
    }

    /// Stored value, or the sentinel if the address was never written
    pub fn get(&self, address: u32) -> u32 {
        self.registers
            .get(&address)
            .copied()
            .unwrap_or(UNWRITTEN_SENTINEL)
    }

    /// Store a value unconditionally
    pub fn set(&mut self, address: u32, value: u32) {
        self.registers.insert(address, value);
    }

    /// Whether the address has been written
    pub fn contains(&self, address: u32) -> bool {
        self.registers.contains_key(&address)
    }

    /// Number of addresses written so far
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

impl DeviceModel for RegisterMap {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn kind(&self) -> &'static str {
        "generic"
    }

    fn read(&mut self, address: u32) -> Result<u32, AccessError> {
        let value = self.get(address);
        debug!("Read 0x{:08X} = 0x{:08X}", address, value);
        Ok(value)
    }

    fn write(&mut self, address: u32, value: u32) -> Result<(), AccessError> {
        debug!("Write 0x{:08X} = 0x{:08X}", address, value);
        self.set(address, value);
        Ok(())
    }

    fn init(&mut self, device_id: u32) {
        info!("Device {} initialized", device_id);
    }

    fn deinit(&mut self, device_id: u32) {
        info!("Device {} deinitialized", device_id);
    }
}
