//! In-memory block device, used by tests and the demo workload

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use super::{check_range, AccessMode, BlockDevice, DeviceLookupError, DeviceResolver};

/// A fixed-capacity device held entirely in memory.
#[derive(Debug)]
pub struct MemDevice {
    name: String,
    data: RwLock<Vec<u8>>,
}

impl MemDevice {
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(vec![0u8; capacity]),
        }
    }
}

impl BlockDevice for MemDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity_bytes(&self) -> u64 {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        check_range(&self.name, data.len() as u64, offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, payload: &[u8]) -> io::Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        check_range(&self.name, data.len() as u64, offset, payload.len())?;
        let start = offset as usize;
        data[start..start + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Resolver over a fixed set of in-memory devices.
#[derive(Debug, Default)]
pub struct MemDeviceResolver {
    devices: HashMap<String, Arc<MemDevice>>,
}

impl MemDeviceResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device reachable under its own name.
    pub fn add(&mut self, device: Arc<MemDevice>) {
        self.devices.insert(device.name().to_string(), device);
    }

    /// Convenience: create and register a zeroed device.
    pub fn add_new(&mut self, name: &str, capacity: usize) -> Arc<MemDevice> {
        let device = Arc::new(MemDevice::new(name, capacity));
        self.add(Arc::clone(&device));
        device
    }
}

impl DeviceResolver for MemDeviceResolver {
    fn resolve(
        &self,
        identifier: &str,
        _mode: AccessMode,
    ) -> Result<Arc<dyn BlockDevice>, DeviceLookupError> {
        self.devices
            .get(identifier)
            .map(|d| Arc::clone(d) as Arc<dyn BlockDevice>)
            .ok_or_else(|| DeviceLookupError::NotConfigured {
                identifier: identifier.to_string(),
            })
    }
}
