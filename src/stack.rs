//! Storage-stack seam: target registration and request submission
//!
//! An interposition target registers a factory under a target-type name;
//! the stack then builds virtual devices from it and routes every request
//! through the target's `map` before touching the device the target
//! remapped it to. The data plane lives here, outside the targets, so a
//! target can never alter a request's outcome.

use std::io;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::device::{AccessMode, BlockDevice};
use crate::types::{IoClass, IoRequest, SECTOR_SIZE};

/// Target-type version, kept alongside the name in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetVersion(pub u32, pub u32, pub u32);

impl std::fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// What a target decided to do with a request.
#[derive(Clone)]
pub enum MapDisposition {
    /// Redirected to the returned device; the stack submits it there.
    Remapped(Arc<dyn BlockDevice>),
    /// Terminated with an error, never reaching a device.
    Kill,
}

/// A live interposition target bound to one virtual device.
pub trait Target: std::fmt::Debug + Send + Sync {
    /// Route one request. Must not perform the I/O itself.
    fn map(&self, request: &IoRequest) -> MapDisposition;

    /// Capacity the virtual device advertises.
    fn capacity_bytes(&self) -> u64;
}

/// Builds target instances when a virtual device is created.
pub trait TargetFactory: std::fmt::Debug + Send + Sync {
    fn target_name(&self) -> &str;

    fn version(&self) -> TargetVersion;

    /// Construct a target from the table arguments. Either fully succeeds
    /// or leaves no trace.
    fn create(
        &self,
        device_name: &str,
        args: &[String],
        mode: AccessMode,
    ) -> anyhow::Result<Box<dyn Target>>;
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("a target type named '{name}' is already registered")]
    DuplicateTarget { name: String },

    #[error("no target type named '{name}' is registered")]
    UnknownTarget { name: String },
}

/// Registry of available target types.
#[derive(Debug, Default)]
pub struct StackRegistry {
    targets: DashMap<String, Arc<dyn TargetFactory>>,
}

impl StackRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a target type. The returned guard unregisters on drop.
    pub fn register(
        self: &Arc<Self>,
        factory: Arc<dyn TargetFactory>,
    ) -> Result<TargetRegistration, StackError> {
        let name = factory.target_name().to_string();
        match self.targets.entry(name.clone()) {
            Entry::Occupied(_) => return Err(StackError::DuplicateTarget { name }),
            Entry::Vacant(slot) => {
                info!(target = %name, version = %factory.version(), "registered target type");
                slot.insert(factory);
            }
        }
        Ok(TargetRegistration {
            stack: Arc::clone(self),
            name,
        })
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Build a virtual device from a registered target type.
    pub fn create_device(
        &self,
        target: &str,
        device_name: &str,
        args: &[String],
        mode: AccessMode,
    ) -> anyhow::Result<VirtualDevice> {
        let factory = self
            .targets
            .get(target)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StackError::UnknownTarget {
                name: target.to_string(),
            })?;

        let instance = factory.create(device_name, args, mode)?;
        info!(device = device_name, target, "created virtual device");
        Ok(VirtualDevice {
            name: device_name.to_string(),
            target: instance,
        })
    }

    fn unregister(&self, name: &str) {
        if self.targets.remove(name).is_some() {
            info!(target = name, "unregistered target type");
        } else {
            warn!(target = name, "unregister of an unknown target type");
        }
    }
}

/// RAII registration of one target type.
#[derive(Debug)]
pub struct TargetRegistration {
    stack: Arc<StackRegistry>,
    name: String,
}

impl Drop for TargetRegistration {
    fn drop(&mut self) {
        self.stack.unregister(&self.name);
    }
}

/// A virtual device: requests submitted here run through the target's
/// `map` and then against whatever device the target remapped them to.
///
/// Implements [`BlockDevice`] itself, so virtual devices stack.
#[derive(Debug)]
pub struct VirtualDevice {
    name: String,
    target: Box<dyn Target>,
}

impl VirtualDevice {
    fn request(&self, class: IoClass, offset: u64, len: usize) -> io::Result<IoRequest> {
        if offset % SECTOR_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {} is not sector aligned", offset),
            ));
        }
        let size = u32::try_from(len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "request larger than 4 GiB")
        })?;
        Ok(IoRequest::new(class, offset / SECTOR_SIZE, size))
    }

    fn submit(&self, request: &IoRequest) -> io::Result<Arc<dyn BlockDevice>> {
        match self.target.map(request) {
            MapDisposition::Remapped(device) => Ok(device),
            MapDisposition::Kill => Err(io::Error::other(format!(
                "request killed by target on '{}'",
                self.name
            ))),
        }
    }
}

impl BlockDevice for VirtualDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity_bytes(&self) -> u64 {
        self.target.capacity_bytes()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let request = self.request(IoClass::Read, offset, buf.len())?;
        self.submit(&request)?.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let request = self.request(IoClass::Write, offset, data.len())?;
        self.submit(&request)?.write_at(offset, data)
    }

    fn flush(&self) -> io::Result<()> {
        let request = IoRequest::new(IoClass::Other, 0, 0);
        self.submit(&request)?.flush()
    }
}
