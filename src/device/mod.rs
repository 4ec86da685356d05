//! Underlying block device access
//!
//! The proxy only ever talks to devices through these seams: a
//! [`BlockDevice`] carries the data plane, a [`DeviceResolver`] turns a
//! configured identifier into an exclusively owned handle. Handles release
//! their device when dropped.

mod file;
mod mem;

pub use file::{BackingSpec, FileDevice, FileDeviceResolver};
pub use mem::{MemDevice, MemDeviceResolver};

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Requested access to an underlying device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Error)]
pub enum DeviceLookupError {
    #[error("no device configured under identifier '{identifier}'")]
    NotConfigured { identifier: String },

    #[error("device '{identifier}' is write protected")]
    WriteProtected { identifier: String },

    #[error("failed to open backing store for '{identifier}': {source}")]
    Open {
        identifier: String,
        #[source]
        source: io::Error,
    },
}

/// A block-addressable device the proxy can forward requests to.
///
/// Offsets are in bytes and must be sector aligned; implementations reject
/// out-of-range access the way a real device errors past its last sector.
pub trait BlockDevice: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn capacity_bytes(&self) -> u64;

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;

    fn flush(&self) -> io::Result<()>;
}

/// Resolves configured device identifiers to live handles.
pub trait DeviceResolver: std::fmt::Debug + Send + Sync {
    fn resolve(
        &self,
        identifier: &str,
        mode: AccessMode,
    ) -> Result<Arc<dyn BlockDevice>, DeviceLookupError>;
}

/// Bounds check shared by the shipped device implementations.
pub(crate) fn check_range(
    name: &str,
    capacity: u64,
    offset: u64,
    len: usize,
) -> io::Result<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
    if end > capacity {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "access beyond end of device '{}' ({} + {} > {})",
                name, offset, len, capacity
            ),
        ));
    }
    Ok(())
}
