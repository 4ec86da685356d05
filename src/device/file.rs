//! File-backed block devices
//!
//! Each configured identifier maps to a backing file opened with the
//! requested access mode. Positioned reads and writes keep the handle free
//! of seek state so concurrent submitters never interfere.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::{check_range, AccessMode, BlockDevice, DeviceLookupError, DeviceResolver};

/// A block device backed by a regular file.
#[derive(Debug)]
pub struct FileDevice {
    name: String,
    file: std::fs::File,
    capacity: u64,
    mode: AccessMode,
}

impl FileDevice {
    /// Open `path` as a device named `name`.
    ///
    /// When opened read-write and the file is missing, it is created with
    /// `create_size` bytes so a fresh deployment works without manual
    /// provisioning.
    pub fn open(
        name: &str,
        path: &Path,
        mode: AccessMode,
        create_size: Option<u64>,
    ) -> io::Result<Self> {
        let writable = matches!(mode, AccessMode::ReadWrite);
        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        if writable && create_size.is_some() {
            options.create(true);
        }

        let file = options.open(path)?;
        let mut capacity = file.metadata()?.len();
        if capacity == 0 {
            if let Some(size) = create_size {
                file.set_len(size)?;
                capacity = size;
                info!(device = name, path = %path.display(), size, "created backing store");
            }
        }

        Ok(Self {
            name: name.to_string(),
            file,
            capacity,
            mode,
        })
    }
}

impl BlockDevice for FileDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity_bytes(&self) -> u64 {
        self.capacity
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(&self.name, self.capacity, offset, buf.len())?;
        self.file.read_exact_at(buf, offset)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        if matches!(self.mode, AccessMode::ReadOnly) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("device '{}' is open read-only", self.name),
            ));
        }
        check_range(&self.name, self.capacity, offset, data.len())?;
        self.file.write_all_at(data, offset)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// Backing-store description for one resolvable identifier.
#[derive(Debug, Clone)]
pub struct BackingSpec {
    pub path: PathBuf,
    pub read_only: bool,
    /// Size used to create a missing backing file; `None` requires the
    /// file to already exist.
    pub create_size: Option<u64>,
}

/// Resolver over a fixed table of configured identifiers.
#[derive(Debug, Default)]
pub struct FileDeviceResolver {
    table: HashMap<String, BackingSpec>,
}

impl FileDeviceResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, spec: BackingSpec) {
        self.table.insert(identifier.into(), spec);
    }
}

impl DeviceResolver for FileDeviceResolver {
    fn resolve(
        &self,
        identifier: &str,
        mode: AccessMode,
    ) -> Result<Arc<dyn BlockDevice>, DeviceLookupError> {
        let spec = self
            .table
            .get(identifier)
            .ok_or_else(|| DeviceLookupError::NotConfigured {
                identifier: identifier.to_string(),
            })?;

        if spec.read_only && matches!(mode, AccessMode::ReadWrite) {
            return Err(DeviceLookupError::WriteProtected {
                identifier: identifier.to_string(),
            });
        }

        let device = FileDevice::open(identifier, &spec.path, mode, spec.create_size).map_err(
            |source| DeviceLookupError::Open {
                identifier: identifier.to_string(),
                source,
            },
        )?;

        debug!(device = identifier, path = %spec.path.display(), "resolved backing device");
        Ok(Arc::new(device))
    }
}
