//! Compute device abstraction
//!
//! A `ComputeDevice` owns opaque allocations and moves bytes between them and
//! host memory. Every transfer blocks until it completes. Implementations
//! record their traffic in `TransferCounters` so callers can observe how many
//! round trips an operation cost.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to the device a layer allocates from
pub type DeviceHandle = Arc<dyn ComputeDevice>;

/// Opaque identifier of one device allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(pub u64);

/// Device-side failures
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device out of memory: requested {requested} bytes, available {available}")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Unknown device allocation {id}")]
    UnknownAllocation { id: u64 },

    #[error("Device access out of range: offset {offset} + {len} bytes exceeds allocation of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("Device transfer '{operation}' failed: {message}")]
    Transfer { operation: String, message: String },

    #[error("No compatible GPU adapter found")]
    AdapterNotFound,
}

/// Snapshot of a device's transfer and allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploads: u64,
    pub downloads: u64,
    pub device_copies: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub live_allocations: u64,
    pub live_bytes: u64,
}

/// Lock-free counters shared by device implementations
#[derive(Debug, Default)]
pub struct TransferCounters {
    uploads: AtomicU64,
    downloads: AtomicU64,
    device_copies: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    live_allocations: AtomicU64,
    live_bytes: AtomicU64,
}

impl TransferCounters {
    pub fn record_upload(&self, bytes: u64) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_copy(&self) {
        self.device_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation(&self, bytes: u64) {
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_release(&self, bytes: u64) {
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            uploads: self.uploads.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            device_copies: self.device_copies.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            live_allocations: self.live_allocations.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Memory and transfer interface of a compute device.
///
/// Offsets and lengths are in bytes and need no particular alignment;
/// implementations with alignment rules handle them internally.
pub trait ComputeDevice: Send + Sync + fmt::Debug {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Allocate `size` zero-initialized bytes
    fn allocate(&self, size: u64) -> Result<AllocationId, DeviceError>;

    /// Free an allocation. Unknown ids are ignored.
    fn release(&self, id: AllocationId);

    /// Copy host bytes into an allocation at `offset`
    fn upload(&self, id: AllocationId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Copy bytes from an allocation at `offset` into `out`
    fn download(&self, id: AllocationId, offset: u64, out: &mut [u8]) -> Result<(), DeviceError>;

    /// Copy the first `size` bytes of `src` into `dst` without a host round trip
    fn copy(&self, src: AllocationId, dst: AllocationId, size: u64) -> Result<(), DeviceError>;

    fn stats(&self) -> TransferStats;
}

/// Owned device allocation, released when dropped
pub struct DeviceAllocation {
    device: DeviceHandle,
    id: AllocationId,
    size: u64,
}

impl DeviceAllocation {
    pub fn new(device: &DeviceHandle, size: u64) -> Result<Self, DeviceError> {
        let id = device.allocate(size)?;
        Ok(Self {
            device: Arc::clone(device),
            id,
            size,
        })
    }

    /// Allocate and fill with `bytes` in one step
    pub fn with_contents(device: &DeviceHandle, bytes: &[u8]) -> Result<Self, DeviceError> {
        let allocation = Self::new(device, bytes.len() as u64)?;
        if !bytes.is_empty() {
            allocation.upload(0, bytes)?;
        }
        Ok(allocation)
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn upload(&self, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        self.device.upload(self.id, offset, bytes)
    }

    pub fn download(&self, offset: u64, out: &mut [u8]) -> Result<(), DeviceError> {
        self.device.download(self.id, offset, out)
    }

    /// Whether `other` lives on the same device instance
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.device, other)
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        self.device.release(self.id);
    }
}

impl fmt::Debug for DeviceAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAllocation")
            .field("device", &self.device.name())
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

/// Reject accesses that run past the end of an allocation
pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<(), DeviceError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(DeviceError::OutOfRange { offset, len, size }),
    }
}
