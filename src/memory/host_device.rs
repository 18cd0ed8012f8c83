//! Host-emulated compute device
//!
//! Keeps "device" allocations in ordinary host memory while still forcing
//! every access through explicit upload/download calls. Used as the CPU
//! fallback when no GPU is present and throughout the test-suite, where its
//! capacity limit and fault injection exercise the error paths.

use super::device::{
    check_range, AllocationId, ComputeDevice, DeviceError, DeviceHandle, TransferCounters,
    TransferStats,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub struct HostDevice {
    name: String,
    allocations: Mutex<FxHashMap<AllocationId, Vec<u8>>>,
    next_id: AtomicU64,
    /// Total bytes that may be live at once
    capacity: Option<u64>,
    fail_transfers: AtomicBool,
    counters: TransferCounters,
}

impl HostDevice {
    pub fn new() -> Self {
        Self {
            name: "host-emulated".to_string(),
            allocations: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            capacity: None,
            fail_transfers: AtomicBool::new(false),
            counters: TransferCounters::default(),
        }
    }

    /// Device that refuses allocations once `bytes` are live
    pub fn with_capacity(bytes: u64) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::new()
        }
    }

    /// Convenience: a fresh device behind a `DeviceHandle`
    pub fn shared() -> DeviceHandle {
        Arc::new(Self::new())
    }

    /// Make every subsequent upload, download and copy fail
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::Relaxed);
    }

    fn check_fault(&self, operation: &str) -> Result<(), DeviceError> {
        if self.fail_transfers.load(Ordering::Relaxed) {
            log::error!("[HOST_DEVICE] Injected fault during {}", operation);
            return Err(DeviceError::Transfer {
                operation: operation.to_string(),
                message: "injected transfer fault".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDevice")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, size: u64) -> Result<AllocationId, DeviceError> {
        // Capacity check and insert happen under the same lock
        let mut allocations = self.allocations.lock();
        if let Some(capacity) = self.capacity {
            let live = self.counters.live_bytes();
            let available = capacity.saturating_sub(live);
            if size > available {
                log::error!(
                    "[HOST_DEVICE] Allocation of {} bytes refused ({} of {} bytes in use)",
                    size,
                    live,
                    capacity
                );
                return Err(DeviceError::OutOfMemory {
                    requested: size,
                    available,
                });
            }
        }

        let id = AllocationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        allocations.insert(id, vec![0u8; size as usize]);
        self.counters.record_allocation(size);
        Ok(id)
    }

    fn release(&self, id: AllocationId) {
        if let Some(bytes) = self.allocations.lock().remove(&id) {
            self.counters.record_release(bytes.len() as u64);
        }
    }

    fn upload(&self, id: AllocationId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        self.check_fault("upload")?;
        let mut allocations = self.allocations.lock();
        let memory = allocations
            .get_mut(&id)
            .ok_or(DeviceError::UnknownAllocation { id: id.0 })?;
        check_range(offset, bytes.len() as u64, memory.len() as u64)?;

        let start = offset as usize;
        memory[start..start + bytes.len()].copy_from_slice(bytes);
        self.counters.record_upload(bytes.len() as u64);
        Ok(())
    }

    fn download(&self, id: AllocationId, offset: u64, out: &mut [u8]) -> Result<(), DeviceError> {
        self.check_fault("download")?;
        let allocations = self.allocations.lock();
        let memory = allocations
            .get(&id)
            .ok_or(DeviceError::UnknownAllocation { id: id.0 })?;
        check_range(offset, out.len() as u64, memory.len() as u64)?;

        let start = offset as usize;
        out.copy_from_slice(&memory[start..start + out.len()]);
        self.counters.record_download(out.len() as u64);
        Ok(())
    }

    fn copy(&self, src: AllocationId, dst: AllocationId, size: u64) -> Result<(), DeviceError> {
        self.check_fault("copy")?;
        let mut allocations = self.allocations.lock();
        let source = allocations
            .get(&src)
            .ok_or(DeviceError::UnknownAllocation { id: src.0 })?;
        check_range(0, size, source.len() as u64)?;
        let staged = source[..size as usize].to_vec();

        let destination = allocations
            .get_mut(&dst)
            .ok_or(DeviceError::UnknownAllocation { id: dst.0 })?;
        check_range(0, size, destination.len() as u64)?;
        destination[..size as usize].copy_from_slice(&staged);

        self.counters.record_copy();
        Ok(())
    }

    fn stats(&self) -> TransferStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_download() {
        let device = HostDevice::new();
        let id = device.allocate(16).expect("allocate");

        device.upload(id, 4, &[1, 2, 3, 4]).expect("upload");
        let mut out = [0u8; 6];
        device.download(id, 2, &mut out).expect("download");
        assert_eq!(out, [0, 0, 1, 2, 3, 4]);

        let stats = device.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.live_allocations, 1);
        assert_eq!(stats.live_bytes, 16);
    }

    #[test]
    fn test_capacity_limit() {
        let device = HostDevice::with_capacity(32);
        let first = device.allocate(24).expect("first allocation fits");

        match device.allocate(16) {
            Err(DeviceError::OutOfMemory {
                requested,
                available,
            }) => {
                assert_eq!(requested, 16);
                assert_eq!(available, 8);
            }
            other => panic!("expected out of memory, got {:?}", other),
        }

        device.release(first);
        assert!(device.allocate(16).is_ok());
    }

    #[test]
    fn test_out_of_range_and_unknown() {
        let device = HostDevice::new();
        let id = device.allocate(8).expect("allocate");

        assert!(matches!(
            device.upload(id, 6, &[0; 4]),
            Err(DeviceError::OutOfRange { .. })
        ));
        assert!(matches!(
            device.download(AllocationId(999), 0, &mut [0; 1]),
            Err(DeviceError::UnknownAllocation { id: 999 })
        ));
    }

    #[test]
    fn test_device_copy() {
        let device = HostDevice::new();
        let src = device.allocate(8).expect("allocate src");
        let dst = device.allocate(8).expect("allocate dst");
        device.upload(src, 0, &[9; 8]).expect("upload");

        device.copy(src, dst, 8).expect("copy");
        let mut out = [0u8; 8];
        device.download(dst, 0, &mut out).expect("download");
        assert_eq!(out, [9; 8]);
        assert_eq!(device.stats().device_copies, 1);
    }

    #[test]
    fn test_injected_fault() {
        let device = HostDevice::new();
        let id = device.allocate(4).expect("allocate");
        device.set_fail_transfers(true);
        assert!(matches!(
            device.upload(id, 0, &[1]),
            Err(DeviceError::Transfer { .. })
        ));
        device.set_fail_transfers(false);
        assert!(device.upload(id, 0, &[1]).is_ok());
    }

    #[test]
    fn test_concurrent_allocations_respect_capacity() {
        let device = HostDevice::with_capacity(1000);
        let granted: u64 = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..10)
                            .filter(|_| device.allocate(200).is_ok())
                            .count() as u64
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker thread"))
                .sum()
        });

        assert_eq!(granted, 5);
        assert_eq!(device.stats().live_bytes, 1000);
        assert_eq!(device.stats().live_allocations, 5);
    }
}
