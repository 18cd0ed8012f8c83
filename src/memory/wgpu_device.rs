//! wgpu-backed compute device
//!
//! Allocations are storage buffers. Uploads go through `queue.write_buffer`,
//! downloads through a staging buffer that is mapped and polled to
//! completion, so every call returns only after the GPU has finished.

use super::device::{
    check_range, AllocationId, ComputeDevice, DeviceError, TransferCounters, TransferStats,
};
use crate::constants::gpu_limits::{COPY_ALIGNMENT, MAX_ALLOCATION_SIZE};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct GpuAllocation {
    buffer: wgpu::Buffer,
    /// Size requested by the caller; the buffer itself is padded to `COPY_ALIGNMENT`
    size: u64,
}

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    name: String,
    allocations: Mutex<FxHashMap<AllocationId, GpuAllocation>>,
    next_id: AtomicU64,
    counters: TransferCounters,
}

#[inline]
fn align_down(value: u64) -> u64 {
    value & !(COPY_ALIGNMENT - 1)
}

#[inline]
fn align_up(value: u64) -> u64 {
    (value + COPY_ALIGNMENT - 1) & !(COPY_ALIGNMENT - 1)
}

fn transfer_error(operation: &str, error: impl std::fmt::Display) -> DeviceError {
    DeviceError::Transfer {
        operation: operation.to_string(),
        message: error.to_string(),
    }
}

impl WgpuDevice {
    /// Wrap an existing device/queue pair
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        log::info!("[WGPU_DEVICE] Created compute device '{}'", name);
        Self {
            device,
            queue,
            name,
            allocations: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            counters: TransferCounters::default(),
        }
    }

    /// Acquire the default adapter and open a device on it
    pub fn request_default() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(DeviceError::AdapterNotFound)?;

        let info = adapter.get_info();
        log::info!(
            "[WGPU_DEVICE] Using adapter '{}' ({:?})",
            info.name,
            info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Sparse Layer Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| transfer_error("request_device", e))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue), info.name))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn max_allocation_size(&self) -> u64 {
        MAX_ALLOCATION_SIZE.min(self.device.limits().max_buffer_size)
    }

    /// Blocking readback of an aligned byte range
    fn read_aligned(&self, buffer: &wgpu::Buffer, start: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let started = Instant::now();

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sparse Layer Readback Buffer"),
            size: len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sparse Layer Readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, start, &staging, 0, len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| transfer_error("download", e))?
            .map_err(|e| transfer_error("download", e))?;

        let bytes = {
            let mapped = slice.get_mapped_range();
            mapped.to_vec()
        };
        staging.unmap();

        log::debug!(
            "[WGPU_DEVICE] Read back {} bytes in {}μs",
            len,
            started.elapsed().as_micros()
        );
        Ok(bytes)
    }

    fn wait_idle(&self) {
        self.queue.submit(std::iter::empty());
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("name", &self.name)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, size: u64) -> Result<AllocationId, DeviceError> {
        let padded = align_up(size.max(COPY_ALIGNMENT));
        let limit = self.max_allocation_size();
        if padded > limit {
            log::error!(
                "[WGPU_DEVICE] Allocation of {} bytes exceeds device limit of {} bytes",
                padded,
                limit
            );
            return Err(DeviceError::OutOfMemory {
                requested: size,
                available: limit,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sparse Layer Storage Buffer"),
            size: padded,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("[WGPU_DEVICE] Buffer creation failed: {}", error);
            return Err(DeviceError::OutOfMemory {
                requested: size,
                available: 0,
            });
        }

        let id = AllocationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.allocations
            .lock()
            .insert(id, GpuAllocation { buffer, size });
        self.counters.record_allocation(size);
        Ok(id)
    }

    fn release(&self, id: AllocationId) {
        if let Some(allocation) = self.allocations.lock().remove(&id) {
            allocation.buffer.destroy();
            self.counters.record_release(allocation.size);
        }
    }

    fn upload(&self, id: AllocationId, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        let allocations = self.allocations.lock();
        let allocation = allocations
            .get(&id)
            .ok_or(DeviceError::UnknownAllocation { id: id.0 })?;
        let len = bytes.len() as u64;
        check_range(offset, len, allocation.size)?;
        if bytes.is_empty() {
            return Ok(());
        }

        let start = align_down(offset);
        let end = align_up(offset + len);
        if start == offset && end == offset + len {
            self.queue.write_buffer(&allocation.buffer, offset, bytes);
        } else {
            // Unaligned write: patch the surrounding aligned words
            let mut patched = self.read_aligned(&allocation.buffer, start, end - start)?;
            let local = (offset - start) as usize;
            patched[local..local + bytes.len()].copy_from_slice(bytes);
            self.queue.write_buffer(&allocation.buffer, start, &patched);
        }
        self.wait_idle();

        self.counters.record_upload(len);
        Ok(())
    }

    fn download(&self, id: AllocationId, offset: u64, out: &mut [u8]) -> Result<(), DeviceError> {
        let allocations = self.allocations.lock();
        let allocation = allocations
            .get(&id)
            .ok_or(DeviceError::UnknownAllocation { id: id.0 })?;
        let len = out.len() as u64;
        check_range(offset, len, allocation.size)?;
        if out.is_empty() {
            return Ok(());
        }

        let start = align_down(offset);
        let end = align_up(offset + len);
        let bytes = self.read_aligned(&allocation.buffer, start, end - start)?;
        let local = (offset - start) as usize;
        out.copy_from_slice(&bytes[local..local + out.len()]);

        self.counters.record_download(len);
        Ok(())
    }

    fn copy(&self, src: AllocationId, dst: AllocationId, size: u64) -> Result<(), DeviceError> {
        let allocations = self.allocations.lock();
        let source = allocations
            .get(&src)
            .ok_or(DeviceError::UnknownAllocation { id: src.0 })?;
        let destination = allocations
            .get(&dst)
            .ok_or(DeviceError::UnknownAllocation { id: dst.0 })?;
        check_range(0, size, source.size)?;
        check_range(0, size, destination.size)?;
        if size == 0 {
            return Ok(());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sparse Layer Device Copy"),
            });
        encoder.copy_buffer_to_buffer(&source.buffer, 0, &destination.buffer, 0, align_up(size));
        self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);

        self.counters.record_copy();
        Ok(())
    }

    fn stats(&self) -> TransferStats {
        self.counters.snapshot()
    }
}
