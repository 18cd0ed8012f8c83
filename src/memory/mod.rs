//! Memory residency
//!
//! Devices, device allocations, and the typed buffers block payloads are
//! stored in.

mod device;
mod host_device;
mod resident_buffer;
#[cfg(feature = "gpu")]
mod wgpu_device;

pub use device::{
    AllocationId, ComputeDevice, DeviceAllocation, DeviceError, DeviceHandle, TransferCounters,
    TransferStats,
};
pub use host_device::HostDevice;
pub use resident_buffer::ResidentBuffer;
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;

/// Location of a block's payload bytes as seen by compute kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadLocation {
    /// Host address of the first payload element
    Host { address: u64 },
    /// Device allocation holding the payload
    Device { allocation: AllocationId },
}

impl PayloadLocation {
    /// Raw 64-bit value stored in device index entries
    pub fn raw(self) -> u64 {
        match self {
            PayloadLocation::Host { address } => address,
            PayloadLocation::Device { allocation } => allocation.0,
        }
    }
}
