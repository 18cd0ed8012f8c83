//! GPU Layer View Data - Pure DOP
//!
//! NO METHODS beyond trivial accessors. Just data.
//! All transformations happen in gpu_layer_view_operations.rs

use crate::core::BlockIndex;
use crate::memory::{AllocationId, DeviceAllocation, PayloadLocation};
use bytemuck::{Pod, Zeroable};
use glam::IVec3;

/// Slot states stored in `GpuHashEntry::state`
pub mod slot_state {
    pub const EMPTY: u32 = 0;
    pub const HOST: u32 = 1;
    pub const DEVICE: u32 = 2;
}

/// One slot of the device-resident block hash.
///
/// Layout matches the storage buffer read by compute kernels:
/// 12 bytes of block index, 4 bytes of slot state, 8 bytes of payload
/// location (host address or device allocation id).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuHashEntry {
    pub index: [i32; 3],
    pub state: u32,
    pub location: u64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<GpuHashEntry>(), 24);

impl GpuHashEntry {
    pub const EMPTY: Self = Self {
        index: [0; 3],
        state: slot_state::EMPTY,
        location: 0,
    };

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.state != slot_state::EMPTY
    }

    #[inline]
    pub fn block_index(&self) -> BlockIndex {
        IVec3::from_array(self.index)
    }

    pub fn payload_location(&self) -> Option<PayloadLocation> {
        match self.state {
            slot_state::HOST => Some(PayloadLocation::Host {
                address: self.location,
            }),
            slot_state::DEVICE => Some(PayloadLocation::Device {
                allocation: AllocationId(self.location),
            }),
            _ => None,
        }
    }
}

/// A rebuilt device index: host mirror plus the device copy kernels read
#[derive(Debug)]
pub struct GpuHashTableData {
    /// Host mirror of the device table, `capacity` slots
    pub entries: Vec<GpuHashEntry>,
    pub capacity: usize,
    pub num_blocks: usize,
    pub block_size: f32,
    /// Device allocation holding `entries`
    pub device_table: DeviceAllocation,
    /// Rebuild number that produced this table, starting at 1
    pub generation: u64,
}
