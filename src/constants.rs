//! Layer-wide constants
//!
//! Every block payload type in the system shares the same voxel grid
//! resolution, so block edge length is always derived from `VOXELS_PER_SIDE`.

pub mod core {
    /// Voxels along one edge of a voxel block
    pub const VOXELS_PER_SIDE: usize = 8;

    /// Voxels stored in one voxel block
    pub const VOXELS_PER_BLOCK: usize = VOXELS_PER_SIDE * VOXELS_PER_SIDE * VOXELS_PER_SIDE;
}

pub mod gpu_limits {
    /// Offsets and sizes of buffer copies must be multiples of this (wgpu::COPY_BUFFER_ALIGNMENT)
    pub const COPY_ALIGNMENT: u64 = 4;

    /// Largest single allocation we will request from a device
    pub const MAX_ALLOCATION_SIZE: u64 = 256 * 1024 * 1024;
}

pub mod hashing {
    /// Device hash slots per allocated block
    pub const DEFAULT_CAPACITY_FACTOR: f32 = 2.0;

    /// Largest accepted slots-per-block factor
    pub const MAX_CAPACITY_FACTOR: f32 = 16.0;

    /// Smallest device hash table we build, even for empty layers
    pub const MIN_TABLE_CAPACITY: usize = 16;
}

pub mod transfer {
    /// Per-voxel copy-out loops slower than this get a warning
    pub const SLOW_TRANSFER_WARNING_MS: u128 = 10;
}

static_assertions::const_assert!(core::VOXELS_PER_SIDE.is_power_of_two());
static_assertions::const_assert_eq!(core::VOXELS_PER_BLOCK, 512);
static_assertions::const_assert!(gpu_limits::COPY_ALIGNMENT.is_power_of_two());
