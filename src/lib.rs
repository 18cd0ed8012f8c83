// Sparse Layer - GPU-resident sparse voxel block storage
//
// Blocks are fixed-size grids of voxels addressed by integer block index.
// A layer keeps them in a hash on the host and publishes a device-resident
// copy of that hash for compute kernels.
//
// - core: index math and memory types
// - memory: compute devices and residency-aware buffers
// - blocks: the Block contract and voxel block payloads
// - layer: block layers, voxel layers, the device view

// Constants module
pub mod constants;

pub mod blocks;
pub mod config;
pub mod core;
pub mod error;
pub mod layer;
pub mod memory;
pub mod serialization;

pub use blocks::{
    make_block_ptr, Block, BlockPtr, ColorVoxel, OccupancyVoxel, TsdfVoxel, Voxel, VoxelBlock,
};
pub use config::LayerConfig;
pub use crate::core::index_operations::position_to_block_index;
pub use crate::core::{BlockIndex, MemoryType, VoxelIndex};
pub use error::{ErrorContext, LayerError, LayerResult, OptionExt};
pub use layer::{
    create_layer_from_voxel_size, is_voxel_layer, size_argument_from_voxel_size, BaseLayer,
    BlockLayer, GpuLayerView, LayerKind, LayerPtr, LayerStats, LayerType, VoxelBlockLayer,
};
pub use memory::{ComputeDevice, DeviceHandle, HostDevice, PayloadLocation, TransferStats};
#[cfg(feature = "gpu")]
pub use memory::WgpuDevice;

pub type TsdfLayer = VoxelBlockLayer<TsdfVoxel>;
pub type ColorLayer = VoxelBlockLayer<ColorVoxel>;
pub type OccupancyLayer = VoxelBlockLayer<OccupancyVoxel>;

/// Device to use when the caller has no preference: the default GPU
/// adapter when one is available, host emulation otherwise.
pub fn default_device() -> DeviceHandle {
    #[cfg(feature = "gpu")]
    {
        match WgpuDevice::request_default() {
            Ok(device) => {
                log::info!("[SPARSE_LAYER] Using GPU device '{}'", device.name());
                return std::sync::Arc::new(device);
            }
            Err(e) => {
                log::warn!("[SPARSE_LAYER] No GPU device ({}), falling back to host emulation", e);
            }
        }
    }
    HostDevice::shared()
}
