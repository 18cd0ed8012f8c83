//! Sparse layers
//!
//! `BlockLayer` maps block indices to shared block handles and keeps a
//! lazily rebuilt device view of that map. `VoxelBlockLayer` fixes the
//! payload to a voxel grid and adds position-addressed voxel access.

mod base_layer;
mod block_layer;
mod gpu_layer_view;
mod gpu_layer_view_data;
pub mod gpu_layer_view_operations;
mod traits;
mod voxel_block_layer;

pub use base_layer::{downcast_layer, downcast_layer_mut, BaseLayer, LayerPtr};
pub use block_layer::{BlockLayer, LayerStats};
pub use gpu_layer_view::{GpuLayerView, GpuLayerViewCache};
pub use gpu_layer_view_data::{slot_state, GpuHashEntry, GpuHashTableData};
pub use traits::{
    create_layer_from_voxel_size, is_voxel_layer, size_argument_from_voxel_size, LayerKind,
    LayerType,
};
pub use voxel_block_layer::VoxelBlockLayer;
