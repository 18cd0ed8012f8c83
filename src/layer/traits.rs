//! Compile-time layer dispatch
//!
//! Generic code that builds or walks layers without knowing their concrete
//! type branches on `LayerType::KIND`. Every branch is resolved at
//! monomorphization; nothing here costs anything at runtime.

use super::block_layer::BlockLayer;
use super::voxel_block_layer::VoxelBlockLayer;
use crate::blocks::{Block, Voxel};
use crate::constants::core::VOXELS_PER_SIDE;
use crate::core::MemoryType;
use crate::memory::DeviceHandle;

/// Capability tag of a layer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Block-granularity access only
    Block,
    /// Voxel-granularity access available
    Voxel,
}

pub trait LayerType: Sized {
    const KIND: LayerKind;

    /// Construct from the kind's native size argument: voxel size for voxel
    /// layers, block size otherwise
    fn from_size_argument(size: f32, memory_type: MemoryType, device: DeviceHandle) -> Self;
}

impl<B: Block> LayerType for BlockLayer<B> {
    const KIND: LayerKind = LayerKind::Block;

    fn from_size_argument(size: f32, memory_type: MemoryType, device: DeviceHandle) -> Self {
        BlockLayer::new(size, memory_type, device)
    }
}

impl<V: Voxel> LayerType for VoxelBlockLayer<V> {
    const KIND: LayerKind = LayerKind::Voxel;

    fn from_size_argument(size: f32, memory_type: MemoryType, device: DeviceHandle) -> Self {
        VoxelBlockLayer::new(size, memory_type, device)
    }
}

#[inline]
pub const fn is_voxel_layer<L: LayerType>() -> bool {
    matches!(L::KIND, LayerKind::Voxel)
}

/// Size argument `L`'s constructor expects for a given voxel size
#[inline]
pub fn size_argument_from_voxel_size<L: LayerType>(voxel_size: f32) -> f32 {
    match L::KIND {
        LayerKind::Voxel => voxel_size,
        LayerKind::Block => VOXELS_PER_SIDE as f32 * voxel_size,
    }
}

/// Build any layer type from a voxel size
pub fn create_layer_from_voxel_size<L: LayerType>(
    voxel_size: f32,
    memory_type: MemoryType,
    device: DeviceHandle,
) -> L {
    L::from_size_argument(
        size_argument_from_voxel_size::<L>(voxel_size),
        memory_type,
        device,
    )
}
