//! Type-erased layer handle
//!
//! For collections that hold layers of mixed payload types. Nothing in
//! this crate dispatches through it; concrete layers are recovered with
//! `downcast_layer`.

use super::block_layer::BlockLayer;
use super::traits::{LayerKind, LayerType};
use super::voxel_block_layer::VoxelBlockLayer;
use crate::blocks::{Block, Voxel};
use crate::core::MemoryType;
use std::any::Any;
use std::sync::Arc;

pub trait BaseLayer: Any + Send + Sync {
    fn kind(&self) -> LayerKind;
    fn memory_type(&self) -> MemoryType;
    fn block_size(&self) -> f32;
    fn num_allocated_blocks(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared, type-erased layer
pub type LayerPtr = Arc<dyn BaseLayer>;

impl<B: Block> BaseLayer for BlockLayer<B> {
    fn kind(&self) -> LayerKind {
        <Self as LayerType>::KIND
    }

    fn memory_type(&self) -> MemoryType {
        BlockLayer::memory_type(self)
    }

    fn block_size(&self) -> f32 {
        BlockLayer::block_size(self)
    }

    fn num_allocated_blocks(&self) -> usize {
        BlockLayer::num_allocated_blocks(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<V: Voxel> BaseLayer for VoxelBlockLayer<V> {
    fn kind(&self) -> LayerKind {
        <Self as LayerType>::KIND
    }

    fn memory_type(&self) -> MemoryType {
        (**self).memory_type()
    }

    fn block_size(&self) -> f32 {
        (**self).block_size()
    }

    fn num_allocated_blocks(&self) -> usize {
        (**self).num_allocated_blocks()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Concrete layer behind a type-erased one, `None` on type mismatch
pub fn downcast_layer<L: BaseLayer>(layer: &dyn BaseLayer) -> Option<&L> {
    layer.as_any().downcast_ref::<L>()
}

pub fn downcast_layer_mut<L: BaseLayer>(layer: &mut dyn BaseLayer) -> Option<&mut L> {
    layer.as_any_mut().downcast_mut::<L>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ColorVoxel, TsdfVoxel, VoxelBlock};
    use crate::memory::HostDevice;
    use glam::{IVec3, Vec3};

    #[test]
    fn test_mixed_collection() {
        let device = HostDevice::shared();
        let mut tsdf: VoxelBlockLayer<TsdfVoxel> =
            VoxelBlockLayer::new(0.1, MemoryType::Host, device.clone());
        tsdf.set_voxel(Vec3::ZERO, TsdfVoxel::new(0.0, 1.0))
            .expect("set voxel");
        let color: BlockLayer<VoxelBlock<ColorVoxel>> =
            BlockLayer::new(0.8, MemoryType::Device, device);

        let layers: Vec<LayerPtr> = vec![Arc::new(tsdf), Arc::new(color)];

        assert_eq!(layers[0].kind(), LayerKind::Voxel);
        assert_eq!(layers[0].num_allocated_blocks(), 1);
        assert_eq!(layers[1].kind(), LayerKind::Block);
        assert_eq!(layers[1].memory_type(), MemoryType::Device);

        let recovered = downcast_layer::<VoxelBlockLayer<TsdfVoxel>>(layers[0].as_ref())
            .expect("tsdf layer");
        assert_eq!(
            recovered.get_voxel(Vec3::ZERO).expect("get voxel"),
            (TsdfVoxel::new(0.0, 1.0), true)
        );
        assert!(downcast_layer::<VoxelBlockLayer<ColorVoxel>>(layers[0].as_ref()).is_none());
    }

    #[test]
    fn test_downcast_mut() {
        let mut boxed: Box<dyn BaseLayer> = Box::new(BlockLayer::<VoxelBlock<TsdfVoxel>>::new(
            1.0,
            MemoryType::Host,
            HostDevice::shared(),
        ));

        downcast_layer_mut::<BlockLayer<VoxelBlock<TsdfVoxel>>>(boxed.as_mut())
            .expect("block layer")
            .allocate_block_at_index(IVec3::ZERO)
            .expect("allocate");
        assert_eq!(boxed.num_allocated_blocks(), 1);
    }
}
