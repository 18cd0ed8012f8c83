use super::block::Block;
use super::voxels::Voxel;
use crate::constants::core::{VOXELS_PER_BLOCK, VOXELS_PER_SIDE};
use crate::core::index_operations::{is_valid_voxel_index, voxel_linear_index};
use crate::core::{MemoryType, VoxelIndex};
use crate::error::{LayerError, LayerResult};
use crate::memory::{DeviceHandle, PayloadLocation, ResidentBuffer};

/// Dense `VOXELS_PER_SIDE`³ grid of voxels
#[derive(Debug)]
pub struct VoxelBlock<V: Voxel> {
    voxels: ResidentBuffer<V>,
}

impl<V: Voxel> VoxelBlock<V> {
    pub const VOXELS_PER_SIDE: usize = VOXELS_PER_SIDE;

    /// Block holding a copy of `values`, which must hold `VOXELS_PER_BLOCK` voxels
    pub fn from_voxels(
        values: &[V],
        memory_type: MemoryType,
        device: &DeviceHandle,
    ) -> LayerResult<Self> {
        if values.len() != VOXELS_PER_BLOCK {
            return Err(LayerError::BufferAccess {
                index: values.len(),
                size: VOXELS_PER_BLOCK,
            });
        }
        Ok(Self {
            voxels: ResidentBuffer::from_slice(values, memory_type, device)?,
        })
    }

    pub fn memory_type(&self) -> MemoryType {
        self.voxels.memory_type()
    }

    fn linear_index(voxel: VoxelIndex) -> LayerResult<usize> {
        if !is_valid_voxel_index(voxel) {
            return Err(LayerError::VoxelOutOfBounds {
                index: (voxel.x, voxel.y, voxel.z),
                voxels_per_side: VOXELS_PER_SIDE,
            });
        }
        Ok(voxel_linear_index(voxel))
    }

    /// Copy of one voxel. Device-resident blocks download just that voxel.
    pub fn voxel(&self, voxel: VoxelIndex) -> LayerResult<V> {
        self.voxels.get(Self::linear_index(voxel)?)
    }

    pub fn set_voxel(&mut self, voxel: VoxelIndex, value: V) -> LayerResult<()> {
        self.voxels.set(Self::linear_index(voxel)?, value)
    }

    /// Every voxel copied to the host, in linear order
    pub fn voxels(&self) -> LayerResult<Vec<V>> {
        self.voxels.to_vec()
    }

    /// Overwrite the whole grid; `values` must hold `VOXELS_PER_BLOCK` voxels
    pub fn set_voxels(&mut self, values: &[V]) -> LayerResult<()> {
        self.voxels.write_all(values)
    }

    /// In-place voxels for host-accessible blocks
    pub fn host_voxels(&self) -> Option<&[V]> {
        self.voxels.host_slice()
    }

    pub fn host_voxels_mut(&mut self) -> Option<&mut [V]> {
        self.voxels.host_slice_mut()
    }
}

impl<V: Voxel> Block for VoxelBlock<V> {
    fn allocate(memory_type: MemoryType, device: &DeviceHandle) -> LayerResult<Self> {
        Ok(Self {
            voxels: ResidentBuffer::filled(V::default(), VOXELS_PER_BLOCK, memory_type, device)?,
        })
    }

    fn copy_to(&self, memory_type: MemoryType, device: &DeviceHandle) -> LayerResult<Self> {
        Ok(Self {
            voxels: self.voxels.copy_to(memory_type, device)?,
        })
    }

    fn payload_location(&self) -> PayloadLocation {
        self.voxels.payload_location()
    }

    fn size_bytes(&self) -> u64 {
        self.voxels.size_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::TsdfVoxel;
    use crate::memory::HostDevice;
    use glam::IVec3;

    #[test]
    fn test_allocate_is_default_initialized() {
        let device = HostDevice::shared();
        for memory_type in MemoryType::ALL {
            let block = VoxelBlock::<TsdfVoxel>::allocate(memory_type, &device).expect("allocate");
            let voxels = block.voxels().expect("read voxels");
            assert_eq!(voxels.len(), VOXELS_PER_BLOCK);
            assert!(voxels.iter().all(|v| *v == TsdfVoxel::default()));
            assert_eq!(block.memory_type(), memory_type);
        }
    }

    #[test]
    fn test_set_and_get_on_device() {
        let device = HostDevice::shared();
        let mut block =
            VoxelBlock::<TsdfVoxel>::allocate(MemoryType::Device, &device).expect("allocate");
        let index = IVec3::new(1, 2, 3);

        block
            .set_voxel(index, TsdfVoxel::new(0.25, 1.0))
            .expect("set voxel");
        assert_eq!(block.voxel(index).expect("get"), TsdfVoxel::new(0.25, 1.0));
        assert_eq!(block.voxel(IVec3::ZERO).expect("get"), TsdfVoxel::default());
        assert!(block.host_voxels().is_none());
    }

    #[test]
    fn test_out_of_block_index() {
        let device = HostDevice::shared();
        let block = VoxelBlock::<TsdfVoxel>::allocate(MemoryType::Host, &device).expect("allocate");
        assert!(matches!(
            block.voxel(IVec3::new(0, 8, 0)),
            Err(LayerError::VoxelOutOfBounds {
                index: (0, 8, 0),
                voxels_per_side: 8
            })
        ));
    }

    #[test]
    fn test_copy_is_independent() {
        let device = HostDevice::shared();
        let mut original =
            VoxelBlock::<TsdfVoxel>::allocate(MemoryType::Unified, &device).expect("allocate");
        let copy = original
            .copy_to(MemoryType::Unified, &device)
            .expect("copy block");

        original
            .set_voxel(IVec3::ZERO, TsdfVoxel::new(1.0, 2.0))
            .expect("set voxel");
        assert_eq!(copy.voxel(IVec3::ZERO).expect("get"), TsdfVoxel::default());
    }
}
