//! Voxel block layer
//!
//! A block layer whose payload is a dense voxel grid. Block edge length is
//! `VOXELS_PER_SIDE * voxel_size`. Adds voxel-granularity reads and writes
//! addressed by position; all block-level operations are reachable through
//! `Deref` to the underlying `BlockLayer`.

use super::block_layer::BlockLayer;
use crate::blocks::{Voxel, VoxelBlock};
use crate::config::LayerConfig;
use crate::constants::core::VOXELS_PER_SIDE;
use crate::constants::transfer::SLOW_TRANSFER_WARNING_MS;
use crate::core::index_operations::block_and_voxel_index_from_position;
use crate::core::MemoryType;
use crate::error::LayerResult;
use crate::memory::DeviceHandle;
use glam::Vec3;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

pub struct VoxelBlockLayer<V: Voxel> {
    base: BlockLayer<VoxelBlock<V>>,
    voxel_size: f32,
}

impl<V: Voxel> VoxelBlockLayer<V> {
    pub fn new(voxel_size: f32, memory_type: MemoryType, device: DeviceHandle) -> Self {
        Self {
            base: BlockLayer::new(VOXELS_PER_SIDE as f32 * voxel_size, memory_type, device),
            voxel_size,
        }
    }

    pub fn from_config(config: &LayerConfig, device: DeviceHandle) -> LayerResult<Self> {
        config.validate()?;
        let mut layer = Self::new(config.voxel_size, config.memory_type, device);
        layer.base = layer
            .base
            .with_view_capacity_factor(config.view_capacity_factor);
        Ok(layer)
    }

    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn try_clone(&self) -> LayerResult<Self> {
        Ok(Self {
            base: self.base.try_clone()?,
            voxel_size: self.voxel_size,
        })
    }

    pub fn clone_with_memory_type(&self, memory_type: MemoryType) -> LayerResult<Self> {
        Ok(Self {
            base: self.base.clone_with_memory_type(memory_type)?,
            voxel_size: self.voxel_size,
        })
    }

    /// Replace this layer's contents with deep copies of `other`'s, kept in
    /// this layer's memory type
    pub fn copy_from(&mut self, other: &Self) -> LayerResult<()> {
        self.base.copy_from(&other.base)?;
        self.voxel_size = other.voxel_size;
        Ok(())
    }

    pub fn take_blocks(&mut self) -> Self {
        Self {
            base: self.base.take_blocks(),
            voxel_size: self.voxel_size,
        }
    }

    /// Copy out the voxels containing each of `positions`.
    ///
    /// Both outputs are resized to `positions.len()`. A position in an
    /// unallocated block gets `false` and `V::default()`.
    ///
    /// Slow for device-resident layers: every voxel is its own blocking
    /// download. Meant for spot checks and tests, not bulk reads.
    pub fn get_voxels(
        &self,
        positions: &[Vec3],
        voxels: &mut Vec<V>,
        success: &mut Vec<bool>,
    ) -> LayerResult<()> {
        let started = Instant::now();
        voxels.clear();
        voxels.resize(positions.len(), V::default());
        success.clear();
        success.resize(positions.len(), false);

        let block_size = self.base.block_size();
        for (i, position) in positions.iter().enumerate() {
            let (block_index, voxel_index) =
                block_and_voxel_index_from_position(*position, block_size);
            let Some(block) = self.base.get_block_at_index(block_index) else {
                continue;
            };

            let voxel = block.read().voxel(voxel_index)?;
            voxels[i] = voxel;
            success[i] = true;
        }

        let elapsed = started.elapsed().as_millis();
        if !self.base.memory_type().is_host_accessible() && elapsed > SLOW_TRANSFER_WARNING_MS {
            log::warn!(
                "[VOXEL_LAYER] Per-voxel copy of {} voxels from {} memory took {}ms",
                positions.len(),
                self.base.memory_type(),
                elapsed
            );
        }
        Ok(())
    }

    /// Single-position form of `get_voxels`
    pub fn get_voxel(&self, position: Vec3) -> LayerResult<(V, bool)> {
        let mut voxels = Vec::with_capacity(1);
        let mut success = Vec::with_capacity(1);
        self.get_voxels(&[position], &mut voxels, &mut success)?;
        Ok((voxels[0], success[0]))
    }

    /// Write the voxel containing `position`, allocating its block if needed
    pub fn set_voxel(&mut self, position: Vec3, voxel: V) -> LayerResult<()> {
        let (block_index, voxel_index) =
            block_and_voxel_index_from_position(position, self.base.block_size());
        let block = self.base.allocate_block_at_index(block_index)?;
        let mut guard = block.write();
        guard.set_voxel(voxel_index, voxel)
    }
}

impl<V: Voxel> Deref for VoxelBlockLayer<V> {
    type Target = BlockLayer<VoxelBlock<V>>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<V: Voxel> DerefMut for VoxelBlockLayer<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<V: Voxel> std::fmt::Debug for VoxelBlockLayer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelBlockLayer")
            .field("voxel_size", &self.voxel_size)
            .field("base", &self.base)
            .finish()
    }
}
