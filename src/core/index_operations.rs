//! Spatial Index Operations - Pure Functions
//!
//! Mapping between continuous layer-frame positions, block indices and
//! voxel indices. No state, no side effects.

use super::{BlockIndex, VoxelIndex};
use crate::constants::core::VOXELS_PER_SIDE;
use glam::{IVec3, Vec3};

/// Index of the block whose half-open volume contains `position`.
///
/// Uses floor division, so `-0.1` lands in block `-1`, not block `0`.
#[inline]
pub fn position_to_block_index(position: Vec3, block_size: f32) -> BlockIndex {
    (position / block_size).floor().as_ivec3()
}

/// Block index and local voxel index of the voxel containing `position`.
///
/// Goes through the global voxel index so the local index is always inside
/// `[0, VOXELS_PER_SIDE)`, even for positions a rounding error away from a
/// block boundary.
pub fn block_and_voxel_index_from_position(
    position: Vec3,
    block_size: f32,
) -> (BlockIndex, VoxelIndex) {
    let voxel_size = block_size / VOXELS_PER_SIDE as f32;
    let global = (position / voxel_size).floor().as_ivec3();
    let n = VOXELS_PER_SIDE as i32;

    let block = IVec3::new(
        global.x.div_euclid(n),
        global.y.div_euclid(n),
        global.z.div_euclid(n),
    );
    let voxel = IVec3::new(
        global.x.rem_euclid(n),
        global.y.rem_euclid(n),
        global.z.rem_euclid(n),
    );
    (block, voxel)
}

/// Minimum corner of a block in the layer frame
#[inline]
pub fn block_origin(index: BlockIndex, block_size: f32) -> Vec3 {
    index.as_vec3() * block_size
}

/// Center of a voxel in the layer frame
pub fn voxel_center_position(block: BlockIndex, voxel: VoxelIndex, block_size: f32) -> Vec3 {
    let voxel_size = block_size / VOXELS_PER_SIDE as f32;
    block_origin(block, block_size) + (voxel.as_vec3() + Vec3::splat(0.5)) * voxel_size
}

/// Check that a local voxel index lies inside a block
#[inline]
pub fn is_valid_voxel_index(voxel: VoxelIndex) -> bool {
    let n = VOXELS_PER_SIDE as i32;
    voxel.cmpge(IVec3::ZERO).all() && voxel.cmplt(IVec3::splat(n)).all()
}

/// Flat offset of a voxel inside the block payload (x fastest)
#[inline]
pub fn voxel_linear_index(voxel: VoxelIndex) -> usize {
    let n = VOXELS_PER_SIDE;
    voxel.x as usize + n * (voxel.y as usize + n * voxel.z as usize)
}

/// Inverse of [`voxel_linear_index`]
#[inline]
pub fn voxel_index_from_linear(linear: usize) -> VoxelIndex {
    let n = VOXELS_PER_SIDE;
    IVec3::new(
        (linear % n) as i32,
        ((linear / n) % n) as i32,
        (linear / (n * n)) as i32,
    )
}
