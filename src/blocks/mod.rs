//! Block payloads
//!
//! The `Block` contract the layer stores, plus the voxel grid payload and
//! its voxel types.

mod block;
mod voxel_block;
mod voxels;

pub use block::{make_block_ptr, Block, BlockPtr};
pub use voxel_block::VoxelBlock;
pub use voxels::{ColorVoxel, OccupancyVoxel, TsdfVoxel, Voxel};
