use glam::IVec3;

/// Integer coordinate of a block on the layer lattice.
///
/// Lattice spacing is the layer's block size, so block `(i, j, k)` covers
/// `[i, i + 1) * block_size` along x and likewise for the other axes.
pub type BlockIndex = IVec3;

/// Local coordinate of a voxel inside its block, each component in
/// `[0, VOXELS_PER_SIDE)`.
pub type VoxelIndex = IVec3;
