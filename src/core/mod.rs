//! Core layer data types
//!
//! Block and voxel coordinates, memory residency, and the pure functions that
//! map continuous positions onto the block lattice.

pub mod index_operations;
mod memory_type;
mod position;

pub use memory_type::MemoryType;
pub use position::{BlockIndex, VoxelIndex};
