//! Voxel payload types
//!
//! Plain-old-data cells stored in voxel blocks. `Default` must describe an
//! unobserved voxel: it is what new blocks are filled with and what voxel
//! queries report for unallocated space.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::mem::size_of;

/// Marker for types that can live in a voxel block
pub trait Voxel: Pod + Default + PartialEq + Debug + Send + Sync + 'static {}

/// Truncated signed distance sample
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct TsdfVoxel {
    /// Signed distance to the nearest surface in meters
    pub distance: f32,
    /// Accumulated integration weight; zero means unobserved
    pub weight: f32,
}

/// Fused surface color
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct ColorVoxel {
    /// RGBA, 8 bits per channel
    pub color: [u8; 4],
    pub weight: f32,
}

/// Occupancy probability in log-odds form
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct OccupancyVoxel {
    pub log_odds: f32,
}

impl Voxel for TsdfVoxel {}
impl Voxel for ColorVoxel {}
impl Voxel for OccupancyVoxel {}

impl TsdfVoxel {
    pub fn new(distance: f32, weight: f32) -> Self {
        Self { distance, weight }
    }

    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }
}

impl ColorVoxel {
    pub fn new(color: [u8; 4], weight: f32) -> Self {
        Self { color, weight }
    }
}

impl OccupancyVoxel {
    /// Occupancy probability in `[0, 1]`
    pub fn probability(&self) -> f32 {
        1.0 / (1.0 + (-self.log_odds).exp())
    }
}

// Device kernels index voxel arrays with these strides
static_assertions::const_assert_eq!(size_of::<TsdfVoxel>(), 8);
static_assertions::const_assert_eq!(size_of::<ColorVoxel>(), 8);
static_assertions::const_assert_eq!(size_of::<OccupancyVoxel>(), 4);
