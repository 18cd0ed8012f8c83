//! Layer configuration
//!
//! Construction parameters for voxel block layers, loadable from TOML.
//! Every field has a default, so a config file only lists what it changes.

use crate::constants::core::VOXELS_PER_SIDE;
use crate::constants::gpu_limits::MAX_ALLOCATION_SIZE;
use crate::constants::hashing::{DEFAULT_CAPACITY_FACTOR, MAX_CAPACITY_FACTOR};
use crate::core::MemoryType;
use crate::error::{ErrorContext, LayerError, LayerResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Voxel edge length in meters
    pub voxel_size: f32,
    pub memory_type: MemoryType,
    /// Device hash slots per allocated block
    pub view_capacity_factor: f32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.05,
            memory_type: MemoryType::Host,
            view_capacity_factor: DEFAULT_CAPACITY_FACTOR,
        }
    }
}

impl LayerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> LayerResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| LayerError::ParseError {
            value: e.to_string(),
            expected_type: "LayerConfig".to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> LayerResult<String> {
        toml::to_string(self).context("LayerConfig serialization failed")
    }

    /// Block edge length derived from the voxel size
    #[inline]
    pub fn block_size(&self) -> f32 {
        VOXELS_PER_SIDE as f32 * self.voxel_size
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> LayerResult<()> {
        if !self.voxel_size.is_finite() || self.voxel_size <= 0.0 {
            return Err(LayerError::InvalidConfig {
                field: "voxel_size".to_string(),
                value: self.voxel_size.to_string(),
                reason: "must be a positive, finite length".to_string(),
            });
        }

        if !self.view_capacity_factor.is_finite() || self.view_capacity_factor < 1.0 {
            return Err(LayerError::InvalidConfig {
                field: "view_capacity_factor".to_string(),
                value: self.view_capacity_factor.to_string(),
                reason: "device hash needs at least one slot per block".to_string(),
            });
        }

        if self.view_capacity_factor > MAX_CAPACITY_FACTOR {
            return Err(LayerError::InvalidConfig {
                field: "view_capacity_factor".to_string(),
                value: self.view_capacity_factor.to_string(),
                reason: format!("must not exceed {}", MAX_CAPACITY_FACTOR),
            });
        }

        if self.view_capacity_factor > 4.0 * DEFAULT_CAPACITY_FACTOR {
            log::warn!(
                "[LayerConfig] view_capacity_factor {} wastes device memory on empty slots",
                self.view_capacity_factor
            );
        }

        let max_blocks_in_view = MAX_ALLOCATION_SIZE
            / (std::mem::size_of::<crate::layer::GpuHashEntry>() as u64)
            / self.view_capacity_factor.ceil() as u64;

        log::info!(
            "[LayerConfig] Validation: voxel_size={}, block_size={}, memory_type={}, max_blocks_in_view={}",
            self.voxel_size,
            self.block_size(),
            self.memory_type,
            max_blocks_in_view
        );
        Ok(())
    }
}
