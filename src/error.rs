//! Error handling for sparse layers
//!
//! Lookup misses are never errors: they come back as `None` or as a `false`
//! success flag. `LayerError` is reserved for conditions the caller cannot
//! treat as "not found", mostly device allocation and transfer faults.

use crate::memory::DeviceError;
use std::error::Error as StdError;
use std::fmt;

/// Main error type for layer operations
#[derive(Debug)]
pub enum LayerError {
    // Access Errors
    BufferAccess {
        index: usize,
        size: usize,
    },
    VoxelOutOfBounds {
        index: (i32, i32, i32),
        voxels_per_side: usize,
    },

    // Device Errors
    DeviceNotFound,
    OutOfDeviceMemory {
        requested: u64,
        available: u64,
    },
    AllocationNotFound {
        id: u64,
    },
    TransferFailed {
        operation: String,
        error: String,
    },

    // Data Errors
    CorruptedData {
        reason: String,
    },

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },
    ParseError {
        value: String,
        expected_type: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl LayerError {
    /// True for failures of the device itself (memory exhaustion, transfer
    /// faults), as opposed to misuse of the layer API.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            LayerError::DeviceNotFound
                | LayerError::OutOfDeviceMemory { .. }
                | LayerError::AllocationNotFound { .. }
                | LayerError::TransferFailed { .. }
        )
    }
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::BufferAccess { index, size } => write!(
                f,
                "Buffer access out of bounds: index {} >= size {}",
                index, size
            ),
            LayerError::VoxelOutOfBounds {
                index,
                voxels_per_side,
            } => write!(
                f,
                "Voxel index {:?} out of bounds for block with {} voxels per side",
                index, voxels_per_side
            ),

            LayerError::DeviceNotFound => write!(f, "Compute device not found"),
            LayerError::OutOfDeviceMemory {
                requested,
                available,
            } => write!(
                f,
                "Out of device memory: requested {} bytes, available {}",
                requested, available
            ),
            LayerError::AllocationNotFound { id } => {
                write!(f, "Device allocation {} not found", id)
            }
            LayerError::TransferFailed { operation, error } => {
                write!(f, "Device transfer '{}' failed: {}", operation, error)
            }

            LayerError::CorruptedData { reason } => write!(f, "Data corrupted: {}", reason),

            LayerError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),
            LayerError::ParseError {
                value,
                expected_type,
            } => write!(
                f,
                "Parse error: '{}' is not a valid {}",
                value, expected_type
            ),

            LayerError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for LayerError {}

/// Type alias for Results of layer operations
pub type LayerResult<T> = Result<T, LayerError>;

impl From<DeviceError> for LayerError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::OutOfMemory {
                requested,
                available,
            } => LayerError::OutOfDeviceMemory {
                requested,
                available,
            },
            DeviceError::UnknownAllocation { id } => LayerError::AllocationNotFound { id },
            DeviceError::OutOfRange { offset, len, size } => LayerError::TransferFailed {
                operation: "range check".to_string(),
                error: format!(
                    "offset {} + {} bytes exceeds allocation of {} bytes",
                    offset, len, size
                ),
            },
            DeviceError::Transfer { operation, message } => LayerError::TransferFailed {
                operation,
                error: message,
            },
            DeviceError::AdapterNotFound => LayerError::DeviceNotFound,
        }
    }
}

// Helper functions for common error patterns

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_layer<F>(self, f: F) -> LayerResult<T>
    where
        F: FnOnce() -> LayerError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_layer<F>(self, f: F) -> LayerResult<T>
    where
        F: FnOnce() -> LayerError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> LayerResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> LayerResult<T> {
        self.map_err(|e| LayerError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }
}
