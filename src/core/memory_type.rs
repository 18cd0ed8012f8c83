use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a layer keeps its block payload bytes.
///
/// Fixed for the lifetime of a layer; the only way to change it is a deep
/// copy into a layer of a different memory type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Ordinary host memory
    #[default]
    Host,
    /// Device memory; every host read or write is an explicit transfer
    Device,
    /// Memory visible to host and device alike
    Unified,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [MemoryType::Host, MemoryType::Device, MemoryType::Unified];

    /// Whether the host can read payload bytes without a device transfer
    #[inline]
    pub fn is_host_accessible(self) -> bool {
        !matches!(self, MemoryType::Device)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Host => write!(f, "host"),
            MemoryType::Device => write!(f, "device"),
            MemoryType::Unified => write!(f, "unified"),
        }
    }
}
