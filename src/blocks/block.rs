use crate::core::MemoryType;
use crate::error::LayerResult;
use crate::memory::{DeviceHandle, PayloadLocation};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to a block payload.
///
/// The layer's hash holds one handle; every accessor hands out another.
/// Writes through any handle are seen by all holders. The payload is freed
/// when the last handle drops. Use a deep copy when isolation is needed.
pub type BlockPtr<B> = Arc<RwLock<B>>;

/// Contract every block payload type fulfils.
pub trait Block: Sized + Send + Sync + 'static {
    /// Construct a default-initialized block resident in `memory_type`
    fn allocate(memory_type: MemoryType, device: &DeviceHandle) -> LayerResult<Self>;

    /// Independent copy of this block, migrated to `memory_type`
    fn copy_to(&self, memory_type: MemoryType, device: &DeviceHandle) -> LayerResult<Self>;

    /// Where the payload lives, for the device index
    fn payload_location(&self) -> PayloadLocation;

    /// Payload size in bytes
    fn size_bytes(&self) -> u64;
}

/// Wrap a freshly built block in a shared handle
#[inline]
pub fn make_block_ptr<B: Block>(block: B) -> BlockPtr<B> {
    Arc::new(RwLock::new(block))
}
