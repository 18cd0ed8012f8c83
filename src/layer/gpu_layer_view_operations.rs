//! GPU Layer View Operations - Pure DOP Functions
//!
//! Building and probing the open-addressed block hash that compute kernels
//! read. Linear probing over a power-of-two table; kernels use the same
//! hash and probe sequence as `find_entry`.

use super::gpu_layer_view_data::{slot_state, GpuHashEntry, GpuHashTableData};
use crate::constants::gpu_limits::MAX_ALLOCATION_SIZE;
use crate::constants::hashing::MIN_TABLE_CAPACITY;
use crate::core::BlockIndex;
use crate::error::{LayerError, LayerResult, OptionExt};
use crate::memory::{DeviceAllocation, DeviceHandle, PayloadLocation};
use std::mem::size_of;
use std::time::Instant;

const FNV_OFFSET_32: u32 = 0x811c9dc5;
const FNV_PRIME_32: u32 = 0x01000193;

/// FNV-1a over the little-endian bytes of x, y, z
#[inline]
pub fn hash_block_index(index: BlockIndex) -> u32 {
    let mut hash = FNV_OFFSET_32;
    for component in [index.x, index.y, index.z] {
        for byte in component.to_le_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME_32);
        }
    }
    hash
}

/// Power-of-two slot count for `num_blocks` entries.
///
/// Fails when the table would not fit in one device allocation.
pub fn table_capacity_for(num_blocks: usize, capacity_factor: f32) -> LayerResult<usize> {
    let wanted = (num_blocks as f32 * capacity_factor.max(1.0)).ceil() as usize;
    let entry_size = size_of::<GpuHashEntry>() as u64;
    let capacity = wanted
        .max(num_blocks)
        .max(MIN_TABLE_CAPACITY)
        .checked_next_power_of_two()
        .filter(|&slots| (slots as u64).saturating_mul(entry_size) <= MAX_ALLOCATION_SIZE);

    capacity.ok_or_layer(|| LayerError::OutOfDeviceMemory {
        requested: (wanted as u64).saturating_mul(entry_size),
        available: MAX_ALLOCATION_SIZE,
    })
}

/// Insert into a table. Returns false if the index is already present or
/// the table is full.
pub fn insert_entry(
    entries: &mut [GpuHashEntry],
    index: BlockIndex,
    location: PayloadLocation,
) -> bool {
    let capacity = entries.len();
    if capacity == 0 {
        return false;
    }
    let mut slot = hash_block_index(index) as usize & (capacity - 1);

    for _ in 0..capacity {
        let entry = &mut entries[slot];
        if !entry.is_occupied() {
            let (state, raw) = match location {
                PayloadLocation::Host { .. } => (slot_state::HOST, location.raw()),
                PayloadLocation::Device { .. } => (slot_state::DEVICE, location.raw()),
            };
            *entry = GpuHashEntry {
                index: index.to_array(),
                state,
                location: raw,
            };
            return true;
        }
        if entry.block_index() == index {
            return false;
        }
        slot = (slot + 1) & (capacity - 1);
    }
    false
}

/// Probe a table the way a kernel does
pub fn find_entry(entries: &[GpuHashEntry], index: BlockIndex) -> Option<&GpuHashEntry> {
    let capacity = entries.len();
    if capacity == 0 {
        return None;
    }
    let mut slot = hash_block_index(index) as usize & (capacity - 1);

    for _ in 0..capacity {
        let entry = &entries[slot];
        if !entry.is_occupied() {
            return None;
        }
        if entry.block_index() == index {
            return Some(entry);
        }
        slot = (slot + 1) & (capacity - 1);
    }
    None
}

/// Build a fresh table from `(index, location)` pairs and upload it
pub fn build_gpu_hash_table<I>(
    blocks: I,
    num_blocks: usize,
    block_size: f32,
    capacity_factor: f32,
    device: &DeviceHandle,
    generation: u64,
) -> LayerResult<GpuHashTableData>
where
    I: IntoIterator<Item = (BlockIndex, PayloadLocation)>,
{
    let started = Instant::now();
    let capacity = table_capacity_for(num_blocks, capacity_factor)?;
    let mut entries = vec![GpuHashEntry::EMPTY; capacity];

    let mut inserted = 0usize;
    for (index, location) in blocks {
        if !insert_entry(&mut entries, index, location) {
            return Err(LayerError::Internal {
                message: format!(
                    "device hash insert failed for block {:?} (capacity {})",
                    index, capacity
                ),
            });
        }
        inserted += 1;
    }

    let device_table = DeviceAllocation::with_contents(device, bytemuck::cast_slice(&entries))
        .map_err(|e| {
            log::error!(
                "[GPU_LAYER_VIEW] Uploading {} hash slots to '{}' failed: {}",
                capacity,
                device.name(),
                e
            );
            LayerError::from(e)
        })?;

    log::debug!(
        "[GPU_LAYER_VIEW] Built generation {}: {} blocks in {} slots ({}μs)",
        generation,
        inserted,
        capacity,
        started.elapsed().as_micros()
    );

    Ok(GpuHashTableData {
        entries,
        capacity,
        num_blocks: inserted,
        block_size,
        device_table,
        generation,
    })
}
