//! Device view of a block layer
//!
//! `GpuLayerViewCache` holds the most recently built device hash and a
//! validity flag. Layer mutations mark it stale; the next view request
//! rebuilds it. The cache sits behind a mutex so a shared `&BlockLayer`
//! can rebuild on demand; it is derived state and never copied with the
//! layer.

use super::gpu_layer_view_data::{GpuHashEntry, GpuHashTableData};
use super::gpu_layer_view_operations::find_entry;
use crate::core::BlockIndex;
use crate::error::LayerResult;
use crate::memory::{DeviceAllocation, PayloadLocation};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

/// Read-only handle to a layer's device hash.
///
/// Only valid until the next mutation of the layer it came from. After
/// that the view still points at live memory, but its contents describe
/// the old key set and are not checked against the layer. Fetch a fresh
/// view after every allocate or clear.
pub struct GpuLayerView<B> {
    table: Arc<GpuHashTableData>,
    _block: PhantomData<fn() -> B>,
}

impl<B> GpuLayerView<B> {
    pub(crate) fn new(table: Arc<GpuHashTableData>) -> Self {
        Self {
            table,
            _block: PhantomData,
        }
    }

    /// Host mirror of every slot, empty ones included
    pub fn entries(&self) -> &[GpuHashEntry] {
        &self.table.entries
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity
    }

    pub fn num_blocks(&self) -> usize {
        self.table.num_blocks
    }

    pub fn block_size(&self) -> f32 {
        self.table.block_size
    }

    pub fn generation(&self) -> u64 {
        self.table.generation
    }

    /// Device allocation kernels bind to read the table
    pub fn device_table(&self) -> &DeviceAllocation {
        &self.table.device_table
    }

    /// Host-side lookup following the kernel probe sequence
    pub fn find(&self, index: BlockIndex) -> Option<PayloadLocation> {
        find_entry(&self.table.entries, index).and_then(|entry| entry.payload_location())
    }

    /// Occupied slots as `(index, location)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (BlockIndex, PayloadLocation)> + '_ {
        self.table
            .entries
            .iter()
            .filter_map(|entry| entry.payload_location().map(|loc| (entry.block_index(), loc)))
    }

    /// True when both views were produced by the same rebuild
    pub fn shares_table(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

impl<B> Clone for GpuLayerView<B> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.table))
    }
}

impl<B> std::fmt::Debug for GpuLayerView<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuLayerView")
            .field("num_blocks", &self.table.num_blocks)
            .field("capacity", &self.table.capacity)
            .field("generation", &self.table.generation)
            .finish()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    up_to_date: bool,
    table: Option<Arc<GpuHashTableData>>,
    rebuilds: u64,
}

/// Lazily rebuilt device hash plus its validity flag
#[derive(Debug, Default)]
pub struct GpuLayerViewCache {
    state: Mutex<CacheState>,
}

impl GpuLayerViewCache {
    /// Starts stale with no table
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark stale. The old table stays alive until the next rebuild.
    pub fn invalidate(&self) {
        self.state.lock().up_to_date = false;
    }

    pub fn is_up_to_date(&self) -> bool {
        self.state.lock().up_to_date
    }

    /// Number of rebuilds performed so far
    pub fn rebuild_count(&self) -> u64 {
        self.state.lock().rebuilds
    }

    /// Return the cached table, calling `rebuild` with the next generation
    /// number first if the cache is stale. A failed rebuild leaves the cache
    /// stale.
    pub fn get_or_rebuild<F>(&self, rebuild: F) -> LayerResult<Arc<GpuHashTableData>>
    where
        F: FnOnce(u64) -> LayerResult<GpuHashTableData>,
    {
        let mut state = self.state.lock();
        if state.up_to_date {
            if let Some(table) = &state.table {
                return Ok(Arc::clone(table));
            }
        }

        let table = Arc::new(rebuild(state.rebuilds + 1)?);
        state.rebuilds += 1;
        state.table = Some(Arc::clone(&table));
        state.up_to_date = true;
        Ok(table)
    }
}
