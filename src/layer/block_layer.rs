//! Sparse block layer
//!
//! A hash from integer block index to shared block handle, plus the lazily
//! rebuilt device view of that hash. Every block in a layer has the same
//! edge length and lives in the layer's memory type.

use super::gpu_layer_view::{GpuLayerView, GpuLayerViewCache};
use super::gpu_layer_view_operations::build_gpu_hash_table;
use crate::blocks::{make_block_ptr, Block, BlockPtr};
use crate::constants::hashing::{DEFAULT_CAPACITY_FACTOR, MAX_CAPACITY_FACTOR};
use crate::core::index_operations::position_to_block_index;
use crate::core::{BlockIndex, MemoryType};
use crate::error::LayerResult;
use crate::memory::DeviceHandle;
use glam::Vec3;
use rustc_hash::FxHashMap;

type BlockHash<B> = FxHashMap<BlockIndex, BlockPtr<B>>;

/// Snapshot of a layer's size and cache state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStats {
    pub num_blocks: usize,
    pub payload_bytes: u64,
    pub memory_type: MemoryType,
    pub view_up_to_date: bool,
    pub view_rebuilds: u64,
}

pub struct BlockLayer<B: Block> {
    block_size: f32,
    memory_type: MemoryType,
    device: DeviceHandle,
    blocks: BlockHash<B>,
    gpu_layer_view: GpuLayerViewCache,
    view_capacity_factor: f32,
}

impl<B: Block> BlockLayer<B> {
    pub fn new(block_size: f32, memory_type: MemoryType, device: DeviceHandle) -> Self {
        debug_assert!(block_size > 0.0, "block size must be positive");
        Self {
            block_size,
            memory_type,
            device,
            blocks: BlockHash::default(),
            gpu_layer_view: GpuLayerViewCache::new(),
            view_capacity_factor: DEFAULT_CAPACITY_FACTOR,
        }
    }

    /// Device hash slots per block used on rebuild, clamped to
    /// `[1, MAX_CAPACITY_FACTOR]`. Non-finite factors fall back to the default.
    pub fn with_view_capacity_factor(mut self, factor: f32) -> Self {
        self.view_capacity_factor = if factor.is_finite() {
            factor.clamp(1.0, MAX_CAPACITY_FACTOR)
        } else {
            log::warn!(
                "[BLOCK_LAYER] Ignoring view capacity factor {}, using {}",
                factor,
                DEFAULT_CAPACITY_FACTOR
            );
            DEFAULT_CAPACITY_FACTOR
        };
        self
    }

    pub fn view_capacity_factor(&self) -> f32 {
        self.view_capacity_factor
    }

    // Accessors

    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    #[inline]
    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    #[inline]
    pub fn num_allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_block_allocated(&self, index: BlockIndex) -> bool {
        self.blocks.contains_key(&index)
    }

    /// Shared handle to the block at `index`, `None` if not allocated
    pub fn get_block_at_index(&self, index: BlockIndex) -> Option<BlockPtr<B>> {
        self.blocks.get(&index).cloned()
    }

    pub fn get_block_at_position(&self, position: Vec3) -> Option<BlockPtr<B>> {
        self.get_block_at_index(position_to_block_index(position, self.block_size))
    }

    /// Snapshot of every allocated index, in no particular order
    pub fn get_all_block_indices(&self) -> Vec<BlockIndex> {
        self.blocks.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockIndex, &BlockPtr<B>)> {
        self.blocks.iter().map(|(index, block)| (*index, block))
    }

    // Mutation

    /// Handle to the block at `index`, allocating a default block first if
    /// there is none. An existing block is returned untouched.
    pub fn allocate_block_at_index(&mut self, index: BlockIndex) -> LayerResult<BlockPtr<B>> {
        if let Some(block) = self.blocks.get(&index) {
            return Ok(block.clone());
        }

        let block = B::allocate(self.memory_type, &self.device).map_err(|e| {
            log::error!(
                "[BLOCK_LAYER] Failed to allocate {} block at {:?}: {}",
                self.memory_type,
                index,
                e
            );
            e
        })?;
        let block = make_block_ptr(block);
        self.blocks.insert(index, block.clone());
        self.gpu_layer_view.invalidate();

        log::debug!(
            "[BLOCK_LAYER] Allocated block {:?} ({} blocks)",
            index,
            self.blocks.len()
        );
        Ok(block)
    }

    pub fn allocate_block_at_position(&mut self, position: Vec3) -> LayerResult<BlockPtr<B>> {
        self.allocate_block_at_index(position_to_block_index(position, self.block_size))
    }

    /// Drop every block handle the layer owns
    pub fn clear(&mut self) {
        let removed = self.blocks.len();
        self.blocks.clear();
        self.gpu_layer_view.invalidate();
        log::debug!("[BLOCK_LAYER] Cleared {} blocks", removed);
    }

    /// Remove the listed blocks, skipping indices that are not allocated.
    /// Returns how many were removed.
    pub fn clear_blocks(&mut self, indices: &[BlockIndex]) -> usize {
        let removed = indices
            .iter()
            .filter(|index| self.blocks.remove(*index).is_some())
            .count();

        if removed > 0 {
            self.gpu_layer_view.invalidate();
            log::debug!(
                "[BLOCK_LAYER] Cleared {} of {} requested blocks",
                removed,
                indices.len()
            );
        }
        removed
    }

    // Device view

    /// Device hash of the current block set, rebuilt first if any block
    /// was allocated or cleared since the last call.
    ///
    /// The returned view must not be used after the next mutation of this
    /// layer. Nothing checks this.
    pub fn get_gpu_layer_view(&self) -> LayerResult<GpuLayerView<B>> {
        let table = self.gpu_layer_view.get_or_rebuild(|generation| {
            build_gpu_hash_table(
                self.blocks
                    .iter()
                    .map(|(index, block)| (*index, block.read().payload_location())),
                self.blocks.len(),
                self.block_size,
                self.view_capacity_factor,
                &self.device,
                generation,
            )
        })?;
        Ok(GpuLayerView::new(table))
    }

    pub fn is_gpu_layer_view_up_to_date(&self) -> bool {
        self.gpu_layer_view.is_up_to_date()
    }

    pub fn view_rebuild_count(&self) -> u64 {
        self.gpu_layer_view.rebuild_count()
    }

    pub fn stats(&self) -> LayerStats {
        LayerStats {
            num_blocks: self.blocks.len(),
            payload_bytes: self.blocks.values().map(|b| b.read().size_bytes()).sum(),
            memory_type: self.memory_type,
            view_up_to_date: self.gpu_layer_view.is_up_to_date(),
            view_rebuilds: self.gpu_layer_view.rebuild_count(),
        }
    }

    // Copy and move

    /// Deep copy with the same memory type. Every payload is duplicated.
    pub fn try_clone(&self) -> LayerResult<Self> {
        self.clone_with_memory_type(self.memory_type)
    }

    /// Deep copy whose payloads are migrated to `memory_type`
    pub fn clone_with_memory_type(&self, memory_type: MemoryType) -> LayerResult<Self> {
        let blocks = copy_blocks(&self.blocks, memory_type, &self.device)?;
        log::info!(
            "[BLOCK_LAYER] Copied {} blocks ({} -> {})",
            blocks.len(),
            self.memory_type,
            memory_type
        );

        Ok(Self {
            block_size: self.block_size,
            memory_type,
            device: self.device.clone(),
            blocks,
            gpu_layer_view: GpuLayerViewCache::new(),
            view_capacity_factor: self.view_capacity_factor,
        })
    }

    /// Replace this layer's blocks with deep copies of `other`'s, migrated
    /// to this layer's own memory type and device. On error this layer is
    /// left unchanged.
    pub fn copy_from(&mut self, other: &Self) -> LayerResult<()> {
        let blocks = copy_blocks(&other.blocks, self.memory_type, &self.device)?;
        log::info!(
            "[BLOCK_LAYER] Assigned {} blocks ({} -> {})",
            blocks.len(),
            other.memory_type,
            self.memory_type
        );

        self.block_size = other.block_size;
        self.blocks = blocks;
        self.gpu_layer_view.invalidate();
        Ok(())
    }

    /// Move the blocks and device view out into a new layer, leaving this
    /// one empty with the same block size and memory type.
    pub fn take_blocks(&mut self) -> Self {
        Self {
            block_size: self.block_size,
            memory_type: self.memory_type,
            device: self.device.clone(),
            blocks: std::mem::take(&mut self.blocks),
            gpu_layer_view: std::mem::take(&mut self.gpu_layer_view),
            view_capacity_factor: self.view_capacity_factor,
        }
    }
}

fn copy_blocks<B: Block>(
    source: &BlockHash<B>,
    memory_type: MemoryType,
    device: &DeviceHandle,
) -> LayerResult<BlockHash<B>> {
    let mut blocks = BlockHash::default();
    blocks.reserve(source.len());
    for (index, block) in source {
        let copy = block.read().copy_to(memory_type, device)?;
        blocks.insert(*index, make_block_ptr(copy));
    }
    Ok(blocks)
}

impl<B: Block> std::fmt::Debug for BlockLayer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockLayer")
            .field("block_size", &self.block_size)
            .field("memory_type", &self.memory_type)
            .field("device", &self.device.name())
            .field("num_blocks", &self.blocks.len())
            .field("view_up_to_date", &self.gpu_layer_view.is_up_to_date())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{TsdfVoxel, VoxelBlock};
    use crate::error::LayerError;
    use crate::memory::{ComputeDevice, HostDevice, PayloadLocation};
    use glam::IVec3;
    use std::collections::HashSet;
    use std::sync::Arc;

    type TsdfBlockLayer = BlockLayer<VoxelBlock<TsdfVoxel>>;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn host_layer() -> TsdfBlockLayer {
        BlockLayer::new(1.0, MemoryType::Host, HostDevice::shared())
    }

    #[test]
    fn test_allocate_is_idempotent() {
        init_logging();
        let mut layer = host_layer();
        let index = IVec3::new(3, -2, 7);

        let first = layer.allocate_block_at_index(index).expect("allocate");
        first
            .write()
            .set_voxel(IVec3::ZERO, TsdfVoxel::new(0.5, 1.0))
            .expect("write voxel");

        let second = layer.allocate_block_at_index(index).expect("allocate again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            second.read().voxel(IVec3::ZERO).expect("read voxel"),
            TsdfVoxel::new(0.5, 1.0)
        );
        assert_eq!(layer.num_allocated_blocks(), 1);
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let layer = host_layer();
        assert!(layer.get_block_at_index(IVec3::ZERO).is_none());
        assert!(layer.get_block_at_position(Vec3::new(0.5, 0.5, 0.5)).is_none());
        assert!(!layer.is_block_allocated(IVec3::ZERO));
    }

    #[test]
    fn test_position_round_trip() {
        let mut layer: TsdfBlockLayer = BlockLayer::new(0.4, MemoryType::Host, HostDevice::shared());
        let positions = [
            Vec3::new(0.1, 0.2, 0.3),
            Vec3::new(-0.1, -0.1, -0.1),
            Vec3::new(12.7, -3.3, 0.0),
            Vec3::new(-0.8, 0.8, -0.79),
        ];

        for position in positions {
            let allocated = layer.allocate_block_at_position(position).expect("allocate");
            let found = layer.get_block_at_position(position).expect("block present");
            assert!(Arc::ptr_eq(&allocated, &found));
            assert!(layer.is_block_allocated(position_to_block_index(position, 0.4)));
        }
        assert!(layer.is_block_allocated(IVec3::new(-1, -1, -1)));
    }

    #[test]
    fn test_indices_snapshot() {
        let mut layer = host_layer();
        let indices: HashSet<_> = [IVec3::ZERO, IVec3::X, IVec3::new(-4, 5, -6)]
            .into_iter()
            .collect();
        for index in &indices {
            layer.allocate_block_at_index(*index).expect("allocate");
        }

        let snapshot = layer.get_all_block_indices();
        layer.clear();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.into_iter().collect::<HashSet<_>>(), indices);
        assert!(layer.get_all_block_indices().is_empty());
    }

    #[test]
    fn test_clear_blocks_skips_missing() {
        let mut layer = host_layer();
        for x in 0..4 {
            layer.allocate_block_at_index(IVec3::new(x, 0, 0)).expect("allocate");
        }

        let removed = layer.clear_blocks(&[
            IVec3::new(0, 0, 0),
            IVec3::new(9, 9, 9),
            IVec3::new(2, 0, 0),
            IVec3::new(-1, 0, 0),
        ]);

        assert_eq!(removed, 2);
        assert_eq!(layer.num_allocated_blocks(), 2);
        assert!(layer.is_block_allocated(IVec3::new(1, 0, 0)));
        assert!(layer.is_block_allocated(IVec3::new(3, 0, 0)));
        assert!(!layer.is_block_allocated(IVec3::new(0, 0, 0)));
    }

    #[test]
    fn test_clear_blocks_without_removal_keeps_view() {
        let mut layer = host_layer();
        layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        layer.get_gpu_layer_view().expect("view");

        assert_eq!(layer.clear_blocks(&[IVec3::ONE]), 0);
        assert!(layer.is_gpu_layer_view_up_to_date());
        layer.get_gpu_layer_view().expect("view");
        assert_eq!(layer.view_rebuild_count(), 1);
    }

    #[test]
    fn test_view_tracks_mutations() {
        init_logging();
        let mut layer: TsdfBlockLayer =
            BlockLayer::new(1.0, MemoryType::Device, HostDevice::shared());

        let empty = layer.get_gpu_layer_view().expect("view");
        assert_eq!(empty.num_blocks(), 0);
        assert_eq!(layer.view_rebuild_count(), 1);

        for x in -3..3 {
            layer.allocate_block_at_index(IVec3::new(x, x, -x)).expect("allocate");
        }
        assert!(!layer.is_gpu_layer_view_up_to_date());

        let view = layer.get_gpu_layer_view().expect("view");
        let again = layer.get_gpu_layer_view().expect("cached view");
        assert!(view.shares_table(&again));
        assert_eq!(layer.view_rebuild_count(), 2);

        let mut expected: Vec<_> = layer.get_all_block_indices();
        let mut in_view: Vec<_> = view.iter().map(|(index, _)| index).collect();
        expected.sort_by_key(|i| i.to_array());
        in_view.sort_by_key(|i| i.to_array());
        assert_eq!(in_view, expected);

        for index in layer.get_all_block_indices() {
            let block = layer.get_block_at_index(index).expect("block");
            let location = block.read().payload_location();
            assert!(matches!(location, PayloadLocation::Device { .. }));
            assert_eq!(view.find(index), Some(location));
        }

        layer.clear_blocks(&[IVec3::new(0, 0, 0)]);
        let after_clear = layer.get_gpu_layer_view().expect("view");
        assert_eq!(after_clear.num_blocks(), 5);
        assert_eq!(after_clear.find(IVec3::ZERO), None);

        layer.clear();
        let cleared = layer.get_gpu_layer_view().expect("view");
        assert_eq!(cleared.num_blocks(), 0);
        assert_eq!(layer.view_rebuild_count(), 4);
    }

    #[test]
    fn test_view_taken_before_mutation_is_not_refreshed() {
        let mut layer = host_layer();
        layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        let old_view = layer.get_gpu_layer_view().expect("view");

        layer.allocate_block_at_index(IVec3::ONE).expect("allocate");

        // Holding a view across a mutation is a caller error: it still
        // describes the old key set.
        assert_eq!(old_view.num_blocks(), 1);
        assert!(old_view.find(IVec3::ONE).is_none());
        assert_eq!(layer.get_gpu_layer_view().expect("view").num_blocks(), 2);
    }

    #[test]
    fn test_handles_alias_payload() {
        let mut layer = host_layer();
        let held = layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        let other = layer.get_block_at_index(IVec3::ZERO).expect("block");

        other
            .write()
            .set_voxel(IVec3::ONE, TsdfVoxel::new(-0.2, 3.0))
            .expect("write voxel");
        assert_eq!(
            held.read().voxel(IVec3::ONE).expect("read"),
            TsdfVoxel::new(-0.2, 3.0)
        );

        layer.clear();
        assert_eq!(
            held.read().voxel(IVec3::ONE).expect("block outlives the layer entry"),
            TsdfVoxel::new(-0.2, 3.0)
        );
    }

    #[test]
    fn test_deep_copy_isolation() {
        let mut original = host_layer();
        let block = original.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        original.get_gpu_layer_view().expect("view");

        let copy = original.try_clone().expect("deep copy");
        assert_eq!(copy.num_allocated_blocks(), 1);
        assert_eq!(copy.memory_type(), MemoryType::Host);
        assert!(!copy.is_gpu_layer_view_up_to_date());
        assert_eq!(copy.view_rebuild_count(), 0);

        let copied = copy.get_block_at_index(IVec3::ZERO).expect("block");
        assert!(!Arc::ptr_eq(&block, &copied));

        block
            .write()
            .set_voxel(IVec3::ZERO, TsdfVoxel::new(1.0, 1.0))
            .expect("write original");
        assert_eq!(copied.read().voxel(IVec3::ZERO).expect("read"), TsdfVoxel::default());

        copied
            .write()
            .set_voxel(IVec3::ONE, TsdfVoxel::new(2.0, 1.0))
            .expect("write copy");
        assert_eq!(block.read().voxel(IVec3::ONE).expect("read"), TsdfVoxel::default());
    }

    #[test]
    fn test_migrating_copy() {
        let device = HostDevice::shared();
        let mut source: TsdfBlockLayer = BlockLayer::new(1.0, MemoryType::Device, device.clone());
        let block = source.allocate_block_at_index(IVec3::new(1, 1, 1)).expect("allocate");
        block
            .write()
            .set_voxel(IVec3::new(4, 5, 6), TsdfVoxel::new(0.3, 2.0))
            .expect("write voxel");

        let host = source
            .clone_with_memory_type(MemoryType::Host)
            .expect("migrating copy");
        assert_eq!(host.memory_type(), MemoryType::Host);

        let downloads_before = device.stats().downloads;
        let copied = host.get_block_at_index(IVec3::new(1, 1, 1)).expect("block");
        let guard = copied.read();
        let voxels = guard.host_voxels().expect("host resident");
        assert_eq!(voxels, block.read().voxels().expect("source voxels").as_slice());
        assert_eq!(device.stats().downloads, downloads_before + 1);
    }

    #[test]
    fn test_copy_from_keeps_target_memory_type() {
        let device = HostDevice::shared();
        let mut source: TsdfBlockLayer = BlockLayer::new(0.8, MemoryType::Host, device.clone());
        source.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        source.allocate_block_at_index(IVec3::X).expect("allocate");

        let mut target: TsdfBlockLayer = BlockLayer::new(1.0, MemoryType::Device, device);
        target.allocate_block_at_index(IVec3::NEG_ONE).expect("allocate");
        target.get_gpu_layer_view().expect("view");

        target.copy_from(&source).expect("assign");
        assert_eq!(target.memory_type(), MemoryType::Device);
        assert_eq!(target.block_size(), 0.8);
        assert_eq!(target.num_allocated_blocks(), 2);
        assert!(!target.is_block_allocated(IVec3::NEG_ONE));
        assert!(!target.is_gpu_layer_view_up_to_date());

        let block = target.get_block_at_index(IVec3::X).expect("block");
        assert_eq!(block.read().memory_type(), MemoryType::Device);
    }

    #[test]
    fn test_take_blocks_moves_contents() {
        let mut layer = host_layer();
        let block = layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        layer.get_gpu_layer_view().expect("view");

        let moved = layer.take_blocks();
        assert_eq!(moved.num_allocated_blocks(), 1);
        assert!(moved.is_gpu_layer_view_up_to_date());
        assert!(Arc::ptr_eq(
            &block,
            &moved.get_block_at_index(IVec3::ZERO).expect("block")
        ));

        assert_eq!(layer.num_allocated_blocks(), 0);
        assert!(!layer.is_gpu_layer_view_up_to_date());
        assert_eq!(layer.get_gpu_layer_view().expect("view").num_blocks(), 0);
    }

    #[test]
    fn test_out_of_device_memory_is_an_error() {
        init_logging();
        let block_bytes = (crate::constants::core::VOXELS_PER_BLOCK * 8) as u64;
        let device: DeviceHandle = Arc::new(HostDevice::with_capacity(block_bytes));
        let mut layer: TsdfBlockLayer = BlockLayer::new(1.0, MemoryType::Device, device);

        layer.allocate_block_at_index(IVec3::ZERO).expect("first block fits");
        let result = layer.allocate_block_at_index(IVec3::X);

        match result {
            Err(err) => {
                assert!(matches!(err, LayerError::OutOfDeviceMemory { .. }));
                assert!(err.is_device_failure());
            }
            Ok(_) => panic!("allocation past capacity should fail"),
        }
        assert!(!layer.is_block_allocated(IVec3::X));
        assert_eq!(layer.num_allocated_blocks(), 1);

        // The table upload has no room either; the cache stays stale.
        assert!(layer.get_gpu_layer_view().is_err());
        assert!(!layer.is_gpu_layer_view_up_to_date());
    }

    #[test]
    fn test_drop_releases_device_memory() {
        let device = HostDevice::shared();
        {
            let mut layer: TsdfBlockLayer =
                BlockLayer::new(1.0, MemoryType::Device, device.clone());
            for z in 0..3 {
                layer.allocate_block_at_index(IVec3::new(0, 0, z)).expect("allocate");
            }
            layer.get_gpu_layer_view().expect("view");
            assert_eq!(device.stats().live_allocations, 4);
        }
        assert_eq!(device.stats().live_allocations, 0);
        assert_eq!(device.stats().live_bytes, 0);
    }

    #[test]
    fn test_stats() {
        let mut layer: TsdfBlockLayer =
            BlockLayer::new(1.0, MemoryType::Unified, HostDevice::shared());
        layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        layer.allocate_block_at_index(IVec3::Y).expect("allocate");
        layer.get_gpu_layer_view().expect("view");

        let stats = layer.stats();
        assert_eq!(stats.num_blocks, 2);
        assert_eq!(stats.payload_bytes, 2 * 512 * 8);
        assert_eq!(stats.memory_type, MemoryType::Unified);
        assert!(stats.view_up_to_date);
        assert_eq!(stats.view_rebuilds, 1);
    }

    #[test]
    fn test_view_capacity_factor_is_clamped() {
        let layer = host_layer().with_view_capacity_factor(1e30);
        assert_eq!(layer.view_capacity_factor(), MAX_CAPACITY_FACTOR);

        let layer = host_layer().with_view_capacity_factor(0.25);
        assert_eq!(layer.view_capacity_factor(), 1.0);

        let mut layer = host_layer().with_view_capacity_factor(f32::NAN);
        assert_eq!(layer.view_capacity_factor(), DEFAULT_CAPACITY_FACTOR);

        layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");
        assert_eq!(layer.get_gpu_layer_view().expect("view").num_blocks(), 1);
    }

    #[test]
    fn test_transfer_fault_fails_migrating_copy() {
        let host_device = Arc::new(HostDevice::new());
        let device: DeviceHandle = host_device.clone();
        let mut layer: TsdfBlockLayer = BlockLayer::new(1.0, MemoryType::Device, device);
        layer.allocate_block_at_index(IVec3::ZERO).expect("allocate");

        host_device.set_fail_transfers(true);
        match layer.clone_with_memory_type(MemoryType::Host) {
            Err(err) => {
                assert!(matches!(err, LayerError::TransferFailed { .. }));
                assert!(err.is_device_failure());
            }
            Ok(_) => panic!("copy through a faulting device should fail"),
        }
        assert!(layer.try_clone().is_err());
        assert_eq!(layer.num_allocated_blocks(), 1);
    }

    #[test]
    fn test_failed_copy_from_leaves_target_unchanged() {
        let host_device = Arc::new(HostDevice::new());
        let device: DeviceHandle = host_device.clone();

        let mut source: TsdfBlockLayer = BlockLayer::new(0.5, MemoryType::Device, device.clone());
        source.allocate_block_at_index(IVec3::X).expect("allocate");
        source.allocate_block_at_index(IVec3::Y).expect("allocate");

        let mut target: TsdfBlockLayer = BlockLayer::new(1.0, MemoryType::Device, device);
        let kept = target.allocate_block_at_index(IVec3::NEG_ONE).expect("allocate");
        kept.write()
            .set_voxel(IVec3::ONE, TsdfVoxel::new(0.7, 3.0))
            .expect("write voxel");
        target.get_gpu_layer_view().expect("view");

        host_device.set_fail_transfers(true);
        assert!(matches!(
            target.copy_from(&source),
            Err(LayerError::TransferFailed { .. })
        ));
        host_device.set_fail_transfers(false);

        assert_eq!(target.block_size(), 1.0);
        assert_eq!(target.get_all_block_indices(), vec![IVec3::NEG_ONE]);
        assert!(target.is_gpu_layer_view_up_to_date());
        let block = target.get_block_at_index(IVec3::NEG_ONE).expect("block");
        assert!(Arc::ptr_eq(&block, &kept));
        assert_eq!(
            block.read().voxel(IVec3::ONE).expect("read voxel"),
            TsdfVoxel::new(0.7, 3.0)
        );
    }
}
