//! Voxel block serialization
//!
//! Raw byte images of voxel blocks and whole voxel layers. Voxel payloads
//! are written as their in-memory `Pod` bytes; device-resident blocks are
//! downloaded first.
//!
//! Layer layout:
//! - Bytes 0-3: magic "SLYR"
//! - Bytes 4-7: voxel_size (f32 LE)
//! - Bytes 8-11: bytes per voxel (u32 LE)
//! - Bytes 12-15: num_blocks (u32 LE)
//! - Then per block: x, y, z (i32 LE each) followed by the block payload

use crate::blocks::{Voxel, VoxelBlock};
use crate::constants::core::VOXELS_PER_BLOCK;
use crate::core::{BlockIndex, MemoryType};
use crate::error::{LayerError, LayerResult, OptionExt};
use crate::layer::VoxelBlockLayer;
use crate::memory::DeviceHandle;
use glam::IVec3;
use std::mem::size_of;

pub const LAYER_MAGIC: [u8; 4] = *b"SLYR";
pub const LAYER_HEADER_SIZE: usize = 16;

/// Bytes in one serialized block of `V`
#[inline]
pub fn block_payload_size<V: Voxel>() -> usize {
    VOXELS_PER_BLOCK * size_of::<V>()
}

pub fn serialize_block<V: Voxel>(block: &VoxelBlock<V>) -> LayerResult<Vec<u8>> {
    match block.host_voxels() {
        Some(voxels) => Ok(bytemuck::cast_slice(voxels).to_vec()),
        None => {
            let voxels = block.voxels()?;
            Ok(bytemuck::cast_slice(&voxels).to_vec())
        }
    }
}

pub fn deserialize_block<V: Voxel>(
    bytes: &[u8],
    memory_type: MemoryType,
    device: &DeviceHandle,
) -> LayerResult<VoxelBlock<V>> {
    let expected = block_payload_size::<V>();
    if bytes.len() != expected {
        return Err(LayerError::CorruptedData {
            reason: format!(
                "voxel block payload is {} bytes, expected {}",
                bytes.len(),
                expected
            ),
        });
    }

    VoxelBlock::from_voxels(&read_voxels::<V>(bytes), memory_type, device)
}

// Input may not be aligned for `V`
fn read_voxels<V: Voxel>(bytes: &[u8]) -> Vec<V> {
    bytes
        .chunks_exact(size_of::<V>())
        .map(bytemuck::pod_read_unaligned::<V>)
        .collect()
}

pub fn serialize_layer<V: Voxel>(layer: &VoxelBlockLayer<V>) -> LayerResult<Vec<u8>> {
    let num_blocks = layer.num_allocated_blocks();
    let mut bytes =
        Vec::with_capacity(LAYER_HEADER_SIZE + num_blocks * (12 + block_payload_size::<V>()));

    bytes.extend_from_slice(&LAYER_MAGIC);
    bytes.extend_from_slice(&layer.voxel_size().to_le_bytes());
    bytes.extend_from_slice(&(size_of::<V>() as u32).to_le_bytes());
    bytes.extend_from_slice(&(num_blocks as u32).to_le_bytes());

    for (index, block) in layer.iter() {
        for component in index.to_array() {
            bytes.extend_from_slice(&component.to_le_bytes());
        }
        bytes.extend_from_slice(&serialize_block(&*block.read())?);
    }

    log::debug!(
        "[SERIALIZATION] Wrote {} blocks ({} bytes)",
        num_blocks,
        bytes.len()
    );
    Ok(bytes)
}

/// Rebuild a voxel layer in `memory_type` from `serialize_layer` output
pub fn deserialize_layer<V: Voxel>(
    bytes: &[u8],
    memory_type: MemoryType,
    device: DeviceHandle,
) -> LayerResult<VoxelBlockLayer<V>> {
    let header = bytes
        .get(..LAYER_HEADER_SIZE)
        .ok_or_layer(|| corrupted("layer data shorter than its header"))?;
    if header[0..4] != LAYER_MAGIC {
        return Err(corrupted("bad layer magic"));
    }

    let voxel_size = f32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let voxel_bytes = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let num_blocks = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;

    if !voxel_size.is_finite() || voxel_size <= 0.0 {
        return Err(LayerError::CorruptedData {
            reason: format!("layer voxel size {} is not a positive length", voxel_size),
        });
    }

    if voxel_bytes != size_of::<V>() {
        return Err(LayerError::CorruptedData {
            reason: format!(
                "layer stores {}-byte voxels, reading as {}-byte voxels",
                voxel_bytes,
                size_of::<V>()
            ),
        });
    }

    let record_size = 12 + block_payload_size::<V>();
    let body = &bytes[LAYER_HEADER_SIZE..];
    if body.len() != num_blocks * record_size {
        return Err(LayerError::CorruptedData {
            reason: format!(
                "expected {} blocks in {} bytes, found {} bytes",
                num_blocks,
                num_blocks * record_size,
                body.len()
            ),
        });
    }

    let mut layer = VoxelBlockLayer::new(voxel_size, memory_type, device);
    for record in body.chunks_exact(record_size) {
        let index = read_block_index(&record[..12]);
        let voxels = read_voxels::<V>(&record[12..]);
        let block = layer.allocate_block_at_index(index)?;
        let mut guard = block.write();
        guard.set_voxels(&voxels)?;
    }

    log::debug!(
        "[SERIALIZATION] Read {} blocks into a {} layer",
        num_blocks,
        memory_type
    );
    Ok(layer)
}

fn read_block_index(bytes: &[u8]) -> BlockIndex {
    let component = |i: usize| {
        i32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
    };
    IVec3::new(component(0), component(4), component(8))
}

fn corrupted(reason: &str) -> LayerError {
    LayerError::CorruptedData {
        reason: reason.to_string(),
    }
}
