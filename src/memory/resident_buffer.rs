//! Residency-aware typed buffer
//!
//! Holds a fixed-length array of `Pod` elements either in host memory
//! (`Host` and `Unified` residency) or in a device allocation (`Device`).
//! Host-accessible buffers are read in place; device buffers pay one
//! transfer per access, sized to exactly the elements touched.

use super::device::{DeviceAllocation, DeviceHandle};
use super::PayloadLocation;
use crate::core::MemoryType;
use crate::error::{LayerError, LayerResult};
use bytemuck::Pod;
use std::mem::size_of;

enum Storage<T> {
    Host(Vec<T>),
    Device(DeviceAllocation),
}

pub struct ResidentBuffer<T: Pod> {
    memory_type: MemoryType,
    len: usize,
    storage: Storage<T>,
}

impl<T: Pod> ResidentBuffer<T> {
    /// Build a buffer holding a copy of `data` in the requested residency
    pub fn from_slice(
        data: &[T],
        memory_type: MemoryType,
        device: &DeviceHandle,
    ) -> LayerResult<Self> {
        let storage = if memory_type.is_host_accessible() {
            Storage::Host(data.to_vec())
        } else {
            Storage::Device(DeviceAllocation::with_contents(
                device,
                bytemuck::cast_slice(data),
            )?)
        };

        Ok(Self {
            memory_type,
            len: data.len(),
            storage,
        })
    }

    pub fn filled(
        value: T,
        len: usize,
        memory_type: MemoryType,
        device: &DeviceHandle,
    ) -> LayerResult<Self> {
        Self::from_slice(&vec![value; len], memory_type, device)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn size_bytes(&self) -> u64 {
        (self.len * size_of::<T>()) as u64
    }

    /// In-place view for host-accessible buffers; `None` for device buffers
    pub fn host_slice(&self) -> Option<&[T]> {
        match &self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    pub fn host_slice_mut(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    fn check_index(&self, index: usize) -> LayerResult<()> {
        if index >= self.len {
            return Err(LayerError::BufferAccess {
                index,
                size: self.len,
            });
        }
        Ok(())
    }

    /// Copy out one element. Device buffers download exactly that element.
    pub fn get(&self, index: usize) -> LayerResult<T> {
        self.check_index(index)?;
        match &self.storage {
            Storage::Host(data) => Ok(data[index]),
            Storage::Device(allocation) => {
                let mut value = T::zeroed();
                allocation.download(
                    (index * size_of::<T>()) as u64,
                    bytemuck::bytes_of_mut(&mut value),
                )?;
                Ok(value)
            }
        }
    }

    /// Overwrite one element. Device buffers upload exactly that element.
    pub fn set(&mut self, index: usize, value: T) -> LayerResult<()> {
        self.check_index(index)?;
        match &mut self.storage {
            Storage::Host(data) => {
                data[index] = value;
                Ok(())
            }
            Storage::Device(allocation) => {
                allocation.upload((index * size_of::<T>()) as u64, bytemuck::bytes_of(&value))?;
                Ok(())
            }
        }
    }

    /// Copy the whole buffer to the host
    pub fn to_vec(&self) -> LayerResult<Vec<T>> {
        match &self.storage {
            Storage::Host(data) => Ok(data.clone()),
            Storage::Device(allocation) => {
                let mut values = vec![T::zeroed(); self.len];
                allocation.download(0, bytemuck::cast_slice_mut(&mut values))?;
                Ok(values)
            }
        }
    }

    /// Overwrite every element from `data`, which must match the buffer length
    pub fn write_all(&mut self, data: &[T]) -> LayerResult<()> {
        if data.len() != self.len {
            return Err(LayerError::BufferAccess {
                index: data.len(),
                size: self.len,
            });
        }
        match &mut self.storage {
            Storage::Host(values) => {
                values.copy_from_slice(data);
                Ok(())
            }
            Storage::Device(allocation) => {
                allocation.upload(0, bytemuck::cast_slice(data))?;
                Ok(())
            }
        }
    }

    /// Independent copy of this buffer in `memory_type`.
    ///
    /// Host to device uploads, device to host downloads, and a device to
    /// device copy on the same device never leaves the device.
    pub fn copy_to(&self, memory_type: MemoryType, device: &DeviceHandle) -> LayerResult<Self> {
        match (&self.storage, memory_type.is_host_accessible()) {
            (Storage::Host(data), _) => Self::from_slice(data, memory_type, device),
            (Storage::Device(source), false) if source.same_device(device) => {
                let destination = DeviceAllocation::new(device, source.size())?;
                device.copy(source.id(), destination.id(), source.size())?;
                Ok(Self {
                    memory_type,
                    len: self.len,
                    storage: Storage::Device(destination),
                })
            }
            (Storage::Device(_), _) => {
                let values = self.to_vec()?;
                Self::from_slice(&values, memory_type, device)
            }
        }
    }

    /// Where the payload bytes live, as published in the device index
    pub fn payload_location(&self) -> PayloadLocation {
        match &self.storage {
            Storage::Host(data) => PayloadLocation::Host {
                address: data.as_ptr() as usize as u64,
            },
            Storage::Device(allocation) => PayloadLocation::Device {
                allocation: allocation.id(),
            },
        }
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for ResidentBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidentBuffer")
            .field("memory_type", &self.memory_type)
            .field("len", &self.len)
            .field("location", &self.payload_location())
            .finish()
    }
}
