//! Vertex storage for the pipeline variant of a window.
//!
//! [`VertexBuffer`] is a fixed-size, host-visible, host-coherent buffer that
//! stays mapped for as long as it lives. It is sized once; writing more than
//! it holds is an error rather than a reallocation. [`BufferHandle`] is how
//! windows and command recording refer to a buffer without caring about its
//! concrete type.

use std::mem::{offset_of, size_of};
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::{AllocationError, MemoryLocation, vulkan::Allocation};
use thiserror::Error;

use crate::backend::GpuDevice;
use crate::device::Device;

/// Types that expose a raw `VkBuffer` handle.
pub trait BufferHandle {
    fn raw_buffer(&self) -> vk::Buffer;
}

impl<T> BufferHandle for &T
where
    T: BufferHandle + ?Sized,
{
    fn raw_buffer(&self) -> vk::Buffer {
        (*self).raw_buffer()
    }
}

/// Interleaved vertex layout consumed by [`crate::pipeline::GraphicsPipeline`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
        ]
    }
}

#[derive(Debug, Error)]
pub enum CreateBufferError {
    #[error("Vertex buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("Vulkan error creating buffer: {0}")]
    CreateBuffer(vk::Result),

    #[error("GPU allocator error allocating memory: {0}")]
    AllocateMemory(AllocationError),

    #[error("Allocated memory is not host-coherent")]
    NotHostCoherent,

    #[error("Allocated memory is not host-mapped")]
    NotMapped,

    #[error("Vulkan error binding buffer memory: {0}")]
    BindMemory(vk::Result),
}

#[derive(Debug, Error)]
pub enum WriteBufferError {
    #[error("Data size ({data_bytes} bytes) exceeds buffer size ({buffer_bytes} bytes)")]
    DataTooLarge {
        data_bytes: usize,
        buffer_bytes: vk::DeviceSize,
    },
}

/// A persistently mapped `CpuToGpu` buffer with `VERTEX_BUFFER` usage.
pub struct VertexBuffer {
    parent: Arc<Device>,
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    mapped: std::ptr::NonNull<std::ffi::c_void>,
    size: vk::DeviceSize,
}

// SAFETY: `mapped` points into an allocation owned by this value and is only
// written through `&mut self`.
unsafe impl Send for VertexBuffer {}
// SAFETY: shared access never touches `mapped`.
unsafe impl Sync for VertexBuffer {}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl VertexBuffer {
    /// Create a buffer holding up to `vertex_capacity` [`Vertex`] values.
    pub fn new(
        device: &Arc<Device>,
        vertex_capacity: usize,
        name: &str,
    ) -> Result<Self, CreateBufferError> {
        if vertex_capacity == 0 {
            return Err(CreateBufferError::ZeroCapacity);
        }
        let size = (vertex_capacity * size_of::<Vertex>()) as vk::DeviceSize;
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: create_info is fully initialised and has no borrowed data.
        let handle = unsafe { device.create_raw_buffer(&create_info) }
            .map_err(CreateBufferError::CreateBuffer)?;

        let destroy_handle = || {
            // SAFETY: handle came from device and is not in use.
            unsafe { device.destroy_raw_buffer(handle) };
        };

        // SAFETY: handle is a valid buffer created from this device.
        let reqs = unsafe { device.get_raw_buffer_memory_requirements(handle) };
        let allocation = match device.allocate_memory(name, reqs, MemoryLocation::CpuToGpu) {
            Ok(allocation) => allocation,
            Err(e) => {
                destroy_handle();
                return Err(CreateBufferError::AllocateMemory(e));
            }
        };

        let check = if !allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            Err(CreateBufferError::NotHostCoherent)
        } else {
            allocation.mapped_ptr().ok_or(CreateBufferError::NotMapped)
        };
        let mapped = match check {
            Ok(mapped) => mapped,
            Err(e) => {
                if let Err(free_err) = device.free_memory(allocation) {
                    tracing::error!("Failed to free GPU allocation: {free_err}");
                }
                destroy_handle();
                return Err(e);
            }
        };

        // SAFETY: handle and allocation memory are valid and belong to this
        // device; the allocation was sized from handle's requirements.
        let bind_result = unsafe {
            device.bind_raw_buffer_memory(handle, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bind_result {
            if let Err(free_err) = device.free_memory(allocation) {
                tracing::error!("Failed to free GPU allocation: {free_err}");
            }
            destroy_handle();
            return Err(CreateBufferError::BindMemory(e));
        }

        // SAFETY: handle is a live buffer from device.
        unsafe { device.set_debug_name(handle, name) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            allocation: Some(allocation),
            mapped,
            size,
        })
    }

    /// Copy `data` to the start of the mapping.
    ///
    /// The memory is host-coherent, so no flush is needed. Callers must not
    /// write while a submitted frame may still be reading the buffer.
    pub fn write_pod<T: Pod>(&mut self, data: &[T]) -> Result<(), WriteBufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(WriteBufferError::DataTooLarge {
                data_bytes: bytes.len(),
                buffer_bytes: self.size,
            });
        }
        // SAFETY: mapped points to at least `size` bytes of host-visible memory
        // owned by this buffer, and bytes.len() <= size was checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.mapped.as_ptr().cast::<u8>(),
                bytes.len(),
            );
        }
        Ok(())
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn vertex_capacity(&self) -> usize {
        self.size as usize / size_of::<Vertex>()
    }
}

impl BufferHandle for VertexBuffer {
    fn raw_buffer(&self) -> vk::Buffer {
        self.handle
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        tracing::debug!("Dropping vertex buffer {:?}", self.handle);
        // SAFETY: windows holding this buffer idle the device before
        // releasing their reference.
        unsafe { self.parent.destroy_raw_buffer(self.handle) };
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.parent.free_memory(allocation)
        {
            tracing::error!("Failed to free GPU allocation: {e}");
        }
    }
}
