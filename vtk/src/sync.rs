use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CreateFenceError {
    #[error("Vulkan error creating fence: {0}")]
    Vulkan(vk::Result),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitFenceError {
    #[error("Fence wait timed out")]
    Timeout,
    #[error("Vulkan error waiting for fence: {0}")]
    Vulkan(vk::Result),
}

#[derive(Debug, Error)]
pub enum CreateSemaphoreError {
    #[error("Vulkan error creating semaphore: {0}")]
    Vulkan(vk::Result),
}

// ---------------------------------------------------------------------------
// Fence
// ---------------------------------------------------------------------------

/// An owned binary fence. The frame loop waits on it before touching the
/// command buffer the GPU may still be reading.
pub struct Fence<B: GpuDevice> {
    parent: Arc<B>,
    handle: vk::Fence,
}

impl<B: GpuDevice> std::fmt::Debug for Fence<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<B: GpuDevice> Fence<B> {
    /// Create a fence.
    ///
    /// Pass `signaled = true` so the first wait in a render loop returns
    /// immediately.
    pub fn new(device: &Arc<B>, signaled: bool, name: &str) -> Result<Self, CreateFenceError> {
        // SAFETY: no preconditions beyond a live device
        let handle =
            unsafe { device.create_raw_fence(signaled) }.map_err(CreateFenceError::Vulkan)?;
        // SAFETY: handle is a fresh fence from device.
        unsafe { device.set_debug_name(handle, name) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
        })
    }

    /// Block until the fence is signaled or `timeout_ns` nanoseconds elapse.
    ///
    /// Pass `u64::MAX` to wait indefinitely.
    pub fn wait(&self, timeout_ns: u64) -> Result<(), WaitFenceError> {
        // SAFETY: handle is a valid fence created from parent.
        unsafe { self.parent.wait_for_raw_fence(self.handle, timeout_ns) }.map_err(|e| {
            if e == vk::Result::TIMEOUT {
                WaitFenceError::Timeout
            } else {
                WaitFenceError::Vulkan(e)
            }
        })
    }

    /// Reset the fence to the unsignaled state.
    ///
    /// # Safety
    /// The fence must not be currently pending on any queue submission.
    pub unsafe fn reset(&mut self) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees the fence is not pending.
        unsafe { self.parent.reset_raw_fence(self.handle) }
    }

    pub fn raw_handle(&self) -> vk::Fence {
        self.handle
    }
}

impl<B: GpuDevice> Drop for Fence<B> {
    fn drop(&mut self) {
        tracing::debug!("Dropping fence {:?}", self.handle);
        // SAFETY: handle was created from parent. Owners wait for the device
        // to go idle before dropping us.
        unsafe { self.parent.destroy_raw_fence(self.handle) };
    }
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// An owned binary semaphore, signaled by acquire and waited on by submit.
pub struct Semaphore<B: GpuDevice> {
    parent: Arc<B>,
    handle: vk::Semaphore,
}

impl<B: GpuDevice> std::fmt::Debug for Semaphore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<B: GpuDevice> Semaphore<B> {
    pub fn new(device: &Arc<B>, name: &str) -> Result<Self, CreateSemaphoreError> {
        // SAFETY: no preconditions beyond a live device
        let handle =
            unsafe { device.create_raw_semaphore() }.map_err(CreateSemaphoreError::Vulkan)?;
        // SAFETY: handle is a fresh semaphore from device.
        unsafe { device.set_debug_name(handle, name) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
        })
    }

    pub fn raw_handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl<B: GpuDevice> Drop for Semaphore<B> {
    fn drop(&mut self) {
        tracing::debug!("Dropping semaphore {:?}", self.handle);
        // SAFETY: handle was created from parent and no queue operation waits
        // on it once the owner has idled the device.
        unsafe { self.parent.destroy_raw_semaphore(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDevice};

    #[test]
    fn fence_timeout_maps_to_timeout_error() {
        let device = Arc::new(MockDevice::new());
        let fence = Fence::new(&device, true, "test fence").unwrap();
        device.script_fence_wait([Err(vk::Result::TIMEOUT)]);
        assert_eq!(fence.wait(10), Err(WaitFenceError::Timeout));
        device.script_fence_wait([Err(vk::Result::ERROR_DEVICE_LOST)]);
        assert_eq!(
            fence.wait(10),
            Err(WaitFenceError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        );
        assert_eq!(fence.wait(10), Ok(()));
    }

    #[test]
    fn drop_destroys_handles() {
        let device = Arc::new(MockDevice::new());
        {
            let _fence = Fence::new(&device, true, "f").unwrap();
            let _semaphore = Semaphore::new(&device, "s").unwrap();
            assert_eq!(device.live_object_count(), 2);
        }
        assert_eq!(device.live_object_count(), 0);
        let calls = device.calls();
        assert!(calls.contains(&Call::CreateFence { signaled: true }));
        assert!(calls.contains(&Call::DestroySemaphore));
    }
}
