use ash::vk;
use thiserror::Error;

use crate::backend::{GpuDevice, SurfaceStatus};
use crate::platform::ExtentAuthority;
use crate::sync::WaitFenceError;
use crate::window::{RecreateError, SwapchainState, Window};

/// What a call to [`Window::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    /// The image was presented, then the swapchain was rebuilt because the
    /// surface reported suboptimal/out-of-date or the compositor extent moved.
    PresentedThenRecreated { image_index: u32 },
    /// Acquire reported out-of-date. The swapchain was rebuilt and nothing
    /// was presented.
    SkippedOutOfDate,
    /// There is no swapchain to render to, usually because the drawable
    /// extent is zero.
    SkippedNoSurface,
    /// The fence wait or acquire ran out of time. No GPU state was changed.
    TimedOut,
    /// The window has been closed.
    Closed,
}

impl FrameOutcome {
    pub fn presented_image(self) -> Option<u32> {
        match self {
            Self::Presented { image_index } | Self::PresentedThenRecreated { image_index } => {
                Some(image_index)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderFrameError {
    #[error("Error recreating swapchain: {0}")]
    Recreate(#[from] RecreateError),

    #[error("Vulkan error waiting for frame fence: {0}")]
    FenceWait(vk::Result),

    #[error("Vulkan error acquiring swapchain image: {0}")]
    Acquire(vk::Result),

    #[error("Vulkan error resetting frame fence: {0}")]
    ResetFence(vk::Result),

    #[error("Acquired image index {index} but swapchain has {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("Vulkan error submitting frame: {0}")]
    Submit(vk::Result),

    #[error("Vulkan error presenting frame: {0}")]
    Present(vk::Result),
}

impl<B: GpuDevice> Window<B> {
    /// Render and present one frame.
    ///
    /// Waits on the frame fence, acquires an image, resubmits that image's
    /// pre-recorded command buffer and presents it. Surface out-of-date and
    /// suboptimal statuses are recovered from by recreating the swapchain,
    /// at most once per call; every other failure is returned.
    pub fn render_frame(&mut self) -> Result<FrameOutcome, RenderFrameError> {
        let _span = tracing::trace_span!("render_frame", generation = self.generation).entered();

        match self.state {
            SwapchainState::TornDown => return Ok(FrameOutcome::Closed),
            SwapchainState::Uninitialized => return Ok(FrameOutcome::SkippedNoSurface),
            SwapchainState::Stale => {
                if !self.recreate()? {
                    return Ok(FrameOutcome::SkippedNoSurface);
                }
            }
            SwapchainState::Ready => {}
        }

        let (Some(swapchain), Some(semaphore)) = (self.swapchain.as_ref(), self.semaphore.as_ref())
        else {
            return Ok(FrameOutcome::SkippedNoSurface);
        };
        let swapchain_handle = swapchain.raw_handle();
        let swapchain_extent = swapchain.extent();
        let semaphore = semaphore.raw_handle();
        let Some(fence) = self.fence.as_mut() else {
            return Ok(FrameOutcome::SkippedNoSurface);
        };

        match fence.wait(self.config.fence_timeout_ns) {
            Ok(()) => {}
            Err(WaitFenceError::Timeout) => return Ok(FrameOutcome::TimedOut),
            Err(WaitFenceError::Vulkan(e)) => return Err(RenderFrameError::FenceWait(e)),
        }

        // SAFETY: swapchain and semaphore are live. The semaphore has no
        // pending signal: the last acquire that signaled it was consumed by
        // the submit the fence wait above just retired.
        let acquired = unsafe {
            self.device
                .acquire_next_image(swapchain_handle, self.config.acquire_timeout_ns, semaphore)
        };
        let (image_index, mut needs_recreate) = match acquired {
            SurfaceStatus::Ok(index) => (index, false),
            SurfaceStatus::SurfaceSuboptimal(index) => {
                tracing::info!("Acquire reported a suboptimal surface");
                (index, true)
            }
            SurfaceStatus::SurfaceOutOfDate => {
                tracing::info!("Acquire reported an out-of-date surface");
                self.recreate()?;
                return Ok(FrameOutcome::SkippedOutOfDate);
            }
            SurfaceStatus::Fatal(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                return Ok(FrameOutcome::TimedOut);
            }
            SurfaceStatus::Fatal(e) => return Err(RenderFrameError::Acquire(e)),
        };

        // SAFETY: the wait above returned, so the fence is signaled and not
        // pending.
        unsafe { fence.reset() }.map_err(RenderFrameError::ResetFence)?;
        let fence = fence.raw_handle();

        let command_buffers = self
            .swapchain
            .as_ref()
            .map(|generation| generation.command_buffers())
            .unwrap_or_default();
        let command_buffer = command_buffers.get(image_index as usize).copied().ok_or(
            RenderFrameError::ImageIndexOutOfRange {
                index: image_index,
                count: command_buffers.len(),
            },
        )?;

        // SAFETY: the command buffer was recorded for this generation and is
        // not pending (the fence covering its last submission has signaled).
        // The fence was just reset.
        unsafe {
            self.device.queue_submit(
                command_buffer,
                semaphore,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                fence,
            )
        }
        .map_err(RenderFrameError::Submit)?;

        // SAFETY: image_index was acquired from swapchain_handle this frame.
        match unsafe { self.device.queue_present(swapchain_handle, image_index) } {
            SurfaceStatus::Ok(()) => {}
            SurfaceStatus::SurfaceSuboptimal(()) => {
                tracing::info!("Present reported a suboptimal surface");
                needs_recreate = true;
            }
            SurfaceStatus::SurfaceOutOfDate => {
                tracing::info!("Present reported an out-of-date surface");
                needs_recreate = true;
            }
            SurfaceStatus::Fatal(e) => return Err(RenderFrameError::Present(e)),
        }

        if self.authority == ExtentAuthority::Compositor
            && self.drawable_extent != swapchain_extent
        {
            tracing::debug!(
                "Compositor extent {}x{} differs from swapchain {}x{}",
                self.drawable_extent.width,
                self.drawable_extent.height,
                swapchain_extent.width,
                swapchain_extent.height,
            );
            needs_recreate = true;
        }

        if needs_recreate {
            self.recreate()?;
            Ok(FrameOutcome::PresentedThenRecreated { image_index })
        } else {
            Ok(FrameOutcome::Presented { image_index })
        }
    }
}
