//! The seam between the swapchain/frame state machine and the GPU.
//!
//! [`crate::device::Device`] implements [`GpuDevice`] on top of `ash`. Window,
//! swapchain and frame code are generic over the trait so the whole
//! lifecycle can be driven against a recording fake.

use ash::vk;

/// Outcome of an acquire or present call.
///
/// `SurfaceOutOfDate` and `SurfaceSuboptimal` are the two statuses the frame
/// loop recovers from by recreating the swapchain. Everything else that is
/// not success is `Fatal`.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus<T> {
    Ok(T),
    SurfaceSuboptimal(T),
    SurfaceOutOfDate,
    Fatal(vk::Result),
}

impl<T> SurfaceStatus<T> {
    /// Map the `(value, suboptimal)` convention used by `ash` for
    /// `vkAcquireNextImageKHR` and `vkQueuePresentKHR`.
    pub fn from_ash(result: Result<(T, bool), vk::Result>) -> Self {
        match result {
            Ok((value, false)) => Self::Ok(value),
            Ok((value, true)) => Self::SurfaceSuboptimal(value),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Self::SurfaceOutOfDate,
            Err(e) => Self::Fatal(e),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SurfaceSuboptimal(_) | Self::SurfaceOutOfDate)
    }
}

/// Every GPU operation the window lifecycle needs.
///
/// Methods mirror single Vulkan calls. The `unsafe` ones carry the Vulkan
/// valid-usage rules of the call they wrap: handles passed in must have been
/// created from this device (or its parent instance for surfaces), must not
/// be destroyed yet, and destroy calls must not race in-flight GPU work.
pub trait GpuDevice: Send + Sync {
    /// Block until every queue on the device is idle.
    fn wait_idle(&self) -> Result<(), vk::Result>;

    /// Queue family that owns the graphics queue and the command pool.
    fn graphics_queue_family(&self) -> u32;

    /// Attach a debug label to an object. Labels are best effort.
    ///
    /// # Safety
    /// `object` must be a live handle owned by this device.
    unsafe fn set_debug_name<H: vk::Handle>(&self, object: H, name: &str) {
        let _ = (object, name);
    }

    /// Run `f` while holding the command pool lock. Allocation, recording,
    /// reset and free of command buffers from the shared pool all happen
    /// inside this.
    fn with_command_pool<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    // ---- Surface ---------------------------------------------------------

    /// # Safety
    /// `surface` must be a live surface from the parent instance.
    unsafe fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result>;

    /// # Safety
    /// `surface` must be a live surface from the parent instance.
    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result>;

    /// # Safety
    /// Every swapchain created against `surface` must already be destroyed.
    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR);

    // ---- Synchronization -------------------------------------------------

    /// # Safety
    /// No extra requirements beyond a live device.
    unsafe fn create_raw_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result>;

    /// # Safety
    /// `fence` must not be pending on any queue.
    unsafe fn destroy_raw_fence(&self, fence: vk::Fence);

    /// Returns `Err(vk::Result::TIMEOUT)` when `timeout_ns` elapses.
    ///
    /// # Safety
    /// `fence` must be a live fence from this device.
    unsafe fn wait_for_raw_fence(&self, fence: vk::Fence, timeout_ns: u64)
    -> Result<(), vk::Result>;

    /// # Safety
    /// `fence` must not be pending on any queue.
    unsafe fn reset_raw_fence(&self, fence: vk::Fence) -> Result<(), vk::Result>;

    /// # Safety
    /// No extra requirements beyond a live device.
    unsafe fn create_raw_semaphore(&self) -> Result<vk::Semaphore, vk::Result>;

    /// # Safety
    /// No queue operation may still wait on or signal `semaphore`.
    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore);

    // ---- Render pass, shaders, pipelines ---------------------------------

    /// # Safety
    /// `create_info` and everything it points to must be valid for the call.
    unsafe fn create_raw_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass, vk::Result>;

    /// # Safety
    /// No framebuffer, pipeline or pending command buffer may still use it.
    unsafe fn destroy_raw_render_pass(&self, render_pass: vk::RenderPass);

    /// # Safety
    /// `create_info` must hold valid SPIR-V.
    unsafe fn create_raw_shader_module(
        &self,
        create_info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule, vk::Result>;

    /// # Safety
    /// `module` must be a live module from this device.
    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule);

    /// # Safety
    /// `create_info` and everything it points to must be valid for the call.
    unsafe fn create_raw_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout, vk::Result>;

    /// # Safety
    /// No live pipeline may still use `layout`.
    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// # Safety
    /// `create_info` must reference live shader modules, layout and render
    /// pass from this device.
    unsafe fn create_raw_graphics_pipeline(
        &self,
        create_info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, vk::Result>;

    /// # Safety
    /// No pending command buffer may still reference `pipeline`.
    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline);

    // ---- Swapchain and derived objects -----------------------------------

    /// # Safety
    /// `create_info` must reference a live surface and valid parameters
    /// chosen from that surface's capabilities.
    unsafe fn create_raw_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR, vk::Result>;

    /// # Safety
    /// `swapchain` must be a live swapchain from this device.
    unsafe fn get_raw_swapchain_images(
        &self,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>, vk::Result>;

    /// # Safety
    /// Every view and framebuffer over the swapchain images must be
    /// destroyed first, and no GPU work may reference them.
    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// # Safety
    /// `create_info.image` must be a live image from this device.
    unsafe fn create_raw_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, vk::Result>;

    /// # Safety
    /// No framebuffer may still reference `view`.
    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView);

    /// # Safety
    /// `create_info` must reference a live render pass and live views.
    unsafe fn create_raw_framebuffer(
        &self,
        create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer, vk::Result>;

    /// # Safety
    /// No pending command buffer may still reference `framebuffer`.
    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer);

    // ---- Command buffers ---------------------------------------------------

    /// Allocate `count` primary command buffers from the device's pool.
    ///
    /// # Safety
    /// Must be called inside [`with_command_pool`](Self::with_command_pool).
    unsafe fn allocate_raw_command_buffers(
        &self,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, vk::Result>;

    /// # Safety
    /// Must be called inside [`with_command_pool`](Self::with_command_pool);
    /// none of `command_buffers` may be pending.
    unsafe fn free_raw_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    /// # Safety
    /// `command_buffer` must not be pending; called inside
    /// [`with_command_pool`](Self::with_command_pool).
    unsafe fn begin_raw_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result>;

    /// # Safety
    /// `command_buffer` must be recording.
    unsafe fn end_raw_command_buffer(&self, command_buffer: vk::CommandBuffer)
    -> Result<(), vk::Result>;

    /// # Safety
    /// `command_buffer` must be recording and outside a render pass.
    unsafe fn cmd_image_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    );

    /// # Safety
    /// `command_buffer` must be recording; `begin_info` must reference a live
    /// render pass and framebuffer.
    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
    );

    /// # Safety
    /// `command_buffer` must be inside a render pass.
    unsafe fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// # Safety
    /// `command_buffer` must be recording; `pipeline` must be live.
    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    );

    /// Set a full-extent viewport and scissor.
    ///
    /// # Safety
    /// `command_buffer` must be recording with a pipeline bound that has
    /// dynamic viewport and scissor.
    unsafe fn cmd_set_viewport_and_scissor(
        &self,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    );

    /// # Safety
    /// `command_buffer` must be recording; `buffer` must be live and outlive
    /// every submission of `command_buffer`.
    unsafe fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);

    /// # Safety
    /// `command_buffer` must be inside a render pass with a pipeline bound.
    unsafe fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32);

    // ---- Queue -------------------------------------------------------------

    /// # Safety
    /// `swapchain` and `semaphore` must be live; `semaphore` must have no
    /// pending signal.
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> SurfaceStatus<u32>;

    /// Submit one command buffer that waits on `wait_semaphore` at
    /// `wait_stage` and signals `fence` on completion.
    ///
    /// # Safety
    /// All handles must be live; `command_buffer` must be executable and not
    /// pending; `fence` must be unsignaled.
    unsafe fn queue_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        fence: vk::Fence,
    ) -> Result<(), vk::Result>;

    /// # Safety
    /// `image_index` must have been acquired from `swapchain` and not yet
    /// presented.
    unsafe fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32)
    -> SurfaceStatus<()>;
}
