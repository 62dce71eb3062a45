//! Recording fake of [`GpuDevice`] for lifecycle tests.
//!
//! Every call is appended to an ordered log. Created handles are tracked so
//! tests can check for leaks, double destroys and use of destroyed
//! swapchains. Acquire, present and fence-wait results can be scripted;
//! unscripted calls succeed.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use ash::vk::{self, Handle};

use crate::backend::{GpuDevice, SurfaceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Success,
    Suboptimal,
    OutOfDate,
    Fail(vk::Result),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitIdle,
    DestroySurface,
    CreateFence { signaled: bool },
    DestroyFence,
    WaitFence,
    ResetFence,
    CreateSemaphore,
    DestroySemaphore,
    CreateRenderPass { format: vk::Format },
    DestroyRenderPass,
    CreateShaderModule,
    DestroyShaderModule,
    CreatePipelineLayout { push_constant_ranges: u32 },
    DestroyPipelineLayout,
    CreateGraphicsPipeline,
    DestroyPipeline,
    CreateSwapchain { min_image_count: u32, width: u32, height: u32 },
    DestroySwapchain,
    CreateImageView,
    DestroyImageView,
    CreateFramebuffer,
    DestroyFramebuffer,
    AllocateCommandBuffers(u32),
    FreeCommandBuffers(usize),
    BeginCommandBuffer(u64),
    EndCommandBuffer(u64),
    ImageBarrier {
        image: u64,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        new_layout: vk::ImageLayout,
    },
    BeginRenderPass { framebuffer: u64, clear: [f32; 4] },
    EndRenderPass,
    BindPipeline(u64),
    SetViewportAndScissor { width: u32, height: u32 },
    BindVertexBuffer(u64),
    Draw(u32),
    Acquire { swapchain: u64 },
    Submit(u64),
    Present { swapchain: u64, image_index: u32 },
}

/// Whether `call` destroys or frees a device object.
pub fn is_destroy(call: &Call) -> bool {
    matches!(
        call,
        Call::DestroySurface
            | Call::DestroyFence
            | Call::DestroySemaphore
            | Call::DestroyRenderPass
            | Call::DestroyShaderModule
            | Call::DestroyPipelineLayout
            | Call::DestroyPipeline
            | Call::DestroySwapchain
            | Call::DestroyImageView
            | Call::DestroyFramebuffer
            | Call::FreeCommandBuffers(_)
    )
}

struct MockState {
    calls: Vec<Call>,
    next_handle: u64,
    live: HashSet<u64>,
    invalid_uses: Vec<String>,
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    image_count: u32,
    swapchain_image_count: u32,
    next_image: u32,
    acquire_script: VecDeque<Scripted>,
    present_script: VecDeque<Scripted>,
    fence_wait_script: VecDeque<Result<(), vk::Result>>,
    framebuffer_failure: Option<(usize, vk::Result)>,
    framebuffers_created: usize,
}

impl MockState {
    fn create(&mut self, call: Call) -> u64 {
        self.calls.push(call);
        self.fresh()
    }

    fn fresh(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle);
        handle
    }

    fn destroy(&mut self, call: Call, handle: u64) {
        if !self.live.remove(&handle) {
            self.invalid_uses
                .push(format!("{call:?} on unknown handle {handle:#x}"));
        }
        self.calls.push(call);
    }

    fn check_live(&mut self, what: &str, handle: u64) {
        if !self.live.contains(&handle) {
            self.invalid_uses
                .push(format!("{what} on dead handle {handle:#x}"));
        }
    }
}

pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    /// Three images, three requested.
    pub fn new() -> Self {
        Self::with_images(3, 3)
    }

    /// `min_image_count` is what the surface asks for; `image_count` is what
    /// swapchain creation hands back.
    pub fn with_images(min_image_count: u32, image_count: u32) -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        };
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                next_handle: 0x1000,
                live: HashSet::new(),
                invalid_uses: Vec::new(),
                capabilities,
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                image_count,
                swapchain_image_count: 0,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fence_wait_script: VecDeque::new(),
                framebuffer_failure: None,
                framebuffers_created: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock lock poisoned")
    }

    /// A live surface handle that the window can take ownership of.
    pub fn fake_surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(self.state().fresh())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn live_object_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn invalid_uses(&self) -> Vec<String> {
        self.state().invalid_uses.clone()
    }

    pub fn capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        self.state().capabilities
    }

    pub fn set_current_extent(&self, extent: vk::Extent2D) {
        self.state().capabilities.current_extent = extent;
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state().formats = formats;
    }

    pub fn script_acquire(&self, results: impl IntoIterator<Item = Scripted>) {
        self.state().acquire_script.extend(results);
    }

    pub fn script_present(&self, results: impl IntoIterator<Item = Scripted>) {
        self.state().present_script.extend(results);
    }

    pub fn script_fence_wait(&self, results: impl IntoIterator<Item = Result<(), vk::Result>>) {
        self.state().fence_wait_script.extend(results);
    }

    /// Fail the `nth` (zero based) framebuffer creation from now on.
    pub fn fail_framebuffer_creation(&self, nth: usize, result: vk::Result) {
        let mut state = self.state();
        let created = state.framebuffers_created;
        state.framebuffer_failure = Some((created + nth, result));
    }
}

impl GpuDevice for MockDevice {
    fn wait_idle(&self) -> Result<(), vk::Result> {
        self.state().calls.push(Call::WaitIdle);
        Ok(())
    }

    fn graphics_queue_family(&self) -> u32 {
        0
    }

    unsafe fn surface_formats(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        Ok(self.state().formats.clone())
    }

    unsafe fn surface_capabilities(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        Ok(self.state().capabilities)
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.state().destroy(Call::DestroySurface, surface.as_raw());
    }

    unsafe fn create_raw_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result> {
        Ok(vk::Fence::from_raw(
            self.state().create(Call::CreateFence { signaled }),
        ))
    }

    unsafe fn destroy_raw_fence(&self, fence: vk::Fence) {
        self.state().destroy(Call::DestroyFence, fence.as_raw());
    }

    unsafe fn wait_for_raw_fence(
        &self,
        fence: vk::Fence,
        _timeout_ns: u64,
    ) -> Result<(), vk::Result> {
        let mut state = self.state();
        state.check_live("wait fence", fence.as_raw());
        state.calls.push(Call::WaitFence);
        state.fence_wait_script.pop_front().unwrap_or(Ok(()))
    }

    unsafe fn reset_raw_fence(&self, fence: vk::Fence) -> Result<(), vk::Result> {
        let mut state = self.state();
        state.check_live("reset fence", fence.as_raw());
        state.calls.push(Call::ResetFence);
        Ok(())
    }

    unsafe fn create_raw_semaphore(&self) -> Result<vk::Semaphore, vk::Result> {
        Ok(vk::Semaphore::from_raw(
            self.state().create(Call::CreateSemaphore),
        ))
    }

    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore) {
        self.state()
            .destroy(Call::DestroySemaphore, semaphore.as_raw());
    }

    unsafe fn create_raw_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass, vk::Result> {
        // SAFETY: callers pass one attachment description
        let format = unsafe { (*create_info.p_attachments).format };
        Ok(vk::RenderPass::from_raw(
            self.state().create(Call::CreateRenderPass { format }),
        ))
    }

    unsafe fn destroy_raw_render_pass(&self, render_pass: vk::RenderPass) {
        self.state()
            .destroy(Call::DestroyRenderPass, render_pass.as_raw());
    }

    unsafe fn create_raw_shader_module(
        &self,
        _create_info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule, vk::Result> {
        Ok(vk::ShaderModule::from_raw(
            self.state().create(Call::CreateShaderModule),
        ))
    }

    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule) {
        self.state()
            .destroy(Call::DestroyShaderModule, module.as_raw());
    }

    unsafe fn create_raw_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout, vk::Result> {
        let push_constant_ranges = create_info.push_constant_range_count;
        Ok(vk::PipelineLayout::from_raw(self.state().create(
            Call::CreatePipelineLayout {
                push_constant_ranges,
            },
        )))
    }

    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state()
            .destroy(Call::DestroyPipelineLayout, layout.as_raw());
    }

    unsafe fn create_raw_graphics_pipeline(
        &self,
        _create_info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, vk::Result> {
        Ok(vk::Pipeline::from_raw(
            self.state().create(Call::CreateGraphicsPipeline),
        ))
    }

    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline) {
        self.state().destroy(Call::DestroyPipeline, pipeline.as_raw());
    }

    unsafe fn create_raw_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR, vk::Result> {
        let mut state = self.state();
        state.check_live("create swapchain", create_info.surface.as_raw());
        state.swapchain_image_count = state.image_count;
        state.next_image = 0;
        let handle = state.create(Call::CreateSwapchain {
            min_image_count: create_info.min_image_count,
            width: create_info.image_extent.width,
            height: create_info.image_extent.height,
        });
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    unsafe fn get_raw_swapchain_images(
        &self,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>, vk::Result> {
        let mut state = self.state();
        state.check_live("get swapchain images", swapchain.as_raw());
        // Images belong to the swapchain, so they are not tracked as live.
        let base = state.next_handle;
        state.next_handle += u64::from(state.image_count);
        Ok((0..u64::from(state.image_count))
            .map(|i| vk::Image::from_raw(base + i))
            .collect())
    }

    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state()
            .destroy(Call::DestroySwapchain, swapchain.as_raw());
    }

    unsafe fn create_raw_image_view(
        &self,
        _create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, vk::Result> {
        Ok(vk::ImageView::from_raw(
            self.state().create(Call::CreateImageView),
        ))
    }

    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView) {
        self.state().destroy(Call::DestroyImageView, view.as_raw());
    }

    unsafe fn create_raw_framebuffer(
        &self,
        _create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer, vk::Result> {
        let mut state = self.state();
        let nth = state.framebuffers_created;
        state.framebuffers_created += 1;
        if let Some((fail_at, result)) = state.framebuffer_failure
            && fail_at == nth
        {
            state.framebuffer_failure = None;
            return Err(result);
        }
        Ok(vk::Framebuffer::from_raw(
            state.create(Call::CreateFramebuffer),
        ))
    }

    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state()
            .destroy(Call::DestroyFramebuffer, framebuffer.as_raw());
    }

    unsafe fn allocate_raw_command_buffers(
        &self,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, vk::Result> {
        let mut state = self.state();
        state.calls.push(Call::AllocateCommandBuffers(count));
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.fresh()))
            .collect())
    }

    unsafe fn free_raw_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        state
            .calls
            .push(Call::FreeCommandBuffers(command_buffers.len()));
        for command_buffer in command_buffers {
            if !state.live.remove(&command_buffer.as_raw()) {
                state
                    .invalid_uses
                    .push(format!("free of unknown command buffer {command_buffer:?}"));
            }
        }
    }

    unsafe fn begin_raw_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        self.state()
            .calls
            .push(Call::BeginCommandBuffer(command_buffer.as_raw()));
        Ok(())
    }

    unsafe fn end_raw_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        self.state()
            .calls
            .push(Call::EndCommandBuffer(command_buffer.as_raw()));
        Ok(())
    }

    unsafe fn cmd_image_barrier(
        &self,
        _command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    ) {
        self.state().calls.push(Call::ImageBarrier {
            image: barrier.image.as_raw(),
            src_stage,
            dst_stage,
            new_layout: barrier.new_layout,
        });
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
    ) {
        // SAFETY: the recording recipe passes exactly one float color clear
        let clear = unsafe { (*begin_info.p_clear_values).color.float32 };
        self.state().calls.push(Call::BeginRenderPass {
            framebuffer: begin_info.framebuffer.as_raw(),
            clear,
        });
    }

    unsafe fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.state().calls.push(Call::EndRenderPass);
    }

    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        _command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    ) {
        self.state()
            .calls
            .push(Call::BindPipeline(pipeline.as_raw()));
    }

    unsafe fn cmd_set_viewport_and_scissor(
        &self,
        _command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) {
        self.state().calls.push(Call::SetViewportAndScissor {
            width: extent.width,
            height: extent.height,
        });
    }

    unsafe fn cmd_bind_vertex_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
    ) {
        self.state()
            .calls
            .push(Call::BindVertexBuffer(buffer.as_raw()));
    }

    unsafe fn cmd_draw(&self, _command_buffer: vk::CommandBuffer, vertex_count: u32) {
        self.state().calls.push(Call::Draw(vertex_count));
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> SurfaceStatus<u32> {
        let mut state = self.state();
        state.check_live("acquire", swapchain.as_raw());
        state.check_live("acquire semaphore", semaphore.as_raw());
        state.calls.push(Call::Acquire {
            swapchain: swapchain.as_raw(),
        });
        let scripted = state.acquire_script.pop_front().unwrap_or(Scripted::Success);
        let mut next_index = || {
            let index = state.next_image;
            state.next_image = (index + 1) % state.swapchain_image_count.max(1);
            index
        };
        match scripted {
            Scripted::Success => SurfaceStatus::Ok(next_index()),
            Scripted::Suboptimal => SurfaceStatus::SurfaceSuboptimal(next_index()),
            Scripted::OutOfDate => SurfaceStatus::SurfaceOutOfDate,
            Scripted::Fail(e) => SurfaceStatus::Fatal(e),
        }
    }

    unsafe fn queue_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        let mut state = self.state();
        state.check_live("submit", command_buffer.as_raw());
        state.check_live("submit wait semaphore", wait_semaphore.as_raw());
        state.check_live("submit fence", fence.as_raw());
        if wait_stage != vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT {
            state
                .invalid_uses
                .push(format!("submit waits at {wait_stage:?}"));
        }
        state.calls.push(Call::Submit(command_buffer.as_raw()));
        Ok(())
    }

    unsafe fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
    ) -> SurfaceStatus<()> {
        let mut state = self.state();
        state.check_live("present", swapchain.as_raw());
        state.calls.push(Call::Present {
            swapchain: swapchain.as_raw(),
            image_index,
        });
        match state.present_script.pop_front().unwrap_or(Scripted::Success) {
            Scripted::Success => SurfaceStatus::Ok(()),
            Scripted::Suboptimal => SurfaceStatus::SurfaceSuboptimal(()),
            Scripted::OutOfDate => SurfaceStatus::SurfaceOutOfDate,
            Scripted::Fail(e) => SurfaceStatus::Fatal(e),
        }
    }
}
