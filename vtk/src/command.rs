use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;

/// RGBA clear value for the color attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor(pub [f32; 4]);

impl Default for ClearColor {
    /// Magenta, so an unrendered surface is obvious.
    fn default() -> Self {
        Self([1.0, 0.0, 1.0, 1.0])
    }
}

impl From<ClearColor> for vk::ClearValue {
    fn from(color: ClearColor) -> Self {
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color.0 },
        }
    }
}

/// Draw state recorded after the clear when a window has geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommands {
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
}

/// The per-image objects a command buffer renders into.
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub image: vk::Image,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

#[derive(Debug, Error)]
pub enum RecordCommandsError {
    #[error("Vulkan error beginning command buffer: {0}")]
    Begin(vk::Result),
    #[error("Vulkan error ending command buffer: {0}")]
    End(vk::Result),
}

/// Record the fixed frame recipe into `command_buffer`:
/// layout barrier, render pass with clear, optional draw, end.
///
/// The buffer is re-recorded only when the swapchain is rebuilt, so it is
/// submitted many times as-is.
///
/// # Safety
/// Must run inside [`GpuDevice::with_command_pool`]. `command_buffer` must
/// not be pending. Every handle in `target`, `render_pass` and `draw` must be
/// live and must outlive every submission of the recorded buffer.
pub unsafe fn record_frame_commands<B: GpuDevice>(
    device: &B,
    command_buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    target: &FrameTarget,
    clear: ClearColor,
    draw: Option<&DrawCommands>,
) -> Result<(), RecordCommandsError> {
    // SAFETY: Caller guarantees the buffer is idle and the pool lock is held.
    unsafe { device.begin_raw_command_buffer(command_buffer) }
        .map_err(RecordCommandsError::Begin)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(target.image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let clear_values = [vk::ClearValue::from(clear)];
    let begin_info = vk::RenderPassBeginInfo::default()
        .render_pass(render_pass)
        .framebuffer(target.framebuffer)
        .render_area(vk::Rect2D::default().extent(target.extent))
        .clear_values(&clear_values);

    // SAFETY: buffer is recording (begin succeeded) and outside a render
    // pass; the caller guarantees every referenced handle is live.
    unsafe {
        device.cmd_image_barrier(
            command_buffer,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            &barrier,
        );
        device.cmd_begin_render_pass(command_buffer, &begin_info);
        if let Some(draw) = draw {
            device.cmd_bind_graphics_pipeline(command_buffer, draw.pipeline);
            device.cmd_set_viewport_and_scissor(command_buffer, target.extent);
            device.cmd_bind_vertex_buffer(command_buffer, draw.vertex_buffer);
            device.cmd_draw(command_buffer, draw.vertex_count);
        }
        device.cmd_end_render_pass(command_buffer);
    }

    // SAFETY: buffer is recording
    unsafe { device.end_raw_command_buffer(command_buffer) }.map_err(RecordCommandsError::End)
}
