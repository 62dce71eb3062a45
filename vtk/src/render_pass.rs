use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;

#[derive(Debug, Error)]
pub enum CreateRenderPassError {
    #[error("Vulkan error creating render pass: {0}")]
    Vulkan(vk::Result),
}

/// Single-subpass render pass with one color attachment that is cleared on
/// load, stored on end and left ready for presentation.
///
/// Created once per window. Its attachment format is pinned to the surface
/// format chosen at setup, which is why a window refuses to recreate onto a
/// different format.
pub struct RenderPass<B: GpuDevice> {
    parent: Arc<B>,
    handle: vk::RenderPass,
    format: vk::Format,
}

impl<B: GpuDevice> std::fmt::Debug for RenderPass<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("handle", &self.handle)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl<B: GpuDevice> RenderPass<B> {
    pub fn new(device: &Arc<B>, format: vk::Format) -> Result<Self, CreateRenderPassError> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        // SAFETY: create_info and the arrays it points to live until the call
        // returns.
        let handle = unsafe { device.create_raw_render_pass(&create_info) }
            .map_err(CreateRenderPassError::Vulkan)?;
        // SAFETY: fresh handle from device
        unsafe { device.set_debug_name(handle, "vtk render pass") };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            format,
        })
    }

    pub fn raw_handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl<B: GpuDevice> Drop for RenderPass<B> {
    fn drop(&mut self) {
        tracing::debug!("Dropping render pass {:?}", self.handle);
        // SAFETY: the owning window destroys framebuffers and pipelines that
        // reference this pass only after idling the device, and drops us in
        // the teardown order it documents.
        unsafe { self.parent.destroy_raw_render_pass(self.handle) };
    }
}
