use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;
use crate::buffer::Vertex;
use crate::render_pass::RenderPass;

const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

#[derive(Debug, Error)]
pub enum CreatePipelineError {
    #[error("SPIR-V byte slice length ({0}) is not a non-zero multiple of 4")]
    InvalidSpirvLength(usize),

    #[error("Vulkan error creating shader module: {0}")]
    ShaderModule(vk::Result),

    #[error("Vulkan error creating pipeline layout: {0}")]
    LayoutCreation(vk::Result),

    #[error("Vulkan error creating graphics pipeline: {0}")]
    PipelineCreation(vk::Result),
}

/// Input for [`GraphicsPipeline::new`].
///
/// Both shaders use the `main` entry point. A non-zero `push_constant_size`
/// adds one push constant range visible to the vertex stage.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    pub vertex_spirv: &'a [u8],
    pub fragment_spirv: &'a [u8],
    pub push_constant_size: u32,
}

/// Convert a SPIR-V byte stream into words.
///
/// Copies unconditionally, so the input needs no particular alignment.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, CreatePipelineError> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(CreatePipelineError::InvalidSpirvLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Shader module that only lives for the duration of pipeline creation.
struct TransientShaderModule<'a, B: GpuDevice> {
    device: &'a B,
    handle: vk::ShaderModule,
}

impl<'a, B: GpuDevice> TransientShaderModule<'a, B> {
    fn new(device: &'a B, spirv_bytes: &[u8]) -> Result<Self, CreatePipelineError> {
        let words = spirv_words(spirv_bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        // SAFETY: words outlives the call. Contents are the caller's SPIR-V,
        // which the driver validates.
        let handle = unsafe { device.create_raw_shader_module(&create_info) }
            .map_err(CreatePipelineError::ShaderModule)?;
        Ok(Self { device, handle })
    }
}

impl<B: GpuDevice> Drop for TransientShaderModule<'_, B> {
    fn drop(&mut self) {
        // SAFETY: pipelines do not keep a reference to their modules after
        // creation returns.
        unsafe { self.device.destroy_raw_shader_module(self.handle) };
    }
}

/// A graphics pipeline and the layout it owns.
///
/// Fixed state:
/// - Vertex input: one interleaved [`Vertex`] binding, position at location
///   0 and color at location 1
/// - Input assembly: `TRIANGLE_LIST`
/// - Viewport/scissor: dynamic, so the pipeline survives swapchain
///   recreation
/// - Rasterization: fill, no culling, clockwise front face
/// - Multisample: single sample
/// - Color blend: disabled, RGBA write mask
pub struct GraphicsPipeline<B: GpuDevice> {
    parent: Arc<B>,
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl<B: GpuDevice> std::fmt::Debug for GraphicsPipeline<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("handle", &self.handle)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl<B: GpuDevice> GraphicsPipeline<B> {
    pub fn new(
        device: &Arc<B>,
        render_pass: &RenderPass<B>,
        desc: &PipelineDesc<'_>,
    ) -> Result<Self, CreatePipelineError> {
        let vertex_module = TransientShaderModule::new(device.as_ref(), desc.vertex_spirv)?;
        let fragment_module = TransientShaderModule::new(device.as_ref(), desc.fragment_spirv)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(desc.push_constant_size)];
        let used_ranges = if desc.push_constant_size == 0 {
            &push_constant_ranges[..0]
        } else {
            &push_constant_ranges[..]
        };
        let layout_create_info =
            vk::PipelineLayoutCreateInfo::default().push_constant_ranges(used_ranges);
        // SAFETY: layout_create_info and its ranges live until the call returns
        let layout = unsafe { device.create_raw_pipeline_layout(&layout_create_info) }
            .map_err(CreatePipelineError::LayoutCreation)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module.handle)
                .name(SHADER_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module.handle)
                .name(SHADER_ENTRY_POINT),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Counts are required even though the values are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.raw_handle())
            .subpass(0);

        // SAFETY: create_info references live modules, layout and render pass
        // from device, and every state struct outlives the call.
        let handle = match unsafe { device.create_raw_graphics_pipeline(&create_info) } {
            Ok(handle) => handle,
            Err(e) => {
                // SAFETY: no pipeline was created with this layout
                unsafe { device.destroy_raw_pipeline_layout(layout) };
                return Err(CreatePipelineError::PipelineCreation(e));
            }
        };
        // SAFETY: fresh handles from device
        unsafe {
            device.set_debug_name(handle, "vtk graphics pipeline");
            device.set_debug_name(layout, "vtk pipeline layout");
        }

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            layout,
        })
    }

    pub fn raw_handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn raw_layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl<B: GpuDevice> Drop for GraphicsPipeline<B> {
    fn drop(&mut self) {
        tracing::debug!("Dropping pipeline {:?}", self.handle);
        // SAFETY: handles came from parent; the owning window idles the device
        // before dropping us. Pipeline goes before the layout it was built on.
        unsafe {
            self.parent.destroy_raw_pipeline(self.handle);
            self.parent.destroy_raw_pipeline_layout(self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDevice};

    const FAKE_SPIRV: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0, 0, 1, 0];

    #[test]
    fn spirv_words_are_little_endian() {
        assert_eq!(spirv_words(&FAKE_SPIRV).unwrap(), vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn spirv_length_must_be_word_multiple() {
        assert!(matches!(
            spirv_words(&[1, 2, 3]),
            Err(CreatePipelineError::InvalidSpirvLength(3))
        ));
        assert!(matches!(
            spirv_words(&[]),
            Err(CreatePipelineError::InvalidSpirvLength(0))
        ));
    }

    #[test]
    fn modules_are_destroyed_after_pipeline_creation() {
        let device = Arc::new(MockDevice::new());
        let pass = RenderPass::new(&device, vk::Format::B8G8R8A8_SRGB).unwrap();
        let desc = PipelineDesc {
            vertex_spirv: &FAKE_SPIRV,
            fragment_spirv: &FAKE_SPIRV,
            push_constant_size: 64,
        };
        let pipeline = GraphicsPipeline::new(&device, &pass, &desc).unwrap();

        let calls = device.calls();
        let created = calls
            .iter()
            .position(|c| *c == Call::CreateGraphicsPipeline)
            .unwrap();
        let destroyed: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Call::DestroyShaderModule)
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(destroyed.len(), 2);
        assert!(destroyed.iter().all(|&idx| idx > created));
        assert!(calls.contains(&Call::CreatePipelineLayout {
            push_constant_ranges: 1
        }));

        drop(pipeline);
        let calls = device.calls();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail, [Call::DestroyPipeline, Call::DestroyPipelineLayout]);
    }

    #[test]
    fn bad_fragment_shader_cleans_up_vertex_module() {
        let device = Arc::new(MockDevice::new());
        let pass = RenderPass::new(&device, vk::Format::B8G8R8A8_SRGB).unwrap();
        let desc = PipelineDesc {
            vertex_spirv: &FAKE_SPIRV,
            fragment_spirv: &FAKE_SPIRV[..5],
            push_constant_size: 0,
        };
        assert!(matches!(
            GraphicsPipeline::new(&device, &pass, &desc),
            Err(CreatePipelineError::InvalidSpirvLength(5))
        ));
        // only the render pass is left
        assert_eq!(device.live_object_count(), 1);
    }
}
