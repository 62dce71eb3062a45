use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;
use crate::command::{self, ClearColor, DrawCommands, FrameTarget, RecordCommandsError};
use crate::platform::ExtentAuthority;

#[derive(Debug, Error)]
pub enum SwapchainError {
    #[error("Drawable extent is zero; nothing to present to")]
    ZeroExtent,

    #[error("Surface does not offer preferred format {preferred:?}")]
    NoMatchingFormat { preferred: vk::Format },

    #[error("Failed while querying surface support details: {0}")]
    SurfaceQuery(vk::Result),

    #[error("Vulkan error creating swapchain: {0}")]
    VulkanCreate(vk::Result),

    #[error("Vulkan error fetching swapchain images: {0}")]
    GetImages(vk::Result),

    #[error("Vulkan error creating swapchain image view: {0}")]
    ImageView(vk::Result),

    #[error("Vulkan error creating framebuffer: {0}")]
    Framebuffer(vk::Result),

    #[error("Vulkan error allocating command buffers: {0}")]
    AllocateCommandBuffers(vk::Result),

    #[error("Error recording command buffers: {0}")]
    Record(#[from] RecordCommandsError),
}

/// Pick the first surface format whose `format` equals `preferred`.
///
/// There is no fallback: the render pass is built for one format, and a
/// silent substitute would hide a mismatch.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::Format,
) -> Result<vk::SurfaceFormatKHR, SwapchainError> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == preferred)
        .ok_or(SwapchainError::NoMatchingFormat { preferred })
}

/// Swapchain extent for the given authority.
///
/// Under [`ExtentAuthority::Compositor`] the drawable extent reported by the
/// platform wins. Otherwise the surface's current extent is used, unless it
/// is the `u32::MAX` "you decide" sentinel, in which case the drawable
/// extent is clamped into the supported range.
pub fn choose_extent(
    authority: ExtentAuthority,
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_extent: vk::Extent2D,
) -> vk::Extent2D {
    match authority {
        ExtentAuthority::Compositor => drawable_extent,
        ExtentAuthority::SurfaceCapabilities if capabilities.current_extent.width != u32::MAX => {
            capabilities.current_extent
        }
        ExtentAuthority::SurfaceCapabilities => vk::Extent2D {
            width: drawable_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        },
    }
}

/// Request exactly the surface's minimum. The driver may hand back more.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    capabilities.min_image_count.max(1)
}

/// Opaque when offered. Surfaces without it (common on Android) fall back to
/// pre-multiplied, then post-multiplied, then inherit.
pub fn choose_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    let supported = capabilities.supported_composite_alpha;
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|alpha| supported.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

pub(crate) fn create_default_swapchain_image_views<FCreate, FDestroy>(
    images: &[vk::Image],
    format: vk::Format,
    mut create_image_view: FCreate,
    mut destroy_image_view: FDestroy,
) -> Result<Vec<vk::ImageView>, SwapchainError>
where
    FCreate: FnMut(&vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView, vk::Result>,
    FDestroy: FnMut(vk::ImageView),
{
    let mut image_views = Vec::with_capacity(images.len());
    for image in images.iter().copied() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        match create_image_view(&create_info) {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for created_view in image_views.drain(..) {
                    destroy_image_view(created_view);
                }
                return Err(SwapchainError::ImageView(e));
            }
        }
    }
    Ok(image_views)
}

pub(crate) fn create_framebuffers<FCreate, FDestroy>(
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    mut create_framebuffer: FCreate,
    mut destroy_framebuffer: FDestroy,
) -> Result<Vec<vk::Framebuffer>, SwapchainError>
where
    FCreate: FnMut(&vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer, vk::Result>,
    FDestroy: FnMut(vk::Framebuffer),
{
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for view in image_views {
        let attachments = std::slice::from_ref(view);
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match create_framebuffer(&create_info) {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for created in framebuffers.drain(..) {
                    destroy_framebuffer(created);
                }
                return Err(SwapchainError::Framebuffer(e));
            }
        }
    }
    Ok(framebuffers)
}

/// What a new swapchain generation is built from.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
}

/// One swapchain plus everything derived from its images.
///
/// Built and torn down as a unit: a window replaces its generation wholesale
/// on every recreation. Every per-image vector has the same length as
/// `images`, which may exceed the requested minimum image count.
pub struct SwapchainGeneration<B: GpuDevice> {
    device: Arc<B>,
    index: u64,
    handle: vk::SwapchainKHR,
    extent: vk::Extent2D,
    min_image_count: u32,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl<B: GpuDevice> std::fmt::Debug for SwapchainGeneration<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapchainGeneration")
            .field("index", &self.index)
            .field("handle", &self.handle)
            .field("extent", &self.extent)
            .field("image_count", &self.images.len())
            .finish_non_exhaustive()
    }
}

impl<B: GpuDevice> SwapchainGeneration<B> {
    /// Create the swapchain, views, framebuffers and (unrecorded) command
    /// buffers for generation `index`.
    ///
    /// On failure everything created so far is destroyed before returning.
    ///
    /// # Safety
    /// Every handle in `desc` must be live and derived from `device`. The
    /// surface must not have another live swapchain.
    pub unsafe fn new(
        device: &Arc<B>,
        desc: &SwapchainDesc,
        index: u64,
    ) -> Result<Self, SwapchainError> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(SwapchainError::ZeroExtent);
        }

        let min_image_count = choose_image_count(&desc.capabilities);
        let queue_family_indices = [device.graphics_queue_family()];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(desc.capabilities.current_transform)
            .composite_alpha(choose_composite_alpha(&desc.capabilities))
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        // SAFETY: Caller guarantees the surface is live and free; the rest of
        // create_info comes from its queried capabilities.
        let handle = unsafe { device.create_raw_swapchain(&create_info) }
            .map_err(SwapchainError::VulkanCreate)?;

        // From here on Drop cleans up whatever has been filled in.
        let mut generation = Self {
            device: Arc::clone(device),
            index,
            handle,
            extent: desc.extent,
            min_image_count,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
        };
        // SAFETY: handle is a live swapchain from device.
        unsafe { device.set_debug_name(handle, &format!("vtk swapchain {index}")) };

        // SAFETY: handle is live
        generation.images =
            unsafe { device.get_raw_swapchain_images(handle) }.map_err(SwapchainError::GetImages)?;

        generation.image_views = create_default_swapchain_image_views(
            &generation.images,
            desc.surface_format.format,
            // SAFETY: create_info references a live swapchain image from
            // device with a plain 2D color subresource range.
            |create_info| unsafe { device.create_raw_image_view(create_info) },
            // SAFETY: view was just created and nothing references it yet.
            |view| unsafe { device.destroy_raw_image_view(view) },
        )?;

        generation.framebuffers = create_framebuffers(
            &generation.image_views,
            desc.render_pass,
            desc.extent,
            // SAFETY: create_info references a live render pass and view.
            |create_info| unsafe { device.create_raw_framebuffer(create_info) },
            // SAFETY: framebuffer was just created and is unused.
            |framebuffer| unsafe { device.destroy_raw_framebuffer(framebuffer) },
        )?;

        let image_count = generation.images.len() as u32;
        generation.command_buffers = device
            // SAFETY: we hold the pool lock for the allocation
            .with_command_pool(|| unsafe { device.allocate_raw_command_buffers(image_count) })
            .map_err(SwapchainError::AllocateCommandBuffers)?;

        for (i, ((view, framebuffer), command_buffer)) in generation
            .image_views
            .iter()
            .zip(&generation.framebuffers)
            .zip(&generation.command_buffers)
            .enumerate()
        {
            // SAFETY: all three were created from device above.
            unsafe {
                device.set_debug_name(*view, &format!("vtk swapchain {index} view {i}"));
                device.set_debug_name(
                    *framebuffer,
                    &format!("vtk swapchain {index} framebuffer {i}"),
                );
                device.set_debug_name(
                    *command_buffer,
                    &format!("vtk swapchain {index} command buffer {i}"),
                );
            }
        }

        tracing::debug!(
            "Created swapchain generation {index}: {} images ({} requested) at {}x{}",
            generation.images.len(),
            min_image_count,
            desc.extent.width,
            desc.extent.height,
        );
        Ok(generation)
    }

    /// Record one command buffer per image.
    ///
    /// # Safety
    /// `render_pass` and everything in `draw` must be live and outlive this
    /// generation. None of the command buffers may be pending.
    pub unsafe fn record(
        &self,
        render_pass: vk::RenderPass,
        clear: ClearColor,
        draw: Option<&DrawCommands>,
    ) -> Result<(), RecordCommandsError> {
        self.device.with_command_pool(|| {
            for (i, command_buffer) in self.command_buffers.iter().copied().enumerate() {
                let target = FrameTarget {
                    image: self.images[i],
                    framebuffer: self.framebuffers[i],
                    extent: self.extent,
                };
                // SAFETY: pool lock held; caller guarantees liveness and that
                // the buffer is idle.
                unsafe {
                    command::record_frame_commands(
                        self.device.as_ref(),
                        command_buffer,
                        render_pass,
                        &target,
                        clear,
                        draw,
                    )
                }?;
            }
            Ok(())
        })
    }

    /// Return the command buffers to the device pool.
    ///
    /// Full teardown frees them ahead of the pipeline and render pass;
    /// otherwise drop does it.
    ///
    /// # Safety
    /// None of the command buffers may be pending.
    pub unsafe fn free_command_buffers(&mut self) {
        if self.command_buffers.is_empty() {
            return;
        }
        let command_buffers = std::mem::take(&mut self.command_buffers);
        self.device.with_command_pool(|| {
            // SAFETY: pool lock held; caller guarantees they are idle.
            unsafe { self.device.free_raw_command_buffers(&command_buffers) }
        });
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn raw_handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }
}

impl<B: GpuDevice> Drop for SwapchainGeneration<B> {
    fn drop(&mut self) {
        tracing::debug!("Dropping swapchain generation {} {:?}", self.index, self.handle);
        // Owners idle the device before dropping a generation, so none of
        // this is still in use. Framebuffers reference views, views reference
        // swapchain images, so destroy in that order.
        // SAFETY: see above
        unsafe { self.free_command_buffers() };
        for framebuffer in self.framebuffers.drain(..) {
            // SAFETY: created from device, idle
            unsafe { self.device.destroy_raw_framebuffer(framebuffer) };
        }
        for view in self.image_views.drain(..) {
            // SAFETY: created from device, no framebuffer references it now
            unsafe { self.device.destroy_raw_image_view(view) };
        }
        // Images belong to the swapchain and go with it.
        self.images.clear();
        // SAFETY: created from device, every view over its images is gone
        unsafe { self.device.destroy_raw_swapchain(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockDevice};
    use ash::vk::Handle;
    use std::cell::RefCell;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn choose_surface_format_takes_first_exact_match() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        for _ in 0..3 {
            let chosen = choose_surface_format(&formats, vk::Format::B8G8R8A8_SRGB).unwrap();
            assert_eq!(chosen, formats[1]);
        }
    }

    #[test]
    fn choose_surface_format_never_falls_back() {
        let formats = [format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert!(matches!(
            choose_surface_format(&formats, vk::Format::B8G8R8A8_SRGB),
            Err(SwapchainError::NoMatchingFormat {
                preferred: vk::Format::B8G8R8A8_SRGB
            })
        ));
        assert!(choose_surface_format(&[], vk::Format::B8G8R8A8_SRGB).is_err());
    }

    #[test]
    fn choose_extent_uses_current_when_fixed() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let drawable = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        assert_eq!(
            choose_extent(ExtentAuthority::SurfaceCapabilities, &capabilities, drawable),
            capabilities.current_extent
        );
        assert_eq!(
            choose_extent(ExtentAuthority::Compositor, &capabilities, drawable),
            drawable
        );
    }

    #[test]
    fn choose_extent_clamps_when_variable() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let chosen = choose_extent(
            ExtentAuthority::SurfaceCapabilities,
            &capabilities,
            vk::Extent2D {
                width: 4000,
                height: 200,
            },
        );

        assert_eq!(chosen.width, 1920);
        assert_eq!(chosen.height, 480);
    }

    #[test]
    fn choose_image_count_is_the_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 2);
    }

    #[test]
    fn choose_composite_alpha_falls_back_in_order() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
                | vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        };
        assert_eq!(
            choose_composite_alpha(&capabilities),
            vk::CompositeAlphaFlagsKHR::OPAQUE
        );
        capabilities.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED;
        assert_eq!(
            choose_composite_alpha(&capabilities),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
        capabilities.supported_composite_alpha =
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(
            choose_composite_alpha(&capabilities),
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );
        capabilities.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::empty();
        assert_eq!(
            choose_composite_alpha(&capabilities),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }

    #[test]
    fn image_view_helper_cleans_up_on_partial_failure() {
        let images = [
            vk::Image::from_raw(1),
            vk::Image::from_raw(2),
            vk::Image::from_raw(3),
        ];
        let created_views = [vk::ImageView::from_raw(10), vk::ImageView::from_raw(11)];
        let create_calls = RefCell::new(0usize);
        let destroyed = RefCell::new(Vec::<vk::ImageView>::new());

        let result = create_default_swapchain_image_views(
            &images,
            vk::Format::B8G8R8A8_SRGB,
            |_| {
                let mut call = create_calls.borrow_mut();
                let ret = match *call {
                    0 | 1 => Ok(created_views[*call]),
                    _ => Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
                };
                *call += 1;
                ret
            },
            |view| destroyed.borrow_mut().push(view),
        );

        assert!(matches!(
            result,
            Err(SwapchainError::ImageView(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert_eq!(destroyed.borrow().as_slice(), &created_views);
    }

    #[test]
    fn framebuffer_helper_attaches_one_view_each() {
        let views = [vk::ImageView::from_raw(100), vk::ImageView::from_raw(101)];
        let seen = RefCell::new(Vec::new());
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let framebuffers = create_framebuffers(
            &views,
            vk::RenderPass::from_raw(9),
            extent,
            |create_info| {
                // SAFETY: attachments points at one view for the duration of
                // the call
                let attachment = unsafe { *create_info.p_attachments };
                seen.borrow_mut().push((
                    attachment,
                    create_info.attachment_count,
                    create_info.width,
                    create_info.layers,
                ));
                Ok(vk::Framebuffer::from_raw(attachment.as_raw() + 1000))
            },
            |_| panic!("destroy callback should not be called on success"),
        )
        .unwrap();

        assert_eq!(
            framebuffers,
            [vk::Framebuffer::from_raw(1100), vk::Framebuffer::from_raw(1101)]
        );
        assert_eq!(
            seen.into_inner(),
            vec![(views[0], 1, 800, 1), (views[1], 1, 800, 1)]
        );
    }

    #[test]
    fn framebuffer_helper_cleans_up_on_partial_failure() {
        let views = [
            vk::ImageView::from_raw(1),
            vk::ImageView::from_raw(2),
            vk::ImageView::from_raw(3),
        ];
        let destroyed = RefCell::new(Vec::new());
        let result = create_framebuffers(
            &views,
            vk::RenderPass::from_raw(9),
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            // SAFETY: attachments points at one view for the call
            |create_info| match unsafe { *create_info.p_attachments }.as_raw() {
                3 => Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
                raw => Ok(vk::Framebuffer::from_raw(raw + 10)),
            },
            |framebuffer| destroyed.borrow_mut().push(framebuffer.as_raw()),
        );

        assert!(matches!(
            result,
            Err(SwapchainError::Framebuffer(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
        ));
        assert_eq!(destroyed.into_inner(), vec![11, 12]);
    }

    fn desc(device: &MockDevice) -> SwapchainDesc {
        SwapchainDesc {
            surface: vk::SurfaceKHR::from_raw(1),
            surface_format: format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            capabilities: device.capabilities(),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            render_pass: vk::RenderPass::from_raw(2),
        }
    }

    #[test]
    fn generation_counts_match_returned_image_count() {
        // Driver hands back more images than the minimum we asked for.
        let device = Arc::new(MockDevice::with_images(2, 3));
        // SAFETY: mock device
        let generation = unsafe { SwapchainGeneration::new(&device, &desc(&device), 1) }.unwrap();

        assert_eq!(generation.min_image_count(), 2);
        assert_eq!(generation.image_count(), 3);
        assert_eq!(generation.image_views().len(), 3);
        assert_eq!(generation.framebuffers().len(), 3);
        assert_eq!(generation.command_buffers().len(), 3);
        assert!(device.calls().contains(&Call::CreateSwapchain {
            min_image_count: 2,
            width: 640,
            height: 480,
        }));
    }

    #[test]
    fn generation_drop_destroys_in_reverse_dependency_order() {
        let device = Arc::new(MockDevice::with_images(2, 2));
        // SAFETY: mock device
        let generation = unsafe { SwapchainGeneration::new(&device, &desc(&device), 1) }.unwrap();
        device.clear_calls();
        drop(generation);

        assert_eq!(
            device.calls(),
            vec![
                Call::FreeCommandBuffers(2),
                Call::DestroyFramebuffer,
                Call::DestroyFramebuffer,
                Call::DestroyImageView,
                Call::DestroyImageView,
                Call::DestroySwapchain,
            ]
        );
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn failed_framebuffer_leaves_nothing_behind() {
        let device = Arc::new(MockDevice::with_images(3, 3));
        device.fail_framebuffer_creation(2, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        // SAFETY: mock device
        let result = unsafe { SwapchainGeneration::new(&device, &desc(&device), 1) };
        assert!(matches!(result, Err(SwapchainError::Framebuffer(_))));
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn zero_extent_creates_nothing() {
        let device = Arc::new(MockDevice::new());
        let mut zero = desc(&device);
        zero.extent.width = 0;
        // SAFETY: mock device
        let result = unsafe { SwapchainGeneration::new(&device, &zero, 1) };
        assert!(matches!(result, Err(SwapchainError::ZeroExtent)));
        assert!(device.calls().is_empty());
    }
}
