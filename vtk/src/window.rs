//! A presentable surface and the swapchain lifecycle built on top of it.
//!
//! States run `Uninitialized → Ready → (Stale → Ready)* → TornDown`. The
//! surface, sync objects, render pass and pipeline are created once in
//! setup. The swapchain generation (swapchain, views, framebuffers, command
//! buffers) is replaced as a whole on every recreation, and only after the
//! device has gone idle.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;

use crate::backend::GpuDevice;
use crate::buffer::BufferHandle;
use crate::command::{ClearColor, DrawCommands};
use crate::context::CreateSurfaceError;
use crate::device::Device;
use crate::pipeline::{CreatePipelineError, GraphicsPipeline, PipelineDesc};
use crate::platform::{ExtentAuthority, PlatformKind, PlatformWindow};
use crate::render_pass::{CreateRenderPassError, RenderPass};
use crate::swapchain::{self, SwapchainDesc, SwapchainError, SwapchainGeneration};
use crate::sync::{CreateFenceError, CreateSemaphoreError, Fence, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Ready,
    /// No usable swapchain generation. The next frame recreates first.
    Stale,
    TornDown,
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub preferred_format: vk::Format,
    pub clear_color: ClearColor,
    /// `None` derives the authority from the platform the window lives on.
    pub extent_authority: Option<ExtentAuthority>,
    pub fence_timeout_ns: u64,
    pub acquire_timeout_ns: u64,
    pub name: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            preferred_format: vk::Format::B8G8R8A8_SRGB,
            clear_color: ClearColor::default(),
            extent_authority: None,
            fence_timeout_ns: u64::MAX,
            acquire_timeout_ns: u64::MAX,
            name: "vtk window".to_owned(),
        }
    }
}

/// Optional triangle-drawing state. Without it a window only clears.
pub struct Geometry<'a> {
    pub pipeline: PipelineDesc<'a>,
    pub vertex_buffer: Arc<dyn BufferHandle + Send + Sync>,
    pub vertex_count: u32,
}

/// Messages a platform layer feeds into a window in place of callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    DrawableResized(vk::Extent2D),
    Close,
}

#[derive(Debug, Error)]
pub enum CreateWindowError {
    #[error("Could not get a window handle: {0}")]
    PlatformHandle(raw_window_handle::HandleError),

    #[error("Error creating surface: {0}")]
    Surface(#[from] CreateSurfaceError),

    #[error("Vulkan error querying present support: {0}")]
    PresentSupportQuery(vk::Result),

    #[error("The graphics queue family cannot present to this surface")]
    PresentUnsupported,

    #[error("Error creating fence: {0}")]
    Fence(#[from] CreateFenceError),

    #[error("Error creating semaphore: {0}")]
    Semaphore(#[from] CreateSemaphoreError),

    #[error("Error creating render pass: {0}")]
    RenderPass(#[from] CreateRenderPassError),

    #[error("Error creating pipeline: {0}")]
    Pipeline(#[from] CreatePipelineError),

    #[error("Error creating swapchain: {0}")]
    Swapchain(#[from] SwapchainError),
}

#[derive(Debug, Error)]
pub enum RecreateError {
    #[error("Vulkan error waiting for device idle: {0}")]
    WaitIdle(vk::Result),

    #[error(
        "Surface format changed from {expected:?}; the render pass cannot be reused \
         (now offered: {found:?})"
    )]
    SurfaceFormatChanged {
        expected: vk::SurfaceFormatKHR,
        found: Option<vk::SurfaceFormatKHR>,
    },

    #[error("Error rebuilding swapchain: {0}")]
    Swapchain(#[from] SwapchainError),
}

/// A presentable surface bound to one platform window.
///
/// Single writer: every operation takes `&mut self`, so one render tick at a
/// time. Several windows may share one device.
pub struct Window<B: GpuDevice> {
    pub(crate) device: Arc<B>,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) config: WindowConfig,
    pub(crate) authority: ExtentAuthority,
    pub(crate) state: SwapchainState,
    pub(crate) surface_format: vk::SurfaceFormatKHR,
    pub(crate) fence: Option<Fence<B>>,
    pub(crate) semaphore: Option<Semaphore<B>>,
    pub(crate) render_pass: Option<RenderPass<B>>,
    pub(crate) pipeline: Option<GraphicsPipeline<B>>,
    pub(crate) vertex_buffer: Option<(Arc<dyn BufferHandle + Send + Sync>, u32)>,
    pub(crate) swapchain: Option<SwapchainGeneration<B>>,
    pub(crate) drawable_extent: vk::Extent2D,
    pub(crate) generation: u64,
    pub(crate) recreations: u64,
}

impl<B: GpuDevice> std::fmt::Debug for Window<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("name", &self.config.name)
            .field("surface", &self.surface)
            .field("state", &self.state)
            .field("surface_format", &self.surface_format)
            .field("swapchain", &self.swapchain)
            .finish_non_exhaustive()
    }
}

impl Window<Device> {
    /// Create a surface for `platform_window` and set the window up on it.
    ///
    /// # Safety
    /// `platform_window`'s native window must outlive the returned `Window`.
    pub unsafe fn create(
        device: &Arc<Device>,
        platform_window: &impl PlatformWindow,
        config: WindowConfig,
        geometry: Option<Geometry<'_>>,
    ) -> Result<Self, CreateWindowError> {
        let platform =
            PlatformKind::from_window(platform_window).map_err(CreateWindowError::PlatformHandle)?;
        let authority = config
            .extent_authority
            .unwrap_or_else(|| platform.extent_authority());

        // SAFETY: Caller keeps the native window alive for the surface's
        // lifetime; the surface is destroyed by this window's teardown.
        let surface = unsafe { device.get_parent().create_raw_surface(platform_window) }?;

        // SAFETY: surface was just created from the device's context
        let supported = unsafe { device.supports_present(surface) };
        if supported != Ok(true) {
            // SAFETY: no swapchain exists on the surface yet
            unsafe { device.destroy_surface(surface) };
            return Err(match supported {
                Err(e) => CreateWindowError::PresentSupportQuery(e),
                Ok(_) => CreateWindowError::PresentUnsupported,
            });
        }

        tracing::info!(
            "Creating window {:?} on {platform:?} ({authority:?} extent authority)",
            config.name
        );

        let drawable_extent = platform_window.drawable_extent();
        let config = WindowConfig {
            extent_authority: Some(authority),
            ..config
        };
        // SAFETY: surface is live, from device's context and present-capable
        unsafe {
            Self::from_surface(Arc::clone(device), surface, drawable_extent, config, geometry)
        }
    }
}

impl<B: GpuDevice> Window<B> {
    /// Take ownership of `surface` and run setup on it.
    ///
    /// The surface is destroyed with the window, including when setup fails.
    ///
    /// # Safety
    /// `surface` must be a live surface from the instance `device` was
    /// created on, with no swapchain attached, and the device's graphics
    /// queue family must be able to present to it.
    pub unsafe fn from_surface(
        device: Arc<B>,
        surface: vk::SurfaceKHR,
        drawable_extent: vk::Extent2D,
        config: WindowConfig,
        geometry: Option<Geometry<'_>>,
    ) -> Result<Self, CreateWindowError> {
        let authority = config
            .extent_authority
            .unwrap_or(ExtentAuthority::SurfaceCapabilities);
        let mut window = Self {
            device,
            surface,
            config,
            authority,
            state: SwapchainState::Uninitialized,
            surface_format: vk::SurfaceFormatKHR::default(),
            fence: None,
            semaphore: None,
            render_pass: None,
            pipeline: None,
            vertex_buffer: None,
            swapchain: None,
            drawable_extent,
            generation: 0,
            recreations: 0,
        };
        // A failed setup drops `window`, which tears down what was built.
        window.setup(geometry)?;
        Ok(window)
    }

    fn setup(&mut self, geometry: Option<Geometry<'_>>) -> Result<(), CreateWindowError> {
        let _span = tracing::info_span!("window_setup", name = %self.config.name).entered();

        self.fence = Some(Fence::new(&self.device, true, "vtk frame fence")?);
        self.semaphore = Some(Semaphore::new(&self.device, "vtk image available")?);

        // SAFETY: surface is live for the window's lifetime
        let formats = unsafe { self.device.surface_formats(self.surface) }
            .map_err(SwapchainError::SurfaceQuery)?;
        self.surface_format =
            swapchain::choose_surface_format(&formats, self.config.preferred_format)?;
        tracing::info!(
            "Surface format {:?} / {:?}",
            self.surface_format.format,
            self.surface_format.color_space
        );

        let render_pass = RenderPass::new(&self.device, self.surface_format.format)?;
        if let Some(geometry) = geometry {
            self.pipeline = Some(GraphicsPipeline::new(
                &self.device,
                &render_pass,
                &geometry.pipeline,
            )?);
            self.vertex_buffer = Some((geometry.vertex_buffer, geometry.vertex_count));
        }
        self.render_pass = Some(render_pass);

        self.build_generation()?;
        Ok(())
    }

    /// Build and record a new swapchain generation at the current extent.
    ///
    /// Returns `Ok(false)` and leaves the window `Stale` when the extent is
    /// zero (a minimized window has nothing to present to).
    fn build_generation(&mut self) -> Result<bool, SwapchainError> {
        let Some(render_pass) = self.render_pass.as_ref() else {
            return Ok(false);
        };

        // SAFETY: surface is live for the window's lifetime
        let capabilities = unsafe { self.device.surface_capabilities(self.surface) }
            .map_err(SwapchainError::SurfaceQuery)?;
        let extent = swapchain::choose_extent(self.authority, &capabilities, self.drawable_extent);
        if extent.width == 0 || extent.height == 0 {
            tracing::info!("Drawable extent is zero, deferring swapchain creation");
            self.state = SwapchainState::Stale;
            return Ok(false);
        }

        let desc = SwapchainDesc {
            surface: self.surface,
            surface_format: self.surface_format,
            capabilities,
            extent,
            render_pass: render_pass.raw_handle(),
        };
        // SAFETY: every handle in desc is live and owned by this window, and
        // the previous generation (if any) has been dropped.
        let generation =
            unsafe { SwapchainGeneration::new(&self.device, &desc, self.generation + 1) }?;
        self.generation += 1;

        let draw = self.draw_commands();
        // SAFETY: render pass, pipeline and vertex buffer all outlive the
        // generation; its command buffers are fresh.
        unsafe {
            generation.record(
                render_pass.raw_handle(),
                self.config.clear_color,
                draw.as_ref(),
            )
        }?;

        self.swapchain = Some(generation);
        self.state = SwapchainState::Ready;
        Ok(true)
    }

    fn draw_commands(&self) -> Option<DrawCommands> {
        let pipeline = self.pipeline.as_ref()?;
        let (vertex_buffer, vertex_count) = self.vertex_buffer.as_ref()?;
        Some(DrawCommands {
            pipeline: pipeline.raw_handle(),
            vertex_buffer: vertex_buffer.raw_buffer(),
            vertex_count: *vertex_count,
        })
    }

    /// Tear down the current swapchain generation and build a new one.
    ///
    /// The device is idled before anything is destroyed. Returns whether a
    /// generation now exists; `false` means the extent is zero and the window
    /// stays `Stale`.
    pub fn recreate(&mut self) -> Result<bool, RecreateError> {
        if self.state == SwapchainState::TornDown {
            return Ok(false);
        }
        let _span = tracing::info_span!(
            "recreate_swapchain",
            name = %self.config.name,
            generation = self.generation
        )
        .entered();
        self.recreations += 1;

        self.device.wait_idle().map_err(RecreateError::WaitIdle)?;
        self.swapchain = None;
        self.state = SwapchainState::Stale;

        // SAFETY: surface is live for the window's lifetime
        let formats = unsafe { self.device.surface_formats(self.surface) }
            .map_err(SwapchainError::SurfaceQuery)?;
        match swapchain::choose_surface_format(&formats, self.config.preferred_format) {
            Ok(format) if format == self.surface_format => {}
            other => {
                return Err(RecreateError::SurfaceFormatChanged {
                    expected: self.surface_format,
                    found: other.ok(),
                });
            }
        }

        Ok(self.build_generation()?)
    }

    /// Record a new drawable extent reported by the platform.
    ///
    /// Under compositor authority the next frame notices the mismatch and
    /// recreates after presenting.
    pub fn set_drawable_extent(&mut self, extent: vk::Extent2D) {
        self.drawable_extent = extent;
    }

    pub fn handle_message(&mut self, message: WindowMessage) -> Result<(), vk::Result> {
        match message {
            WindowMessage::DrawableResized(extent) => {
                self.set_drawable_extent(extent);
                Ok(())
            }
            WindowMessage::Close => self.close(),
        }
    }

    /// Wait for the device to idle and destroy everything the window owns.
    ///
    /// Safe to call more than once. After it returns every frame reports
    /// [`crate::frame::FrameOutcome::Closed`]. A failed idle wait is returned
    /// after teardown completes.
    pub fn close(&mut self) -> Result<(), vk::Result> {
        if self.state == SwapchainState::TornDown {
            return Ok(());
        }
        let _span = tracing::info_span!("window_teardown", name = %self.config.name).entered();

        let idle = self.device.wait_idle();
        if let Err(e) = idle {
            tracing::error!("Error waiting for device idle before teardown: {e}");
        }

        if let Some(generation) = self.swapchain.as_mut() {
            // SAFETY: device is idle
            unsafe { generation.free_command_buffers() };
        }
        self.pipeline = None;
        self.render_pass = None;
        self.swapchain = None;
        self.semaphore = None;
        self.fence = None;
        self.vertex_buffer = None;
        if self.surface != vk::SurfaceKHR::null() {
            tracing::debug!("Dropping surface {:?}", self.surface);
            // SAFETY: the swapchain built on it is gone and the surface is
            // owned by this window
            unsafe { self.device.destroy_surface(self.surface) };
            self.surface = vk::SurfaceKHR::null();
        }
        self.state = SwapchainState::TornDown;
        idle
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Number of swapchain generations created so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times recreation has run.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(SwapchainGeneration::extent)
    }

    pub fn drawable_extent(&self) -> vk::Extent2D {
        self.drawable_extent
    }

    pub fn extent_authority(&self) -> ExtentAuthority {
        self.authority
    }

    pub fn swapchain(&self) -> Option<&SwapchainGeneration<B>> {
        self.swapchain.as_ref()
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<B> {
        &self.device
    }
}

impl<B: GpuDevice> Drop for Window<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Error closing window {:?} during drop: {e}", self.config.name);
        }
    }
}
