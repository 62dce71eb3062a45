use std::ffi::{CStr, CString};
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use gpu_allocator::{
    AllocationError, MemoryLocation,
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc},
};
use thiserror::Error;

use crate::backend::{GpuDevice, SurfaceStatus};
use crate::context::{Context, FetchPhysicalDeviceError, VkVersion};

/// How [`Device::new`] picks a physical adapter.
///
/// Adapter type is always logged, but only `PreferDiscrete` uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterPreference {
    /// Adapter index 0, whatever it is. Fails if it has no graphics queue.
    #[default]
    First,
    /// The first adapter that has a graphics-capable queue family.
    FirstWithGraphics,
    /// The first discrete GPU with a graphics queue family, falling back to
    /// `FirstWithGraphics`.
    PreferDiscrete,
}

#[derive(Debug, Default, Clone)]
pub struct DeviceConfig {
    pub adapter: AdapterPreference,
}

/// The parts of a physical adapter that selection looks at.
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub queue_flags: Vec<vk::QueueFlags>,
}

#[derive(Debug, Error)]
pub enum CreateDeviceError {
    #[error("No Vulkan adapters are available")]
    NoAdapters,

    #[error("Adapter {adapter} has no graphics-capable queue family")]
    NoGraphicsQueue { adapter: usize },

    #[error("No adapter has a graphics-capable queue family")]
    NoSuitableAdapter,

    #[error("Error enumerating adapters: {0}")]
    FetchPhysicalDevices(#[from] FetchPhysicalDeviceError),

    #[error("Vulkan error enumerating device extensions: {0}")]
    EnumerateExtensions(vk::Result),

    #[error("Selected adapter does not support VK_KHR_swapchain")]
    MissingSwapchainExtension,

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Failed to create command pool: {0}")]
    CommandPoolCreation(vk::Result),

    #[error("Failed to create memory allocator: {0}")]
    Allocator(AllocationError),
}

/// Index of the first queue family whose flags include `GRAPHICS`.
pub fn find_graphics_queue_family(queue_flags: &[vk::QueueFlags]) -> Option<u32> {
    queue_flags
        .iter()
        .position(|flags| flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|idx| idx as u32)
}

/// Pick `(adapter index, graphics queue family index)`.
pub fn select_adapter(
    candidates: &[AdapterCandidate],
    preference: AdapterPreference,
) -> Result<(usize, u32), CreateDeviceError> {
    if candidates.is_empty() {
        return Err(CreateDeviceError::NoAdapters);
    }

    let first_with_graphics = |filter: &dyn Fn(&AdapterCandidate) -> bool| {
        candidates.iter().enumerate().find_map(|(idx, candidate)| {
            if !filter(candidate) {
                return None;
            }
            find_graphics_queue_family(&candidate.queue_flags).map(|family| (idx, family))
        })
    };

    match preference {
        AdapterPreference::First => find_graphics_queue_family(&candidates[0].queue_flags)
            .map(|family| (0, family))
            .ok_or(CreateDeviceError::NoGraphicsQueue { adapter: 0 }),
        AdapterPreference::FirstWithGraphics => {
            first_with_graphics(&|_| true).ok_or(CreateDeviceError::NoSuitableAdapter)
        }
        AdapterPreference::PreferDiscrete => first_with_graphics(&|candidate| {
            candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
        })
        .or_else(|| first_with_graphics(&|_| true))
        .ok_or(CreateDeviceError::NoSuitableAdapter),
    }
}

type AdapterInfo = (
    vk::PhysicalDevice,
    vk::PhysicalDeviceProperties,
    Vec<vk::QueueFamilyProperties>,
);

/// A logical device with one graphics queue and one command pool.
///
/// The queue sits behind a mutex so that several windows sharing a device
/// serialize their submits and presents. The command pool has its own lock,
/// taken through [`GpuDevice::with_command_pool`].
pub struct Device {
    parent: Arc<Context>,
    handle: ash::Device,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    swapchain_device: ash::khr::swapchain::Device,
    debug_utils_device: Option<ash::ext::debug_utils::Device>,
    queue: Mutex<vk::Queue>,
    queue_family: u32,
    command_pool: vk::CommandPool,
    command_pool_lock: Mutex<()>,
    allocator: Option<Mutex<Allocator>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle.handle())
            .field("queue_family", &self.queue_family)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.handle.handle());
        if let Err(e) = self.wait_idle() {
            tracing::error!("Error waiting for device idle during drop: {e}");
        }
        // SAFETY: Every command buffer from this pool belongs to a window,
        // and windows hold an Arc to us, so none remain.
        unsafe { self.handle.destroy_command_pool(self.command_pool, None) };
        // Allocations borrow the device, so the allocator goes before it.
        self.allocator = None;
        //SAFETY: All objects derived from this device are gone (they hold an
        //Arc to it)
        unsafe { self.handle.destroy_device(None) };
    }
}

impl Device {
    pub fn new(context: &Arc<Context>, config: DeviceConfig) -> Result<Self, CreateDeviceError> {
        let _span = tracing::info_span!("device_init").entered();

        let physical_devices = context.fetch_physical_devices()?;

        let adapters: Vec<AdapterInfo> = physical_devices
            .iter()
            .map(|&dev| {
                //SAFETY: dev was derived from context
                let props = unsafe { context.get_raw_physical_device_properties(dev) };
                //SAFETY: dev was derived from context
                let queue_families =
                    unsafe { context.get_raw_physical_device_queue_family_properties(dev) };
                (dev, props, queue_families)
            })
            .collect();

        for (idx, (_, props, _)) in adapters.iter().enumerate() {
            tracing::info!(
                "Adapter {idx}: {:?} (type: {:?}, api: {})",
                props.device_name_as_c_str().unwrap_or(c"unknown"),
                props.device_type,
                VkVersion::from_raw(props.api_version),
            );
        }

        let candidates: Vec<AdapterCandidate> = adapters
            .iter()
            .map(|(_, props, families)| AdapterCandidate {
                device_type: props.device_type,
                queue_flags: families.iter().map(|f| f.queue_flags).collect(),
            })
            .collect();
        let (adapter_index, queue_family) = select_adapter(&candidates, config.adapter)?;
        let (physical_device, properties, _) = adapters[adapter_index];

        tracing::info!(
            "Selected adapter {adapter_index}: {:?}, graphics queue family {queue_family}",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
        );

        //SAFETY: physical_device was derived from context
        let available_exts =
            unsafe { context.enumerate_raw_device_extension_properties(physical_device) }
                .map_err(CreateDeviceError::EnumerateExtensions)?;
        let has_ext = |name: &CStr| {
            available_exts
                .iter()
                .any(|ext| ext.extension_name_as_c_str() == Ok(name))
        };
        if !has_ext(ash::khr::swapchain::NAME) {
            return Err(CreateDeviceError::MissingSwapchainExtension);
        }
        let mut enabled_exts = vec![ash::khr::swapchain::NAME.as_ptr()];
        // MoltenVK and friends advertise this and require it to be enabled
        if has_ext(ash::khr::portability_subset::NAME) {
            tracing::info!("Enabling VK_KHR_portability_subset");
            enabled_exts.push(ash::khr::portability_subset::NAME.as_ptr());
        }

        let priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_exts);

        //SAFETY: physical_device was derived from context, create info is
        //valid for the call
        let handle = unsafe { context.create_ash_device(physical_device, &device_create_info) }
            .map_err(CreateDeviceError::DeviceCreation)?;

        //SAFETY: We asked for exactly one queue from this family
        let queue = unsafe { handle.get_device_queue(queue_family, 0) };

        // Windows re-record single buffers after every swapchain rebuild, so
        // the pool must allow resetting them one at a time.
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        //SAFETY: queue_family is valid for this device
        let command_pool = match unsafe { handle.create_command_pool(&pool_create_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                //SAFETY: nothing else has been created from the device yet
                unsafe { handle.destroy_device(None) };
                return Err(CreateDeviceError::CommandPoolCreation(e));
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: context.ash_instance().clone(),
            device: handle.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                //SAFETY: the pool is the only child object and is unused
                unsafe {
                    handle.destroy_command_pool(command_pool, None);
                    handle.destroy_device(None);
                }
                return Err(CreateDeviceError::Allocator(e));
            }
        };

        let device = Self {
            parent: Arc::clone(context),
            swapchain_device: context.create_swapchain_loader(&handle),
            debug_utils_device: context.create_debug_utils_device_loader(&handle),
            handle,
            physical_device,
            properties,
            queue: Mutex::new(queue),
            queue_family,
            command_pool,
            command_pool_lock: Mutex::new(()),
            allocator: Some(Mutex::new(allocator)),
        };
        // SAFETY: the pool is a live object of this device
        unsafe { device.set_debug_name(command_pool, "vtk command pool") };
        Ok(device)
    }

    pub fn get_parent(&self) -> &Arc<Context> {
        &self.parent
    }

    pub fn get_physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn ash_handle(&self) -> &ash::Device {
        &self.handle
    }

    pub fn raw_handle(&self) -> vk::Device {
        self.handle.handle()
    }

    pub fn raw_command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Whether the graphics queue family can present to `surface`.
    ///
    /// # Safety
    /// `surface` must be a live surface created from this device's context.
    pub unsafe fn supports_present(&self, surface: vk::SurfaceKHR) -> Result<bool, vk::Result> {
        // SAFETY: physical device and surface share the parent context
        unsafe {
            self.parent.get_raw_physical_device_surface_support(
                self.physical_device,
                self.queue_family,
                surface,
            )
        }
    }
}

// Memory functionality
impl Device {
    /// Allocate memory for a resource through the device's `gpu-allocator`.
    pub fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
    ) -> Result<Allocation, AllocationError> {
        let mut allocator = self.lock_allocator()?;
        allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
    }

    pub fn free_memory(&self, allocation: Allocation) -> Result<(), AllocationError> {
        self.lock_allocator()?.free(allocation)
    }

    fn lock_allocator(&self) -> Result<std::sync::MutexGuard<'_, Allocator>, AllocationError> {
        self.allocator
            .as_ref()
            .ok_or_else(|| AllocationError::Internal("allocator already dropped".into()))?
            .lock()
            .map_err(|_| AllocationError::Internal("allocator lock poisoned".into()))
    }

    /// # Safety
    /// `create_info` must be valid for the call.
    pub unsafe fn create_raw_buffer(
        &self,
        create_info: &vk::BufferCreateInfo<'_>,
    ) -> Result<vk::Buffer, vk::Result> {
        // SAFETY: Caller guarantees create_info validity
        unsafe { self.handle.create_buffer(create_info, None) }
    }

    /// # Safety
    /// `buffer` must be a live buffer from this device.
    pub unsafe fn get_raw_buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        // SAFETY: Caller guarantees buffer provenance
        unsafe { self.handle.get_buffer_memory_requirements(buffer) }
    }

    /// # Safety
    /// `buffer` must be unbound and `memory`/`offset` must satisfy its
    /// requirements.
    pub unsafe fn bind_raw_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees binding validity
        unsafe { self.handle.bind_buffer_memory(buffer, memory, offset) }
    }

    /// # Safety
    /// No pending GPU work may reference `buffer`.
    pub unsafe fn destroy_raw_buffer(&self, buffer: vk::Buffer) {
        // SAFETY: Caller guarantees provenance and ordering
        unsafe { self.handle.destroy_buffer(buffer, None) };
    }
}

impl GpuDevice for Device {
    /// Wait until all submitted work on this device has completed.
    ///
    /// Used before any swapchain teardown and at shutdown, never per frame.
    fn wait_idle(&self) -> Result<(), vk::Result> {
        let _span = tracing::debug_span!("device_wait_idle").entered();
        // Holding the queue lock keeps other windows from submitting while
        // we wait.
        let _queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `self.handle` is a valid logical device for the lifetime of
        // `self`, and this call has no additional pointer preconditions.
        unsafe { self.handle.device_wait_idle() }
    }

    fn graphics_queue_family(&self) -> u32 {
        self.queue_family
    }

    unsafe fn set_debug_name<H: vk::Handle>(&self, object: H, name: &str) {
        let Some(debug_utils) = self.debug_utils_device.as_ref() else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            tracing::warn!("Debug name {name:?} contains a NUL byte");
            return;
        };
        let raw = object.as_raw();
        let name_info = debug_name_info::<H>(raw, &name);
        // SAFETY: Caller guarantees object provenance and validity.
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
            tracing::warn!("Failed to name object {raw:#x}: {e}");
        }
    }

    fn with_command_pool<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pool = self
            .command_pool_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f()
    }

    unsafe fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        // SAFETY: Caller guarantees surface provenance
        unsafe { self.parent.get_raw_surface_formats(self.physical_device, surface) }
    }

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        // SAFETY: Caller guarantees surface provenance
        unsafe {
            self.parent
                .get_raw_surface_capabilities(self.physical_device, surface)
        }
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        // SAFETY: Caller guarantees every swapchain on it is gone
        unsafe { self.parent.destroy_raw_surface(surface) };
    }

    unsafe fn create_raw_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        // SAFETY: create info has no borrowed pointers
        unsafe {
            self.handle
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
    }

    unsafe fn destroy_raw_fence(&self, fence: vk::Fence) {
        // SAFETY: Caller guarantees the fence is not pending
        unsafe { self.handle.destroy_fence(fence, None) };
    }

    unsafe fn wait_for_raw_fence(
        &self,
        fence: vk::Fence,
        timeout_ns: u64,
    ) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees fence provenance
        unsafe { self.handle.wait_for_fences(&[fence], true, timeout_ns) }
    }

    unsafe fn reset_raw_fence(&self, fence: vk::Fence) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees the fence is not pending
        unsafe { self.handle.reset_fences(&[fence]) }
    }

    unsafe fn create_raw_semaphore(&self) -> Result<vk::Semaphore, vk::Result> {
        // SAFETY: create info has no borrowed pointers
        unsafe {
            self.handle
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore) {
        // SAFETY: Caller guarantees no queue operation still uses it
        unsafe { self.handle.destroy_semaphore(semaphore, None) };
    }

    unsafe fn create_raw_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass, vk::Result> {
        // SAFETY: Caller guarantees create_info validity
        unsafe { self.handle.create_render_pass(create_info, None) }
    }

    unsafe fn destroy_raw_render_pass(&self, render_pass: vk::RenderPass) {
        // SAFETY: Caller guarantees nothing still uses the render pass
        unsafe { self.handle.destroy_render_pass(render_pass, None) };
    }

    unsafe fn create_raw_shader_module(
        &self,
        create_info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule, vk::Result> {
        // SAFETY: Caller guarantees create_info validity.
        unsafe { self.handle.create_shader_module(create_info, None) }
    }

    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule) {
        // SAFETY: Caller guarantees module provenance
        unsafe { self.handle.destroy_shader_module(module, None) };
    }

    unsafe fn create_raw_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout, vk::Result> {
        // SAFETY: Caller guarantees create_info validity.
        unsafe { self.handle.create_pipeline_layout(create_info, None) }
    }

    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout) {
        // SAFETY: Caller guarantees layout provenance and drop ordering.
        unsafe { self.handle.destroy_pipeline_layout(layout, None) };
    }

    /// On partial batch failure ash hands back whatever was created; those
    /// are destroyed so callers never see a half-made pipeline.
    unsafe fn create_raw_graphics_pipeline(
        &self,
        create_info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, vk::Result> {
        // SAFETY: Caller guarantees create_info validity.
        unsafe {
            self.handle.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(create_info),
                None,
            )
        }
        .map_err(|(partial, result)| {
            for p in partial {
                if p != vk::Pipeline::null() {
                    // SAFETY: p was just created by this device.
                    unsafe { self.handle.destroy_pipeline(p, None) };
                }
            }
            result
        })
        .and_then(|pipelines| pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN))
    }

    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline) {
        // SAFETY: Caller guarantees pipeline provenance and drop ordering.
        unsafe { self.handle.destroy_pipeline(pipeline, None) };
    }

    unsafe fn create_raw_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR, vk::Result> {
        // SAFETY: Caller guarantees create_info validity and handle provenance.
        unsafe { self.swapchain_device.create_swapchain(create_info, None) }
    }

    unsafe fn get_raw_swapchain_images(
        &self,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>, vk::Result> {
        // SAFETY: Caller guarantees swapchain validity and lifetime.
        unsafe { self.swapchain_device.get_swapchain_images(swapchain) }
    }

    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR) {
        // SAFETY: Caller guarantees swapchain provenance and drop ordering.
        unsafe { self.swapchain_device.destroy_swapchain(swapchain, None) };
    }

    unsafe fn create_raw_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView, vk::Result> {
        // SAFETY: Caller guarantees create_info validity and provenance.
        unsafe { self.handle.create_image_view(create_info, None) }
    }

    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView) {
        // SAFETY: Caller guarantees view provenance and drop ordering.
        unsafe { self.handle.destroy_image_view(view, None) };
    }

    unsafe fn create_raw_framebuffer(
        &self,
        create_info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer, vk::Result> {
        // SAFETY: Caller guarantees create_info validity and provenance.
        unsafe { self.handle.create_framebuffer(create_info, None) }
    }

    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer) {
        // SAFETY: Caller guarantees framebuffer provenance and drop ordering.
        unsafe { self.handle.destroy_framebuffer(framebuffer, None) };
    }

    unsafe fn allocate_raw_command_buffers(
        &self,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, vk::Result> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        // SAFETY: allocate_info references our pool; caller holds the pool
        // lock.
        unsafe { self.handle.allocate_command_buffers(&allocate_info) }
    }

    unsafe fn free_raw_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        // SAFETY: Caller guarantees these came from our pool, are idle, and
        // that the pool lock is held.
        unsafe {
            self.handle
                .free_command_buffers(self.command_pool, command_buffers)
        };
    }

    unsafe fn begin_raw_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees the buffer is not pending and holds the
        // pool lock. RESET_COMMAND_BUFFER makes begin an implicit reset.
        unsafe {
            self.handle
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())
        }
    }

    unsafe fn end_raw_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        // SAFETY: Caller guarantees the buffer is recording.
        unsafe { self.handle.end_command_buffer(command_buffer) }
    }

    unsafe fn cmd_image_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    ) {
        // SAFETY: Caller guarantees the buffer is recording outside a render
        // pass and the barrier references a live image.
        unsafe {
            self.handle.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            )
        };
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
    ) {
        // SAFETY: Caller guarantees recording state and live handles.
        unsafe {
            self.handle
                .cmd_begin_render_pass(command_buffer, begin_info, vk::SubpassContents::INLINE)
        };
    }

    unsafe fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        // SAFETY: Caller guarantees the buffer is inside a render pass.
        unsafe { self.handle.cmd_end_render_pass(command_buffer) };
    }

    unsafe fn cmd_bind_graphics_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    ) {
        // SAFETY: Caller guarantees recording state and a live pipeline.
        unsafe {
            self.handle
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    unsafe fn cmd_set_viewport_and_scissor(
        &self,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) {
        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(extent);
        // SAFETY: Caller guarantees recording state and dynamic viewport /
        // scissor on the bound pipeline.
        unsafe {
            self.handle.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.handle.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    unsafe fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        // SAFETY: Caller guarantees recording state and buffer lifetime.
        unsafe {
            self.handle
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0])
        };
    }

    unsafe fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        // SAFETY: Caller guarantees render pass and pipeline state.
        unsafe { self.handle.cmd_draw(command_buffer, vertex_count, 1, 0, 0) };
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> SurfaceStatus<u32> {
        // SAFETY: Caller guarantees swapchain and semaphore validity.
        SurfaceStatus::from_ash(unsafe {
            self.swapchain_device.acquire_next_image(
                swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    unsafe fn queue_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        let wait_semaphores = [wait_semaphore];
        let wait_stages = [wait_stage];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: Caller guarantees handle validity; the queue lock gives us
        // the external synchronization vkQueueSubmit needs.
        unsafe {
            self.handle
                .queue_submit(*queue, std::slice::from_ref(&submit_info), fence)
        }
    }

    unsafe fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
    ) -> SurfaceStatus<()> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: Caller guarantees the image was acquired from swapchain;
        // the queue lock provides external synchronization.
        let result = unsafe { self.swapchain_device.queue_present(*queue, &present_info) };
        SurfaceStatus::from_ash(result.map(|suboptimal| ((), suboptimal)))
    }
}

/// Name info for the object of type `H` with raw handle `raw`.
fn debug_name_info<'a, H: vk::Handle>(
    raw: u64,
    name: &'a CStr,
) -> vk::DebugUtilsObjectNameInfoEXT<'a> {
    vk::DebugUtilsObjectNameInfoEXT::default()
        .object_handle(H::from_raw(raw))
        .object_name(name)
}
