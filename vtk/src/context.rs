use ash::vk;
use raw_window_handle::HasDisplayHandle;
use thiserror::Error;

use crate::log::{VulkanLogLevel, vulkan_debug_callback};
use crate::platform::PlatformWindow;
use std::{
    ffi::CStr,
    fmt::{Debug, Display},
};

/// Application and engine name reported to the driver.
pub const APPLICATION_NAME: &CStr = c"vtk";
pub const ENGINE_NAME: &CStr = c"vtk";
/// Reported for both the application and the engine.
pub const APPLICATION_VERSION: u32 = vk::make_api_version(0, 0, 1, 0);
/// Highest API version requested. Lower if the loader can't do it.
pub const TARGET_API_VERSION: u32 = vk::API_VERSION_1_1;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VkVersion(u32);

impl VkVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn major(&self) -> u32 {
        vk::api_version_major(self.0)
    }
    pub fn minor(&self) -> u32 {
        vk::api_version_minor(self.0)
    }
    pub fn patch(&self) -> u32 {
        vk::api_version_patch(self.0)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

impl Display for VkVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ContextConfig {
    /// `Some` turns on the Khronos validation layer and routes its messages
    /// at or above this severity into `tracing`.
    pub validation: Option<VulkanLogLevel>,
}

/// The Vulkan instance plus the instance-level extension loaders. One per
/// process. Devices hold an `Arc<Context>` so the instance is destroyed
/// after every device.
pub struct Context {
    entry: ash::Entry,
    handle: ash::Instance,
    debug_messenger: Option<(vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance)>,
    surface_instance: ash::khr::surface::Instance,
    ver: VkVersion,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle.handle())
            .field("api_version", &self.ver)
            .field("validation", &self.debug_messenger.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum CreateContextError {
    #[error("Could not load libvulkan: {0}")]
    LibraryLoading(libloading::Error),
    #[error("Could not load vkGetInstanceProcAddr from libvulkan")]
    MissingEntryPoint,
    #[error("Couldn't get display handle from passed value: {0}")]
    InvalidDisplayHandle(raw_window_handle::HandleError),
    #[error("Missing mandatory instance extensions: {0:?}")]
    MissingExtensions(Vec<String>),
    #[error("Vulkan error creating instance: {0}")]
    Vulkan(vk::Result),
}

impl From<vk::Result> for CreateContextError {
    fn from(value: vk::Result) -> Self {
        CreateContextError::Vulkan(value)
    }
}

#[derive(Debug, Error)]
pub enum CreateSurfaceError {
    #[error("Couldn't get display handle: {0}")]
    InvalidDisplayHandle(raw_window_handle::HandleError),
    #[error("Couldn't get window handle: {0}")]
    InvalidWindowHandle(raw_window_handle::HandleError),
    #[error("Vulkan surface creation failed: {0}")]
    Vulkan(vk::Result),
}

#[derive(Debug, Error)]
pub enum FetchPhysicalDeviceError {
    #[error("Error fetching physical devices, memory exhaustion")]
    MemoryExhaustion,
    #[error("Error fetching physical devices, Unknown vulkan: {0}")]
    UnknownVulkan(vk::Result),
}

impl Drop for Context {
    fn drop(&mut self) {
        tracing::debug!("Dropping context {:?}", self.handle.handle());
        if let Some((debug_messenger, debug_utils_instance)) = self.debug_messenger.take() {
            //SAFETY: last use of this debug messenger. We made this debug
            //messenger from this instance. debug_utils_instance is derived from
            //this instance
            unsafe { debug_utils_instance.destroy_debug_utils_messenger(debug_messenger, None) };
        }
        //SAFETY: We are in drop so this is the last use of instance. Devices
        //hold an Arc to us so they are all gone
        unsafe { self.handle.destroy_instance(None) };
    }
}

fn clamp_api_version(loader_version: u32) -> u32 {
    if loader_version >= TARGET_API_VERSION {
        TARGET_API_VERSION
    } else {
        vk::API_VERSION_1_0
    }
}

impl Context {
    /// Load Vulkan and create the instance.
    ///
    /// The instance gets the surface extensions the display's platform needs,
    /// portability enumeration when the loader offers it, and validation
    /// plus debug utils when `config.validation` is set and both are
    /// installed.
    ///
    /// # Safety
    /// This loads vulkan using libloading, meaning that arbitrary code from
    /// the system's Vulkan loader runs in this process.
    pub unsafe fn new(
        config: &ContextConfig,
        display_handle_source: &impl HasDisplayHandle,
    ) -> Result<Self, CreateContextError> {
        use CreateContextError as Error;
        let _span = tracing::info_span!("context_init").entered();

        //SAFETY: We pass on the burden of the safety from loading dlls to the
        //caller. Entry is dropped after the instance (field order + Drop)
        let entry = unsafe { ash::Entry::load() }.map_err(|e| match e {
            ash::LoadingError::LibraryLoadFailure(error) => Error::LibraryLoading(error),
            ash::LoadingError::MissingEntryPoint(_) => Error::MissingEntryPoint,
        })?;

        //SAFETY: No preconditions
        let loader_version = unsafe { entry.try_enumerate_instance_version() }
            .ok()
            .flatten()
            .unwrap_or(vk::API_VERSION_1_0);
        let api_version = clamp_api_version(loader_version);

        // ash_window knows which VK_KHR_*_surface extension this display needs
        let surface_exts = ash_window::enumerate_required_extensions(
            display_handle_source
                .display_handle()
                .map_err(Error::InvalidDisplayHandle)?
                .as_raw(),
        )?;
        let mandatory_exts: Vec<&CStr> = surface_exts
            .iter()
            //SAFETY: ash_window hands out pointers to static nul terminated
            //extension names
            .map(|ext_cstr_ptr| unsafe { CStr::from_ptr(*ext_cstr_ptr) })
            .collect();

        //SAFETY: No preconditions
        let instance_exts_avail = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        //SAFETY: No preconditions
        let instance_layers_avail =
            unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let has_ext = |name: &CStr| {
            instance_exts_avail
                .iter()
                .any(|avail| avail.extension_name_as_c_str() == Ok(name))
        };

        let missing_exts: Vec<_> = mandatory_exts
            .iter()
            .filter(|ext| !has_ext(*ext))
            .map(|ext| ext.to_string_lossy().into_owned())
            .collect();
        if !missing_exts.is_empty() {
            return Err(Error::MissingExtensions(missing_exts));
        }

        let mut enabled_exts: Vec<*const std::ffi::c_char> =
            mandatory_exts.iter().map(|ext| ext.as_ptr()).collect();
        let mut enabled_layers: Vec<*const std::ffi::c_char> = Vec::new();
        let mut create_flags = vk::InstanceCreateFlags::empty();

        if has_ext(ash::khr::portability_enumeration::NAME) {
            enabled_exts.push(ash::khr::portability_enumeration::NAME.as_ptr());
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let validation_layer_available = instance_layers_avail
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME));
        let debug_level = match config.validation {
            Some(level) if validation_layer_available && has_ext(ash::ext::debug_utils::NAME) => {
                Some(level)
            }
            Some(_) => {
                tracing::warn!(
                    "Validation requested but {} or {} is not installed; continuing without it",
                    VALIDATION_LAYER_NAME.to_string_lossy(),
                    ash::ext::debug_utils::NAME.to_string_lossy(),
                );
                None
            }
            None => None,
        };

        let mut debug_messenger_create_info = debug_level.map(|level| {
            enabled_exts.push(ash::ext::debug_utils::NAME.as_ptr());
            enabled_layers.push(VALIDATION_LAYER_NAME.as_ptr());
            vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(level.severity_mask())
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vulkan_debug_callback))
        });

        let app_info = vk::ApplicationInfo::default()
            .application_name(APPLICATION_NAME)
            .application_version(APPLICATION_VERSION)
            .engine_name(ENGINE_NAME)
            .engine_version(APPLICATION_VERSION)
            .api_version(api_version);

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .flags(create_flags)
            .application_info(&app_info)
            .enabled_extension_names(&enabled_exts)
            .enabled_layer_names(&enabled_layers);

        // Chained so instance creation/destruction itself is also reported
        if let Some(ref mut debug_info) = debug_messenger_create_info {
            instance_create_info = instance_create_info.push_next(debug_info);
        }

        //SAFETY: instance_create_info and everything it points at lives until
        //the end of this function
        let instance = unsafe { entry.create_instance(&instance_create_info, None) }?;

        let debug_messenger = debug_messenger_create_info.and_then(|mut create_info| {
            create_info.p_next = std::ptr::null();
            let debug_utils_instance = ash::ext::debug_utils::Instance::new(&entry, &instance);
            //SAFETY: Valid create info, instance is live
            match unsafe { debug_utils_instance.create_debug_utils_messenger(&create_info, None) } {
                Ok(messenger) => Some((messenger, debug_utils_instance)),
                Err(e) => {
                    tracing::error!("Could not create debug messenger, continuing without: {e}");
                    None
                }
            }
        });
        let surface_instance = ash::khr::surface::Instance::new(&entry, &instance);

        tracing::info!(
            "Created Vulkan instance (api {}, loader {}, validation: {})",
            VkVersion::from_raw(api_version),
            VkVersion::from_raw(loader_version),
            debug_messenger.is_some()
        );

        Ok(Context {
            entry,
            handle: instance,
            debug_messenger,
            surface_instance,
            ver: VkVersion::from_raw(api_version),
        })
    }

    /// Create a `VkSurfaceKHR` for a platform window.
    ///
    /// # Safety
    /// The returned surface must be destroyed before `source`'s native window
    /// goes away and before this context is dropped.
    pub unsafe fn create_raw_surface(
        &self,
        source: &impl PlatformWindow,
    ) -> Result<vk::SurfaceKHR, CreateSurfaceError> {
        use CreateSurfaceError as Error;
        //SAFETY: display and window handles come from the same live source;
        //the caller keeps it alive for the surface's lifetime
        unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.handle,
                source
                    .display_handle()
                    .map_err(Error::InvalidDisplayHandle)?
                    .as_raw(),
                source
                    .window_handle()
                    .map_err(Error::InvalidWindowHandle)?
                    .as_raw(),
                None,
            )
        }
        .map_err(Error::Vulkan)
    }

    /// # Safety
    /// Every swapchain created from `surface` must be destroyed first, and
    /// `surface` must come from this context.
    pub unsafe fn destroy_raw_surface(&self, surface: vk::SurfaceKHR) {
        // SAFETY: Caller guarantees provenance and ordering
        unsafe { self.surface_instance.destroy_surface(surface, None) };
    }

    /// Get a vector of handles to available physical devices. These handles are
    /// ONLY valid in the context of this instance.
    pub fn fetch_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError> {
        //SAFETY: No preconditions
        match unsafe { self.handle.enumerate_physical_devices() } {
            Ok(v) => Ok(v),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                Err(FetchPhysicalDeviceError::MemoryExhaustion)
            }
            Err(e) => Err(FetchPhysicalDeviceError::UnknownVulkan(e)),
        }
    }

    pub fn get_supported_ver(&self) -> VkVersion {
        self.ver
    }

    pub fn debug_utils_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    pub fn ash_instance(&self) -> &ash::Instance {
        &self.handle
    }

    pub fn raw_handle(&self) -> vk::Instance {
        self.handle.handle()
    }
}

// Physical device queries
impl Context {
    /// # Safety
    /// `physical_device` must come from this context.
    pub unsafe fn get_raw_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        // SAFETY: Caller guarantees provenance
        unsafe { self.handle.get_physical_device_properties(physical_device) }
    }

    /// # Safety
    /// `physical_device` must come from this context.
    pub unsafe fn get_raw_physical_device_queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        // SAFETY: Caller guarantees provenance
        unsafe {
            self.handle
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must come from this context.
    pub unsafe fn enumerate_raw_device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::ExtensionProperties>, vk::Result> {
        // SAFETY: Caller guarantees provenance
        unsafe {
            self.handle
                .enumerate_device_extension_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must come from this context.
    pub unsafe fn get_raw_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, vk::Result> {
        // SAFETY: Caller guarantees provenance
        unsafe {
            self.surface_instance.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must come from this context.
    pub unsafe fn get_raw_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        // SAFETY: Caller guarantees provenance
        unsafe {
            self.surface_instance
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    /// # Safety
    /// `physical_device` and `surface` must come from this context.
    pub unsafe fn get_raw_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        // SAFETY: Caller guarantees provenance
        unsafe {
            self.surface_instance
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    /// # Safety
    /// `physical_device` must come from this context and `create_info` must
    /// be valid for the call.
    pub unsafe fn create_ash_device(
        &self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<ash::Device, vk::Result> {
        // SAFETY: Caller guarantees provenance and create_info validity
        unsafe { self.handle.create_device(physical_device, create_info, None) }
    }

    pub fn create_swapchain_loader(&self, device: &ash::Device) -> ash::khr::swapchain::Device {
        ash::khr::swapchain::Device::new(&self.handle, device)
    }

    pub fn create_debug_utils_device_loader(
        &self,
        device: &ash::Device,
    ) -> Option<ash::ext::debug_utils::Device> {
        self.debug_messenger
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(&self.handle, device))
    }
}
