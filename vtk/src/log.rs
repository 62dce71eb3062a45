//! Routing of validation layer messages into `tracing`.

use ash::vk;
use std::ffi::CStr;

/// Lowest validation message severity that gets forwarded.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum VulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl VulkanLogLevel {
    pub fn severity_mask(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        match self {
            Self::Verbose => S::VERBOSE | S::INFO | S::WARNING | S::ERROR,
            Self::Info => S::INFO | S::WARNING | S::ERROR,
            Self::Warning => S::WARNING | S::ERROR,
            Self::Error => S::ERROR,
        }
    }
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    }
}

/// `PFN_vkDebugUtilsMessengerCallbackEXT` that forwards to `tracing` under
/// the `vtk-debug-messenger` target. Never asks the driver to abort the call.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    //SAFETY: Vulkan guarantees p_callback_data and its message are valid for
    //the duration of the callback
    let message = unsafe {
        let data = &*p_callback_data;
        if data.p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(data.p_message)
    }
    .to_string_lossy();
    let type_str = message_type_name(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(target: "vtk-debug-messenger", "[{}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "vtk-debug-messenger", "[{}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vtk-debug-messenger", "[{}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vtk-debug-messenger", "[{}] {}", type_str, message);
        }
        _ => {
            tracing::debug!(target: "vtk-debug-messenger", "[{}] {}", type_str, message);
        }
    }

    vk::FALSE
}
