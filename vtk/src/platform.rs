use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};

/// The window system a surface is bound to.
///
/// One variant per platform family instead of per-platform fields on the
/// window; everything platform specific that the core cares about hangs off
/// this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    AppKit,
    UiKit,
    Wayland,
    Xlib,
    Xcb,
    Win32,
    Android,
    Other,
}

/// Who decides the size of the swapchain images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentAuthority {
    /// `current_extent` from the surface capabilities query is
    /// authoritative. The drawable extent is only used when the surface
    /// reports the `0xFFFFFFFF` "no preference" sentinel.
    SurfaceCapabilities,
    /// The compositor tells the client what size to draw at and the surface
    /// has no opinion. The drawable extent reported by the platform window
    /// always wins and is re-checked after every present.
    Compositor,
}

impl PlatformKind {
    pub fn from_raw_window_handle(handle: &RawWindowHandle) -> Self {
        match handle {
            RawWindowHandle::AppKit(_) => Self::AppKit,
            RawWindowHandle::UiKit(_) => Self::UiKit,
            RawWindowHandle::Wayland(_) => Self::Wayland,
            RawWindowHandle::Xlib(_) => Self::Xlib,
            RawWindowHandle::Xcb(_) => Self::Xcb,
            RawWindowHandle::Win32(_) => Self::Win32,
            RawWindowHandle::AndroidNdk(_) => Self::Android,
            _ => Self::Other,
        }
    }

    pub fn from_window(
        source: &impl HasWindowHandle,
    ) -> Result<Self, raw_window_handle::HandleError> {
        Ok(Self::from_raw_window_handle(&source.window_handle()?.as_raw()))
    }

    pub fn extent_authority(self) -> ExtentAuthority {
        match self {
            Self::Wayland => ExtentAuthority::Compositor,
            _ => ExtentAuthority::SurfaceCapabilities,
        }
    }
}

/// The capability a platform window has to provide to the core: handles to
/// build a surface from, and its current drawable size in physical pixels.
pub trait PlatformWindow: HasDisplayHandle + HasWindowHandle {
    fn drawable_extent(&self) -> vk::Extent2D;
}

impl<T: PlatformWindow + ?Sized> PlatformWindow for &T {
    fn drawable_extent(&self) -> vk::Extent2D {
        (**self).drawable_extent()
    }
}
