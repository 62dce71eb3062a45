//! `vtk` naming conventions:
//! - `raw_*` accessors and backend methods deal in `ash::vk` handle types.
//! - `ash_*` accessors return the corresponding `ash` wrapper object.
//!
//! Lifecycle: [`context::Context`] → [`device::Device`] →
//! [`window::Window`] → repeated [`window::Window::render_frame`].

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod backend;
pub mod buffer;
pub mod command;
pub mod context;
pub mod device;
pub mod frame;
pub mod log;
pub mod pipeline;
pub mod platform;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod window;

#[cfg(test)]
mod mock;

pub use ash;
pub use raw_window_handle::HandleError as RWHHandleError;
