//! V4L2 device bindings.
//!
//! This module is the external collaborator the pitcher runtime's capture and
//! output channels are built on: device enumeration, format negotiation, and
//! the mmap/userptr streaming I/O paths. None of it knows about channels,
//! buffers, or the scheduler — [`crate::adapter::v4l2`] is the seam where the
//! two meet.

#[macro_use]
mod macros;
mod buf_type;
mod device;
pub mod format;
mod pixelformat;
pub mod raw;
mod shared;
pub mod stream;

pub use buf_type::*;
pub(crate) use device::byte_array_to_str;
pub use device::*;
pub use pixelformat::Pixelformat;
pub use shared::*;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
