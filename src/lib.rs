//! Device-platform EGL backend plumbing for DRI rendering drivers.
//!
//! This crate binds an abstract rendering device (a DRM render node or the
//! built-in software rasterizer) to a native driver and manages the
//! off-screen surfaces rendered against it. It covers the pieces a display
//! server or headless GL stack needs below the windowing layer: device
//! enumeration, driver probing and loading, extension negotiation, config
//! enumeration, and the loader callbacks drivers use to resolve the buffers
//! backing a drawable. It deliberately does not manage windows, presentation,
//! or GPU command submission.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod cache_key;
pub use crate::cache_key::CacheKey;

pub mod config;
pub use crate::config::Config;

pub mod device;
pub use crate::device::{Device, DeviceCapabilities};

pub mod display;
pub use crate::display::{Display, DisplayOptions};

pub mod driver;
pub use crate::driver::{
    BufferMask, DrawableHandle, DriverConfig, DriverExtensions, DriverScreen, ExtensionKind,
    ImageHandle, ImageList, ImageLoader, PixelLayout,
};

pub mod error;
pub use crate::error::Error;

pub mod loader;

mod swrast;

pub mod surface;
pub use crate::surface::{ImageFormat, SurfaceKey, SurfaceTypeFlags};

#[cfg(test)]
mod tests;
