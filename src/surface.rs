// dridev/src/surface.rs
//
//! Off-screen rendering surfaces and the pixel formats backing them.

use crate::config::Config;
use crate::driver::{DrawableHandle, ImageHandle};

use euclid::default::Size2D;
use std::fmt::{self, Display, Formatter};

bitflags! {
    /// The surface types a config can be used with.
    ///
    /// Device displays have no windowing system, so every config here is
    /// offscreen-buffer-capable and nothing else.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SurfaceTypeFlags: u32 {
        /// Off-screen pixel-buffer surfaces.
        const PBUFFER = 1 << 0;
    }
}

/// The pixel format of an image backing a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    /// 16-bit 565, no alpha.
    Rgb565,
    /// 32-bit opaque (alpha channel present in memory but ignored).
    Xrgb8888,
    /// 32-bit with alpha.
    Argb8888,
}

impl ImageFormat {
    /// Derives the exposed format from a config's channel depths.
    ///
    /// The precedence is fixed: a 5-bit red channel means 565, otherwise a
    /// zero-bit alpha channel means opaque 32-bit, otherwise 32-bit with
    /// alpha.
    pub fn for_config(config: &Config) -> ImageFormat {
        if config.red_bits == 5 {
            ImageFormat::Rgb565
        } else if config.alpha_bits == 0 {
            ImageFormat::Xrgb8888
        } else {
            ImageFormat::Argb8888
        }
    }

    /// Bytes per pixel for this format.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgb565 => 2,
            ImageFormat::Xrgb8888 | ImageFormat::Argb8888 => 4,
        }
    }
}

/// An index into a display's surface arena.
///
/// Drivers hold these instead of pointers back into the display; a key is
/// only meaningful to the display whose arena issued it, and only while the
/// surface it names is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceKey(pub(crate) usize);

impl Display for SurfaceKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Surface({})", self.0)
    }
}

/// A single off-screen rendering target.
///
/// Each surface owns at most one backing image, allocated lazily the first
/// time the driver asks for the front buffer, and exactly one drawable.
pub(crate) struct Surface {
    /// The surface's size, in pixels.
    pub(crate) size: Size2D<i32>,
    /// The exposed pixel format, derived from the config at creation.
    pub(crate) format: ImageFormat,
    /// The identifier of the config the surface was created against.
    pub(crate) config_id: u32,
    /// The driver drawable tied to this surface.
    pub(crate) drawable: DrawableHandle,
    /// The backing image, if the driver has asked for one.
    pub(crate) front: Option<ImageHandle>,
}
