// dridev/src/swrast.rs
//
//! The built-in software rasterizer driver.
//!
//! This is the screen the software device path binds: images live in process
//! memory and drawables are plain records, but the extension surface is the
//! same one an accelerated driver presents.

use crate::driver::{
    DrawableHandle, DriverConfig, DriverScreen, ExtensionKind, ImageHandle, PixelLayout,
    SOFTWARE_DRIVER_NAME,
};
use crate::error::Error;
use crate::surface::{ImageFormat, SurfaceKey};

use euclid::default::Size2D;
use std::collections::HashMap;

static SWRAST_EXTENSIONS: [ExtensionKind; 3] = [
    ExtensionKind::Core,
    ExtensionKind::Image,
    ExtensionKind::Invalidate,
];

// Every channel layout in single- and double-buffered flavors, the way a real
// rasterizer reports its config list.
static SWRAST_CONFIGS: [DriverConfig; 6] = [
    DriverConfig { red_bits: 8, green_bits: 8, blue_bits: 8, alpha_bits: 8, double_buffered: false },
    DriverConfig { red_bits: 8, green_bits: 8, blue_bits: 8, alpha_bits: 8, double_buffered: true },
    DriverConfig { red_bits: 8, green_bits: 8, blue_bits: 8, alpha_bits: 0, double_buffered: false },
    DriverConfig { red_bits: 8, green_bits: 8, blue_bits: 8, alpha_bits: 0, double_buffered: true },
    DriverConfig { red_bits: 5, green_bits: 6, blue_bits: 5, alpha_bits: 0, double_buffered: false },
    DriverConfig { red_bits: 5, green_bits: 6, blue_bits: 5, alpha_bits: 0, double_buffered: true },
];

// The pixel storage is only ever handed to renderers through the image
// handle; nothing in this crate reads it back.
#[allow(dead_code)]
struct SwrastImage {
    size: Size2D<i32>,
    format: ImageFormat,
    pixels: Vec<u8>,
}

/// A software rasterizer screen.
pub(crate) struct SwrastScreen {
    exposed: HashMap<[u32; 4], u32>,
    drawables: HashMap<u64, SurfaceKey>,
    images: HashMap<u64, SwrastImage>,
    next_handle: u64,
}

impl SwrastScreen {
    pub(crate) fn new() -> SwrastScreen {
        SwrastScreen {
            exposed: HashMap::new(),
            drawables: HashMap::new(),
            images: HashMap::new(),
            next_handle: 1,
        }
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl DriverScreen for SwrastScreen {
    fn driver_name(&self) -> &str {
        SOFTWARE_DRIVER_NAME
    }

    fn extensions(&self) -> &[ExtensionKind] {
        &SWRAST_EXTENSIONS
    }

    fn configs(&self) -> &[DriverConfig] {
        &SWRAST_CONFIGS
    }

    fn match_config(
        &mut self,
        config: &DriverConfig,
        layout: &PixelLayout,
        proposed_id: u32,
    ) -> Option<u32> {
        if layout.channel_bits()
            != [
                config.red_bits,
                config.green_bits,
                config.blue_bits,
                config.alpha_bits,
            ]
        {
            return None;
        }

        // A layout already exposed under some identifier stays under it; the
        // double-buffered flavor of a config adds nothing for pbuffers.
        match self.exposed.get(&layout.rgba_masks) {
            Some(&existing) => Some(existing),
            None => {
                self.exposed.insert(layout.rgba_masks, proposed_id);
                Some(proposed_id)
            }
        }
    }

    fn create_drawable(
        &mut self,
        _config: &DriverConfig,
        surface: SurfaceKey,
    ) -> Result<DrawableHandle, Error> {
        let handle = self.next_handle();
        self.drawables.insert(handle, surface);
        Ok(DrawableHandle(handle))
    }

    fn destroy_drawable(&mut self, drawable: DrawableHandle) {
        self.drawables.remove(&drawable.0);
    }

    fn create_image(
        &mut self,
        size: Size2D<i32>,
        format: ImageFormat,
    ) -> Result<ImageHandle, Error> {
        if size.width <= 0 || size.height <= 0 {
            return Err(Error::AllocError);
        }
        let bytes = (size.width as usize)
            .checked_mul(size.height as usize)
            .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
            .ok_or(Error::AllocError)?;

        let handle = self.next_handle();
        self.images.insert(
            handle,
            SwrastImage {
                size,
                format,
                pixels: vec![0; bytes],
            },
        );
        Ok(ImageHandle(handle))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.images.remove(&image.0);
    }
}
