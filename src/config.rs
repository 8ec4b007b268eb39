// dridev/src/config.rs
//
//! Advertised pixel configurations and their enumeration.

use crate::driver::{DriverScreen, PixelLayout};
use crate::error::Error;
use crate::surface::SurfaceTypeFlags;

/// The fixed ordered table of pixel layouts this backend supports.
///
/// Every driver config is offered every entry, in this order. The table
/// order therefore determines config identifier assignment.
pub(crate) static PIXEL_LAYOUTS: [PixelLayout; 3] = [
    PixelLayout {
        name: "ARGB8888",
        rgba_masks: [0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0xff00_0000],
    },
    PixelLayout {
        name: "RGB888",
        rgba_masks: [0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0x0],
    },
    PixelLayout {
        name: "RGB565",
        rgba_masks: [0x0000_f800, 0x0000_07e0, 0x0000_001f, 0x0],
    },
];

/// An immutable advertised pixel format.
///
/// Identifiers are 1-based, unique within a display, and strictly increasing
/// in creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// The config's identifier.
    pub id: u32,
    /// Red channel depth, in bits.
    pub red_bits: u8,
    /// Green channel depth, in bits.
    pub green_bits: u8,
    /// Blue channel depth, in bits.
    pub blue_bits: u8,
    /// Alpha channel depth, in bits.
    pub alpha_bits: u8,
    /// The surface types this config supports.
    pub surface_types: SurfaceTypeFlags,
    /// Index of the accepted driver config in the driver's config list.
    pub(crate) driver_index: usize,
}

/// Cross-products the driver's reported configs with the supported pixel
/// layouts to build a display's advertised config list.
///
/// Identifier assignment is delegated to the driver's pairing decision: a
/// config is only appended, and the dense counter only advances, when the
/// driver accepts the exact identifier proposed for it. A driver that
/// redirects to an already-exposed equivalent config leaves the counter
/// where it was, so duplicates collapse without leaving identifier holes.
pub(crate) fn add_configs_for_layouts(
    screen: &mut dyn DriverScreen,
) -> Result<Vec<Config>, Error> {
    let mut configs = Vec::new();
    let mut format_count = [0u32; PIXEL_LAYOUTS.len()];
    let mut config_count = 0u32;

    let driver_configs = screen.configs().to_vec();
    for (driver_index, driver_config) in driver_configs.iter().enumerate() {
        for (layout_index, layout) in PIXEL_LAYOUTS.iter().enumerate() {
            let proposed_id = config_count + 1;
            let accepted = match screen.match_config(driver_config, layout, proposed_id) {
                Some(id) => id,
                None => continue,
            };

            if accepted == proposed_id {
                let [red_bits, green_bits, blue_bits, alpha_bits] = layout.channel_bits();
                configs.push(Config {
                    id: accepted,
                    red_bits,
                    green_bits,
                    blue_bits,
                    alpha_bits,
                    surface_types: SurfaceTypeFlags::PBUFFER,
                    driver_index,
                });
                config_count += 1;
            }
            format_count[layout_index] += 1;
        }
    }

    for (layout, &count) in PIXEL_LAYOUTS.iter().zip(format_count.iter()) {
        if count == 0 {
            debug!("no driver config supports native format {}", layout.name);
        }
    }

    if configs.is_empty() {
        return Err(Error::NoConfigsAvailable);
    }
    Ok(configs)
}
