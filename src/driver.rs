// dridev/src/driver.rs
//
//! The seam between this backend and a native rendering driver.
//!
//! A loaded driver exposes a screen handle plus the set of extensions it
//! advertises. The backend binds the subset it understands and hands the
//! driver a loader callback set so the driver can resolve the buffers backing
//! a drawable on demand.

use crate::error::Error;
use crate::surface::{ImageFormat, SurfaceKey};
use crate::swrast::SwrastScreen;

use euclid::default::Size2D;

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Mutex;

/// The driver name bound on the software-rendering path.
pub static SOFTWARE_DRIVER_NAME: &str = "swrast";

/// Extensions a driver can advertise.
///
/// This backend only understands (and requires) the three listed here;
/// anything else a driver advertises is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Core drawable lifecycle operations.
    Core,
    /// Image allocation and teardown.
    Image,
    /// Invalidate notification for drawables whose buffers went stale.
    Invalidate,
}

/// The extensions every device display depends on.
static REQUIRED_EXTENSIONS: [ExtensionKind; 3] = [
    ExtensionKind::Core,
    ExtensionKind::Image,
    ExtensionKind::Invalidate,
];

/// A low-level framebuffer config descriptor as reported by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Red channel depth, in bits.
    pub red_bits: u8,
    /// Green channel depth, in bits.
    pub green_bits: u8,
    /// Blue channel depth, in bits.
    pub blue_bits: u8,
    /// Alpha channel depth, in bits (0 for opaque configs).
    pub alpha_bits: u8,
    /// Whether the driver reports this config as double-buffered.
    ///
    /// Pbuffer pairings ignore this, which is what makes the single- and
    /// double-buffered flavors of a layout collapse into one exposed config.
    pub double_buffered: bool,
}

/// A supported pixel layout, expressed as RGBA channel masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    /// Human-readable format name, for diagnostics.
    pub name: &'static str,
    /// Red, green, blue and alpha channel masks, in that order.
    pub rgba_masks: [u32; 4],
}

impl PixelLayout {
    /// The channel depths implied by the masks.
    #[inline]
    pub fn channel_bits(&self) -> [u8; 4] {
        [
            self.rgba_masks[0].count_ones() as u8,
            self.rgba_masks[1].count_ones() as u8,
            self.rgba_masks[2].count_ones() as u8,
            self.rgba_masks[3].count_ones() as u8,
        ]
    }
}

/// An opaque driver handle to a renderable target, tied 1:1 to a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawableHandle(pub u64);

/// An opaque driver handle to a pixel buffer backing a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHandle(pub u64);

bitflags! {
    /// Buffer slots a driver can request or a loader can populate.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BufferMask: u32 {
        /// The front buffer slot.
        const FRONT = 1 << 0;
        /// The back buffer slot.
        const BACK = 1 << 1;
    }
}

/// The buffers the loader resolved for a drawable.
///
/// Slots absent from `mask` carry no image, and drivers are expected to cope
/// with an empty list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageList {
    /// Which slots are populated.
    pub mask: BufferMask,
    /// The front buffer, if `mask` contains `FRONT`.
    pub front: Option<ImageHandle>,
    /// The back buffer, if `mask` contains `BACK`.
    pub back: Option<ImageHandle>,
}

impl ImageList {
    #[inline]
    pub(crate) fn empty() -> ImageList {
        ImageList {
            mask: BufferMask::empty(),
            front: None,
            back: None,
        }
    }
}

/// The callback set the backend registers with the driver.
///
/// The driver invokes these synchronously, on its calling context, whenever
/// it needs to resolve which buffers back a drawable. The surface key is the
/// one supplied when the drawable was created.
pub trait ImageLoader {
    /// Supplies (allocating on demand) the buffers backing a surface.
    ///
    /// This never fails outward; a slot that could not be populated is simply
    /// absent from the returned list's mask.
    fn get_buffers(&mut self, surface: SurfaceKey, request: BufferMask) -> ImageList;

    /// Notifies the loader that the front buffer was flushed.
    fn flush_front_buffer(&mut self, surface: SurfaceKey);
}

/// A bound driver screen.
///
/// This is the Rust rendition of the driver's extension function tables: one
/// trait object per loaded driver, covering the drawable lifecycle (core
/// extension), image allocation (image extension), and config pairing.
pub trait DriverScreen {
    /// The name this screen was loaded under.
    fn driver_name(&self) -> &str;

    /// The extensions the driver advertises.
    fn extensions(&self) -> &[ExtensionKind];

    /// The driver-reported framebuffer config descriptors, in driver order.
    fn configs(&self) -> &[DriverConfig];

    /// Decides whether a driver config can be exposed with the given pixel
    /// layout.
    ///
    /// `proposed_id` is the next unused config identifier. The driver either
    /// rejects the pairing (`None`), accepts it under the proposed identifier,
    /// or redirects to the identifier of an already-exposed equivalent config.
    /// The equality criterion behind redirection belongs to the driver; this
    /// backend never second-guesses it.
    fn match_config(
        &mut self,
        config: &DriverConfig,
        layout: &PixelLayout,
        proposed_id: u32,
    ) -> Option<u32>;

    /// Creates a drawable bound to the given surface key.
    ///
    /// The driver passes the key back through [`ImageLoader::get_buffers`]
    /// whenever it needs the drawable's backing buffers.
    fn create_drawable(
        &mut self,
        config: &DriverConfig,
        surface: SurfaceKey,
    ) -> Result<DrawableHandle, Error>;

    /// Destroys a drawable.
    ///
    /// Any image that backed the drawable must already have been released.
    fn destroy_drawable(&mut self, drawable: DrawableHandle);

    /// Allocates a pixel buffer of the given size and format.
    fn create_image(&mut self, size: Size2D<i32>, format: ImageFormat)
        -> Result<ImageHandle, Error>;

    /// Releases a pixel buffer.
    fn destroy_image(&mut self, image: ImageHandle);
}

/// The extension table negotiated for a display.
///
/// Holding one of these is proof that every required extension was bound.
#[derive(Clone, Debug)]
pub struct DriverExtensions {
    bound: Vec<ExtensionKind>,
}

impl DriverExtensions {
    /// The extensions that were bound, in required order.
    #[inline]
    pub fn bound(&self) -> &[ExtensionKind] {
        &self.bound
    }
}

/// Walks the driver's advertised extension list and binds the subset this
/// backend requires.
///
/// Missing any required extension is a hard initialization failure; it is
/// never retried.
pub(crate) fn negotiate_extensions(
    screen: &dyn DriverScreen,
) -> Result<DriverExtensions, Error> {
    let advertised = screen.extensions();
    let mut bound = Vec::with_capacity(REQUIRED_EXTENSIONS.len());
    for &required in &REQUIRED_EXTENSIONS {
        if !advertised.contains(&required) {
            error!(
                "driver {} does not advertise the {:?} extension",
                screen.driver_name(),
                required
            );
            return Err(Error::MissingRequiredExtension(required));
        }
        bound.push(required);
    }
    Ok(DriverExtensions { bound })
}

/// Builds a screen for an accelerated driver from an open render-node
/// descriptor.
///
/// The descriptor stays owned by the display; it outlives any screen built
/// on it.
pub type DriverFactory = fn(RawFd) -> Result<Box<dyn DriverScreen>, Error>;

lazy_static! {
    static ref DRIVER_REGISTRY: Mutex<HashMap<&'static str, DriverFactory>> =
        Mutex::new(HashMap::new());
}

/// Registers an accelerated driver binding under the given name.
///
/// This is the module-resolution step of driver loading: a probe that
/// resolves a device to `name` will bind through `factory`.
pub fn register_driver(name: &'static str, factory: DriverFactory) {
    DRIVER_REGISTRY
        .lock()
        .unwrap()
        .insert(name, factory);
}

/// Loads the accelerated driver registered under `driver_name`, binding it to
/// the given render-node descriptor.
pub fn load_accelerated_driver(
    driver_name: &str,
    fd: RawFd,
) -> Result<Box<dyn DriverScreen>, Error> {
    let factory = {
        let registry = DRIVER_REGISTRY.lock().unwrap();
        registry.get(driver_name).copied()
    };
    match factory {
        Some(factory) => {
            let screen = factory(fd)?;
            info!("loaded driver {} for fd {}", driver_name, fd);
            Ok(screen)
        }
        None => {
            warn!("no driver registered under the name {}", driver_name);
            Err(Error::DriverLoadError)
        }
    }
}

/// Loads the built-in software rasterizer.
pub fn load_software_driver() -> Result<Box<dyn DriverScreen>, Error> {
    Ok(Box::new(SwrastScreen::new()))
}
