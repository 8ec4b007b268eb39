// dridev/src/display.rs
//
//! The process's live connection to a rendering target.
//!
//! Opening a display probes the device, binds a driver, negotiates its
//! extensions, and enumerates the advertised configs. Everything the display
//! owns is strictly hierarchical: configs, the device descriptor, the driver
//! screen, and the surface arena all go away with it.

use crate::config::{self, Config};
use crate::device::{self, Device, DeviceCapabilities};
use crate::driver::{
    self, BufferMask, DriverExtensions, DriverScreen, ImageList, ImageLoader,
    SOFTWARE_DRIVER_NAME,
};
use crate::error::Error;
use crate::loader;
use crate::surface::{ImageFormat, Surface, SurfaceKey, SurfaceTypeFlags};

use euclid::default::Size2D;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Options supplied when opening a display.
#[derive(Default)]
pub struct DisplayOptions {
    /// A descriptor the caller already holds for the device.
    ///
    /// The display does not use it directly; it validates that the
    /// descriptor identifies the requested device and then reopens the
    /// device through its render node.
    pub device_fd: Option<OwnedFd>,
}

/// A display connection bound to one device.
pub struct Display {
    device: Device,
    driver_name: String,
    // Declaration order doubles as drop order: the screen has to go before
    // the descriptor it renders through.
    screen: Box<dyn DriverScreen>,
    fd: Option<OwnedFd>,
    extensions: DriverExtensions,
    configs: Vec<Config>,
    surfaces: Vec<Option<Surface>>,
}

struct ProbedDriver {
    fd: Option<OwnedFd>,
    driver_name: String,
    screen: Box<dyn DriverScreen>,
}

/// Resolves the descriptor to use for a hardware device.
///
/// A caller-supplied descriptor must still identify the requested device;
/// either way the device is reopened through its render node, since nothing
/// here needs display-master privileges.
fn device_fd(target: &Device, options: DisplayOptions) -> Result<OwnedFd, Error> {
    if let Some(supplied) = options.device_fd {
        match device::device_for_fd(supplied.as_fd()) {
            Some(resolved) if resolved == *target => {}
            _ => return Err(Error::DeviceMismatch),
        }

        let node = loader::render_node_for_fd(supplied.as_fd()).ok_or(Error::OpenError)?;
        drop(supplied);
        return loader::open_device(&node);
    }

    let node = target.render_node_path().ok_or(Error::OpenError)?;
    loader::open_device(node)
}

/// Selects and binds a driver for the device.
///
/// Descriptor ownership moves to the returned probe only once a driver is
/// bound; every error path closes the descriptor before returning.
fn probe_device(target: &Device, options: DisplayOptions) -> Result<ProbedDriver, Error> {
    if target.supports(DeviceCapabilities::DRM) {
        let fd = device_fd(target, options)?;
        let driver_name = loader::driver_for_fd(fd.as_fd())?;
        let screen = driver::load_accelerated_driver(&driver_name, fd.as_raw_fd())?;
        Ok(ProbedDriver {
            fd: Some(fd),
            driver_name,
            screen,
        })
    } else if target.supports(DeviceCapabilities::SOFTWARE) {
        let screen = driver::load_software_driver()?;
        Ok(ProbedDriver {
            fd: None,
            driver_name: SOFTWARE_DRIVER_NAME.to_owned(),
            screen,
        })
    } else {
        // Every enumerable device answers one of the two capability queries.
        unreachable!("device supports neither DRM nor software rendering");
    }
}

impl Display {
    /// Opens a display on the given device.
    ///
    /// Any initialization failure unwinds whatever was built so far through
    /// the same release path normal teardown uses, and surfaces one error.
    pub fn open(target: &Device, options: DisplayOptions) -> Result<Display, Error> {
        device::ensure_initialized();
        let probed = probe_device(target, options).map_err(|error| {
            error!("failed to load a driver for the device: {}", error);
            error
        })?;
        Display::with_screen(target.clone(), probed.fd, probed.driver_name, probed.screen)
    }

    pub(crate) fn with_screen(
        device: Device,
        fd: Option<OwnedFd>,
        driver_name: String,
        mut screen: Box<dyn DriverScreen>,
    ) -> Result<Display, Error> {
        let extensions = driver::negotiate_extensions(screen.as_ref())?;
        let configs = config::add_configs_for_layouts(screen.as_mut()).map_err(|error| {
            error!("failed to add configs: {}", error);
            error
        })?;

        Ok(Display {
            device,
            driver_name,
            screen,
            fd,
            extensions,
            configs,
            surfaces: Vec::new(),
        })
    }

    /// The device this display was opened on.
    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The name of the bound driver.
    #[inline]
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// The open device descriptor, when the display targets hardware.
    #[inline]
    pub fn device_fd(&self) -> Option<BorrowedFd> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// The extension table negotiated with the driver.
    #[inline]
    pub fn extensions(&self) -> &DriverExtensions {
        &self.extensions
    }

    /// The advertised configs, in identifier order.
    #[inline]
    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    /// Creates an off-screen pbuffer surface against the given config.
    ///
    /// Failure releases everything allocated so far; the display is left as
    /// if the call had never been made.
    pub fn create_pbuffer_surface(
        &mut self,
        config_id: u32,
        size: Size2D<i32>,
    ) -> Result<SurfaceKey, Error> {
        let config = *self
            .configs
            .iter()
            .find(|config| config.id == config_id)
            .ok_or(Error::UnsupportedConfig)?;
        if !config.surface_types.contains(SurfaceTypeFlags::PBUFFER) {
            return Err(Error::UnsupportedConfig);
        }
        let driver_config = *self
            .screen
            .configs()
            .get(config.driver_index)
            .ok_or(Error::UnsupportedConfig)?;

        let key = self.reserve_slot();
        let drawable = match self.screen.create_drawable(&driver_config, key) {
            Ok(drawable) => drawable,
            Err(_) => {
                self.surfaces[key.0] = None;
                return Err(Error::AllocError);
            }
        };

        self.surfaces[key.0] = Some(Surface {
            size,
            format: ImageFormat::for_config(&config),
            config_id,
            drawable,
            front: None,
        });
        Ok(key)
    }

    /// Destroys a surface.
    ///
    /// Destroying a key that no longer names a live surface is a no-op.
    pub fn destroy_surface(&mut self, key: SurfaceKey) {
        let surface = match self.surfaces.get_mut(key.0).and_then(Option::take) {
            Some(surface) => surface,
            None => return,
        };
        self.release_surface(surface);
    }

    /// Presents a surface.
    ///
    /// Pbuffer surfaces have no presentation step, so this always succeeds
    /// and changes nothing.
    pub fn swap_buffers(&mut self, key: SurfaceKey) -> Result<(), Error> {
        debug_assert!(self.surface(key).is_some());
        Ok(())
    }

    /// The size of a live surface.
    #[inline]
    pub fn surface_size(&self, key: SurfaceKey) -> Option<Size2D<i32>> {
        self.surface(key).map(|surface| surface.size)
    }

    /// The exposed pixel format of a live surface.
    #[inline]
    pub fn surface_format(&self, key: SurfaceKey) -> Option<ImageFormat> {
        self.surface(key).map(|surface| surface.format)
    }

    /// The identifier of the config a live surface was created against.
    #[inline]
    pub fn surface_config_id(&self, key: SurfaceKey) -> Option<u32> {
        self.surface(key).map(|surface| surface.config_id)
    }

    fn surface(&self, key: SurfaceKey) -> Option<&Surface> {
        self.surfaces.get(key.0).and_then(Option::as_ref)
    }

    fn reserve_slot(&mut self) -> SurfaceKey {
        match self.surfaces.iter().position(Option::is_none) {
            Some(index) => SurfaceKey(index),
            None => {
                self.surfaces.push(None);
                SurfaceKey(self.surfaces.len() - 1)
            }
        }
    }

    // Image strictly before drawable: the driver's drawable bookkeeping may
    // reference the image until the drawable itself is torn down.
    fn release_surface(&mut self, mut surface: Surface) {
        if let Some(front) = surface.front.take() {
            self.screen.destroy_image(front);
        }
        self.screen.destroy_drawable(surface.drawable);
    }
}

impl ImageLoader for Display {
    // Pbuffers nominally carry a back buffer and no front buffer, but
    // single-buffered surfaces with no front buffer confuse driver
    // visibility and copy logic that special-cases the front slot. The X11
    // backend in this driver family assigns pbuffers a front buffer instead,
    // and that convention is what drivers are tested against, so the one
    // image here goes in the front slot too. The back slot stays empty.
    fn get_buffers(&mut self, surface: SurfaceKey, request: BufferMask) -> ImageList {
        let mut list = ImageList::empty();
        let (size, format, existing) = match self.surface(surface) {
            Some(surface) => (surface.size, surface.format, surface.front),
            None => return list,
        };

        if request.contains(BufferMask::FRONT) {
            let front = match existing {
                Some(image) => Some(image),
                None => match self.screen.create_image(size, format) {
                    Ok(image) => {
                        if let Some(slot) = self.surfaces.get_mut(surface.0).and_then(Option::as_mut)
                        {
                            slot.front = Some(image);
                        }
                        Some(image)
                    }
                    Err(error) => {
                        // Not an outward failure; the mask just omits the
                        // front slot and the driver copes with the absence.
                        debug!("front buffer allocation failed: {}", error);
                        None
                    }
                },
            };
            if let Some(front) = front {
                list.mask |= BufferMask::FRONT;
                list.front = Some(front);
            }
        }

        list
    }

    // No display refresh exists to synchronize against.
    fn flush_front_buffer(&mut self, _surface: SurfaceKey) {}
}

impl Drop for Display {
    fn drop(&mut self) {
        for index in 0..self.surfaces.len() {
            if let Some(surface) = self.surfaces[index].take() {
                self.release_surface(surface);
            }
        }
        // Field drop order releases the screen, then the device descriptor.
    }
}
