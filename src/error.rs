// dridev/src/error.rs
//
//! Various errors that methods can produce.

use crate::driver::ExtensionKind;

use std::fmt::{self, Display, Formatter};

/// Various errors that methods can produce.
///
/// Every error is terminal to the operation that raised it; nothing in this
/// crate retries internally. Display-initialization errors unwind the whole
/// display through the ordinary teardown path, surface errors unwind only the
/// surface under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A caller-supplied file descriptor does not identify the device the
    /// display was requested for.
    DeviceMismatch,
    /// No file descriptor to the rendering device could be opened.
    OpenError,
    /// No registered driver matches the opened device's hardware identity.
    DriverResolutionError,
    /// The resolved driver could not be loaded and bound.
    DriverLoadError,
    /// The loaded driver does not advertise an extension this backend
    /// depends on.
    MissingRequiredExtension(ExtensionKind),
    /// Scanning all driver configs against all supported pixel layouts
    /// produced no usable configs.
    NoConfigsAvailable,
    /// The requested config/surface-type combination is not resolvable into
    /// a concrete driver config.
    UnsupportedConfig,
    /// The driver refused to allocate a resource.
    AllocError,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Error::DeviceMismatch => f.write_str("file descriptor does not match the device"),
            Error::OpenError => f.write_str("failed to open the device node"),
            Error::DriverResolutionError => f.write_str("failed to resolve a driver name"),
            Error::DriverLoadError => f.write_str("failed to load the driver"),
            Error::MissingRequiredExtension(kind) => {
                write!(f, "driver is missing the required {:?} extension", kind)
            }
            Error::NoConfigsAvailable => f.write_str("no configs available"),
            Error::UnsupportedConfig => f.write_str("unsupported config for this surface type"),
            Error::AllocError => f.write_str("driver allocation failed"),
        }
    }
}

impl std::error::Error for Error {}
