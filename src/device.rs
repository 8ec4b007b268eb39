// dridev/src/device.rs
//
//! Enumeration of the rendering devices a process can target.
//!
//! The device list is process-wide, lazily initialized, and guarded by a
//! single mutex. Readers get copies; nothing hands out references into the
//! guarded storage.

use crate::loader;

use std::fs;
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

bitflags! {
    /// The capability queries a device target can answer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceCapabilities: u32 {
        /// The device is a DRM hardware node.
        const DRM = 1 << 0;
        /// The device is the built-in software rasterizer.
        const SOFTWARE = 1 << 1;
    }
}

/// An abstract device-selection target: either a DRM hardware device or the
/// built-in software rasterizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub(crate) capabilities: DeviceCapabilities,
    pub(crate) render_node: Option<PathBuf>,
    pub(crate) id_path_tag: Option<String>,
    pub(crate) vendor_chip: Option<(u32, u32)>,
}

impl Device {
    /// The software-rasterizer device.
    pub(crate) fn software() -> Device {
        Device {
            capabilities: DeviceCapabilities::SOFTWARE,
            render_node: None,
            id_path_tag: None,
            vendor_chip: None,
        }
    }

    /// Whether the device answers the given capability query.
    #[inline]
    pub fn supports(&self, capabilities: DeviceCapabilities) -> bool {
        self.capabilities.contains(capabilities)
    }

    /// The render node backing a hardware device.
    ///
    /// Render nodes carry no display-master privileges, which is all this
    /// backend ever needs.
    #[inline]
    pub fn render_node_path(&self) -> Option<&Path> {
        self.render_node.as_deref()
    }

    /// The device's bus identity tag (for example `pci-0000_02_00_0`).
    #[inline]
    pub fn id_path_tag(&self) -> Option<&str> {
        self.id_path_tag.as_deref()
    }

    /// PCI vendor and chip identifiers, when known.
    #[inline]
    pub fn vendor_chip(&self) -> Option<(u32, u32)> {
        self.vendor_chip
    }
}

lazy_static! {
    static ref DEVICE_LIST: Mutex<Option<Vec<Device>>> = Mutex::new(None);
}

/// Initializes the device list if it has not been built yet.
///
/// The software device is always present, at index 0, followed by one entry
/// per DRM render node found on the system.
pub fn ensure_initialized() {
    let mut guard = DEVICE_LIST.lock().unwrap();
    if guard.is_some() {
        return;
    }

    let mut devices = vec![Device::software()];
    devices.extend(scan_render_nodes());
    debug!("device list initialized with {} devices", devices.len());
    *guard = Some(devices);
}

/// Tears the device list down.
///
/// The next `ensure_initialized` rebuilds it from scratch.
pub fn teardown() {
    let mut guard = DEVICE_LIST.lock().unwrap();
    *guard = None;
}

/// Returns a snapshot of the device list, initializing it if necessary.
pub fn devices() -> Vec<Device> {
    ensure_initialized();
    let guard = DEVICE_LIST.lock().unwrap();
    guard.as_ref().cloned().unwrap_or_default()
}

/// The number of enumerable devices.
pub fn num_devices() -> usize {
    devices().len()
}

/// Whether the given device is still present in the enumeration list.
pub fn is_valid(device: &Device) -> bool {
    devices().iter().any(|candidate| candidate == device)
}

/// Resolves the device identity behind an open file descriptor.
///
/// Identity is matched by bus tag first, then by render node, so a
/// descriptor opened on any node of a device resolves to the same entry.
pub fn device_for_fd(fd: BorrowedFd) -> Option<Device> {
    if let Some(tag) = loader::id_path_tag_for_fd(fd) {
        if let Some(device) = devices()
            .into_iter()
            .find(|device| device.id_path_tag.as_deref() == Some(tag.as_str()))
        {
            return Some(device);
        }
    }

    let render_node = loader::render_node_for_fd(fd)?;
    devices()
        .into_iter()
        .find(|device| device.render_node.as_deref() == Some(render_node.as_path()))
}

fn scan_render_nodes() -> Vec<Device> {
    let mut found = Vec::new();
    let entries = match fs::read_dir("/dev/dri") {
        Ok(entries) => entries,
        Err(_) => return found,
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) if name.starts_with("renderD") => name.to_owned(),
            _ => continue,
        };
        found.push(device_for_render_node(&name, entry.path()));
    }
    found.sort_by(|a, b| a.render_node.cmp(&b.render_node));
    found
}

fn device_for_render_node(name: &str, path: PathBuf) -> Device {
    // Sysfs mirrors every DRM node under /sys/class/drm, so the identity can
    // be read without opening the node itself.
    let sysfs = PathBuf::from("/sys/class/drm").join(name).join("device");
    let vendor = read_sysfs_hex(&sysfs.join("vendor"));
    let chip = read_sysfs_hex(&sysfs.join("device"));
    let id_path_tag = fs::read_to_string(sysfs.join("uevent"))
        .ok()
        .and_then(|uevent| loader::pci_slot_to_id_path_tag(&uevent));

    Device {
        capabilities: DeviceCapabilities::DRM,
        render_node: Some(path),
        id_path_tag,
        vendor_chip: match (vendor, chip) {
            (Some(vendor), Some(chip)) => Some((vendor, chip)),
            _ => None,
        },
    }
}

fn read_sysfs_hex(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    let trimmed = raw.trim().trim_start_matches("0x");
    u32::from_str_radix(trimmed, 16).ok()
}
