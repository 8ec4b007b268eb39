// dridev/src/loader.rs
//
//! Generic helpers for opening device nodes and resolving the driver behind
//! an open descriptor.

use crate::error::Error;

use std::env;
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// PCI vendor id to driver name.
///
/// This is the loader's registered-driver table; a vendor absent from it can
/// still resolve through the sysfs kernel-driver fallback.
static DRIVER_MAP: [(u32, &str); 5] = [
    (0x8086, "i915"),
    (0x1002, "radeonsi"),
    (0x10de, "nouveau"),
    (0x15ad, "vmwgfx"),
    (0x1af4, "virtio_gpu"),
];

static DRI_PRIME_ENV_VAR: &str = "DRI_PRIME";

/// Opens a device node read-write with close-on-exec.
///
/// Kernels that reject `O_CLOEXEC` at open time get the flag applied through
/// `fcntl` instead.
pub fn open_device(path: &Path) -> Result<OwnedFd, Error> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::OpenError)?;
    unsafe {
        let mut fd = libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC);
        if fd == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::EINVAL) {
            fd = libc::open(c_path.as_ptr(), libc::O_RDWR);
            if fd != -1 {
                let flags = libc::fcntl(fd, libc::F_GETFD);
                libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
        if fd == -1 {
            warn!("failed to open device node {:?}", path);
            return Err(Error::OpenError);
        }
        Ok(OwnedFd::from_raw_fd(fd))
    }
}

/// Returns the (major, minor) numbers of the character device behind a
/// descriptor.
pub fn device_node_from_fd(fd: BorrowedFd) -> Option<(u32, u32)> {
    unsafe {
        let mut buf: libc::stat = std::mem::zeroed();
        if libc::fstat(fd.as_raw_fd(), &mut buf) < 0 {
            warn!("failed to stat fd {}", fd.as_raw_fd());
            return None;
        }
        if (buf.st_mode & libc::S_IFMT) != libc::S_IFCHR {
            warn!("fd {} is not a character device", fd.as_raw_fd());
            return None;
        }
        Some((libc::major(buf.st_rdev), libc::minor(buf.st_rdev)))
    }
}

fn sysfs_device_dir(fd: BorrowedFd) -> Option<PathBuf> {
    let (major, minor) = device_node_from_fd(fd)?;
    Some(PathBuf::from(format!(
        "/sys/dev/char/{}:{}/device",
        major, minor
    )))
}

/// Reads the PCI vendor and chip id of the device behind a descriptor.
pub fn pci_id_for_fd(fd: BorrowedFd) -> Option<(u32, u32)> {
    let sysfs = sysfs_device_dir(fd)?;
    let vendor = read_hex_file(&sysfs.join("vendor"))?;
    let chip = read_hex_file(&sysfs.join("device"))?;
    Some((vendor, chip))
}

/// Resolves the driver name for an open descriptor.
///
/// Resolution goes through the PCI-id table first, then falls back to the
/// kernel driver name sysfs reports for the device.
pub fn driver_for_fd(fd: BorrowedFd) -> Result<String, Error> {
    if let Some((vendor, chip)) = pci_id_for_fd(fd) {
        for &(map_vendor, driver) in &DRIVER_MAP {
            if vendor == map_vendor {
                debug!(
                    "pci id for fd {}: {:04x}:{:04x}, driver {}",
                    fd.as_raw_fd(),
                    vendor,
                    chip,
                    driver
                );
                return Ok(driver.to_owned());
            }
        }
        warn!(
            "pci id for fd {}: {:04x}:{:04x}, no driver found",
            fd.as_raw_fd(),
            vendor,
            chip
        );
    }

    // Non-PCI device, or a vendor the table does not know. Ask the kernel.
    let driver = sysfs_device_dir(fd)
        .and_then(|sysfs| uevent_field(&sysfs.join("uevent"), "DRIVER"))
        .ok_or(Error::DriverResolutionError)?;
    info!("using kernel driver {} for fd {}", driver, fd.as_raw_fd());
    Ok(driver)
}

/// Finds the render node belonging to the same DRM device as the descriptor.
pub fn render_node_for_fd(fd: BorrowedFd) -> Option<PathBuf> {
    let drm_dir = sysfs_device_dir(fd)?.join("drm");
    let entries = fs::read_dir(drm_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if name.starts_with("renderD") {
                return Some(PathBuf::from("/dev/dri").join(name));
            }
        }
    }
    None
}

/// The bus identity tag for the device behind a descriptor.
pub fn id_path_tag_for_fd(fd: BorrowedFd) -> Option<String> {
    let uevent = sysfs_device_dir(fd)?.join("uevent");
    let contents = fs::read_to_string(uevent).ok()?;
    pci_slot_to_id_path_tag(&contents)
}

/// Builds a `pci-dddd_bb_ss_f` tag from a sysfs uevent blob.
pub(crate) fn pci_slot_to_id_path_tag(uevent: &str) -> Option<String> {
    let slot = uevent
        .lines()
        .find_map(|line| line.strip_prefix("PCI_SLOT_NAME="))?;
    // "0000:02:00.0" becomes "pci-0000_02_00_0".
    let tag = slot.replace([':', '.'], "_");
    Some(format!("pci-{}", tag))
}

fn uevent_field(path: &Path, field: &str) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    contents
        .lines()
        .find_map(|line| line.strip_prefix(field).and_then(|rest| rest.strip_prefix('=')))
        .map(str::to_owned)
}

fn read_hex_file(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()
}

/// Applies the user's `DRI_PRIME` device-selection override to an already
/// opened descriptor.
///
/// `"1"` selects any render node other than the default's; any other value
/// selects the device with that bus tag. Returns the chosen descriptor and
/// whether it differs from the default. Every failure path falls back to the
/// default descriptor unchanged.
pub fn user_preferred_fd(default_fd: OwnedFd) -> (OwnedFd, bool) {
    let prime = match env::var(DRI_PRIME_ENV_VAR) {
        Ok(prime) if !prime.is_empty() => prime,
        _ => return (default_fd, false),
    };

    let default_tag = match id_path_tag_for_fd(default_fd.as_fd()) {
        Some(tag) => tag,
        None => return (default_fd, false),
    };

    let target = crate::device::devices().into_iter().find(|device| {
        let tag = match device.id_path_tag() {
            Some(tag) => tag,
            None => return false,
        };
        if prime == "1" {
            device.render_node_path().is_some() && tag != default_tag
        } else {
            tag == prime
        }
    });

    let node = match target.as_ref().and_then(|device| device.render_node_path()) {
        Some(node) => node.to_owned(),
        None => return (default_fd, false),
    };

    match open_device(&node) {
        Ok(fd) => {
            info!("DRI_PRIME selected {:?}", node);
            let different = target
                .and_then(|device| device.id_path_tag().map(|tag| tag != default_tag))
                .unwrap_or(false);
            drop(default_fd);
            (fd, different)
        }
        Err(_) => (default_fd, false),
    }
}
