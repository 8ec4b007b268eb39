// dridev/src/tests.rs
//
//! Unit tests.

use crate::config::Config;
use crate::device::{self, Device, DeviceCapabilities};
use crate::display::{Display, DisplayOptions};
use crate::driver::{
    self, BufferMask, DrawableHandle, DriverConfig, DriverScreen, ExtensionKind, ImageHandle,
    ImageLoader, PixelLayout,
};
use crate::error::Error;
use crate::loader;
use crate::surface::{ImageFormat, SurfaceKey, SurfaceTypeFlags};
use crate::CacheKey;

use euclid::default::Size2D;
use serial_test::serial;

use std::cell::Cell;
use std::collections::HashMap;
use std::fs::File;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;
use std::rc::Rc;

const ARGB8888: DriverConfig = DriverConfig {
    red_bits: 8,
    green_bits: 8,
    blue_bits: 8,
    alpha_bits: 8,
    double_buffered: false,
};
const XRGB8888: DriverConfig = DriverConfig {
    red_bits: 8,
    green_bits: 8,
    blue_bits: 8,
    alpha_bits: 0,
    double_buffered: false,
};
const RGB565: DriverConfig = DriverConfig {
    red_bits: 5,
    green_bits: 6,
    blue_bits: 5,
    alpha_bits: 0,
    double_buffered: false,
};

#[derive(Clone, Default)]
struct DriverCounters {
    images: Rc<Cell<usize>>,
    drawables: Rc<Cell<usize>>,
}

struct MockScreen {
    extensions: Vec<ExtensionKind>,
    configs: Vec<DriverConfig>,
    fail_image_allocation: bool,
    fail_drawable_creation: bool,
    exposed: HashMap<[u32; 4], u32>,
    counters: DriverCounters,
    next_handle: u64,
}

impl MockScreen {
    fn new(configs: &[DriverConfig]) -> MockScreen {
        MockScreen {
            extensions: vec![
                ExtensionKind::Core,
                ExtensionKind::Image,
                ExtensionKind::Invalidate,
            ],
            configs: configs.to_vec(),
            fail_image_allocation: false,
            fail_drawable_creation: false,
            exposed: HashMap::new(),
            counters: DriverCounters::default(),
            next_handle: 1,
        }
    }

    fn counters(&self) -> DriverCounters {
        self.counters.clone()
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl DriverScreen for MockScreen {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn extensions(&self) -> &[ExtensionKind] {
        &self.extensions
    }

    fn configs(&self) -> &[DriverConfig] {
        &self.configs
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
        _surface: SurfaceKey,
    ) -> Result<DrawableHandle, Error> {
        if self.fail_drawable_creation {
            return Err(Error::AllocError);
        }
        let handle = self.next_handle();
        self.counters.drawables.set(self.counters.drawables.get() + 1);
        Ok(DrawableHandle(handle))
    }

    fn destroy_drawable(&mut self, _drawable: DrawableHandle) {
        self.counters.drawables.set(self.counters.drawables.get() - 1);
    }

    fn create_image(
        &mut self,
        _size: Size2D<i32>,
        _format: ImageFormat,
    ) -> Result<ImageHandle, Error> {
        if self.fail_image_allocation {
            return Err(Error::AllocError);
        }
        let handle = self.next_handle();
        self.counters.images.set(self.counters.images.get() + 1);
        Ok(ImageHandle(handle))
    }

    fn destroy_image(&mut self, _image: ImageHandle) {
        self.counters.images.set(self.counters.images.get() - 1);
    }
}

fn mock_display(screen: MockScreen) -> Result<Display, Error> {
    Display::with_screen(
        Device::software(),
        None,
        "mock".to_owned(),
        Box::new(screen),
    )
}

fn fake_hardware_device() -> Device {
    Device {
        capabilities: DeviceCapabilities::DRM,
        render_node: Some("/dev/dri/renderD128".into()),
        id_path_tag: Some("pci-0000_99_00_0".to_owned()),
        vendor_chip: Some((0x8086, 0x9a49)),
    }
}

#[test]
#[serial]
fn test_software_display_open() {
    let devices = device::devices();
    let software = devices[0].clone();
    assert!(software.supports(DeviceCapabilities::SOFTWARE));

    let display = Display::open(&software, DisplayOptions::default()).unwrap();
    assert_eq!(display.driver_name(), "swrast");
    assert!(display.device_fd().is_none());
    assert_eq!(display.extensions().bound().len(), 3);

    // One config per layout, 1-based and contiguous, all pbuffer-capable.
    let configs = display.configs();
    assert_eq!(configs.len(), 3);
    for (index, config) in configs.iter().enumerate() {
        assert_eq!(config.id, index as u32 + 1);
        assert_eq!(config.surface_types, SurfaceTypeFlags::PBUFFER);
    }
    assert_eq!(
        (configs[0].red_bits, configs[0].alpha_bits),
        (8, 8)
    );
    assert_eq!(
        (configs[1].red_bits, configs[1].alpha_bits),
        (8, 0)
    );
    assert_eq!(
        (configs[2].red_bits, configs[2].green_bits, configs[2].blue_bits),
        (5, 6, 5)
    );
}

#[test]
#[serial]
fn test_software_surface_end_to_end() {
    let software = device::devices()[0].clone();
    let mut display = Display::open(&software, DisplayOptions::default()).unwrap();

    let config_id = display.configs()[0].id;
    let surface = display
        .create_pbuffer_surface(config_id, Size2D::new(64, 64))
        .unwrap();
    assert_eq!(display.surface_size(surface), Some(Size2D::new(64, 64)));
    assert_eq!(display.surface_config_id(surface), Some(config_id));

    let list = display.get_buffers(surface, BufferMask::FRONT);
    assert_eq!(list.mask, BufferMask::FRONT);
    assert!(list.front.is_some());

    display.swap_buffers(surface).unwrap();
    display.destroy_surface(surface);
    assert!(display.surface_size(surface).is_none());
}

#[test]
fn test_config_enumeration_deduplicates() {
    // Duplicate driver configs redirect to the already-exposed config; the
    // identifier counter must not advance for them.
    let screen = MockScreen::new(&[ARGB8888, ARGB8888, XRGB8888, RGB565, RGB565]);
    let display = mock_display(screen).unwrap();

    let ids: Vec<u32> = display.configs().iter().map(|config| config.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_config_enumeration_deterministic() {
    let first = mock_display(MockScreen::new(&[XRGB8888, ARGB8888, RGB565])).unwrap();
    let second = mock_display(MockScreen::new(&[XRGB8888, ARGB8888, RGB565])).unwrap();
    let as_tuples = |display: &Display| -> Vec<(u32, u8, u8, u8, u8)> {
        display
            .configs()
            .iter()
            .map(|config| {
                (
                    config.id,
                    config.red_bits,
                    config.green_bits,
                    config.blue_bits,
                    config.alpha_bits,
                )
            })
            .collect()
    };
    assert_eq!(as_tuples(&first), as_tuples(&second));
}

#[test]
fn test_empty_config_list_yields_no_configs() {
    match mock_display(MockScreen::new(&[])) {
        Err(Error::NoConfigsAvailable) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[test]
fn test_missing_required_extension() {
    let mut screen = MockScreen::new(&[ARGB8888]);
    screen.extensions = vec![ExtensionKind::Core, ExtensionKind::Image];
    match mock_display(screen) {
        Err(Error::MissingRequiredExtension(ExtensionKind::Invalidate)) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[test]
fn test_create_destroy_leaves_no_driver_resources() {
    let screen = MockScreen::new(&[ARGB8888, XRGB8888, RGB565]);
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    for _ in 0..3 {
        let surface = display
            .create_pbuffer_surface(1, Size2D::new(32, 32))
            .unwrap();
        let list = display.get_buffers(surface, BufferMask::FRONT);
        assert!(list.front.is_some());
        display.destroy_surface(surface);
        assert_eq!(counters.images.get(), 0);
        assert_eq!(counters.drawables.get(), 0);
    }
}

#[test]
fn test_destroy_is_idempotent() {
    let screen = MockScreen::new(&[ARGB8888]);
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(16, 16))
        .unwrap();
    display.get_buffers(surface, BufferMask::FRONT);
    display.destroy_surface(surface);
    display.destroy_surface(surface);
    assert_eq!(counters.images.get(), 0);
    assert_eq!(counters.drawables.get(), 0);
}

#[test]
fn test_display_drop_destroys_remaining_surfaces() {
    let screen = MockScreen::new(&[ARGB8888]);
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(16, 16))
        .unwrap();
    display.get_buffers(surface, BufferMask::FRONT);
    assert_eq!(counters.images.get(), 1);
    assert_eq!(counters.drawables.get(), 1);

    drop(display);
    assert_eq!(counters.images.get(), 0);
    assert_eq!(counters.drawables.get(), 0);
}

#[test]
fn test_buffer_callback_allocates_at_most_one_image() {
    let screen = MockScreen::new(&[ARGB8888]);
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(8, 8))
        .unwrap();
    let first = display.get_buffers(surface, BufferMask::FRONT);
    let second = display.get_buffers(surface, BufferMask::FRONT);
    assert_eq!(counters.images.get(), 1);
    assert_eq!(first.front, second.front);
}

#[test]
fn test_buffer_callback_swallows_allocation_failure() {
    let mut screen = MockScreen::new(&[ARGB8888]);
    screen.fail_image_allocation = true;
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(8, 8))
        .unwrap();
    let list = display.get_buffers(surface, BufferMask::FRONT);
    assert_eq!(list.mask, BufferMask::empty());
    assert!(list.front.is_none());
}

#[test]
fn test_back_slot_is_never_populated() {
    let screen = MockScreen::new(&[ARGB8888]);
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(8, 8))
        .unwrap();
    let list = display.get_buffers(surface, BufferMask::FRONT | BufferMask::BACK);
    assert_eq!(list.mask, BufferMask::FRONT);
    assert!(list.back.is_none());

    let back_only = display.get_buffers(surface, BufferMask::BACK);
    assert_eq!(back_only.mask, BufferMask::empty());
}

#[test]
fn test_format_derivation() {
    let config = |red_bits, green_bits, blue_bits, alpha_bits| Config {
        id: 1,
        red_bits,
        green_bits,
        blue_bits,
        alpha_bits,
        surface_types: SurfaceTypeFlags::PBUFFER,
        driver_index: 0,
    };
    assert_eq!(ImageFormat::for_config(&config(5, 6, 5, 0)), ImageFormat::Rgb565);
    assert_eq!(ImageFormat::for_config(&config(8, 8, 8, 0)), ImageFormat::Xrgb8888);
    assert_eq!(ImageFormat::for_config(&config(8, 8, 8, 8)), ImageFormat::Argb8888);
}

#[test]
fn test_surface_formats_follow_configs() {
    let screen = MockScreen::new(&[ARGB8888, XRGB8888, RGB565]);
    let mut display = mock_display(screen).unwrap();

    let expectations = [
        (1, ImageFormat::Argb8888),
        (2, ImageFormat::Xrgb8888),
        (3, ImageFormat::Rgb565),
    ];
    for &(config_id, format) in &expectations {
        let surface = display
            .create_pbuffer_surface(config_id, Size2D::new(4, 4))
            .unwrap();
        assert_eq!(display.surface_format(surface), Some(format));
        display.destroy_surface(surface);
    }
}

#[test]
fn test_swap_succeeds_and_changes_nothing() {
    let screen = MockScreen::new(&[ARGB8888]);
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    let surface = display
        .create_pbuffer_surface(1, Size2D::new(8, 8))
        .unwrap();
    let before = display.get_buffers(surface, BufferMask::FRONT);
    display.swap_buffers(surface).unwrap();
    let after = display.get_buffers(surface, BufferMask::FRONT);
    assert_eq!(before, after);
    assert_eq!(counters.images.get(), 1);
}

#[test]
fn test_unsupported_config_rejected() {
    let screen = MockScreen::new(&[ARGB8888]);
    let mut display = mock_display(screen).unwrap();
    match display.create_pbuffer_surface(99, Size2D::new(8, 8)) {
        Err(Error::UnsupportedConfig) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[test]
fn test_drawable_failure_unwinds_surface() {
    let mut screen = MockScreen::new(&[ARGB8888]);
    screen.fail_drawable_creation = true;
    let counters = screen.counters();
    let mut display = mock_display(screen).unwrap();

    match display.create_pbuffer_surface(1, Size2D::new(8, 8)) {
        Err(Error::AllocError) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert_eq!(counters.drawables.get(), 0);
    assert!(display.surface_size(SurfaceKey(0)).is_none());
}

#[test]
#[serial]
fn test_device_mismatch_before_driver_load() {
    let target = fake_hardware_device();
    let unrelated: OwnedFd = File::open("/dev/null").unwrap().into();
    let options = DisplayOptions {
        device_fd: Some(unrelated),
    };
    match Display::open(&target, options) {
        Err(Error::DeviceMismatch) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[test]
#[serial]
#[should_panic]
fn test_capability_free_device_is_unreachable() {
    let broken = Device {
        capabilities: DeviceCapabilities::empty(),
        render_node: None,
        id_path_tag: None,
        vendor_chip: None,
    };
    let _ = Display::open(&broken, DisplayOptions::default());
}

#[test]
#[serial]
fn test_device_registry() {
    device::teardown();
    assert!(device::num_devices() >= 1);

    let devices = device::devices();
    assert!(devices[0].supports(DeviceCapabilities::SOFTWARE));
    assert!(device::is_valid(&devices[0]));

    device::teardown();
    // The list lazily rebuilds after teardown.
    assert!(device::num_devices() >= 1);
}

#[test]
fn test_driver_registry() {
    match driver::load_accelerated_driver("no-such-driver", 0) {
        Err(Error::DriverLoadError) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }

    fn factory(_fd: std::os::fd::RawFd) -> Result<Box<dyn DriverScreen>, Error> {
        Ok(Box::new(MockScreen::new(&[ARGB8888])))
    }
    driver::register_driver("mock-hw", factory);
    let screen = driver::load_accelerated_driver("mock-hw", 0).unwrap();
    assert_eq!(screen.driver_name(), "mock");
}

#[test]
fn test_loader_id_path_tag() {
    let uevent = "DRIVER=i915\nPCI_SLOT_NAME=0000:02:00.0\nPCI_ID=8086:9A49\n";
    assert_eq!(
        loader::pci_slot_to_id_path_tag(uevent).as_deref(),
        Some("pci-0000_02_00_0")
    );
    assert!(loader::pci_slot_to_id_path_tag("MAJOR=226\n").is_none());
}

#[test]
fn test_loader_open_missing_node() {
    match loader::open_device(Path::new("/dev/dri/renderD999-does-not-exist")) {
        Err(Error::OpenError) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
}

#[test]
fn test_loader_rejects_non_character_devices() {
    let file = File::open("/").unwrap();
    assert!(loader::device_node_from_fd(file.as_fd()).is_none());

    let null = File::open("/dev/null").unwrap();
    assert_eq!(loader::device_node_from_fd(null.as_fd()), Some((1, 3)));
}

#[test]
fn test_cache_key_known_vector() {
    let key = CacheKey::compute([b"abc".as_slice()]);
    assert_eq!(key.to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");

    let split = CacheKey::compute([b"ab".as_slice(), b"c".as_slice()]);
    assert_eq!(key, split);
}
