//! Physical Devices (PDEV)
//!
//! A PDEV describes one output device: its native resolution and depth,
//! what the driver can do, and the surface it draws into. DCs hold a counted
//! reference ([`PdevRef`]) to the device they were opened on.
//!
//! # Device Resolution
//!
//! A request naming no device, or the name `DISPLAY` in any case, resolves
//! to the primary display.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/pdevobj.cxx`
//! - `windows/core/ntgdi/gre/pdevobj.hxx`

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::Deref;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use spin::RwLock;

use crate::{HBITMAP, Size};

/// Alias for the primary display
pub const DISPLAY_DEVICE_NAME: &str = "DISPLAY";

bitflags::bitflags! {
    /// Driver graphics capabilities (GCAPS_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GraphicsCaps: u32 {
        const BEZIERS = 0x0000_0001;
        const GEOMETRIC_WIDEN = 0x0000_0002;
        const ALTERNATE_FILL = 0x0000_0004;
        const WINDING_FILL = 0x0000_0008;
        const HALFTONE = 0x0000_0010;
        const COLOR_DITHER = 0x0000_0020;
        const PALMANAGED = 0x0000_0080;
    }
}

bitflags::bitflags! {
    /// Device flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PdevFlags: u32 {
        /// Device drives a display
        const DISPLAY = 0x0001;
    }
}

/// Device metrics reported by the driver (GDIINFO subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdiInfo {
    pub horz_res: u32,
    pub vert_res: u32,
    pub bits_pixel: u32,
    pub planes: u32,
}

impl GdiInfo {
    pub const fn new(horz_res: u32, vert_res: u32, bits_pixel: u32) -> Self {
        Self {
            horz_res,
            vert_res,
            bits_pixel,
            planes: 1,
        }
    }

    /// Native resolution
    pub const fn size(&self) -> Size {
        Size::new(self.horz_res as i32, self.vert_res as i32)
    }

    /// Color depth of a pixel across all planes
    pub const fn device_bpp(&self) -> u32 {
        self.bits_pixel * self.planes
    }
}

/// Initialization data supplied when opening a DC (DEVMODE subset)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevMode {
    pub device_name: String,
    pub pels_width: u32,
    pub pels_height: u32,
    pub bits_per_pel: u32,
    pub display_frequency: u32,
}

impl DevMode {
    /// Check that the requested mode does not exceed what the device offers
    pub fn fits(&self, info: &GdiInfo) -> bool {
        self.pels_width <= info.horz_res
            && self.pels_height <= info.vert_res
            && self.bits_per_pel <= info.device_bpp()
    }
}

/// Physical device object
#[derive(Debug)]
pub struct Pdev {
    name: String,
    gdi_info: GdiInfo,
    caps: GraphicsCaps,
    flags: PdevFlags,
    surface: HBITMAP,
    dhpdev: usize,
    ref_count: AtomicU32,
}

impl Pdev {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gdi_info(&self) -> &GdiInfo {
        &self.gdi_info
    }

    pub fn caps(&self) -> GraphicsCaps {
        self.caps
    }

    pub fn flags(&self) -> PdevFlags {
        self.flags
    }

    pub fn is_display(&self) -> bool {
        self.flags.contains(PdevFlags::DISPLAY)
    }

    /// Surface the device draws into
    pub fn surface(&self) -> HBITMAP {
        self.surface
    }

    /// Driver instance handle
    pub fn dhpdev(&self) -> usize {
        self.dhpdev
    }

    /// Outstanding references
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }
}

/// Counted reference to a device
///
/// Cloning takes another reference, dropping releases it.
#[derive(Debug)]
pub struct PdevRef(Arc<Pdev>);

impl PdevRef {
    fn new(pdev: Arc<Pdev>) -> Self {
        pdev.ref_count.fetch_add(1, Ordering::AcqRel);
        PdevRef(pdev)
    }

    pub fn ptr_eq(&self, other: &Arc<Pdev>) -> bool {
        Arc::ptr_eq(&self.0, other)
    }
}

impl Clone for PdevRef {
    fn clone(&self) -> Self {
        PdevRef::new(self.0.clone())
    }
}

impl Drop for PdevRef {
    fn drop(&mut self) {
        self.0.ref_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Deref for PdevRef {
    type Target = Pdev;

    fn deref(&self) -> &Pdev {
        &self.0
    }
}

/// Registered devices
pub struct DeviceRegistry {
    devices: RwLock<Vec<Arc<Pdev>>>,
    next_dhpdev: AtomicUsize,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
            next_dhpdev: AtomicUsize::new(1),
        }
    }

    /// Add a device drawing into `surface`
    pub fn register(&self, name: &str, gdi_info: GdiInfo, caps: GraphicsCaps, flags: PdevFlags, surface: HBITMAP) -> Arc<Pdev> {
        let pdev = Arc::new(Pdev {
            name: String::from(name),
            gdi_info,
            caps,
            flags,
            surface,
            dhpdev: self.next_dhpdev.fetch_add(1, Ordering::Relaxed),
            ref_count: AtomicU32::new(0),
        });

        log::info!(
            "[GDI/PDEV] Registered {} ({}x{}x{})",
            name,
            gdi_info.horz_res,
            gdi_info.vert_res,
            gdi_info.device_bpp()
        );

        self.devices.write().push(pdev.clone());
        pdev
    }

    /// The first registered display device
    pub fn primary(&self) -> Option<Arc<Pdev>> {
        self.devices.read().iter().find(|p| p.is_display()).cloned()
    }

    /// Device is the primary display
    pub fn is_primary(&self, pdev: &Pdev) -> bool {
        self.primary().map_or(false, |p| core::ptr::eq(Arc::as_ptr(&p), pdev))
    }

    /// Look up a device and take a reference on it
    pub fn resolve(&self, name: Option<&str>) -> Option<PdevRef> {
        let pdev = match name {
            None => self.primary(),
            Some(n) if n.eq_ignore_ascii_case(DISPLAY_DEVICE_NAME) => self.primary(),
            Some(n) => self
                .devices
                .read()
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(n))
                .cloned(),
        };
        pdev.map(PdevRef::new)
    }

    pub fn count(&self) -> usize {
        self.devices.read().len()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
