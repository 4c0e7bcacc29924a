//! Win32k GDI Core
//!
//! Kernel-mode device-context management for the Nostalgia OS graphical
//! subsystem, following the Windows NT win32k architecture.
//!
//! # Architecture
//!
//! - **gdi/**: handle table, shared graphics objects, devices and the
//!   device-context (DC) lifecycle
//!
//! # NT Functions
//!
//! GDI entry points (NtGdiXxx) implemented here:
//! - `NtGdiOpenDCW` - Open a DC on a named (or the default) device
//! - `NtGdiCreateCompatibleDC` - Create a memory DC
//! - `NtGdiDeleteObjectApp` - Application delete of a DC or object
//! - `NtGdiSaveDC` / `NtGdiRestoreDC` - Attribute snapshots
//!
//! # References
//!
//! Based on Windows Server 2003 win32k.sys implementation:
//! - `windows/core/ntgdi/gre/dcobj.cxx`
//! - `windows/core/ntgdi/gre/hmgrapi.cxx`

#![no_std]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::upper_case_acronyms)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod gdi;

use core::fmt;

// ============================================================================
// NT Status Codes
// ============================================================================

/// Win32k status codes
///
/// Every failure of the DC core maps onto one of these. Entry points hand the
/// value back to callers as the per-process last error.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum W32Status {
    Success = 0,
    /// Handle is unknown, stale, of the wrong type or not yet published
    InvalidHandle = 0xC0000008,
    /// Object is being destroyed
    ObjectDead = 0xC0000056,
    /// No device matches the request
    NoSuitableDevice = 0xC000000E,
    /// The GDI handle table is exhausted
    OutOfHandles = 0xC0000017,
    /// A required shared resource could not be acquired
    ResourceUnavailable = 0xC000009A,
    /// Restore to a level that does not exist
    InvalidSaveLevel = 0xC000000D,
    /// A DC or one of its private objects could not change owner
    OwnershipTransferFailed = 0xC0000022,
    /// Subsystem startup failed; no further requests are served
    InitializationFailed = 0xC0000142,
}

impl W32Status {
    pub fn is_success(self) -> bool {
        self == W32Status::Success
    }

    /// Raw NT status value
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for W32Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            W32Status::Success => "success",
            W32Status::InvalidHandle => "invalid handle",
            W32Status::ObjectDead => "object is being destroyed",
            W32Status::NoSuitableDevice => "no suitable device",
            W32Status::OutOfHandles => "out of GDI handles",
            W32Status::ResourceUnavailable => "shared resource unavailable",
            W32Status::InvalidSaveLevel => "invalid save level",
            W32Status::OwnershipTransferFailed => "ownership transfer failed",
            W32Status::InitializationFailed => "GDI initialization failed",
        };
        write!(f, "{} ({:#010x})", text, self.code())
    }
}

// ============================================================================
// Object Types
// ============================================================================

/// GDI object types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GdiObjectType {
    None = 0,
    DC = 1,           // Device Context
    Bitmap = 2,       // Bitmap/Surface
    Brush = 3,        // Brush
    Pen = 4,          // Pen
    Font = 5,         // Font
    Region = 6,       // Region
    Palette = 7,      // Palette
    Path = 8,         // Path
}

// ============================================================================
// Handle Types
// ============================================================================

/// GDI handle (HDC, HBITMAP, HBRUSH, etc.)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GdiHandle(u32);

impl GdiHandle {
    pub const NULL: GdiHandle = GdiHandle(0);

    /// Stock object marker bit
    const STOCK_BIT: u32 = 0x0080_0000;

    /// Create a new handle from index and type
    pub const fn new(index: u16, obj_type: GdiObjectType) -> Self {
        Self::with_unique(index, obj_type, 0)
    }

    /// Create a handle carrying a slot reuse counter
    pub const fn with_unique(index: u16, obj_type: GdiObjectType, unique: u8) -> Self {
        // Handle format: type (8 bits) | stock (1 bit) | unique (7 bits) | index (16 bits)
        GdiHandle(((obj_type as u32) << 24) | (((unique & 0x7F) as u32) << 16) | (index as u32))
    }

    /// Same handle with the stock bit set
    pub const fn as_stock(self) -> Self {
        GdiHandle(self.0 | Self::STOCK_BIT)
    }

    /// Check the stock bit
    pub const fn is_stock(self) -> bool {
        self.0 & Self::STOCK_BIT != 0
    }

    /// Get the object type from handle
    pub const fn object_type(self) -> GdiObjectType {
        match (self.0 >> 24) as u8 {
            1 => GdiObjectType::DC,
            2 => GdiObjectType::Bitmap,
            3 => GdiObjectType::Brush,
            4 => GdiObjectType::Pen,
            5 => GdiObjectType::Font,
            6 => GdiObjectType::Region,
            7 => GdiObjectType::Palette,
            8 => GdiObjectType::Path,
            _ => GdiObjectType::None,
        }
    }

    /// Get the index from handle
    pub const fn index(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Get the slot reuse counter
    pub const fn unique(self) -> u8 {
        ((self.0 >> 16) & 0x7F) as u8
    }

    /// Check if handle is valid
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && !matches!(self.object_type(), GdiObjectType::None)
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Get raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from its raw value
    pub const fn from_raw(raw: u32) -> Self {
        GdiHandle(raw)
    }
}

impl fmt::Display for GdiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// Type aliases for clarity
pub type HDC = GdiHandle;
pub type HBITMAP = GdiHandle;
pub type HBRUSH = GdiHandle;
pub type HPEN = GdiHandle;
pub type HFONT = GdiHandle;
pub type HRGN = GdiHandle;
pub type HPALETTE = GdiHandle;
pub type HPATH = GdiHandle;

// ============================================================================
// Processes
// ============================================================================

/// Owning process of a GDI object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Objects usable by every process (stock objects)
    pub const PUBLIC: ProcessId = ProcessId(0);
    /// The system process
    pub const SYSTEM: ProcessId = ProcessId(4);
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

// ============================================================================
// Common Structures
// ============================================================================

/// Point structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Size structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub cx: i32,
    pub cy: i32,
}

impl Size {
    pub const fn new(cx: i32, cy: i32) -> Self {
        Size { cx, cy }
    }
}

/// Rectangle structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Rect { left, top, right, bottom }
    }

    /// Rectangle anchored at the origin
    pub const fn from_size(size: Size) -> Self {
        Rect::new(0, 0, size.cx, size.cy)
    }

    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn contains_point(&self, pt: Point) -> bool {
        pt.x >= self.left && pt.x < self.right &&
        pt.y >= self.top && pt.y < self.bottom
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let result = Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };

        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// RGB color
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorRef(pub u32);

impl ColorRef {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        ColorRef((r as u32) | ((g as u32) << 8) | ((b as u32) << 16))
    }

    pub const fn red(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn green(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub const fn blue(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// Convert to 32-bit BGRA format (for framebuffer)
    pub const fn to_bgra(self) -> u32 {
        (self.blue() as u32) |
        ((self.green() as u32) << 8) |
        ((self.red() as u32) << 16) |
        0xFF000000 // Alpha = 255
    }

    /// Convert to 16-bit 5-6-5
    pub const fn to_rgb565(self) -> u32 {
        (((self.red() as u32) >> 3) << 11) |
        (((self.green() as u32) >> 2) << 5) |
        ((self.blue() as u32) >> 3)
    }
}

// Standard colors
impl ColorRef {
    pub const BLACK: ColorRef = ColorRef::rgb(0, 0, 0);
    pub const WHITE: ColorRef = ColorRef::rgb(255, 255, 255);
    pub const GRAY: ColorRef = ColorRef::rgb(128, 128, 128);
    pub const LIGHT_GRAY: ColorRef = ColorRef::rgb(192, 192, 192);
    pub const DARK_GRAY: ColorRef = ColorRef::rgb(64, 64, 64);

    /// CLR_INVALID
    pub const INVALID: ColorRef = ColorRef(0xFFFF_FFFF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_fields_round_trip() {
        let h = GdiHandle::with_unique(0x1234, GdiObjectType::Region, 0x85);
        assert_eq!(h.index(), 0x1234);
        assert_eq!(h.object_type(), GdiObjectType::Region);
        assert_eq!(h.unique(), 0x05);
        assert!(!h.is_stock());
        assert!(h.as_stock().is_stock());
        assert_eq!(h.as_stock().index(), 0x1234);
        assert_eq!(h.as_stock().object_type(), GdiObjectType::Region);
    }

    #[test]
    fn test_null_handle_is_invalid() {
        assert!(!GdiHandle::NULL.is_valid());
        assert!(GdiHandle::NULL.is_null());
        assert!(GdiHandle::new(1, GdiObjectType::DC).is_valid());
        assert!(!GdiHandle::from_raw(0x0000_0001).is_valid());
    }

    #[test]
    fn test_status_codes() {
        assert!(W32Status::Success.is_success());
        assert_eq!(W32Status::InvalidHandle.code(), 0xC0000008);
        assert!(!W32Status::InvalidSaveLevel.is_success());
    }

    #[test]
    fn test_color_encodings() {
        let c = ColorRef::rgb(0x12, 0x34, 0x56);
        assert_eq!(c.0, 0x0056_3412);
        assert_eq!(c.to_bgra(), 0xFF12_3456);
        assert_eq!(ColorRef::WHITE.to_rgb565(), 0xFFFF);
        assert_eq!(ColorRef::BLACK.to_rgb565(), 0);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 20, 20);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 10, 10)));
        assert_eq!(a.intersect(&Rect::new(10, 10, 12, 12)), None);
        assert_eq!(a.union(&b), Rect::new(0, 0, 20, 20));
        assert_eq!(Rect::from_size(Size::new(3, 4)), Rect::new(0, 0, 3, 4));
    }
}
