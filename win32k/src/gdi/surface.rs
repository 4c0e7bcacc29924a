//! Surface/Bitmap Objects
//!
//! Surfaces represent drawable areas - either a device framebuffer or an
//! in-memory bitmap for off-screen rendering. The DC core only binds them;
//! pixel operations belong to the rasterizer.
//!
//! # Surface Types
//!
//! - **Primary**: A device framebuffer
//! - **DIB**: Device-Independent Bitmap (memory)
//! - **DDB**: Device-Dependent Bitmap
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/surfobj.cxx`

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::gdiobj::{GdiObject, HandleTable, ShareLockable, SharedBody};
use crate::{GdiHandle, GdiObjectType, ProcessId, Size, W32Status};

// ============================================================================
// Types
// ============================================================================

/// Surface type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceType {
    #[default]
    None = 0,
    Primary = 1,      // Device framebuffer
    DeviceBitmap = 2, // DDB
    DIBSection = 3,   // DIB
}

/// Pixel format
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Unknown = 0,
    Indexed1 = 1,     // 1 bpp indexed
    Indexed4 = 2,     // 4 bpp indexed
    Indexed8 = 3,     // 8 bpp indexed
    Rgb555 = 4,       // 15 bpp (5-5-5)
    Rgb565 = 5,       // 16 bpp (5-6-5)
    Rgb24 = 6,        // 24 bpp (8-8-8)
    Rgb32 = 7,        // 32 bpp (8-8-8-8)
    Argb32 = 8,       // 32 bpp with alpha
}

impl PixelFormat {
    pub const fn bits_per_pixel(self) -> u8 {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::Indexed1 => 1,
            PixelFormat::Indexed4 => 4,
            PixelFormat::Indexed8 => 8,
            PixelFormat::Rgb555 => 16,
            PixelFormat::Rgb565 => 16,
            PixelFormat::Rgb24 => 24,
            PixelFormat::Rgb32 | PixelFormat::Argb32 => 32,
        }
    }

    /// Format for a device bit depth
    pub const fn from_bpp(bpp: u32) -> Self {
        match bpp {
            1 => PixelFormat::Indexed1,
            4 => PixelFormat::Indexed4,
            8 => PixelFormat::Indexed8,
            15 => PixelFormat::Rgb555,
            16 => PixelFormat::Rgb565,
            24 => PixelFormat::Rgb24,
            32 => PixelFormat::Rgb32,
            _ => PixelFormat::Unknown,
        }
    }
}

// ============================================================================
// Surface Structure
// ============================================================================

/// Surface object
#[derive(Debug)]
pub struct Surface {
    /// Surface type
    pub surf_type: SurfaceType,

    /// Pixel format
    pub format: PixelFormat,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bytes per scanline (stride)
    pub stride: u32,

    /// Pixel storage
    bits: Mutex<Vec<u8>>,
}

impl Surface {
    /// Create a zero-filled surface
    pub fn new(surf_type: SurfaceType, format: PixelFormat, width: u32, height: u32) -> Self {
        // Scanlines are DWORD aligned
        let stride = ((width * format.bits_per_pixel() as u32 + 31) / 32) * 4;
        let size = (stride * height) as usize;

        Self {
            surf_type,
            format,
            width,
            height,
            stride,
            bits: Mutex::new(vec![0u8; size]),
        }
    }

    /// Dimensions as a GDI size
    pub fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    /// Size of the pixel storage in bytes
    pub fn bits_len(&self) -> usize {
        self.bits.lock().len()
    }
}

impl ShareLockable for Surface {
    fn accepts(obj_type: GdiObjectType) -> bool {
        obj_type == GdiObjectType::Bitmap
    }

    fn shared_body(obj: &GdiObject) -> Option<&Arc<SharedBody<Self>>> {
        match obj {
            GdiObject::Surface(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Surface Operations
// ============================================================================

fn wrap(surface: Surface) -> GdiObject {
    GdiObject::Surface(Arc::new(SharedBody::new(surface)))
}

/// Create a memory bitmap
pub fn create_bitmap(
    table: &HandleTable,
    width: u32,
    height: u32,
    format: PixelFormat,
    owner: ProcessId,
) -> Result<GdiHandle, W32Status> {
    let surface = Surface::new(SurfaceType::DIBSection, format, width, height);
    table.alloc_object(GdiObjectType::Bitmap, wrap(surface), owner)
}

/// Create the framebuffer surface of a device
pub fn create_primary_surface(
    table: &HandleTable,
    width: u32,
    height: u32,
    bpp: u32,
) -> Result<GdiHandle, W32Status> {
    let surface = Surface::new(SurfaceType::Primary, PixelFormat::from_bpp(bpp), width, height);
    table.alloc_object(GdiObjectType::Bitmap, wrap(surface), ProcessId::SYSTEM)
}

/// Create the 1x1 monochrome stock bitmap
pub fn create_stock_bitmap(table: &HandleTable) -> Result<GdiHandle, W32Status> {
    let surface = Surface::new(SurfaceType::DeviceBitmap, PixelFormat::Indexed1, 1, 1);
    table.alloc_stock(GdiObjectType::Bitmap, wrap(surface))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_is_dword_aligned() {
        let s = Surface::new(SurfaceType::DIBSection, PixelFormat::Rgb24, 3, 2);
        assert_eq!(s.stride, 12);
        assert_eq!(s.bits_len(), 24);

        let mono = Surface::new(SurfaceType::DeviceBitmap, PixelFormat::Indexed1, 1, 1);
        assert_eq!(mono.stride, 4);
        assert_eq!(mono.size(), Size::new(1, 1));
    }

    #[test]
    fn test_format_from_bpp() {
        assert_eq!(PixelFormat::from_bpp(32), PixelFormat::Rgb32);
        assert_eq!(PixelFormat::from_bpp(16).bits_per_pixel(), 16);
        assert_eq!(PixelFormat::from_bpp(3), PixelFormat::Unknown);
    }

    #[test]
    fn test_stock_bitmap() {
        let table = HandleTable::new(4);
        let h = create_stock_bitmap(&table).unwrap();
        assert!(h.is_stock());
        let s = table.share_lock::<Surface>(h).unwrap();
        assert_eq!(s.size(), Size::new(1, 1));
        assert_eq!(s.format, PixelFormat::Indexed1);
    }
}
