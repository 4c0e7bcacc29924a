//! Palette Objects
//!
//! Logical palettes map color indices to RGB values. A DC always has a
//! palette selected; the stock default palette holds the 20 static system
//! colors.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/palette.cxx` - GRE palette implementation

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::gdiobj::{GdiObject, HandleTable, ShareLockable, SharedBody};
use crate::{ColorRef, GdiHandle, GdiObjectType, ProcessId, W32Status};

/// Maximum entries per palette
pub const MAX_PALETTE_ENTRIES: usize = 256;

/// Palette entry (PALETTEENTRY)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Red component (0-255)
    pub red: u8,
    /// Green component (0-255)
    pub green: u8,
    /// Blue component (0-255)
    pub blue: u8,
    /// Flags (PC_RESERVED, PC_EXPLICIT, PC_NOCOLLAPSE)
    pub flags: u8,
}

impl PaletteEntry {
    /// Create a new palette entry
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            flags: 0,
        }
    }

    /// Convert to ColorRef
    pub const fn to_colorref(&self) -> ColorRef {
        ColorRef::rgb(self.red, self.green, self.blue)
    }
}

/// Standard 20-color system palette
pub(super) const DEFAULT_ENTRIES: [PaletteEntry; 20] = [
    // First 10 colors (Windows standard)
    PaletteEntry::new(0x00, 0x00, 0x00), // 0: Black
    PaletteEntry::new(0x80, 0x00, 0x00), // 1: Dark Red
    PaletteEntry::new(0x00, 0x80, 0x00), // 2: Dark Green
    PaletteEntry::new(0x80, 0x80, 0x00), // 3: Dark Yellow
    PaletteEntry::new(0x00, 0x00, 0x80), // 4: Dark Blue
    PaletteEntry::new(0x80, 0x00, 0x80), // 5: Dark Magenta
    PaletteEntry::new(0x00, 0x80, 0x80), // 6: Dark Cyan
    PaletteEntry::new(0xC0, 0xC0, 0xC0), // 7: Light Gray
    PaletteEntry::new(0xC0, 0xDC, 0xC0), // 8: Money Green
    PaletteEntry::new(0xA6, 0xCA, 0xF0), // 9: Sky Blue
    // Last 10 colors (Windows standard)
    PaletteEntry::new(0xFF, 0xFB, 0xF0), // 246: Cream
    PaletteEntry::new(0xA0, 0xA0, 0xA4), // 247: Medium Gray
    PaletteEntry::new(0x80, 0x80, 0x80), // 248: Dark Gray
    PaletteEntry::new(0xFF, 0x00, 0x00), // 249: Red
    PaletteEntry::new(0x00, 0xFF, 0x00), // 250: Green
    PaletteEntry::new(0xFF, 0xFF, 0x00), // 251: Yellow
    PaletteEntry::new(0x00, 0x00, 0xFF), // 252: Blue
    PaletteEntry::new(0xFF, 0x00, 0xFF), // 253: Magenta
    PaletteEntry::new(0x00, 0xFF, 0xFF), // 254: Cyan
    PaletteEntry::new(0xFF, 0xFF, 0xFF), // 255: White
];

/// Logical palette object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    pub fn new(entries: &[PaletteEntry]) -> Self {
        let count = entries.len().min(MAX_PALETTE_ENTRIES);
        Self {
            entries: entries[..count].to_vec(),
        }
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    /// Index of the closest entry, `None` for an empty palette
    pub fn nearest_index(&self, color: ColorRef) -> Option<u32> {
        let target_r = color.red() as i32;
        let target_g = color.green() as i32;
        let target_b = color.blue() as i32;

        let mut best: Option<(u32, i32)> = None;

        for (i, entry) in self.entries.iter().enumerate() {
            let dr = target_r - entry.red as i32;
            let dg = target_g - entry.green as i32;
            let db = target_b - entry.blue as i32;

            // Squared distance is enough for comparison
            let distance = dr * dr + dg * dg + db * db;

            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i as u32, distance));
                if distance == 0 {
                    break;
                }
            }
        }

        best.map(|(i, _)| i)
    }
}

impl ShareLockable for Palette {
    fn accepts(obj_type: GdiObjectType) -> bool {
        obj_type == GdiObjectType::Palette
    }

    fn shared_body(obj: &GdiObject) -> Option<&Arc<SharedBody<Self>>> {
        match obj {
            GdiObject::Palette(p) => Some(p),
            _ => None,
        }
    }
}

fn wrap(palette: Palette) -> GdiObject {
    GdiObject::Palette(Arc::new(SharedBody::new(palette)))
}

/// Create a logical palette
pub fn create_palette(table: &HandleTable, entries: &[PaletteEntry], owner: ProcessId) -> Result<GdiHandle, W32Status> {
    table.alloc_object(GdiObjectType::Palette, wrap(Palette::new(entries)), owner)
}

/// Create the stock default palette
pub(super) fn create_stock_palette(table: &HandleTable) -> Result<GdiHandle, W32Status> {
    table.alloc_stock(GdiObjectType::Palette, wrap(Palette::new(&DEFAULT_ENTRIES)))
}
