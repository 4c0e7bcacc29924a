//! Brush Objects
//!
//! Brushes are used to fill areas with colors or patterns. Pens are stored
//! as brushes flagged [`BrushFlags::PEN`]; a DC's line brush is its pen.
//!
//! # Brush Types
//!
//! - **Solid**: Single color fill
//! - **Hatched**: Pattern fill (horizontal, vertical, cross, etc.)
//! - **Null**: Draws nothing
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/brushobj.cxx`

use alloc::sync::Arc;

use super::gdiobj::{GdiObject, HandleTable, ShareLockable, SharedBody};
use super::pen::PenStyle;
use crate::{ColorRef, GdiHandle, GdiObjectType, ProcessId, W32Status};

// ============================================================================
// Types
// ============================================================================

/// Brush style
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushStyle {
    #[default]
    Solid = 0,
    Null = 1,
    Hatched = 2,
}

/// Hatch style
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HatchStyle {
    #[default]
    Horizontal = 0,     // -----
    Vertical = 1,       // |||||
    FDiagonal = 2,      // \\\\\
    BDiagonal = 3,      // /////
    Cross = 4,          // +++++
    DiagCross = 5,      // XXXXX
}

bitflags::bitflags! {
    /// Brush object flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BrushFlags: u32 {
        /// Object is a pen
        const PEN = 0x0001;
    }
}

// ============================================================================
// Brush Structure
// ============================================================================

/// Brush object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brush {
    /// Brush style
    pub style: BrushStyle,

    /// Brush color (for solid/hatched)
    pub color: ColorRef,

    /// Hatch style (for hatched)
    pub hatch: HatchStyle,

    /// Object flags
    pub flags: BrushFlags,

    /// Pen style (pens only)
    pub pen_style: PenStyle,

    /// Pen width in logical units (pens only)
    pub pen_width: i32,
}

impl Brush {
    pub const fn solid(color: ColorRef) -> Self {
        Self {
            style: BrushStyle::Solid,
            color,
            hatch: HatchStyle::Horizontal,
            flags: BrushFlags::empty(),
            pen_style: PenStyle::Solid,
            pen_width: 0,
        }
    }

    pub const fn hatched(hatch: HatchStyle, color: ColorRef) -> Self {
        Self {
            style: BrushStyle::Hatched,
            hatch,
            ..Self::solid(color)
        }
    }

    pub const fn null() -> Self {
        Self {
            style: BrushStyle::Null,
            ..Self::solid(ColorRef::BLACK)
        }
    }

    /// Create a pen
    pub const fn pen(style: PenStyle, width: i32, color: ColorRef) -> Self {
        Self {
            style: match style {
                PenStyle::Null => BrushStyle::Null,
                _ => BrushStyle::Solid,
            },
            color,
            hatch: HatchStyle::Horizontal,
            flags: BrushFlags::PEN,
            pen_style: style,
            pen_width: width,
        }
    }

    pub fn is_pen(&self) -> bool {
        self.flags.contains(BrushFlags::PEN)
    }

    pub fn is_null(&self) -> bool {
        self.style == BrushStyle::Null
    }
}

impl ShareLockable for Brush {
    fn accepts(obj_type: GdiObjectType) -> bool {
        matches!(obj_type, GdiObjectType::Brush | GdiObjectType::Pen)
    }

    fn shared_body(obj: &GdiObject) -> Option<&Arc<SharedBody<Self>>> {
        match obj {
            GdiObject::Brush(b) => Some(b),
            _ => None,
        }
    }
}

// ============================================================================
// Brush Operations
// ============================================================================

pub(super) fn wrap(brush: Brush) -> GdiObject {
    GdiObject::Brush(Arc::new(SharedBody::new(brush)))
}

/// Create a solid brush
pub fn create_solid_brush(table: &HandleTable, color: ColorRef, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    table.alloc_object(GdiObjectType::Brush, wrap(Brush::solid(color)), owner)
}

/// Create a hatched brush
pub fn create_hatch_brush(
    table: &HandleTable,
    hatch: HatchStyle,
    color: ColorRef,
    owner: ProcessId,
) -> Result<GdiHandle, W32Status> {
    table.alloc_object(GdiObjectType::Brush, wrap(Brush::hatched(hatch, color)), owner)
}

/// Stock brushes in stock-object order
pub(super) const STOCK_BRUSHES: [Brush; 6] = [
    Brush::solid(ColorRef::WHITE),      // WHITE_BRUSH
    Brush::solid(ColorRef::LIGHT_GRAY), // LTGRAY_BRUSH
    Brush::solid(ColorRef::GRAY),       // GRAY_BRUSH
    Brush::solid(ColorRef::DARK_GRAY),  // DKGRAY_BRUSH
    Brush::solid(ColorRef::BLACK),      // BLACK_BRUSH
    Brush::null(),                      // NULL_BRUSH
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_is_line_brush() {
        let pen = Brush::pen(PenStyle::Dash, 2, ColorRef::BLACK);
        assert!(pen.is_pen());
        assert_eq!(pen.style, BrushStyle::Solid);
        assert!(Brush::pen(PenStyle::Null, 1, ColorRef::BLACK).is_null());
    }

    #[test]
    fn test_create_brushes() {
        let table = HandleTable::new(4);
        let solid = create_solid_brush(&table, ColorRef::GRAY, ProcessId(1)).unwrap();
        let hatch = create_hatch_brush(&table, HatchStyle::Cross, ColorRef::BLACK, ProcessId(1)).unwrap();

        let b = table.share_lock::<Brush>(solid).unwrap();
        assert_eq!(b.color, ColorRef::GRAY);
        let h = table.share_lock::<Brush>(hatch).unwrap();
        assert_eq!(h.style, BrushStyle::Hatched);
        assert_eq!(h.hatch, HatchStyle::Cross);
    }
}
