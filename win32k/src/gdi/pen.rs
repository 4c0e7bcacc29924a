//! Pen Objects
//!
//! Pens are used to draw lines and outline shapes. They share the brush
//! body ([`Brush`]) and are selected into a DC as its line brush.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/penobj.cxx`

use super::brush::{self, Brush};
use super::gdiobj::HandleTable;
use crate::{ColorRef, GdiHandle, GdiObjectType, ProcessId, W32Status};

/// Pen style
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PenStyle {
    #[default]
    Solid = 0,
    Dash = 1,
    Dot = 2,
    DashDot = 3,
    DashDotDot = 4,
    Null = 5,
    InsideFrame = 6,
}

/// Stock pens in stock-object order
pub(super) const STOCK_PENS: [Brush; 3] = [
    Brush::pen(PenStyle::Solid, 0, ColorRef::WHITE), // WHITE_PEN
    Brush::pen(PenStyle::Solid, 0, ColorRef::BLACK), // BLACK_PEN
    Brush::pen(PenStyle::Null, 0, ColorRef::BLACK),  // NULL_PEN
];

/// Create a pen
pub fn create_pen(
    table: &HandleTable,
    style: PenStyle,
    width: i32,
    color: ColorRef,
    owner: ProcessId,
) -> Result<GdiHandle, W32Status> {
    table.alloc_object(GdiObjectType::Pen, brush::wrap(Brush::pen(style, width, color)), owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pen_share_locks_as_brush() {
        let table = HandleTable::new(4);
        let h = create_pen(&table, PenStyle::Dot, 3, ColorRef::GRAY, ProcessId(1)).unwrap();
        assert_eq!(h.object_type(), GdiObjectType::Pen);

        let pen = table.share_lock::<Brush>(h).unwrap();
        assert!(pen.is_pen());
        assert_eq!(pen.pen_width, 3);
        assert_eq!(pen.pen_style, PenStyle::Dot);
    }
}
