//! Engine Brush Objects
//!
//! A DC keeps four engine brushes (fill, line, text, background) that bind a
//! brush to the DC's colors and realize it for the target surface format.
//! Each holds its own share lock on the brush until cleaned up.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/brushobj.cxx` - EBRUSHOBJ
//! - `windows/core/ntgdi/gre/engbrush.cxx`

use super::brush::Brush;
use super::dcattr::DcAttr;
use super::gdiobj::SharedRef;
use super::palette::Palette;
use crate::{ColorRef, HDC};

/// Which DC slot an engine brush serves
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushRole {
    Fill = 0,
    Line = 1,
    Text = 2,
    Background = 3,
}

/// Brush bound to a DC and realized for its surface
#[derive(Debug)]
pub struct EBrushObj {
    role: BrushRole,
    brush: Option<SharedRef<Brush>>,
    hdc: HDC,
    fore_color: ColorRef,
    back_color: ColorRef,
    realized: u32,
}

impl EBrushObj {
    /// Unbound engine brush
    pub const fn new(role: BrushRole) -> Self {
        Self {
            role,
            brush: None,
            hdc: crate::GdiHandle::NULL,
            fore_color: ColorRef::BLACK,
            back_color: ColorRef::WHITE,
            realized: 0,
        }
    }

    /// Bind a brush, capturing the DC's current colors
    pub fn init(&mut self, brush: SharedRef<Brush>, hdc: HDC, attr: &DcAttr, bpp: u32, palette: &Palette) {
        self.hdc = hdc;
        self.brush = Some(brush);
        self.refresh(attr, bpp, palette);
    }

    /// Rebind to a different brush; the previous share lock is released
    pub fn update(&mut self, brush: SharedRef<Brush>, attr: &DcAttr, bpp: u32, palette: &Palette) {
        self.brush = Some(brush);
        self.refresh(attr, bpp, palette);
    }

    /// Recapture colors and realize again
    pub fn refresh(&mut self, attr: &DcAttr, bpp: u32, palette: &Palette) {
        self.fore_color = attr.foreground_color;
        self.back_color = attr.background_color;

        let color = match self.role {
            BrushRole::Fill | BrushRole::Line => self.brush.as_ref().map(|b| b.color),
            BrushRole::Text => Some(attr.foreground_color),
            BrushRole::Background => Some(attr.background_color),
        };
        self.realized = color.map_or(0, |c| realize_color(c, bpp, palette));
    }

    /// Release the brush; returns false if nothing was bound
    pub fn cleanup(&mut self) -> bool {
        let had_brush = self.brush.take().is_some();
        self.hdc = crate::GdiHandle::NULL;
        self.realized = 0;
        had_brush
    }

    pub fn role(&self) -> BrushRole {
        self.role
    }

    pub fn brush(&self) -> Option<&SharedRef<Brush>> {
        self.brush.as_ref()
    }

    pub fn hdc(&self) -> HDC {
        self.hdc
    }

    pub fn colors(&self) -> (ColorRef, ColorRef) {
        (self.fore_color, self.back_color)
    }

    /// Device color of the brush
    pub fn realized_color(&self) -> u32 {
        self.realized
    }
}

/// Translate a color to the device encoding for `bpp`
pub fn realize_color(color: ColorRef, bpp: u32, palette: &Palette) -> u32 {
    match bpp {
        32 | 24 => color.to_bgra() & 0x00FF_FFFF,
        15 | 16 => color.to_rgb565(),
        _ => palette.nearest_index(color).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdi::brush::create_solid_brush;
    use crate::gdi::gdiobj::HandleTable;
    use crate::gdi::palette::DEFAULT_ENTRIES;
    use crate::{GdiHandle, GdiObjectType, ProcessId};

    #[test]
    fn test_realize_by_depth() {
        let pal = Palette::new(&DEFAULT_ENTRIES);
        let red = ColorRef::rgb(0xFF, 0, 0);
        assert_eq!(realize_color(red, 32, &pal), 0x00FF_0000);
        assert_eq!(realize_color(red, 16, &pal), 0xF800);
        assert_eq!(realize_color(red, 8, &pal), 13);
    }

    #[test]
    fn test_ebrush_holds_share_lock() {
        let table = HandleTable::new(4);
        let h = create_solid_brush(&table, ColorRef::GRAY, ProcessId(1)).unwrap();
        let pal = Palette::new(&DEFAULT_ENTRIES);
        let attr = DcAttr::new();
        let hdc = GdiHandle::new(3, GdiObjectType::DC);

        let mut ebo = EBrushObj::new(BrushRole::Fill);
        ebo.init(table.share_lock(h).unwrap(), hdc, &attr, 32, &pal);
        assert_eq!(table.share_count(h), Some(1));
        assert_eq!(ebo.hdc(), hdc);
        assert_eq!(ebo.realized_color(), 0x0080_8080);
        assert_eq!(ebo.colors(), (ColorRef::BLACK, ColorRef::WHITE));

        assert!(ebo.cleanup());
        assert_eq!(table.share_count(h), Some(0));
        assert!(!ebo.cleanup());
    }

    #[test]
    fn test_text_brush_uses_foreground() {
        let table = HandleTable::new(4);
        let h = create_solid_brush(&table, ColorRef::BLACK, ProcessId(1)).unwrap();
        let pal = Palette::new(&DEFAULT_ENTRIES);
        let mut attr = DcAttr::new();
        attr.set_text_color(ColorRef::WHITE);

        let mut ebo = EBrushObj::new(BrushRole::Text);
        ebo.init(table.share_lock(h).unwrap(), GdiHandle::NULL, &attr, 16, &pal);
        assert_eq!(ebo.realized_color(), 0xFFFF);
        assert_eq!(ebo.role(), BrushRole::Text);
    }
}
