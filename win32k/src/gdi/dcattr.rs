//! DC Attribute Record
//!
//! The mutable drawing state of a DC (DC_ATTR). Two copies exist per DC: a
//! trusted copy embedded in the kernel object and a copy mapped for the
//! owning process, which user-mode code may write directly. The DC's live
//! view designates one of them; explicit syncs copy between the two at
//! hand-off points (initialization, save, restore, ownership change, free).
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/inc/ntgdihdl.h` - DC_ATTR layout
//! - `windows/core/ntgdi/gre/dcobj.cxx`

use alloc::boxed::Box;

use super::xform::{
    FloatObj, Matrix, DEVICE_TO_WORLD_DEFAULT, GM_COMPATIBLE, MM_TEXT, PAGE_TO_DEVICE_SCALE_DEFAULT,
    WORLD_TO_DEVICE_DEFAULT, WORLD_TO_PAGE_DEFAULT, XFORM_FLAGS_DEFAULT, XformFlags,
};
use crate::{ColorRef, GdiHandle, Point, ProcessId, Size, HBRUSH, HFONT, HPEN};

// ============================================================================
// Attribute Constants
// ============================================================================

/// Binary raster operation: pixel = pen color
pub const R2_COPYPEN: u8 = 13;

/// Background mode: background filled before drawing
pub const OPAQUE: u8 = 2;
/// Background mode: background left untouched
pub const TRANSPARENT: u8 = 1;

/// Polygon fill mode: alternate
pub const ALTERNATE: u8 = 1;

/// Stretch mode: AND eliminated lines (BLACKONWHITE)
pub const BLACKONWHITE: u8 = 1;

/// Current position is absolute
pub const ABSOLUTE: i32 = 1;

/// ICM disabled
pub const ICM_OFF: i32 = 0;

bitflags::bitflags! {
    /// Attribute changes not yet realized by the engine (ulDirty_)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        const DIRTY_FILL = 0x0001;
        const DIRTY_LINE = 0x0002;
        const DIRTY_TEXT = 0x0004;
        const DIRTY_BACKGROUND = 0x0008;
        const DIRTY_CHARSET = 0x0010;
        /// DC targets the primary display
        const PRIMARY_DISPLAY = 0x0002_0000;
    }
}

// ============================================================================
// DC_ATTR
// ============================================================================

/// Drawing-state record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcAttr {
    pub dirty: DirtyFlags,

    // Colors; each stored as requested and as device value
    pub background_color: ColorRef,
    pub background_ul: u32,
    pub foreground_color: ColorRef,
    pub foreground_ul: u32,
    pub brush_color: ColorRef,
    pub brush_ul: u32,
    pub pen_color: ColorRef,
    pub pen_ul: u32,

    // Fill data
    pub rop2: u8,
    pub bk_mode: u8,
    pub fill_mode: u8,
    pub stretch_mode: u8,
    pub rel_abs: i32,

    // Current position, logical and 28.4 fixed
    pub current: Point,
    pub fx_current: Point,

    // Mapping
    pub window_org: Point,
    pub window_ext: Size,
    pub viewport_org: Point,
    pub viewport_ext: Size,
    pub virtual_device_pixel: Size,
    pub virtual_device_mm: Size,
    pub virtual_device_size: Size,
    pub world_to_device: Matrix,
    pub device_to_world: Matrix,
    pub world_to_page: Matrix,
    pub m11_page_to_device: FloatObj,
    pub m22_page_to_device: FloatObj,
    pub dx_page_to_device: FloatObj,
    pub dy_page_to_device: FloatObj,
    pub xform_flags: XformFlags,
    pub map_mode: u32,
    pub layout: u32,
    pub graphics_mode: u32,

    // Text
    pub hlfnt: HFONT,
    pub text_align: u32,
    pub text_char_extra: i32,
    pub break_extra: i32,
    pub char_set: u32,

    // ICM
    pub icm_mode: i32,
    pub hcm_xform: GdiHandle,
    pub icm_flags: u32,
    pub icm_brush_color: ColorRef,
    pub icm_pen_color: ColorRef,
    pub hcolor_space: GdiHandle,

    pub brush_origin: Point,
    pub hbrush: HBRUSH,
    pub hpen: HPEN,
}

impl DcAttr {
    /// Attribute defaults of a freshly initialized DC
    ///
    /// Object handles are left null; the DC fills them in as it selects its
    /// default objects.
    pub fn new() -> Self {
        Self {
            dirty: DirtyFlags::empty(),

            background_color: ColorRef::WHITE,
            background_ul: ColorRef::WHITE.0,
            foreground_color: ColorRef::BLACK,
            foreground_ul: ColorRef::BLACK.0,
            brush_color: ColorRef::WHITE,
            brush_ul: ColorRef::WHITE.0,
            pen_color: ColorRef::BLACK,
            pen_ul: ColorRef::BLACK.0,

            rop2: R2_COPYPEN,
            bk_mode: OPAQUE,
            fill_mode: ALTERNATE,
            stretch_mode: BLACKONWHITE,
            rel_abs: ABSOLUTE,

            current: Point::new(0, 0),
            fx_current: Point::new(0, 0),

            window_org: Point::new(0, 0),
            window_ext: Size::new(1, 1),
            viewport_org: Point::new(0, 0),
            viewport_ext: Size::new(1, 1),
            virtual_device_pixel: Size::new(0, 0),
            virtual_device_mm: Size::new(0, 0),
            virtual_device_size: Size::new(0, 0),
            world_to_device: WORLD_TO_DEVICE_DEFAULT,
            device_to_world: DEVICE_TO_WORLD_DEFAULT,
            world_to_page: WORLD_TO_PAGE_DEFAULT,
            m11_page_to_device: PAGE_TO_DEVICE_SCALE_DEFAULT,
            m22_page_to_device: PAGE_TO_DEVICE_SCALE_DEFAULT,
            dx_page_to_device: FloatObj::ZERO,
            dy_page_to_device: FloatObj::ZERO,
            xform_flags: XFORM_FLAGS_DEFAULT,
            map_mode: MM_TEXT,
            layout: 0,
            graphics_mode: GM_COMPATIBLE,

            hlfnt: GdiHandle::NULL,
            text_align: 0,
            text_char_extra: 0,
            break_extra: 0,
            char_set: 0,

            icm_mode: ICM_OFF,
            hcm_xform: GdiHandle::NULL,
            icm_flags: 0,
            icm_brush_color: ColorRef::INVALID,
            icm_pen_color: ColorRef::INVALID,
            hcolor_space: GdiHandle::NULL,

            brush_origin: Point::new(0, 0),
            hbrush: GdiHandle::NULL,
            hpen: GdiHandle::NULL,
        }
    }

    pub fn set_text_color(&mut self, color: ColorRef) -> ColorRef {
        let old = self.foreground_color;
        self.foreground_color = color;
        self.foreground_ul = color.0;
        self.dirty.insert(DirtyFlags::DIRTY_TEXT | DirtyFlags::DIRTY_LINE | DirtyFlags::DIRTY_FILL);
        old
    }

    pub fn set_bk_color(&mut self, color: ColorRef) -> ColorRef {
        let old = self.background_color;
        self.background_color = color;
        self.background_ul = color.0;
        self.dirty.insert(DirtyFlags::DIRTY_BACKGROUND | DirtyFlags::DIRTY_LINE | DirtyFlags::DIRTY_FILL);
        old
    }
}

// ============================================================================
// Attribute Store
// ============================================================================

/// Trusted and mapped attribute copies of one DC
#[derive(Debug)]
pub struct AttrStore {
    trusted: DcAttr,
    mapped: Option<Box<DcAttr>>,
    mapped_for: Option<ProcessId>,
}

impl AttrStore {
    /// Store whose live view is the trusted copy
    pub fn new() -> Self {
        Self {
            trusted: DcAttr::new(),
            mapped: None,
            mapped_for: None,
        }
    }

    /// The live attribute record
    pub fn live(&self) -> &DcAttr {
        self.mapped.as_deref().unwrap_or(&self.trusted)
    }

    pub fn live_mut(&mut self) -> &mut DcAttr {
        match self.mapped.as_deref_mut() {
            Some(mapped) => mapped,
            None => &mut self.trusted,
        }
    }

    pub fn trusted(&self) -> &DcAttr {
        &self.trusted
    }

    /// Live view is the process-mapped copy
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Process the mapped copy belongs to
    pub fn mapped_for(&self) -> Option<ProcessId> {
        self.mapped_for
    }

    /// Create the mapped copy for `owner` from the trusted values and make it live
    pub fn allocate(&mut self, owner: ProcessId) {
        self.sync_to_trusted();
        self.mapped = Some(Box::new(self.trusted.clone()));
        self.mapped_for = Some(owner);
    }

    /// Sync back and drop the mapped copy; the trusted copy becomes live
    pub fn free(&mut self) {
        self.sync_to_trusted();
        self.mapped = None;
        self.mapped_for = None;
    }

    /// Copy the mapped values into the trusted copy
    pub fn sync_to_trusted(&mut self) {
        if let Some(mapped) = self.mapped.as_deref() {
            self.trusted.clone_from(mapped);
        }
    }

    /// Copy the trusted values into the mapped copy
    pub fn sync_from_trusted(&mut self) {
        if let Some(mapped) = self.mapped.as_deref_mut() {
            mapped.clone_from(&self.trusted);
        }
    }

    /// Replace the live record with a snapshot
    pub fn load(&mut self, snapshot: &DcAttr) {
        self.trusted.clone_from(snapshot);
        self.sync_from_trusted();
    }

    /// Snapshot of the live record
    pub fn snapshot(&mut self) -> DcAttr {
        self.sync_to_trusted();
        self.trusted.clone()
    }
}

impl Default for AttrStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let attr = DcAttr::new();
        assert_eq!(attr.background_color, ColorRef::WHITE);
        assert_eq!(attr.foreground_color, ColorRef::BLACK);
        assert_eq!(attr.rop2, R2_COPYPEN);
        assert_eq!(attr.bk_mode, OPAQUE);
        assert_eq!(attr.icm_pen_color, ColorRef::INVALID);
        assert_eq!(attr.graphics_mode, GM_COMPATIBLE);
        assert_eq!(attr.world_to_device, WORLD_TO_DEVICE_DEFAULT);
    }

    #[test]
    fn test_live_view_switches_on_allocate_and_free() {
        let mut store = AttrStore::new();
        assert!(!store.is_mapped());
        store.live_mut().text_align = 6;

        store.allocate(ProcessId(9));
        assert!(store.is_mapped());
        assert_eq!(store.mapped_for(), Some(ProcessId(9)));
        assert_eq!(store.live().text_align, 6);

        // Writes land in the mapped copy only
        store.live_mut().set_text_color(ColorRef::GRAY);
        assert_eq!(store.trusted().foreground_color, ColorRef::BLACK);

        store.free();
        assert!(!store.is_mapped());
        assert_eq!(store.live().foreground_color, ColorRef::GRAY);
    }

    #[test]
    fn test_sync_directions() {
        let mut store = AttrStore::new();
        store.allocate(ProcessId(1));

        store.live_mut().bk_mode = TRANSPARENT;
        store.sync_to_trusted();
        assert_eq!(store.trusted().bk_mode, TRANSPARENT);

        // Stray writes to the mapped copy are overwritten from the trusted one
        store.live_mut().rop2 = 7;
        assert_eq!(store.trusted().rop2, R2_COPYPEN);
        store.sync_from_trusted();
        assert_eq!(store.live().rop2, R2_COPYPEN);
        assert_eq!(store.live().bk_mode, TRANSPARENT);
    }

    #[test]
    fn test_snapshot_and_load() {
        let mut store = AttrStore::new();
        store.allocate(ProcessId(1));
        store.live_mut().set_bk_color(ColorRef::GRAY);
        let snap = store.snapshot();

        store.live_mut().set_bk_color(ColorRef::BLACK);
        store.load(&snap);
        assert_eq!(store.live().background_color, ColorRef::GRAY);
        assert_eq!(store.trusted(), &snap);
    }
}
