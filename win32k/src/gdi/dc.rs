//! Device Context (DC) Implementation
//!
//! A Device Context is the primary GDI object for drawing operations.
//! It encapsulates the drawing state (selected objects, colors, transforms,
//! clipping) and provides the target surface for rendering.
//!
//! # DC Types
//!
//! - **Direct**: Draws on a device surface (display or printer)
//! - **Memory**: Draws on a bitmap; 1x1 monochrome until one is selected
//! - **Info**: Query only; device metrics without a drawable surface
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initialized -> (save/restore)* -> Cleaning -> Destroyed
//! ```
//!
//! A DC shares its surface, brushes, palette and font through counted
//! references and privately owns its clip regions, path and saved states.
//! Cleanup releases every one of them; a missing piece is logged and
//! skipped so the rest still gets released.
//!
//! # Lock Ordering
//!
//! DC lock, then region or path locks. The handle table lock is taken only
//! transiently while a DC is locked.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/dcobj.cxx`
//! - `windows/core/ntgdi/inc/dcobj.hxx`
//! - `windows/core/ntgdi/gre/dcrgn.cxx`

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::brush::Brush;
use super::dcattr::{AttrStore, DcAttr, DirtyFlags};
use super::ebrush::{BrushRole, EBrushObj};
use super::font::Font;
use super::gdiobj::{GdiObject, SharedRef};
use super::palette::Palette;
use super::path::{self, PathFlags};
use super::pdev::{DevMode, GraphicsCaps, PdevRef};
use super::region::{self, Region, RegionType};
use super::surface::Surface;
use super::xform::{
    FloatObj, Matrix, DEVICE_TO_WORLD_DEFAULT, PAGE_TO_DEVICE_SCALE_DEFAULT, WORLD_TO_DEVICE_DEFAULT,
    WORLD_TO_PAGE_DEFAULT,
};
use super::{Gdi, SaveLevelPolicy, StockObject};
use crate::{
    ColorRef, GdiHandle, GdiObjectType, Point, ProcessId, Rect, Size, W32Status, HBITMAP, HBRUSH, HDC, HFONT,
    HPALETTE, HPATH, HPEN, HRGN,
};

// ============================================================================
// DC Types
// ============================================================================

/// Device context type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcType {
    #[default]
    Direct = 0,     // Device surface
    Memory = 1,     // Memory DC (compatible bitmap)
    Info = 2,       // Information DC (query only)
}

/// Lifecycle state
///
/// An initialized DC is in use exactly while its lock is held, which is the
/// scope of [`Gdi::with_dc`]. Saved states are counted by
/// [`Dc::save_depth`] and never change the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcState {
    #[default]
    Uninitialized,
    Initialized,
    Cleaning,
    Destroyed,
}

bitflags::bitflags! {
    /// DC flags (DC_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DcFlags: u32 {
        /// Targets a display
        const DISPLAY = 0x0001;
        /// Draws directly on the device surface
        const DIRECT = 0x0002;
        /// Owned by the window manager; applications cannot delete it
        const PERMANENT = 0x0008;
        /// Combined clip region needs recomputing
        const DIRTY_RAO = 0x0010;
        /// Application bounds accumulation
        const ACCUM_APP = 0x0040;
        /// Drawing must take the device lock
        const SYNCHRONIZE_ACCESS = 0x0100;
    }
}

/// Bounds accumulator of a direct DC with nothing accumulated yet
pub const BOUNDS_ACCUMULATOR_EMPTY: Rect = Rect::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);

/// Dirty flags of a freshly initialized DC
const DIRTY_DEFAULT: DirtyFlags = DirtyFlags::DIRTY_FILL
    .union(DirtyFlags::DIRTY_LINE)
    .union(DirtyFlags::DIRTY_TEXT)
    .union(DirtyFlags::DIRTY_BACKGROUND)
    .union(DirtyFlags::DIRTY_CHARSET);

// ============================================================================
// DC Level
// ============================================================================

/// Kernel-only DC state carried by save/restore (DCLEVEL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcLevel {
    pub size: Size,
    pub world_to_device: Matrix,
    pub device_to_world: Matrix,
    pub world_to_page: Matrix,
    pub m11_page_to_device: FloatObj,
    pub m22_page_to_device: FloatObj,
    pub dx_page_to_device: FloatObj,
    pub dy_page_to_device: FloatObj,
    pub m11_twips: FloatObj,
    pub m22_twips: FloatObj,
    pub brush_origin: Point,
    pub icm_mode: i32,
    pub path_flags: PathFlags,
}

impl DcLevel {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            world_to_device: WORLD_TO_DEVICE_DEFAULT,
            device_to_world: DEVICE_TO_WORLD_DEFAULT,
            world_to_page: WORLD_TO_PAGE_DEFAULT,
            m11_page_to_device: PAGE_TO_DEVICE_SCALE_DEFAULT,
            m22_page_to_device: PAGE_TO_DEVICE_SCALE_DEFAULT,
            dx_page_to_device: FloatObj::ZERO,
            dy_page_to_device: FloatObj::ZERO,
            m11_twips: FloatObj::ZERO,
            m22_twips: FloatObj::ZERO,
            brush_origin: Point::new(0, 0),
            icm_mode: 0,
            path_flags: PathFlags::empty(),
        }
    }
}

/// Engine clip object derived from the GDI clip region (CLIPOBJ)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipObj {
    pub complexity: RegionType,
    pub bounds: Rect,
    pub rects: Vec<Rect>,
}

impl ClipObj {
    fn from_region(rgn: &Region) -> Self {
        Self {
            complexity: rgn.rgn_type,
            bounds: rgn.bounds,
            rects: rgn.rects.clone(),
        }
    }
}

/// Region bodies a clip or size change writes to
struct ClipTargets {
    vis: Arc<Mutex<Region>>,
    gc: Arc<Mutex<Region>>,
    clip: Option<Arc<Mutex<Region>>>,
}

/// A saved DC state
struct SavedDc {
    attr: DcAttr,
    level: DcLevel,
    surface: Option<SharedRef<Surface>>,
    fill_brush: Option<SharedRef<Brush>>,
    line_brush: Option<SharedRef<Brush>>,
    palette: Option<SharedRef<Palette>>,
    font: Option<SharedRef<Font>>,
    /// Private copy of the API clip region
    clip_rgn: HRGN,
    /// Private copy of the path
    path: HPATH,
}

fn resource_unavailable(status: W32Status) -> W32Status {
    log::warn!("[GDI/DC] Required resource unavailable: {}", status);
    W32Status::ResourceUnavailable
}

// ============================================================================
// Device Context Structure
// ============================================================================

/// Device Context
#[derive(Debug)]
pub struct Dc {
    handle: HDC,
    state: DcState,
    dc_type: DcType,
    flags: DcFlags,

    pdev: Option<PdevRef>,
    dhpdev: usize,
    graphics_caps: GraphicsCaps,
    bits_per_pixel: u32,

    origin: Point,
    window: Rect,
    bounds: Rect,
    bounds_app: Rect,
    clip_bounds: Rect,

    attrs: AttrStore,
    level: DcLevel,

    surface: Option<SharedRef<Surface>>,
    fill_brush: Option<SharedRef<Brush>>,
    line_brush: Option<SharedRef<Brush>>,
    palette: Option<SharedRef<Palette>>,
    font: Option<SharedRef<Font>>,

    ebo_fill: EBrushObj,
    ebo_line: EBrushObj,
    ebo_text: EBrushObj,
    ebo_background: EBrushObj,

    clip_rgn: HRGN,
    vis_rgn: HRGN,
    gc_clip_rgn: HRGN,
    combined_clip: Option<ClipObj>,
    path: HPATH,

    saved: Vec<SavedDc>,
    devmode: Option<DevMode>,
}

impl core::fmt::Debug for SavedDc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SavedDc")
            .field("clip_rgn", &self.clip_rgn)
            .field("path", &self.path)
            .finish()
    }
}

impl Dc {
    fn new() -> Self {
        Self {
            handle: GdiHandle::NULL,
            state: DcState::Uninitialized,
            dc_type: DcType::Direct,
            flags: DcFlags::empty(),
            pdev: None,
            dhpdev: 0,
            graphics_caps: GraphicsCaps::empty(),
            bits_per_pixel: 0,
            origin: Point::new(0, 0),
            window: Rect::default(),
            bounds: Rect::default(),
            bounds_app: Rect::default(),
            clip_bounds: Rect::default(),
            attrs: AttrStore::new(),
            level: DcLevel::new(Size::new(0, 0)),
            surface: None,
            fill_brush: None,
            line_brush: None,
            palette: None,
            font: None,
            ebo_fill: EBrushObj::new(BrushRole::Fill),
            ebo_line: EBrushObj::new(BrushRole::Line),
            ebo_text: EBrushObj::new(BrushRole::Text),
            ebo_background: EBrushObj::new(BrushRole::Background),
            clip_rgn: GdiHandle::NULL,
            vis_rgn: GdiHandle::NULL,
            gc_clip_rgn: GdiHandle::NULL,
            combined_clip: None,
            path: GdiHandle::NULL,
            saved: Vec::new(),
            devmode: None,
        }
    }

    // ========================================================================
    // Allocation and initialization
    // ========================================================================

    /// Allocate an uninitialized DC under a handle nobody else can see yet
    pub fn allocate(gdi: &Gdi, owner: ProcessId) -> Result<(HDC, Arc<Mutex<Dc>>), W32Status> {
        let dc = Arc::new(Mutex::new(Dc::new()));
        let hdc = gdi.table().alloc_pending(GdiObjectType::DC, GdiObject::Dc(dc.clone()), owner)?;
        dc.lock().handle = hdc;

        log::trace!("[GDI/DC] Allocated {} for {}", hdc, owner);
        Ok((hdc, dc))
    }

    /// Set up a freshly allocated DC for `pdev`
    ///
    /// Every shared resource is acquired before any field changes, so on
    /// failure the DC is left untouched and nothing stays referenced.
    pub fn initialize(&mut self, gdi: &Gdi, dc_type: DcType, pdev: PdevRef) -> Result<(), W32Status> {
        if self.state != DcState::Uninitialized {
            return Err(W32Status::InvalidHandle);
        }

        let table = gdi.table();
        let info = *pdev.gdi_info();

        let surface = match dc_type {
            DcType::Direct => table.share_lock::<Surface>(pdev.surface()),
            // Non-direct DCs draw on the default bitmap until one is selected
            DcType::Memory | DcType::Info => gdi.default_bitmap(),
        }
        .map_err(resource_unavailable)?;
        let fill = table
            .share_lock::<Brush>(gdi.stock_object(StockObject::WhiteBrush))
            .map_err(resource_unavailable)?;
        let line = table
            .share_lock::<Brush>(gdi.stock_object(StockObject::BlackPen))
            .map_err(resource_unavailable)?;
        let palette = table
            .share_lock::<Palette>(gdi.stock_object(StockObject::DefaultPalette))
            .map_err(resource_unavailable)?;
        let font = table
            .share_lock::<Font>(gdi.stock_object(StockObject::SystemFont))
            .map_err(resource_unavailable)?;
        let default_brush = gdi.default_brush().map_err(resource_unavailable)?;

        let size = match dc_type {
            DcType::Memory => Size::new(1, 1),
            DcType::Direct | DcType::Info => info.size(),
        };

        self.dc_type = dc_type;
        self.dhpdev = pdev.dhpdev();
        self.graphics_caps = pdev.caps();
        self.bits_per_pixel = info.device_bpp();
        self.flags = DcFlags::DIRTY_RAO;
        self.origin = Point::new(0, 0);
        self.window = Rect::from_size(size);
        self.level = DcLevel::new(size);

        if dc_type == DcType::Direct {
            self.bounds = BOUNDS_ACCUMULATOR_EMPTY;
            self.bounds_app = BOUNDS_ACCUMULATOR_EMPTY;
            self.clip_bounds = BOUNDS_ACCUMULATOR_EMPTY;
            self.flags |= DcFlags::SYNCHRONIZE_ACCESS
                | DcFlags::ACCUM_APP
                | DcFlags::PERMANENT
                | DcFlags::DISPLAY
                | DcFlags::DIRECT;
        } else {
            self.bounds = Rect::default();
            self.bounds_app = Rect::default();
            self.clip_bounds = self.window;
        }

        let mut attr = DcAttr::new();
        attr.dirty = DIRTY_DEFAULT;
        if gdi.devices().is_primary(&pdev) {
            attr.dirty |= DirtyFlags::PRIMARY_DISPLAY;
        }
        attr.hbrush = fill.handle();
        attr.hpen = line.handle();
        attr.hlfnt = font.handle();
        attr.char_set = font.charset() as u32;
        self.attrs.load(&attr);

        let attr = self.attrs.live();
        let bpp = self.bits_per_pixel;
        self.ebo_fill.init(fill.clone(), self.handle, attr, bpp, &palette);
        self.ebo_line.init(line.clone(), self.handle, attr, bpp, &palette);
        self.ebo_text.init(default_brush.clone(), self.handle, attr, bpp, &palette);
        self.ebo_background.init(default_brush, self.handle, attr, bpp, &palette);

        self.surface = Some(surface);
        self.fill_brush = Some(fill);
        self.line_brush = Some(line);
        self.palette = Some(palette);
        self.font = Some(font);
        self.pdev = Some(pdev);
        self.state = DcState::Initialized;

        log::debug!("[GDI/DC] Initialized {} as {:?} ({}x{})", self.handle, dc_type, size.cx, size.cy);
        Ok(())
    }

    /// Create the visible and GDI clip regions covering the window
    pub fn init_vis_region(&mut self, gdi: &Gdi) -> Result<(), W32Status> {
        let table = gdi.table();
        let owner = self.owner(gdi);

        self.vis_rgn = region::create_dc_rect_rgn(table, self.window, owner).map_err(resource_unavailable)?;
        self.gc_clip_rgn = region::create_dc_rect_rgn(table, self.window, owner).map_err(resource_unavailable)?;

        self.update_gc_clip(gdi)
    }

    /// Look up the regions a clip update rewrites
    ///
    /// `None` when the DC has no visible region yet. Nothing changes until
    /// the targets are handed to [`commit_clip`](Self::commit_clip).
    fn clip_targets(&self, gdi: &Gdi, clip_rgn: HRGN) -> Result<Option<ClipTargets>, W32Status> {
        if self.vis_rgn.is_null() || self.gc_clip_rgn.is_null() {
            return Ok(None);
        }

        let table = gdi.table();
        let clip = if clip_rgn.is_null() {
            None
        } else {
            Some(table.region(clip_rgn).map_err(resource_unavailable)?)
        };

        Ok(Some(ClipTargets {
            vis: table.region(self.vis_rgn).map_err(resource_unavailable)?,
            gc: table.region(self.gc_clip_rgn).map_err(resource_unavailable)?,
            clip,
        }))
    }

    /// Rebuild the GDI clip region and engine clip object
    ///
    /// The GDI clip is the visible region intersected with the API clip.
    fn commit_clip(&mut self, targets: Option<ClipTargets>) {
        let Some(targets) = targets else {
            self.combined_clip = None;
            return;
        };

        let mut combined = targets.vis.lock().clone();
        if let Some(clip) = &targets.clip {
            combined = combined.intersect(&clip.lock());
        }

        self.combined_clip = Some(ClipObj::from_region(&combined));
        *targets.gc.lock() = combined;
        self.flags.remove(DcFlags::DIRTY_RAO);
    }

    /// Recompute the GDI clip after the API clip changed
    fn update_gc_clip(&mut self, gdi: &Gdi) -> Result<(), W32Status> {
        let targets = self.clip_targets(gdi, self.clip_rgn)?;
        self.commit_clip(targets);
        Ok(())
    }

    /// Take on a new surface size, resetting the visible region to match
    fn commit_size(&mut self, size: Size, targets: Option<ClipTargets>) {
        self.level.size = size;
        self.window = Rect::from_size(size);
        self.clip_bounds = self.window;

        if let Some(targets) = &targets {
            *targets.vis.lock() = Region::rect(self.window);
        }

        self.flags.insert(DcFlags::DIRTY_RAO);
        self.commit_clip(targets);
    }

    /// Resize in place, keeping the API clip
    fn set_size(&mut self, gdi: &Gdi, size: Size) -> Result<(), W32Status> {
        let targets = self.clip_targets(gdi, self.clip_rgn)?;
        self.commit_size(size, targets);
        Ok(())
    }

    /// Create the process-mapped attribute copy for `owner`
    pub(super) fn allocate_attr(&mut self, owner: ProcessId) {
        self.attrs.allocate(owner);
    }

    pub(super) fn set_devmode(&mut self, devmode: Option<DevMode>) {
        self.devmode = devmode;
    }

    fn owner(&self, gdi: &Gdi) -> ProcessId {
        gdi.table().owner(self.handle).unwrap_or(ProcessId::PUBLIC)
    }

    /// Realize the engine brushes again after a brush, color or palette change
    fn refresh_brushes(&mut self) {
        let palette: &Palette = match &self.palette {
            Some(p) => &**p,
            None => return,
        };
        let attr = self.attrs.live();
        let bpp = self.bits_per_pixel;

        if let Some(fill) = &self.fill_brush {
            self.ebo_fill.update(fill.clone(), attr, bpp, palette);
        }
        if let Some(line) = &self.line_brush {
            self.ebo_line.update(line.clone(), attr, bpp, palette);
        }
        self.ebo_text.refresh(attr, bpp, palette);
        self.ebo_background.refresh(attr, bpp, palette);
    }

    // ========================================================================
    // Save / Restore
    // ========================================================================

    /// Current save depth; 1 when nothing is saved
    pub fn save_depth(&self) -> i32 {
        self.saved.len() as i32 + 1
    }

    /// Push a snapshot of the drawing state
    ///
    /// Returns the level the snapshot represents, the depth before the push.
    pub fn save(&mut self, gdi: &Gdi) -> Result<i32, W32Status> {
        let table = gdi.table();
        let owner = self.owner(gdi);

        let clip_rgn = if self.clip_rgn.is_null() {
            GdiHandle::NULL
        } else {
            region::copy_dc_rgn(table, self.clip_rgn, owner).map_err(resource_unavailable)?
        };

        let path = if self.path.is_null() {
            GdiHandle::NULL
        } else {
            match path::copy_path(table, self.path, owner) {
                Ok(h) => h,
                Err(status) => {
                    if !clip_rgn.is_null() {
                        region::delete_rgn(table, clip_rgn);
                    }
                    return Err(resource_unavailable(status));
                }
            }
        };

        let level = self.save_depth();
        let saved = SavedDc {
            attr: self.attrs.snapshot(),
            level: self.level.clone(),
            surface: self.surface.clone(),
            fill_brush: self.fill_brush.clone(),
            line_brush: self.line_brush.clone(),
            palette: self.palette.clone(),
            font: self.font.clone(),
            clip_rgn,
            path,
        };
        self.saved.push(saved);

        log::trace!("[GDI/DC] {} saved level {}", self.handle, level);
        Ok(level)
    }

    /// Return to a saved level
    ///
    /// Negative levels count back from the current depth. Levels above the
    /// target are discarded and the target becomes live.
    pub fn restore(&mut self, gdi: &Gdi, level: i32) -> Result<(), W32Status> {
        let depth = self.save_depth();
        let target = if level < 0 { depth + level } else { level };

        if target < 1 || target >= depth {
            return match gdi.config().save_level_policy {
                SaveLevelPolicy::Strict => {
                    log::debug!("[GDI/DC] {} cannot restore level {} at depth {}", self.handle, level, depth);
                    Err(W32Status::InvalidSaveLevel)
                }
                SaveLevelPolicy::Permissive => {
                    log::warn!("[GDI/DC] {} ignoring restore of level {} at depth {}", self.handle, level, depth);
                    Ok(())
                }
            };
        }

        while self.save_depth() > target + 1 {
            if let Some(saved) = self.saved.pop() {
                self.discard_saved(gdi, saved);
            }
        }
        if let Some(saved) = self.saved.pop() {
            self.apply_saved(gdi, saved);
        }

        log::trace!("[GDI/DC] {} restored to level {}", self.handle, target);
        Ok(())
    }

    fn discard_saved(&mut self, gdi: &Gdi, saved: SavedDc) {
        let table = gdi.table();
        if !saved.clip_rgn.is_null() && !region::delete_rgn(table, saved.clip_rgn) {
            log::warn!("[GDI/DC] {} saved clip region {} already gone", self.handle, saved.clip_rgn);
        }
        if !saved.path.is_null() && !path::delete_path(table, saved.path) {
            log::warn!("[GDI/DC] {} saved path {} already gone", self.handle, saved.path);
        }
    }

    fn apply_saved(&mut self, gdi: &Gdi, saved: SavedDc) {
        let table = gdi.table();
        let SavedDc {
            attr,
            level,
            surface,
            fill_brush,
            line_brush,
            palette,
            font,
            clip_rgn,
            path,
        } = saved;

        let resized = level.size != self.level.size;

        self.attrs.load(&attr);
        self.level = level;
        self.surface = surface;
        self.fill_brush = fill_brush;
        self.line_brush = line_brush;
        self.palette = palette;
        self.font = font;

        if !self.clip_rgn.is_null() {
            region::delete_rgn(table, self.clip_rgn);
        }
        self.clip_rgn = clip_rgn;

        if !self.path.is_null() {
            path::delete_path(table, self.path);
        }
        self.path = path;

        self.refresh_brushes();

        let result = if resized {
            self.set_size(gdi, self.level.size)
        } else {
            self.update_gc_clip(gdi)
        };
        if let Err(status) = result {
            log::warn!("[GDI/DC] {} clip update after restore failed: {}", self.handle, status);
        }
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Handles of the regions and paths this DC owns, saved copies included
    pub fn private_handles(&self) -> Vec<GdiHandle> {
        let mut handles: Vec<GdiHandle> = [self.clip_rgn, self.vis_rgn, self.gc_clip_rgn, self.path]
            .into_iter()
            .filter(|h| !h.is_null())
            .collect();
        for saved in &self.saved {
            handles.extend([saved.clip_rgn, saved.path].into_iter().filter(|h| !h.is_null()));
        }
        handles
    }

    /// Move the DC and everything it privately owns to `new_owner`
    ///
    /// All or nothing: if any handle refuses the change, the ones already
    /// moved are handed back and the DC is unchanged.
    pub fn transfer_ownership(&mut self, gdi: &Gdi, new_owner: ProcessId) -> Result<(), W32Status> {
        let table = gdi.table();
        let mut handles = vec![self.handle];
        handles.extend(self.private_handles());

        let mut moved: Vec<(GdiHandle, ProcessId)> = Vec::with_capacity(handles.len());
        for handle in handles {
            match table.set_owner(handle, new_owner) {
                Ok(previous) => moved.push((handle, previous)),
                Err(status) => {
                    log::warn!(
                        "[GDI/DC] {} cannot move {} to {}: {}",
                        self.handle,
                        handle,
                        new_owner,
                        status
                    );
                    for (h, previous) in moved.into_iter().rev() {
                        if table.set_owner(h, previous).is_err() {
                            log::error!("[GDI/DC] {} rollback of {} failed", self.handle, h);
                        }
                    }
                    return Err(W32Status::OwnershipTransferFailed);
                }
            }
        }

        // Region shadows belong to the old owner's address space
        for (h, _) in &moved {
            if h.object_type() == GdiObjectType::Region {
                table.take_user_attr(*h);
            }
        }

        if new_owner == ProcessId::PUBLIC {
            self.attrs.free();
        } else {
            self.attrs.allocate(new_owner);
        }

        log::debug!("[GDI/DC] {} now owned by {}", self.handle, new_owner);
        Ok(())
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Release everything the DC holds
    ///
    /// Every step runs even if an earlier one found nothing to release.
    pub fn cleanup(&mut self, gdi: &Gdi) {
        let table = gdi.table();
        let hdc = self.handle;
        self.state = DcState::Cleaning;

        log::debug!("[GDI/DC] Cleaning up {}", hdc);

        // Attribute record
        self.attrs.free();

        // Saved states
        while let Some(saved) = self.saved.pop() {
            self.discard_saved(gdi, saved);
        }

        // Selected objects
        if self.surface.take().is_none() {
            log::warn!("[GDI/DC] {} had no surface selected", hdc);
        }
        if self.fill_brush.take().is_none() {
            log::warn!("[GDI/DC] {} had no fill brush selected", hdc);
        }
        if self.line_brush.take().is_none() {
            log::warn!("[GDI/DC] {} had no line brush selected", hdc);
        }
        if self.palette.take().is_none() {
            log::warn!("[GDI/DC] {} had no palette selected", hdc);
        }
        if self.font.take().is_none() {
            log::warn!("[GDI/DC] {} had no font selected", hdc);
        }

        // Engine brushes
        for ebo in [
            &mut self.ebo_fill,
            &mut self.ebo_line,
            &mut self.ebo_text,
            &mut self.ebo_background,
        ] {
            if !ebo.cleanup() {
                log::warn!("[GDI/DC] {} {:?} engine brush was not bound", hdc, ebo.role());
            }
        }

        // Regions
        if !self.clip_rgn.is_null() && !region::delete_rgn(table, self.clip_rgn) {
            log::warn!("[GDI/DC] {} clip region {} already gone", hdc, self.clip_rgn);
        }
        for (name, rgn) in [("visible", self.vis_rgn), ("GDI clip", self.gc_clip_rgn)] {
            if rgn.is_null() {
                log::warn!("[GDI/DC] {} has no {} region", hdc, name);
            } else if !region::delete_rgn(table, rgn) {
                log::warn!("[GDI/DC] {} {} region {} already gone", hdc, name, rgn);
            }
        }
        self.clip_rgn = GdiHandle::NULL;
        self.vis_rgn = GdiHandle::NULL;
        self.gc_clip_rgn = GdiHandle::NULL;
        self.combined_clip = None;

        // Path
        if !self.path.is_null() && !path::delete_path(table, self.path) {
            log::warn!("[GDI/DC] {} path {} already gone", hdc, self.path);
        }
        self.path = GdiHandle::NULL;
        self.level.path_flags = PathFlags::empty();

        // Device
        if self.pdev.take().is_none() {
            log::warn!("[GDI/DC] {} had no device", hdc);
        }

        self.state = DcState::Destroyed;
    }

    /// Reset a DC handed back to the window manager
    ///
    /// Saved states, the API clip and the path are dropped and the default
    /// objects selected again. The DC stays alive.
    pub fn release(&mut self, gdi: &Gdi) -> Result<(), W32Status> {
        let table = gdi.table();

        let fill = table.share_lock::<Brush>(gdi.stock_object(StockObject::WhiteBrush))?;
        let line = table.share_lock::<Brush>(gdi.stock_object(StockObject::BlackPen))?;
        let palette = table.share_lock::<Palette>(gdi.stock_object(StockObject::DefaultPalette))?;
        let font = table.share_lock::<Font>(gdi.stock_object(StockObject::SystemFont))?;
        let bitmap = match self.dc_type {
            DcType::Memory => Some(gdi.default_bitmap()?),
            DcType::Direct | DcType::Info => None,
        };
        // The API clip goes away, so the new clip is the visible region alone
        let targets = self.clip_targets(gdi, GdiHandle::NULL)?;

        while let Some(saved) = self.saved.pop() {
            self.discard_saved(gdi, saved);
        }

        if !self.clip_rgn.is_null() {
            region::delete_rgn(table, self.clip_rgn);
            self.clip_rgn = GdiHandle::NULL;
        }
        if !self.path.is_null() {
            path::delete_path(table, self.path);
            self.path = GdiHandle::NULL;
        }

        let primary = self.attrs.live().dirty & DirtyFlags::PRIMARY_DISPLAY;
        let mut attr = DcAttr::new();
        attr.dirty = DIRTY_DEFAULT | primary;
        attr.hbrush = fill.handle();
        attr.hpen = line.handle();
        attr.hlfnt = font.handle();
        attr.char_set = font.charset() as u32;
        self.attrs.load(&attr);

        let size = match &bitmap {
            Some(b) => b.size(),
            None => self.level.size,
        };
        self.level = DcLevel::new(self.level.size);
        self.fill_brush = Some(fill);
        self.line_brush = Some(line);
        self.palette = Some(palette);
        self.font = Some(font);
        if let Some(bitmap) = bitmap {
            self.surface = Some(bitmap);
        }

        self.refresh_brushes();
        self.commit_size(size, targets);

        log::debug!("[GDI/DC] {} released", self.handle);
        Ok(())
    }

    // ========================================================================
    // Object Selection
    // ========================================================================

    /// Select a fill brush, returning the previous one
    pub fn select_fill_brush(&mut self, gdi: &Gdi, hbrush: HBRUSH) -> Result<HBRUSH, W32Status> {
        let brush = gdi.table().share_lock::<Brush>(hbrush)?;
        if brush.is_pen() {
            return Err(W32Status::InvalidHandle);
        }

        let attr = self.attrs.live_mut();
        attr.hbrush = hbrush;
        attr.brush_color = brush.color;
        attr.brush_ul = brush.color.0;
        attr.dirty.insert(DirtyFlags::DIRTY_FILL);

        let old = self.fill_brush.replace(brush);
        self.refresh_brushes();
        Ok(old.map_or(GdiHandle::NULL, |b| b.handle()))
    }

    /// Select a pen as line brush, returning the previous one
    pub fn select_line_brush(&mut self, gdi: &Gdi, hpen: HPEN) -> Result<HPEN, W32Status> {
        let pen = gdi.table().share_lock::<Brush>(hpen)?;
        if !pen.is_pen() {
            return Err(W32Status::InvalidHandle);
        }

        let attr = self.attrs.live_mut();
        attr.hpen = hpen;
        attr.pen_color = pen.color;
        attr.pen_ul = pen.color.0;
        attr.dirty.insert(DirtyFlags::DIRTY_LINE);

        let old = self.line_brush.replace(pen);
        self.refresh_brushes();
        Ok(old.map_or(GdiHandle::NULL, |p| p.handle()))
    }

    /// Select a palette, returning the previous one
    pub fn select_palette(&mut self, gdi: &Gdi, hpal: HPALETTE) -> Result<HPALETTE, W32Status> {
        let palette = gdi.table().share_lock::<Palette>(hpal)?;
        let old = self.palette.replace(palette);
        self.refresh_brushes();
        Ok(old.map_or(GdiHandle::NULL, |p| p.handle()))
    }

    /// Select a font, returning the previous one
    pub fn select_font(&mut self, gdi: &Gdi, hfont: HFONT) -> Result<HFONT, W32Status> {
        let font = gdi.table().share_lock::<Font>(hfont)?;

        let attr = self.attrs.live_mut();
        attr.hlfnt = hfont;
        attr.char_set = font.charset() as u32;
        attr.dirty.insert(DirtyFlags::DIRTY_CHARSET | DirtyFlags::DIRTY_TEXT);

        let old = self.font.replace(font);
        Ok(old.map_or(GdiHandle::NULL, |f| f.handle()))
    }

    /// Select a bitmap into a memory DC, returning the previous one
    pub fn select_bitmap(&mut self, gdi: &Gdi, hbitmap: HBITMAP) -> Result<HBITMAP, W32Status> {
        if self.dc_type != DcType::Memory {
            return Err(W32Status::InvalidHandle);
        }

        let surface = gdi.table().share_lock::<Surface>(hbitmap)?;
        let targets = self.clip_targets(gdi, self.clip_rgn)?;

        let size = surface.size();
        let old = self.surface.replace(surface);
        self.commit_size(size, targets);
        Ok(old.map_or(GdiHandle::NULL, |s| s.handle()))
    }

    /// Replace the API clip region with a private copy of `hrgn`
    ///
    /// A null handle removes the API clip. Returns the complexity of the
    /// resulting GDI clip.
    pub fn select_clip_rgn(&mut self, gdi: &Gdi, hrgn: HRGN) -> Result<RegionType, W32Status> {
        let table = gdi.table();

        let copy = if hrgn.is_null() {
            GdiHandle::NULL
        } else {
            region::copy_dc_rgn(table, hrgn, self.owner(gdi))?
        };
        let targets = match self.clip_targets(gdi, copy) {
            Ok(targets) => targets,
            Err(status) => {
                if !copy.is_null() {
                    region::delete_rgn(table, copy);
                }
                return Err(status);
            }
        };

        if !self.clip_rgn.is_null() {
            region::delete_rgn(table, self.clip_rgn);
        }
        self.clip_rgn = copy;
        self.flags.insert(DcFlags::DIRTY_RAO);

        self.commit_clip(targets);
        Ok(self.combined_clip.as_ref().map_or(RegionType::Null, |c| c.complexity))
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Start recording a new path, discarding the current one
    pub fn begin_path(&mut self, gdi: &Gdi) -> Result<(), W32Status> {
        let table = gdi.table();
        let hpath = path::create_path(table, self.owner(gdi))?;

        if !self.path.is_null() {
            path::delete_path(table, self.path);
        }
        self.path = hpath;
        self.level.path_flags.insert(PathFlags::ACTIVE);
        Ok(())
    }

    /// Stop recording
    pub fn end_path(&mut self) -> bool {
        if !self.level.path_flags.contains(PathFlags::ACTIVE) {
            return false;
        }
        self.level.path_flags.remove(PathFlags::ACTIVE);
        true
    }

    /// Discard the path
    pub fn abort_path(&mut self, gdi: &Gdi) -> bool {
        if self.path.is_null() {
            return false;
        }
        path::delete_path(gdi.table(), self.path);
        self.path = GdiHandle::NULL;
        self.level.path_flags = PathFlags::empty();
        true
    }

    fn with_recording_path<F: FnOnce(&mut path::Path) -> bool>(&self, gdi: &Gdi, f: F) -> bool {
        if !self.level.path_flags.contains(PathFlags::ACTIVE) {
            return false;
        }
        match gdi.table().path(self.path) {
            Ok(p) => f(&mut p.lock()),
            Err(_) => false,
        }
    }

    pub fn path_move_to(&self, gdi: &Gdi, x: i32, y: i32) -> bool {
        self.with_recording_path(gdi, |p| p.move_to(x, y))
    }

    pub fn path_line_to(&self, gdi: &Gdi, x: i32, y: i32) -> bool {
        self.with_recording_path(gdi, |p| p.line_to(x, y))
    }

    pub fn close_figure(&self, gdi: &Gdi) -> bool {
        self.with_recording_path(gdi, |p| p.close_figure())
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Set text color, returning the previous one
    pub fn set_text_color(&mut self, color: ColorRef) -> ColorRef {
        let old = self.attrs.live_mut().set_text_color(color);
        self.refresh_brushes();
        old
    }

    /// Set background color, returning the previous one
    pub fn set_bk_color(&mut self, color: ColorRef) -> ColorRef {
        let old = self.attrs.live_mut().set_bk_color(color);
        self.refresh_brushes();
        old
    }

    /// Set background mode, returning the previous one
    pub fn set_bk_mode(&mut self, mode: u8) -> u8 {
        core::mem::replace(&mut self.attrs.live_mut().bk_mode, mode)
    }

    /// Set the binary raster operation, returning the previous one
    pub fn set_rop2(&mut self, rop2: u8) -> u8 {
        core::mem::replace(&mut self.attrs.live_mut().rop2, rop2)
    }

    /// Set brush origin, returning the previous one
    pub fn set_brush_origin(&mut self, origin: Point) -> Point {
        self.attrs.live_mut().brush_origin = origin;
        core::mem::replace(&mut self.level.brush_origin, origin)
    }

    /// Copy user-mode attribute writes into the trusted record
    pub fn sync_attrs(&mut self) {
        self.attrs.sync_to_trusted();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn handle(&self) -> HDC {
        self.handle
    }

    pub fn state(&self) -> DcState {
        self.state
    }

    pub fn dc_type(&self) -> DcType {
        self.dc_type
    }

    pub fn flags(&self) -> DcFlags {
        self.flags
    }

    pub fn is_permanent(&self) -> bool {
        self.flags.contains(DcFlags::PERMANENT)
    }

    pub fn pdev(&self) -> Option<&PdevRef> {
        self.pdev.as_ref()
    }

    /// Driver instance of the device
    pub fn dhpdev(&self) -> usize {
        self.dhpdev
    }

    pub fn graphics_caps(&self) -> GraphicsCaps {
        self.graphics_caps
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }

    pub fn size(&self) -> Size {
        self.level.size
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn window(&self) -> Rect {
        self.window
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn bounds_app(&self) -> Rect {
        self.bounds_app
    }

    pub fn clip_bounds(&self) -> Rect {
        self.clip_bounds
    }

    /// Live attribute record
    pub fn attr(&self) -> &DcAttr {
        self.attrs.live()
    }

    /// Live attribute record, as user mode writes it
    pub fn attr_mut(&mut self) -> &mut DcAttr {
        self.attrs.live_mut()
    }

    pub fn attrs(&self) -> &AttrStore {
        &self.attrs
    }

    pub fn level(&self) -> &DcLevel {
        &self.level
    }

    pub fn surface(&self) -> Option<&SharedRef<Surface>> {
        self.surface.as_ref()
    }

    pub fn fill_brush(&self) -> Option<&SharedRef<Brush>> {
        self.fill_brush.as_ref()
    }

    pub fn line_brush(&self) -> Option<&SharedRef<Brush>> {
        self.line_brush.as_ref()
    }

    pub fn palette(&self) -> Option<&SharedRef<Palette>> {
        self.palette.as_ref()
    }

    pub fn font(&self) -> Option<&SharedRef<Font>> {
        self.font.as_ref()
    }

    /// Engine brush serving `role`
    pub fn ebrush(&self, role: BrushRole) -> &EBrushObj {
        match role {
            BrushRole::Fill => &self.ebo_fill,
            BrushRole::Line => &self.ebo_line,
            BrushRole::Text => &self.ebo_text,
            BrushRole::Background => &self.ebo_background,
        }
    }

    pub fn clip_rgn(&self) -> HRGN {
        self.clip_rgn
    }

    pub fn vis_rgn(&self) -> HRGN {
        self.vis_rgn
    }

    pub fn gc_clip_rgn(&self) -> HRGN {
        self.gc_clip_rgn
    }

    pub fn combined_clip(&self) -> Option<&ClipObj> {
        self.combined_clip.as_ref()
    }

    pub fn path(&self) -> HPATH {
        self.path
    }

    /// Init data the DC was opened with
    pub fn devmode(&self) -> Option<&DevMode> {
        self.devmode.as_ref()
    }
}

// ============================================================================
// DC Operations
// ============================================================================

impl Gdi {
    /// Lock a DC for the duration of `f`
    pub fn with_dc<R>(&self, hdc: HDC, f: impl FnOnce(&mut Dc) -> R) -> Result<R, W32Status> {
        self.ensure_ready()?;
        let dc = self.table().dc(hdc)?;
        let mut guard = dc.lock();
        Ok(f(&mut guard))
    }

    /// Save the DC state (SaveDC)
    pub fn save_dc(&self, hdc: HDC) -> Result<i32, W32Status> {
        self.with_dc(hdc, |dc| dc.save(self))?
    }

    /// Restore a saved DC state (RestoreDC)
    pub fn restore_dc(&self, hdc: HDC, level: i32) -> Result<(), W32Status> {
        self.with_dc(hdc, |dc| dc.restore(self, level))?
    }

    /// Select a brush, pen, font or bitmap (SelectObject)
    pub fn select_object(&self, hdc: HDC, handle: GdiHandle) -> Result<GdiHandle, W32Status> {
        self.with_dc(hdc, |dc| match handle.object_type() {
            GdiObjectType::Brush => dc.select_fill_brush(self, handle),
            GdiObjectType::Pen => dc.select_line_brush(self, handle),
            GdiObjectType::Font => dc.select_font(self, handle),
            GdiObjectType::Bitmap => dc.select_bitmap(self, handle),
            _ => Err(W32Status::InvalidHandle),
        })?
    }

    /// Select a palette (SelectPalette)
    pub fn select_palette(&self, hdc: HDC, hpal: HPALETTE) -> Result<HPALETTE, W32Status> {
        self.with_dc(hdc, |dc| dc.select_palette(self, hpal))?
    }

    /// Set or remove the API clip region (SelectClipRgn)
    pub fn select_clip_rgn(&self, hdc: HDC, hrgn: HRGN) -> Result<RegionType, W32Status> {
        self.with_dc(hdc, |dc| dc.select_clip_rgn(self, hrgn))?
    }

    pub fn set_text_color(&self, hdc: HDC, color: ColorRef) -> Result<ColorRef, W32Status> {
        self.with_dc(hdc, |dc| dc.set_text_color(color))
    }

    pub fn set_bk_color(&self, hdc: HDC, color: ColorRef) -> Result<ColorRef, W32Status> {
        self.with_dc(hdc, |dc| dc.set_bk_color(color))
    }

    pub fn begin_path(&self, hdc: HDC) -> Result<(), W32Status> {
        self.with_dc(hdc, |dc| dc.begin_path(self))?
    }

    pub fn end_path(&self, hdc: HDC) -> Result<bool, W32Status> {
        self.with_dc(hdc, |dc| dc.end_path())
    }

    pub fn abort_path(&self, hdc: HDC) -> Result<bool, W32Status> {
        self.with_dc(hdc, |dc| dc.abort_path(self))
    }

    /// Hand a DC and its private objects to another process
    pub fn set_dc_ownership(&self, hdc: HDC, owner: ProcessId) -> Result<(), W32Status> {
        self.with_dc(hdc, |dc| dc.transfer_ownership(self, owner))?
    }

    /// Return a DC to its default state without deleting it (ReleaseDC)
    pub fn release_dc(&self, hdc: HDC) -> Result<(), W32Status> {
        self.with_dc(hdc, |dc| dc.release(self))?
    }
}
