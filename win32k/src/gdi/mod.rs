//! GDI - Graphics Device Interface
//!
//! Device-context management following the Windows NT GDI architecture.
//!
//! # Components
//!
//! - **gdiobj**: Handle table, ownership and share locks
//! - **dc**: Device Context lifecycle (HDC)
//! - **dcfactory**: OpenDC / CreateCompatibleDC / DeleteDC
//! - **dcattr**: Trusted and process-mapped attribute records
//! - **ebrush**: Engine brushes bound to a DC
//! - **pdev**: Physical devices
//! - **surface**, **brush**, **pen**, **palette**, **font**, **region**,
//!   **path**: Objects a DC selects or owns
//! - **ntgdi**: Caller-facing entry points
//!
//! # Object Model
//!
//! GDI objects use a handle-based system:
//! - Objects are stored in a table indexed by handle
//! - Reference counting for object lifetime
//! - Per-process object ownership
//!
//! All state lives in a [`Gdi`] context; nothing is global.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/dcobj.cxx` - Device context
//! - `windows/core/ntgdi/gre/stockfnt.cxx` - Stock objects

pub mod brush;
pub mod dc;
pub mod dcattr;
pub mod dcfactory;
pub mod ebrush;
pub mod font;
pub mod gdiobj;
pub mod ntgdi;
pub mod palette;
pub mod path;
pub mod pdev;
pub mod pen;
pub mod region;
pub mod surface;
pub mod xform;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use spin::{Mutex, RwLock};

use self::brush::Brush;
use self::font::{CharSet, LogFont, DEFAULT_FONT_HEIGHT};
use self::gdiobj::{HandleTable, SharedRef};
use self::pdev::{DeviceRegistry, GdiInfo, GraphicsCaps, Pdev, PdevFlags};
use self::surface::Surface;
use crate::{GdiHandle, GdiObjectType, ProcessId, W32Status};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of GDI objects
pub const MAX_GDI_OBJECTS: usize = 16384;

/// Number of stock object slots
const STOCK_OBJECT_SLOTS: usize = 21;

// ============================================================================
// Stock Objects
// ============================================================================

/// Stock object identifiers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockObject {
    WhiteBrush = 0,
    LightGrayBrush = 1,
    GrayBrush = 2,
    DarkGrayBrush = 3,
    BlackBrush = 4,
    NullBrush = 5,
    WhitePen = 6,
    BlackPen = 7,
    NullPen = 8,
    SystemFont = 13,
    DeviceDefaultFont = 14,
    DefaultPalette = 15,
    SystemFixedFont = 16,
    DefaultBitmap = 20,
}

const STOCK_BRUSH_IDS: [StockObject; 6] = [
    StockObject::WhiteBrush,
    StockObject::LightGrayBrush,
    StockObject::GrayBrush,
    StockObject::DarkGrayBrush,
    StockObject::BlackBrush,
    StockObject::NullBrush,
];

const STOCK_PEN_IDS: [StockObject; 3] = [StockObject::WhitePen, StockObject::BlackPen, StockObject::NullPen];

/// Handles of the stock objects; NULL where creation failed
#[derive(Debug, Clone, Copy)]
pub struct StockObjects {
    handles: [GdiHandle; STOCK_OBJECT_SLOTS],
}

impl StockObjects {
    fn create(table: &HandleTable) -> Self {
        let mut stock = Self {
            handles: [GdiHandle::NULL; STOCK_OBJECT_SLOTS],
        };

        for (id, body) in STOCK_BRUSH_IDS.iter().zip(brush::STOCK_BRUSHES) {
            stock.put(*id, table.alloc_stock(GdiObjectType::Brush, brush::wrap(body)));
        }
        for (id, body) in STOCK_PEN_IDS.iter().zip(pen::STOCK_PENS) {
            stock.put(*id, table.alloc_stock(GdiObjectType::Pen, brush::wrap(body)));
        }

        stock.put(StockObject::DefaultPalette, palette::create_stock_palette(table));

        stock.put(
            StockObject::SystemFont,
            font::create_stock_font(table, LogFont::new("System", DEFAULT_FONT_HEIGHT, CharSet::Ansi)),
        );
        stock.put(
            StockObject::DeviceDefaultFont,
            font::create_stock_font(table, LogFont::new("System", DEFAULT_FONT_HEIGHT, CharSet::Default)),
        );
        stock.put(
            StockObject::SystemFixedFont,
            font::create_stock_font(table, LogFont::new("Fixedsys", DEFAULT_FONT_HEIGHT, CharSet::Ansi)),
        );

        stock.put(StockObject::DefaultBitmap, surface::create_stock_bitmap(table));

        stock
    }

    fn put(&mut self, id: StockObject, result: Result<GdiHandle, W32Status>) {
        match result {
            Ok(handle) => self.handles[id as usize] = handle,
            Err(status) => log::error!("[GDI] Failed to create stock object {:?}: {}", id, status),
        }
    }

    /// Handle of a stock object
    pub fn get(&self, id: StockObject) -> GdiHandle {
        self.handles[id as usize]
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Behavior of RestoreDC for a level that does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveLevelPolicy {
    /// Fail with `InvalidSaveLevel`
    #[default]
    Strict,
    /// Log and leave the DC unchanged
    Permissive,
}

/// GDI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdiConfig {
    /// Handle table capacity
    pub max_objects: usize,
    pub save_level_policy: SaveLevelPolicy,
}

impl Default for GdiConfig {
    fn default() -> Self {
        Self {
            max_objects: MAX_GDI_OBJECTS,
            save_level_policy: SaveLevelPolicy::Strict,
        }
    }
}

// ============================================================================
// GDI State
// ============================================================================

/// Objects pinned for the subsystem lifetime
pub(crate) struct GdiDefaults {
    /// Surface of DCs that have no bitmap selected
    pub bitmap: SharedRef<Surface>,
    /// Brush for the text and background engine brushes
    pub brush: SharedRef<Brush>,
}

enum InitState {
    Pending,
    Ready(GdiDefaults),
    Failed,
}

/// GDI statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GdiStats {
    pub initialized: bool,
    pub dc_count: usize,
    pub bitmap_count: usize,
    pub brush_count: usize,
    pub pen_count: usize,
    pub region_count: usize,
    pub palette_count: usize,
    pub font_count: usize,
    pub path_count: usize,
    pub device_count: usize,
}

/// GDI subsystem context
pub struct Gdi {
    config: GdiConfig,
    table: HandleTable,
    devices: DeviceRegistry,
    stock: StockObjects,
    state: RwLock<InitState>,
    last_errors: Mutex<BTreeMap<ProcessId, W32Status>>,
}

impl Gdi {
    /// Create the handle table and the stock objects
    pub fn new(config: GdiConfig) -> Self {
        let table = HandleTable::new(config.max_objects);
        let stock = StockObjects::create(&table);

        log::debug!("[GDI] Created {} stock objects", table.count());

        Self {
            config,
            table,
            devices: DeviceRegistry::new(),
            stock,
            state: RwLock::new(InitState::Pending),
            last_errors: Mutex::new(BTreeMap::new()),
        }
    }

    /// Pin the default bitmap and default brush (InitDcImpl)
    ///
    /// A failure is terminal: every later request reports
    /// `InitializationFailed`.
    pub fn init(&self) -> Result<(), W32Status> {
        let mut state = self.state.write();

        match *state {
            InitState::Ready(_) => return Ok(()),
            InitState::Failed => return Err(W32Status::InitializationFailed),
            InitState::Pending => {}
        }

        log::info!("[GDI] Initializing Graphics Device Interface...");

        let defaults = self
            .table
            .share_lock::<Surface>(self.stock.get(StockObject::DefaultBitmap))
            .and_then(|bitmap| {
                let brush = self.table.share_lock::<Brush>(self.stock.get(StockObject::BlackBrush))?;
                Ok(GdiDefaults { bitmap, brush })
            });

        match defaults {
            Ok(defaults) => {
                *state = InitState::Ready(defaults);
                log::info!("[GDI] Graphics Device Interface initialized");
                Ok(())
            }
            Err(status) => {
                *state = InitState::Failed;
                log::error!("[GDI] Initialization failed: {}", status);
                Err(W32Status::InitializationFailed)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), InitState::Ready(_))
    }

    /// Fail unless [`init`](Self::init) succeeded
    pub(crate) fn ensure_ready(&self) -> Result<(), W32Status> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(W32Status::InitializationFailed)
        }
    }

    /// New reference to the default bitmap
    pub(crate) fn default_bitmap(&self) -> Result<SharedRef<Surface>, W32Status> {
        match &*self.state.read() {
            InitState::Ready(d) => Ok(d.bitmap.clone()),
            _ => Err(W32Status::InitializationFailed),
        }
    }

    /// New reference to the default brush
    pub(crate) fn default_brush(&self) -> Result<SharedRef<Brush>, W32Status> {
        match &*self.state.read() {
            InitState::Ready(d) => Ok(d.brush.clone()),
            _ => Err(W32Status::InitializationFailed),
        }
    }

    pub fn config(&self) -> &GdiConfig {
        &self.config
    }

    pub fn table(&self) -> &HandleTable {
        &self.table
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    /// Get stock object handle
    pub fn stock_object(&self, id: StockObject) -> GdiHandle {
        self.stock.get(id)
    }

    /// Register a device together with its framebuffer surface
    pub fn register_device(
        &self,
        name: &str,
        gdi_info: GdiInfo,
        caps: GraphicsCaps,
        flags: PdevFlags,
    ) -> Result<Arc<Pdev>, W32Status> {
        let surface = surface::create_primary_surface(&self.table, gdi_info.horz_res, gdi_info.vert_res, gdi_info.device_bpp())?;
        Ok(self.devices.register(name, gdi_info, caps, flags, surface))
    }

    /// Delete any GDI object (GreDeleteObject)
    ///
    /// DCs are deleted forcibly and objects private to a DC are refused.
    /// Other objects are removed from the table while outstanding share
    /// locks keep their bodies alive.
    pub fn delete_object(&self, handle: GdiHandle) -> Result<(), W32Status> {
        self.ensure_ready()?;

        if self.table.is_stock(handle) {
            return Err(W32Status::InvalidHandle);
        }
        if self.table.is_dc_private(handle) {
            log::warn!("[GDI] Refusing to delete DC-owned {}", handle);
            return Err(W32Status::InvalidHandle);
        }

        match handle.object_type() {
            GdiObjectType::DC => self.delete_dc(handle, true),
            GdiObjectType::None => Err(W32Status::InvalidHandle),
            obj_type => {
                if self.table.free_object(handle, obj_type) {
                    log::trace!("[GDI] Deleted {:?} {}", obj_type, handle);
                    Ok(())
                } else {
                    Err(W32Status::InvalidHandle)
                }
            }
        }
    }

    /// Record the last error of a process
    pub(crate) fn set_last_error(&self, pid: ProcessId, status: W32Status) {
        self.last_errors.lock().insert(pid, status);
    }

    /// Last error recorded for a process
    ///
    /// Like the Win32 last error, a later success does not clear it.
    pub fn last_error(&self, pid: ProcessId) -> W32Status {
        self.last_errors.lock().get(&pid).copied().unwrap_or(W32Status::Success)
    }

    /// Drop the per-process state of an exiting process
    pub fn forget_process(&self, pid: ProcessId) {
        if let Some(status) = self.last_errors.lock().remove(&pid) {
            log::trace!("[GDI] Forgot {} (last error {})", pid, status);
        }
    }

    /// Get GDI statistics
    pub fn stats(&self) -> GdiStats {
        GdiStats {
            initialized: self.is_initialized(),
            dc_count: self.table.count_type(GdiObjectType::DC),
            bitmap_count: self.table.count_type(GdiObjectType::Bitmap),
            brush_count: self.table.count_type(GdiObjectType::Brush),
            pen_count: self.table.count_type(GdiObjectType::Pen),
            region_count: self.table.count_type(GdiObjectType::Region),
            palette_count: self.table.count_type(GdiObjectType::Palette),
            font_count: self.table.count_type(GdiObjectType::Font),
            path_count: self.table.count_type(GdiObjectType::Path),
            device_count: self.devices.count(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Resolution of the test display
    pub const DISPLAY_SIZE: (u32, u32) = (640, 480);

    /// Initialized GDI with one 32bpp display
    pub fn gdi() -> Gdi {
        gdi_with(GdiConfig::default())
    }

    pub fn gdi_with(config: GdiConfig) -> Gdi {
        let gdi = Gdi::new(config);
        gdi.init().unwrap();
        gdi.register_device(
            "\\\\.\\DISPLAY1",
            GdiInfo::new(DISPLAY_SIZE.0, DISPLAY_SIZE.1, 32),
            GraphicsCaps::BEZIERS | GraphicsCaps::ALTERNATE_FILL | GraphicsCaps::WINDING_FILL,
            PdevFlags::DISPLAY,
        )
        .unwrap();
        gdi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_objects_created() {
        let gdi = Gdi::new(GdiConfig::default());
        for id in STOCK_BRUSH_IDS.iter().chain(STOCK_PEN_IDS.iter()) {
            let h = gdi.stock_object(*id);
            assert!(h.is_stock(), "{:?}", id);
            assert!(gdi.table().is_stock(h));
        }
        assert_eq!(gdi.stock_object(StockObject::WhitePen).object_type(), GdiObjectType::Pen);
        assert_eq!(gdi.stock_object(StockObject::DefaultBitmap).object_type(), GdiObjectType::Bitmap);
        assert_eq!(gdi.stock_object(StockObject::SystemFixedFont).object_type(), GdiObjectType::Font);
        assert_eq!(gdi.table().count(), 14);
    }

    #[test]
    fn test_init_pins_defaults() {
        let gdi = Gdi::new(GdiConfig::default());
        assert!(!gdi.is_initialized());
        assert_eq!(gdi.default_bitmap().err(), Some(W32Status::InitializationFailed));

        gdi.init().unwrap();
        assert!(gdi.is_initialized());
        assert_eq!(gdi.table().share_count(gdi.stock_object(StockObject::DefaultBitmap)), Some(1));
        assert_eq!(gdi.table().share_count(gdi.stock_object(StockObject::BlackBrush)), Some(1));

        // Second call is a no-op
        gdi.init().unwrap();
        assert_eq!(gdi.table().share_count(gdi.stock_object(StockObject::BlackBrush)), Some(1));
    }

    #[test]
    fn test_init_failure_is_terminal() {
        // Too small for the default bitmap
        let gdi = Gdi::new(GdiConfig {
            max_objects: 3,
            ..GdiConfig::default()
        });
        assert!(gdi.stock_object(StockObject::DefaultBitmap).is_null());

        assert_eq!(gdi.init(), Err(W32Status::InitializationFailed));
        assert_eq!(gdi.init(), Err(W32Status::InitializationFailed));
        assert!(!gdi.is_initialized());
        assert_eq!(gdi.create_compatible_dc(None, ProcessId(1)).err(), Some(W32Status::InitializationFailed));
        assert!(!gdi.stats().initialized);
    }

    #[test]
    fn test_stock_objects_cannot_be_deleted() {
        let gdi = testing::gdi();
        let white = gdi.stock_object(StockObject::WhiteBrush);
        assert_eq!(gdi.delete_object(white), Err(W32Status::InvalidHandle));
        assert!(gdi.table().get(white).is_ok());
    }

    #[test]
    fn test_delete_object_generic() {
        let gdi = testing::gdi();
        let h = brush::create_solid_brush(gdi.table(), crate::ColorRef::GRAY, ProcessId(1)).unwrap();
        assert_eq!(gdi.stats().brush_count, 7);
        assert!(gdi.delete_object(h).is_ok());
        assert_eq!(gdi.stats().brush_count, 6);
        assert_eq!(gdi.delete_object(h), Err(W32Status::InvalidHandle));
    }

    #[test]
    fn test_last_error_defaults_to_success() {
        let gdi = testing::gdi();
        assert_eq!(gdi.last_error(ProcessId(5)), W32Status::Success);
        gdi.set_last_error(ProcessId(5), W32Status::InvalidHandle);
        assert_eq!(gdi.last_error(ProcessId(5)), W32Status::InvalidHandle);
        assert_eq!(gdi.last_error(ProcessId(6)), W32Status::Success);
    }

    #[test]
    fn test_forget_process() {
        let gdi = testing::gdi();
        gdi.set_last_error(ProcessId(5), W32Status::InvalidHandle);
        gdi.set_last_error(ProcessId(6), W32Status::OutOfHandles);

        gdi.forget_process(ProcessId(5));
        gdi.forget_process(ProcessId(9));
        assert_eq!(gdi.last_error(ProcessId(5)), W32Status::Success);
        assert_eq!(gdi.last_error(ProcessId(6)), W32Status::OutOfHandles);
        assert_eq!(gdi.last_errors.lock().len(), 1);
    }

    #[test]
    fn test_stats() {
        let gdi = testing::gdi();
        let stats = gdi.stats();
        assert!(stats.initialized);
        assert_eq!(stats.device_count, 1);
        // Default bitmap plus the display framebuffer
        assert_eq!(stats.bitmap_count, 2);
        assert_eq!(stats.pen_count, 3);
        assert_eq!(stats.font_count, 3);
        assert_eq!(stats.dc_count, 0);
    }
}
