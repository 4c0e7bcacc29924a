//! DC Creation and Deletion
//!
//! Factories that allocate, initialize and publish device contexts, and the
//! deletion paths that tear them down again. A DC becomes visible to other
//! callers only once it is fully built; any failure on the way releases what
//! was acquired and frees the handle.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/dcobj.cxx` - GreOpenDCW, GreCreateCompatibleDC
//! - `windows/core/ntgdi/gre/dcobj.cxx` - bDeleteDCInternal

use super::dc::{Dc, DcType};
use super::pdev::{DevMode, PdevRef};
use super::Gdi;
use crate::{GdiHandle, GdiObjectType, ProcessId, W32Status, HDC};

impl Gdi {
    /// Open a DC on a named device (GreOpenDCW)
    ///
    /// `None` or `"DISPLAY"` selects the primary display. With `display`
    /// set, only display devices are accepted. `init_data` must not exceed
    /// what the device offers and is kept with the DC.
    pub fn open_dc(
        &self,
        device: Option<&str>,
        init_data: Option<&DevMode>,
        dc_type: DcType,
        display: bool,
        owner: ProcessId,
    ) -> Result<HDC, W32Status> {
        self.ensure_ready()?;

        let pdev = self.devices().resolve(device).ok_or_else(|| {
            log::warn!("[GDI/DC] No device matches {:?}", device);
            W32Status::NoSuitableDevice
        })?;

        if display && !pdev.is_display() {
            log::warn!("[GDI/DC] {} is not a display device", pdev.name());
            return Err(W32Status::NoSuitableDevice);
        }

        if let Some(dm) = init_data {
            if !dm.fits(pdev.gdi_info()) {
                log::warn!(
                    "[GDI/DC] Mode {}x{}x{} exceeds {}",
                    dm.pels_width,
                    dm.pels_height,
                    dm.bits_per_pel,
                    pdev.name()
                );
                return Err(W32Status::NoSuitableDevice);
            }
        }

        self.build_dc(dc_type, pdev, owner, init_data.cloned())
    }

    /// Create a memory DC on the device of `source` (GreCreateCompatibleDC)
    ///
    /// Without a source the primary display is used. The new DC starts with
    /// the default 1x1 bitmap selected.
    pub fn create_compatible_dc(&self, source: Option<HDC>, owner: ProcessId) -> Result<HDC, W32Status> {
        self.ensure_ready()?;

        let pdev = match source {
            Some(hdc) => {
                // Source stays locked only long enough to reference its device
                let src = self.table().dc(hdc)?;
                let guard = src.lock();
                let pdev = guard.pdev().cloned();
                drop(guard);
                pdev.ok_or(W32Status::InvalidHandle)?
            }
            None => self.devices().resolve(None).ok_or(W32Status::NoSuitableDevice)?,
        };

        self.build_dc(DcType::Memory, pdev, owner, None)
    }

    /// Create a direct or information DC on a display (IntGdiCreateDC)
    pub fn create_dc(
        &self,
        device: Option<&str>,
        init_data: Option<&DevMode>,
        info_only: bool,
        owner: ProcessId,
    ) -> Result<HDC, W32Status> {
        let dc_type = if info_only { DcType::Info } else { DcType::Direct };
        self.open_dc(device, init_data, dc_type, true, owner)
    }

    /// Create a DC of any kind on the primary display (IntGdiCreateDisplayDC)
    pub fn create_display_dc(&self, dc_type: DcType, owner: ProcessId) -> Result<HDC, W32Status> {
        match dc_type {
            DcType::Memory => self.create_compatible_dc(None, owner),
            DcType::Direct => self.create_dc(None, None, false, owner),
            DcType::Info => self.create_dc(None, None, true, owner),
        }
    }

    fn build_dc(
        &self,
        dc_type: DcType,
        pdev: PdevRef,
        owner: ProcessId,
        devmode: Option<DevMode>,
    ) -> Result<HDC, W32Status> {
        let (hdc, dc) = Dc::allocate(self, owner)?;
        let mut guard = dc.lock();

        if let Err(status) = guard.initialize(self, dc_type, pdev) {
            drop(guard);
            self.discard_handle(hdc);
            return Err(status);
        }

        if let Err(status) = guard.init_vis_region(self) {
            guard.cleanup(self);
            drop(guard);
            self.discard_handle(hdc);
            return Err(status);
        }

        guard.set_devmode(devmode);
        guard.allocate_attr(owner);
        drop(guard);

        self.table().publish(hdc);
        log::debug!("[GDI/DC] Created {:?} DC {} for {}", dc_type, hdc, owner);
        Ok(hdc)
    }

    /// Free the handle of a DC that never became visible
    fn discard_handle(&self, hdc: HDC) {
        if self.table().begin_free(hdc, GdiObjectType::DC).is_ok() {
            self.table().finish_free(hdc);
        }
    }

    /// Delete a DC (bDeleteDCInternal)
    ///
    /// A permanent DC is only reset unless `force` is set. A DC already
    /// being deleted by someone else counts as deleted.
    pub fn delete_dc(&self, hdc: HDC, force: bool) -> Result<(), W32Status> {
        self.ensure_ready()?;

        let dc = match self.table().dc(hdc) {
            Ok(dc) => dc,
            Err(W32Status::ObjectDead) => {
                log::debug!("[GDI/DC] {} is already being deleted", hdc);
                return Ok(());
            }
            Err(_) => return Err(W32Status::InvalidHandle),
        };

        let permanent = dc.lock().is_permanent();
        if permanent && !force {
            log::debug!("[GDI/DC] {} is permanent, releasing instead", hdc);
            return self.release_dc(hdc);
        }

        match self.table().begin_free(hdc, GdiObjectType::DC) {
            Ok(_) => {}
            Err(W32Status::ObjectDead) => return Ok(()),
            Err(status) => return Err(status),
        }

        dc.lock().cleanup(self);
        self.table().finish_free(hdc);

        log::debug!("[GDI/DC] Deleted {}", hdc);
        Ok(())
    }

    /// Delete an object on behalf of an application (NtGdiDeleteObjectApp)
    ///
    /// Stock objects are silently kept. DCs must belong to the caller and
    /// permanent ones are reset instead of deleted. Regions and paths owned
    /// by a DC are refused even though they carry the caller's id.
    pub fn delete_object_app(&self, handle: GdiHandle, caller: ProcessId) -> Result<(), W32Status> {
        self.ensure_ready()?;

        if handle.is_stock() {
            return Ok(());
        }

        if !self.table().owned_by(handle, caller) {
            if self.table().is_object_dead(handle) {
                return Ok(());
            }
            log::debug!("[GDI] {} refused to delete {}", caller, handle);
            return Err(W32Status::InvalidHandle);
        }

        if handle.object_type() != GdiObjectType::DC {
            return self.delete_object(handle);
        }

        if self.table().is_object_dead(handle) {
            return Ok(());
        }

        self.delete_dc(handle, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdi::brush::create_solid_brush;
    use crate::gdi::dc::DcState;
    use crate::gdi::pdev::{GdiInfo, GraphicsCaps, PdevFlags};
    use crate::gdi::region::create_rect_rgn;
    use crate::gdi::surface::{create_bitmap, PixelFormat, Surface};
    use crate::gdi::testing::{self, DISPLAY_SIZE};
    use crate::gdi::{Gdi, GdiConfig, StockObject};
    use crate::{ColorRef, Rect, Size};

    const APP: ProcessId = ProcessId(100);

    /// Stock objects plus the display framebuffer
    const BASE_OBJECTS: usize = 15;

    fn kind(gdi: &Gdi, hdc: HDC) -> DcType {
        gdi.with_dc(hdc, |dc| dc.dc_type()).unwrap()
    }

    #[test]
    fn test_open_dc_without_device() {
        let gdi = Gdi::new(GdiConfig::default());
        gdi.init().unwrap();
        assert_eq!(gdi.open_dc(None, None, DcType::Direct, true, APP), Err(W32Status::NoSuitableDevice));
        assert_eq!(gdi.create_compatible_dc(None, APP), Err(W32Status::NoSuitableDevice));
        assert_eq!(gdi.table().count(), 14);
    }

    #[test]
    fn test_open_dc_display_alias() {
        let gdi = testing::gdi();
        let a = gdi.open_dc(Some("DISPLAY"), None, DcType::Direct, true, APP).unwrap();
        let b = gdi.open_dc(Some("display"), None, DcType::Direct, true, APP).unwrap();
        let c = gdi.open_dc(Some("\\\\.\\DISPLAY1"), None, DcType::Info, false, APP).unwrap();

        let primary = gdi.devices().primary().unwrap();
        for hdc in [a, b, c] {
            gdi.with_dc(hdc, |dc| assert!(dc.pdev().unwrap().ptr_eq(&primary))).unwrap();
        }
        assert_eq!(primary.ref_count(), 3);
        assert_eq!(
            gdi.open_dc(Some("PLOTTER"), None, DcType::Direct, false, APP),
            Err(W32Status::NoSuitableDevice)
        );
    }

    #[test]
    fn test_open_dc_requires_display() {
        let gdi = Gdi::new(GdiConfig::default());
        gdi.init().unwrap();
        gdi.register_device("PRINTER", GdiInfo::new(100, 100, 1), GraphicsCaps::empty(), PdevFlags::empty())
            .unwrap();

        assert_eq!(
            gdi.open_dc(Some("PRINTER"), None, DcType::Direct, true, APP),
            Err(W32Status::NoSuitableDevice)
        );
        let hdc = gdi.open_dc(Some("PRINTER"), None, DcType::Direct, false, APP).unwrap();
        gdi.with_dc(hdc, |dc| {
            assert_eq!(dc.size(), Size::new(100, 100));
            assert_eq!(dc.bits_per_pixel(), 1);
        })
        .unwrap();
    }

    #[test]
    fn test_open_dc_init_data() {
        let gdi = testing::gdi();
        let fits = DevMode {
            pels_width: DISPLAY_SIZE.0,
            pels_height: DISPLAY_SIZE.1,
            bits_per_pel: 32,
            ..DevMode::default()
        };
        let hdc = gdi.open_dc(None, Some(&fits), DcType::Direct, true, APP).unwrap();
        gdi.with_dc(hdc, |dc| assert_eq!(dc.devmode(), Some(&fits))).unwrap();

        let too_large = DevMode {
            pels_width: 4096,
            ..fits.clone()
        };
        let before = gdi.table().count();
        assert_eq!(
            gdi.open_dc(None, Some(&too_large), DcType::Direct, true, APP),
            Err(W32Status::NoSuitableDevice)
        );
        assert_eq!(gdi.table().count(), before);
        assert_eq!(gdi.devices().primary().unwrap().ref_count(), 1);
    }

    #[test]
    fn test_create_compatible_dc_without_source() {
        let gdi = testing::gdi();
        let hdc = gdi.create_compatible_dc(None, APP).unwrap();
        let default_bitmap = gdi.stock_object(StockObject::DefaultBitmap);

        gdi.with_dc(hdc, |dc| {
            assert_eq!(dc.dc_type(), DcType::Memory);
            assert_eq!(dc.size(), Size::new(1, 1));
            assert_eq!(dc.surface().unwrap().handle(), default_bitmap);
            assert!(!dc.is_permanent());
        })
        .unwrap();
        assert!(gdi.table().owned_by(hdc, APP));
    }

    #[test]
    fn test_create_compatible_dc_from_source() {
        let gdi = testing::gdi();
        let direct = gdi.create_dc(None, None, false, APP).unwrap();
        let memory = gdi.create_compatible_dc(Some(direct), APP).unwrap();

        assert_eq!(kind(&gdi, direct), DcType::Direct);
        assert_eq!(kind(&gdi, memory), DcType::Memory);
        let dhpdev = gdi.with_dc(direct, |dc| dc.dhpdev()).unwrap();
        assert_eq!(gdi.with_dc(memory, |dc| dc.dhpdev()).unwrap(), dhpdev);

        let bogus = GdiHandle::new(999, GdiObjectType::DC);
        assert_eq!(gdi.create_compatible_dc(Some(bogus), APP), Err(W32Status::InvalidHandle));
    }

    #[test]
    fn test_create_display_dc_kinds() {
        let gdi = testing::gdi();
        for dc_type in [DcType::Direct, DcType::Memory, DcType::Info] {
            let hdc = gdi.create_display_dc(dc_type, APP).unwrap();
            assert_eq!(kind(&gdi, hdc), dc_type);
        }
    }

    #[test]
    fn test_device_reference_returns_to_baseline() {
        let gdi = testing::gdi();
        let pdev = gdi.devices().primary().unwrap();
        let baseline = pdev.ref_count();

        let hdc = gdi.create_compatible_dc(None, APP).unwrap();
        assert_eq!(pdev.ref_count(), baseline + 1);
        gdi.delete_dc(hdc, false).unwrap();
        assert_eq!(pdev.ref_count(), baseline);
        assert_eq!(gdi.table().count(), BASE_OBJECTS);
    }

    #[test]
    fn test_delete_releases_share_locks() {
        let gdi = testing::gdi();
        let table = gdi.table();
        let brush = create_solid_brush(table, ColorRef::GRAY, APP).unwrap();
        let bitmap = create_bitmap(table, 8, 8, PixelFormat::Rgb32, APP).unwrap();

        let hdc = gdi.create_compatible_dc(None, APP).unwrap();
        gdi.select_object(hdc, brush).unwrap();
        gdi.select_object(hdc, bitmap).unwrap();
        gdi.save_dc(hdc).unwrap();
        assert_eq!(table.share_count(brush), Some(3));
        assert_eq!(table.share_count(bitmap), Some(2));

        gdi.delete_object_app(hdc, APP).unwrap();
        assert_eq!(table.share_count(brush), Some(0));
        assert_eq!(table.share_count(bitmap), Some(0));
        assert_eq!(gdi.stats().region_count, 0);
        assert_eq!(gdi.stats().dc_count, 0);
    }

    #[test]
    fn test_permanent_dc_deletion() {
        let gdi = testing::gdi();
        let hdc = gdi.open_dc(None, None, DcType::Direct, true, APP).unwrap();
        gdi.save_dc(hdc).unwrap();

        // Not forced: reset but kept alive
        gdi.delete_dc(hdc, false).unwrap();
        gdi.with_dc(hdc, |dc| {
            assert_eq!(dc.state(), DcState::Initialized);
            assert_eq!(dc.save_depth(), 1);
        })
        .unwrap();

        gdi.delete_object_app(hdc, APP).unwrap();
        assert!(gdi.table().get(hdc).is_ok());

        gdi.delete_dc(hdc, true).unwrap();
        assert_eq!(gdi.table().get(hdc).err(), Some(W32Status::InvalidHandle));
        assert_eq!(gdi.delete_dc(hdc, true), Err(W32Status::InvalidHandle));
    }

    #[test]
    fn test_delete_object_app_checks_owner() {
        let gdi = testing::gdi();
        let hdc = gdi.create_compatible_dc(None, APP).unwrap();

        assert_eq!(gdi.delete_object_app(hdc, ProcessId(7)), Err(W32Status::InvalidHandle));
        assert!(gdi.table().get(hdc).is_ok());

        // Stock objects are kept without complaint
        let white = gdi.stock_object(StockObject::WhiteBrush);
        assert_eq!(gdi.delete_object_app(white, APP), Ok(()));
        assert!(gdi.table().get(white).is_ok());

        // The framebuffer belongs to the system
        let framebuffer = gdi.devices().primary().unwrap().surface();
        assert_eq!(gdi.delete_object_app(framebuffer, APP), Err(W32Status::InvalidHandle));

        gdi.delete_object_app(hdc, APP).unwrap();
    }

    #[test]
    fn test_delete_object_app_spares_dc_regions() {
        let gdi = testing::gdi();
        let hdc = gdi.create_compatible_dc(None, APP).unwrap();
        let clip = create_rect_rgn(gdi.table(), Rect::new(0, 0, 1, 1), APP).unwrap();
        gdi.select_clip_rgn(hdc, clip).unwrap();
        gdi.begin_path(hdc).unwrap();
        gdi.save_dc(hdc).unwrap();

        let (vis, private, clip_before) = gdi
            .with_dc(hdc, |dc| (dc.vis_rgn(), dc.private_handles(), dc.combined_clip().cloned()))
            .unwrap();
        assert!(clip_before.is_some());
        // Live clip, vis, gc clip, path plus the saved clip and path
        assert_eq!(private.len(), 6);

        assert_eq!(gdi.delete_object_app(vis, APP), Err(W32Status::InvalidHandle));
        for &h in &private {
            assert!(gdi.table().owned_by(h, APP));
            assert_eq!(gdi.delete_object_app(h, APP), Err(W32Status::InvalidHandle));
            assert_eq!(gdi.delete_object(h), Err(W32Status::InvalidHandle));
            assert!(gdi.table().get(h).is_ok());
        }

        // The app's own region is still its to delete
        assert_eq!(gdi.delete_object_app(clip, APP), Ok(()));

        let clip_after = gdi.with_dc(hdc, |dc| dc.combined_clip().cloned()).unwrap();
        assert_eq!(clip_after, clip_before);
        // Resizing still finds the visible region
        gdi.select_object(hdc, gdi.stock_object(StockObject::DefaultBitmap)).unwrap();

        gdi.delete_object_app(hdc, APP).unwrap();
        for h in private {
            assert!(gdi.table().get(h).is_err());
        }
        assert_eq!(gdi.stats().region_count, 0);
    }

    #[test]
    fn test_delete_dc_being_deleted() {
        let gdi = testing::gdi();
        let hdc = gdi.create_compatible_dc(None, APP).unwrap();

        gdi.table().begin_free(hdc, GdiObjectType::DC).unwrap();
        assert_eq!(gdi.delete_dc(hdc, false), Ok(()));
        assert_eq!(gdi.delete_object_app(hdc, APP), Ok(()));
    }

    #[test]
    fn test_out_of_handles() {
        let gdi = testing::gdi_with(GdiConfig {
            max_objects: BASE_OBJECTS,
            ..GdiConfig::default()
        });
        let pdev = gdi.devices().primary().unwrap();

        assert_eq!(gdi.create_compatible_dc(None, APP), Err(W32Status::OutOfHandles));
        assert_eq!(gdi.table().count(), BASE_OBJECTS);
        assert_eq!(pdev.ref_count(), 0);
    }

    #[test]
    fn test_region_failure_rolls_back() {
        // Room for the DC and its visible region but not the GDI clip
        let gdi = testing::gdi_with(GdiConfig {
            max_objects: BASE_OBJECTS + 2,
            ..GdiConfig::default()
        });
        let pdev = gdi.devices().primary().unwrap();
        let white = gdi.stock_object(StockObject::WhiteBrush);

        assert_eq!(gdi.create_compatible_dc(None, APP), Err(W32Status::ResourceUnavailable));
        assert_eq!(gdi.table().count(), BASE_OBJECTS);
        assert_eq!(pdev.ref_count(), 0);
        assert_eq!(gdi.table().share_count(white), Some(0));
    }

    #[test]
    fn test_missing_surface_rolls_back() {
        let gdi = testing::gdi();
        let pdev = gdi.devices().primary().unwrap();
        let framebuffer = pdev.surface();

        assert!(gdi.table().share_lock::<Surface>(framebuffer).is_ok());
        assert!(gdi.delete_object(framebuffer).is_ok());
        let before = gdi.table().count();

        assert_eq!(
            gdi.open_dc(None, None, DcType::Direct, true, APP),
            Err(W32Status::ResourceUnavailable)
        );
        assert_eq!(gdi.table().count(), before);
        assert_eq!(pdev.ref_count(), 0);

        // Memory DCs do not need the framebuffer
        assert!(gdi.create_compatible_dc(None, APP).is_ok());
    }

    #[test]
    fn test_uninitialized_gdi_refuses_requests() {
        let gdi = Gdi::new(GdiConfig::default());
        assert_eq!(gdi.open_dc(None, None, DcType::Info, false, APP), Err(W32Status::InitializationFailed));
        assert_eq!(gdi.delete_dc(GdiHandle::NULL, true), Err(W32Status::InitializationFailed));
    }
}
