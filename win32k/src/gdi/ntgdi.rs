//! NtGdi Entry Points
//!
//! The caller-facing surface of the DC manager. Each entry point runs on
//! behalf of one process, reports failure with a sentinel value (NULL
//! handle, `false`, `0`) and records the reason as that process's last
//! error.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/dcobj.cxx` - NtGdiOpenDCW, NtGdiCreateCompatibleDC
//! - `windows/core/ntgdi/gre/hmgrapi.cxx` - NtGdiDeleteObjectApp

use super::dc::DcType;
use super::pdev::DevMode;
use super::Gdi;
use crate::{ColorRef, GdiHandle, ProcessId, W32Status, HDC, HPALETTE, HRGN};

/// Entry points bound to a calling process
#[derive(Clone, Copy)]
pub struct GdiCaller<'a> {
    gdi: &'a Gdi,
    pid: ProcessId,
}

impl<'a> GdiCaller<'a> {
    pub fn new(gdi: &'a Gdi, pid: ProcessId) -> Self {
        Self { gdi, pid }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Last error recorded for this process
    pub fn last_error(&self) -> W32Status {
        self.gdi.last_error(self.pid)
    }

    fn fail(&self, status: W32Status) {
        self.gdi.set_last_error(self.pid, status);
    }

    fn handle_or_null(&self, result: Result<GdiHandle, W32Status>) -> GdiHandle {
        result.unwrap_or_else(|status| {
            self.fail(status);
            GdiHandle::NULL
        })
    }

    fn succeeded(&self, result: Result<(), W32Status>) -> bool {
        match result {
            Ok(()) => true,
            Err(status) => {
                self.fail(status);
                false
            }
        }
    }

    /// Open a DC (NtGdiOpenDCW)
    ///
    /// On success the driver instance of the device is stored in `dhpdev`
    /// when one is supplied.
    pub fn open_dcw(
        &self,
        device: Option<&str>,
        init_data: Option<&DevMode>,
        dc_type: DcType,
        display: bool,
        dhpdev: Option<&mut usize>,
    ) -> HDC {
        let hdc = self.handle_or_null(self.gdi.open_dc(device, init_data, dc_type, display, self.pid));

        if let Some(out) = dhpdev {
            if !hdc.is_null() {
                *out = self.gdi.with_dc(hdc, |dc| dc.dhpdev()).unwrap_or(0);
            }
        }
        hdc
    }

    /// Create a memory DC (NtGdiCreateCompatibleDC); a NULL source means the display
    pub fn create_compatible_dc(&self, source: HDC) -> HDC {
        let source = if source.is_null() { None } else { Some(source) };
        self.handle_or_null(self.gdi.create_compatible_dc(source, self.pid))
    }

    /// Delete an object (NtGdiDeleteObjectApp)
    pub fn delete_object_app(&self, handle: GdiHandle) -> bool {
        self.succeeded(self.gdi.delete_object_app(handle, self.pid))
    }

    /// Save DC state; returns the saved level or 0
    pub fn save_dc(&self, hdc: HDC) -> i32 {
        self.gdi.save_dc(hdc).unwrap_or_else(|status| {
            self.fail(status);
            0
        })
    }

    pub fn restore_dc(&self, hdc: HDC, level: i32) -> bool {
        self.succeeded(self.gdi.restore_dc(hdc, level))
    }

    /// Select an object; returns the previous one or NULL
    pub fn select_object(&self, hdc: HDC, handle: GdiHandle) -> GdiHandle {
        self.handle_or_null(self.gdi.select_object(hdc, handle))
    }

    pub fn select_palette(&self, hdc: HDC, hpal: HPALETTE) -> HPALETTE {
        self.handle_or_null(self.gdi.select_palette(hdc, hpal))
    }

    pub fn select_clip_rgn(&self, hdc: HDC, hrgn: HRGN) -> bool {
        self.succeeded(self.gdi.select_clip_rgn(hdc, hrgn).map(|_| ()))
    }

    /// Set text color; returns the previous one or `CLR_INVALID`
    pub fn set_text_color(&self, hdc: HDC, color: ColorRef) -> ColorRef {
        self.gdi.set_text_color(hdc, color).unwrap_or_else(|status| {
            self.fail(status);
            ColorRef::INVALID
        })
    }

    pub fn set_bk_color(&self, hdc: HDC, color: ColorRef) -> ColorRef {
        self.gdi.set_bk_color(hdc, color).unwrap_or_else(|status| {
            self.fail(status);
            ColorRef::INVALID
        })
    }

    pub fn begin_path(&self, hdc: HDC) -> bool {
        self.succeeded(self.gdi.begin_path(hdc))
    }

    pub fn end_path(&self, hdc: HDC) -> bool {
        self.gdi.end_path(hdc).unwrap_or_else(|status| {
            self.fail(status);
            false
        })
    }

    pub fn abort_path(&self, hdc: HDC) -> bool {
        self.gdi.abort_path(hdc).unwrap_or_else(|status| {
            self.fail(status);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdi::brush::create_solid_brush;
    use crate::gdi::region::create_rect_rgn;
    use crate::gdi::testing;
    use crate::gdi::{GdiConfig, StockObject};
    use crate::{GdiObjectType, Rect};

    #[test]
    fn test_open_dcw_reports_dhpdev() {
        let gdi = testing::gdi();
        let caller = GdiCaller::new(&gdi, ProcessId(10));
        let mut dhpdev = 0usize;

        let hdc = caller.open_dcw(None, None, DcType::Direct, true, Some(&mut dhpdev));
        assert!(!hdc.is_null());
        assert_eq!(dhpdev, gdi.devices().primary().unwrap().dhpdev());
        assert_ne!(dhpdev, 0);
        assert_eq!(caller.last_error(), W32Status::Success);
    }

    #[test]
    fn test_failures_set_last_error() {
        let gdi = testing::gdi();
        let caller = GdiCaller::new(&gdi, ProcessId(10));
        let other = GdiCaller::new(&gdi, ProcessId(11));

        assert!(caller.open_dcw(Some("PLOTTER"), None, DcType::Direct, false, None).is_null());
        assert_eq!(caller.last_error(), W32Status::NoSuitableDevice);
        assert_eq!(other.last_error(), W32Status::Success);

        let bogus = GdiHandle::new(500, GdiObjectType::DC);
        assert_eq!(caller.save_dc(bogus), 0);
        assert_eq!(caller.last_error(), W32Status::InvalidHandle);

        let hdc = caller.create_compatible_dc(GdiHandle::NULL);
        assert!(!caller.restore_dc(hdc, 1));
        assert_eq!(caller.last_error(), W32Status::InvalidSaveLevel);
    }

    #[test]
    fn test_dc_session() {
        let gdi = testing::gdi();
        let caller = GdiCaller::new(&gdi, ProcessId(10));
        let brush = create_solid_brush(gdi.table(), ColorRef::GRAY, caller.pid()).unwrap();
        let rgn = create_rect_rgn(gdi.table(), Rect::new(0, 0, 1, 1), caller.pid()).unwrap();

        let hdc = caller.create_compatible_dc(GdiHandle::NULL);
        assert!(!hdc.is_null());
        assert_eq!(caller.save_dc(hdc), 1);
        assert_eq!(caller.select_object(hdc, brush), gdi.stock_object(StockObject::WhiteBrush));
        assert!(caller.select_clip_rgn(hdc, rgn));
        assert_eq!(caller.set_text_color(hdc, ColorRef::GRAY), ColorRef::BLACK);
        assert!(caller.begin_path(hdc));
        assert!(caller.end_path(hdc));
        assert!(caller.restore_dc(hdc, -1));
        assert_eq!(
            caller.select_palette(hdc, gdi.stock_object(StockObject::DefaultPalette)),
            gdi.stock_object(StockObject::DefaultPalette)
        );

        assert!(caller.delete_object_app(hdc));
        assert!(!caller.delete_object_app(hdc));
        assert_eq!(caller.last_error(), W32Status::InvalidHandle);
        assert_eq!(caller.set_bk_color(hdc, ColorRef::WHITE), ColorRef::INVALID);
    }

    #[test]
    fn test_uninitialized_gdi() {
        let gdi = Gdi::new(GdiConfig::default());
        let caller = GdiCaller::new(&gdi, ProcessId(3));
        assert!(caller.create_compatible_dc(GdiHandle::NULL).is_null());
        assert_eq!(caller.last_error(), W32Status::InitializationFailed);
    }
}
