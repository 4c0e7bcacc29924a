//! Path Objects
//!
//! A path records figures between BeginPath and EndPath. The DC owns at most
//! one path handle; its recording state lives in the DC level flags so that
//! save/restore carries it.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/pathobj.cxx`

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::gdiobj::{GdiObject, HandleTable};
use crate::{GdiHandle, GdiObjectType, Point, ProcessId, W32Status};

/// Maximum points in a single path
const MAX_PATH_POINTS: usize = 65536;

bitflags::bitflags! {
    /// Point type flags (PT_* constants from Windows)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointType: u8 {
        /// Close figure flag
        const CLOSEFIGURE = 0x01;
        /// Line to point
        const LINETO = 0x02;
        /// Bezier control point
        const BEZIERTO = 0x04;
        /// Move to point (start new figure)
        const MOVETO = 0x06;
    }
}

bitflags::bitflags! {
    /// Path state kept in the DC level (DCPATH_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PathFlags: u8 {
        /// A path is being recorded
        const ACTIVE = 0x01;
        /// Path must be preserved across a save
        const SAVE = 0x02;
        /// Arcs are drawn clockwise
        const CLOCKWISE = 0x04;
    }
}

/// A single element in a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathElement {
    pub point: Point,
    pub point_type: PointType,
}

/// Path object containing recorded path elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    elements: Vec<PathElement>,
    figure_open: bool,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Start a new figure
    pub fn move_to(&mut self, x: i32, y: i32) -> bool {
        if self.elements.len() >= MAX_PATH_POINTS {
            return false;
        }
        self.elements.push(PathElement {
            point: Point::new(x, y),
            point_type: PointType::MOVETO,
        });
        self.figure_open = true;
        true
    }

    /// Add a line from the current point
    pub fn line_to(&mut self, x: i32, y: i32) -> bool {
        if self.elements.len() >= MAX_PATH_POINTS {
            return false;
        }
        // No figure started yet; start at origin
        if !self.figure_open && self.elements.is_empty() {
            self.move_to(0, 0);
        }
        self.elements.push(PathElement {
            point: Point::new(x, y),
            point_type: PointType::LINETO,
        });
        true
    }

    /// Close the current figure
    pub fn close_figure(&mut self) -> bool {
        if !self.figure_open {
            return false;
        }
        if let Some(last) = self.elements.last_mut() {
            last.point_type |= PointType::CLOSEFIGURE;
        }
        self.figure_open = false;
        true
    }

    /// Discard all figures
    pub fn clear(&mut self) {
        self.elements.clear();
        self.figure_open = false;
    }
}

fn alloc_path(table: &HandleTable, path: Path, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    table.alloc_private(GdiObjectType::Path, GdiObject::Path(Arc::new(Mutex::new(path))), owner)
}

/// Create an empty path owned by a DC
pub fn create_path(table: &HandleTable, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    alloc_path(table, Path::new(), owner)
}

/// Copy a path into a DC-owned handle
pub fn copy_path(table: &HandleTable, source: GdiHandle, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    let body = table.path(source)?.lock().clone();
    alloc_path(table, body, owner)
}

/// Delete a path
pub fn delete_path(table: &HandleTable, hpath: GdiHandle) -> bool {
    table.free_object(hpath, GdiObjectType::Path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_figure_recording() {
        let mut path = Path::new();
        assert!(!path.close_figure());
        assert!(path.line_to(5, 5));
        assert_eq!(path.len(), 2);
        assert_eq!(path.elements()[0].point_type, PointType::MOVETO);

        assert!(path.close_figure());
        assert!(path.elements()[1].point_type.contains(PointType::CLOSEFIGURE));
        path.clear();
        assert!(path.is_empty());
    }

    #[test]
    fn test_copy_path_is_deep() {
        let table = HandleTable::new(4);
        let h = create_path(&table, ProcessId(1)).unwrap();
        table.path(h).unwrap().lock().move_to(1, 1);

        let copy = copy_path(&table, h, ProcessId(1)).unwrap();
        table.path(copy).unwrap().lock().line_to(2, 2);

        assert_eq!(table.path(h).unwrap().lock().len(), 1);
        assert_eq!(table.path(copy).unwrap().lock().len(), 2);
        assert!(delete_path(&table, copy));
        assert!(delete_path(&table, h));
    }
}
