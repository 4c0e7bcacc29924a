//! Region Implementation
//!
//! Regions define areas for clipping. A DC owns up to three of them (API
//! clip, visible region, GDI-internal clip) and derives its combined clip
//! from their intersection.
//!
//! # Region Types
//!
//! - **Null**: Empty region
//! - **Simple**: Single rectangle
//! - **Complex**: Set of rectangles
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/rgnobj.cxx`

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::gdiobj::{GdiObject, HandleTable, ObjectAttr};
use crate::{GdiHandle, GdiObjectType, Point, ProcessId, Rect, W32Status};

// ============================================================================
// Types
// ============================================================================

/// Region type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionType {
    #[default]
    Error = 0,
    Null = 1,
    Simple = 2,   // Single rectangle
    Complex = 3,  // Multiple rectangles
}

// ============================================================================
// Region Structure
// ============================================================================

/// Region object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Region type
    pub rgn_type: RegionType,

    /// Bounding rectangle
    pub bounds: Rect,

    /// Non-overlapping rectangles covering the region
    pub rects: Vec<Rect>,
}

impl Default for Region {
    fn default() -> Self {
        Self::empty()
    }
}

impl Region {
    /// Empty region
    pub fn empty() -> Self {
        Self {
            rgn_type: RegionType::Null,
            bounds: Rect::default(),
            rects: Vec::new(),
        }
    }

    /// Rectangular region
    pub fn rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::empty();
        }
        Self {
            rgn_type: RegionType::Simple,
            bounds: rect,
            rects: vec![rect],
        }
    }

    fn from_rects(rects: Vec<Rect>) -> Self {
        match rects.len() {
            0 => Self::empty(),
            1 => Self::rect(rects[0]),
            _ => {
                let bounds = rects.iter().skip(1).fold(rects[0], |acc, r| acc.union(r));
                Self {
                    rgn_type: RegionType::Complex,
                    bounds,
                    rects,
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Check if point is in region
    pub fn contains_point(&self, pt: Point) -> bool {
        self.bounds.contains_point(pt) && self.rects.iter().any(|r| r.contains_point(pt))
    }

    /// Intersection of two regions
    pub fn intersect(&self, other: &Region) -> Region {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                if let Some(r) = a.intersect(b) {
                    rects.push(r);
                }
            }
        }
        Region::from_rects(rects)
    }

    /// Offset the region
    pub fn offset(&mut self, dx: i32, dy: i32) {
        let shift = |r: &mut Rect| {
            r.left += dx;
            r.right += dx;
            r.top += dy;
            r.bottom += dy;
        };
        shift(&mut self.bounds);
        self.rects.iter_mut().for_each(shift);
    }
}

/// Process-local region shadow (RGN_ATTR)
///
/// Lets the owning process answer simple region queries without entering
/// the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgnAttr {
    pub rgn_type: RegionType,
    pub bounds: Rect,
}

impl RgnAttr {
    pub fn from_region(region: &Region) -> Self {
        Self {
            rgn_type: region.rgn_type,
            bounds: region.bounds,
        }
    }
}

// ============================================================================
// Region Operations
// ============================================================================

fn alloc_region(
    table: &HandleTable,
    region: Region,
    owner: ProcessId,
    private: bool,
) -> Result<GdiHandle, W32Status> {
    let attr = RgnAttr::from_region(&region);
    let object = GdiObject::Region(Arc::new(Mutex::new(region)));
    let handle = if private {
        table.alloc_private(GdiObjectType::Region, object, owner)?
    } else {
        table.alloc_object(GdiObjectType::Region, object, owner)?
    };
    table.set_user_attr(handle, ObjectAttr::Region(attr));
    Ok(handle)
}

/// Create a rectangular region
pub fn create_rect_rgn(table: &HandleTable, rect: Rect, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    alloc_region(table, Region::rect(rect), owner, false)
}

/// Create a rectangular region owned by a DC
pub(super) fn create_dc_rect_rgn(table: &HandleTable, rect: Rect, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    alloc_region(table, Region::rect(rect), owner, true)
}

/// Create a private copy of a region
pub fn copy_rgn(table: &HandleTable, source: GdiHandle, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    let body = table.region(source)?.lock().clone();
    alloc_region(table, body, owner, false)
}

/// Copy a region into a DC-owned handle
pub(super) fn copy_dc_rgn(table: &HandleTable, source: GdiHandle, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    let body = table.region(source)?.lock().clone();
    alloc_region(table, body, owner, true)
}

/// Delete a region
pub fn delete_rgn(table: &HandleTable, hrgn: GdiHandle) -> bool {
    table.free_object(hrgn, GdiObjectType::Region)
}

/// Get region bounding box
pub fn get_rgn_box(table: &HandleTable, hrgn: GdiHandle) -> Option<(RegionType, Rect)> {
    let rgn = table.region(hrgn).ok()?;
    let rgn = rgn.lock();
    Some((rgn.rgn_type, rgn.bounds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_region() {
        let rgn = Region::rect(Rect::new(0, 0, 10, 10));
        assert_eq!(rgn.rgn_type, RegionType::Simple);
        assert!(rgn.contains_point(Point::new(5, 5)));
        assert!(!rgn.contains_point(Point::new(10, 10)));
        assert_eq!(Region::rect(Rect::new(4, 4, 4, 8)).rgn_type, RegionType::Null);
    }

    #[test]
    fn test_intersect_and_offset() {
        let a = Region::rect(Rect::new(0, 0, 10, 10));
        let b = Region::rect(Rect::new(5, 5, 20, 20));
        let mut c = a.intersect(&b);
        assert_eq!(c.bounds, Rect::new(5, 5, 10, 10));
        c.offset(1, 2);
        assert_eq!(c.bounds, Rect::new(6, 7, 11, 12));
        assert!(a.intersect(&Region::empty()).is_empty());
    }

    #[test]
    fn test_copy_is_independent() {
        let table = HandleTable::new(8);
        let h = create_rect_rgn(&table, Rect::new(0, 0, 4, 4), ProcessId(1)).unwrap();
        let copy = copy_rgn(&table, h, ProcessId(1)).unwrap();
        assert_ne!(h, copy);

        table.region(copy).unwrap().lock().offset(10, 10);
        assert_eq!(get_rgn_box(&table, h), Some((RegionType::Simple, Rect::new(0, 0, 4, 4))));
        assert_eq!(get_rgn_box(&table, copy), Some((RegionType::Simple, Rect::new(10, 10, 14, 14))));
    }

    #[test]
    fn test_region_carries_shadow() {
        let table = HandleTable::new(4);
        let h = create_rect_rgn(&table, Rect::new(1, 1, 3, 3), ProcessId(1)).unwrap();
        match table.user_attr(h) {
            Some(ObjectAttr::Region(attr)) => assert_eq!(attr.bounds, Rect::new(1, 1, 3, 3)),
            other => panic!("unexpected shadow {:?}", other),
        }
        assert!(delete_rgn(&table, h));
        assert_eq!(table.count(), 0);
    }
}
