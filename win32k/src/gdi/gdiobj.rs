//! GDI Handle Manager
//!
//! The handle table maps GDI handles to reference-counted object bodies and
//! tracks per-process ownership. It provides:
//! - typed handle allocation with slot reuse counters
//! - scoped exclusive locking of device contexts
//! - share locks (counted references) on surfaces, brushes, pens,
//!   palettes and fonts
//! - process-local attribute shadows attached to handles
//!
//! # Lock Ordering
//!
//! The table lock is only held while a slot is inspected or updated. Object
//! bodies are cloned out (`Arc`) before any object lock is taken, so the
//! table lock is never held while waiting on a DC, region or path lock.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/hmgrapi.cxx` - Handle manager
//! - `windows/core/ntgdi/gre/hmgr.h`

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::Deref;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, RwLock};

use super::brush::Brush;
use super::dc::Dc;
use super::font::Font;
use super::palette::Palette;
use super::path::Path;
use super::region::{Region, RgnAttr};
use super::surface::Surface;
use crate::{GdiHandle, GdiObjectType, ProcessId, W32Status};

// ============================================================================
// Constants
// ============================================================================

/// Largest slot index a handle can encode
const MAX_HANDLE_INDEX: usize = 0xFFFF;

// ============================================================================
// Object Flags
// ============================================================================

bitflags::bitflags! {
    /// Per-handle state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        /// Stock object, never deleted
        const STOCK = 0x02;
        /// Object is being created and not yet visible to lookups
        const CREATE_IN_PROGRESS = 0x08;
        /// Object is being deleted
        const DELETE_IN_PROGRESS = 0x10;
        /// Owned exclusively by a DC; only the DC may delete it
        const DC_PRIVATE = 0x20;
    }
}

// ============================================================================
// Object Bodies
// ============================================================================

/// Body of a shareable object together with its share count
#[derive(Debug)]
pub struct SharedBody<T> {
    share_count: AtomicU32,
    body: T,
}

impl<T> SharedBody<T> {
    pub fn new(body: T) -> Self {
        Self {
            share_count: AtomicU32::new(0),
            body,
        }
    }

    /// Outstanding share locks
    pub fn share_count(&self) -> u32 {
        self.share_count.load(Ordering::Acquire)
    }
}

/// An object stored in the handle table
#[derive(Clone)]
pub enum GdiObject {
    Dc(Arc<Mutex<Dc>>),
    Surface(Arc<SharedBody<Surface>>),
    /// Brushes and pens (pens are line brushes)
    Brush(Arc<SharedBody<Brush>>),
    Palette(Arc<SharedBody<Palette>>),
    Font(Arc<SharedBody<Font>>),
    Region(Arc<Mutex<Region>>),
    Path(Arc<Mutex<Path>>),
}

impl GdiObject {
    /// Handle types this body may be stored under
    fn accepts(&self, obj_type: GdiObjectType) -> bool {
        matches!(
            (self, obj_type),
            (GdiObject::Dc(_), GdiObjectType::DC)
                | (GdiObject::Surface(_), GdiObjectType::Bitmap)
                | (GdiObject::Brush(_), GdiObjectType::Brush)
                | (GdiObject::Brush(_), GdiObjectType::Pen)
                | (GdiObject::Palette(_), GdiObjectType::Palette)
                | (GdiObject::Font(_), GdiObjectType::Font)
                | (GdiObject::Region(_), GdiObjectType::Region)
                | (GdiObject::Path(_), GdiObjectType::Path)
        )
    }
}

/// Process-local shadow data attached to a handle
///
/// Mirrors the user-mode attribute blocks NT maps into the owning process.
/// It is meaningless to any other process and is discarded on owner change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectAttr {
    Region(RgnAttr),
}

// ============================================================================
// Share Locks
// ============================================================================

/// Object kinds that can be share-locked
pub trait ShareLockable: Sized + Send + Sync + 'static {
    /// Handle types resolving to this body
    fn accepts(obj_type: GdiObjectType) -> bool;

    /// Borrow the shared body out of a table object
    fn shared_body(obj: &GdiObject) -> Option<&Arc<SharedBody<Self>>>;
}

/// A counted reference to a shareable object
///
/// Cloning takes another share lock, dropping releases it. The body outlives
/// its handle when the handle is deleted while references remain.
pub struct SharedRef<T: ShareLockable> {
    handle: GdiHandle,
    body: Arc<SharedBody<T>>,
}

impl<T: ShareLockable> SharedRef<T> {
    fn new(handle: GdiHandle, body: Arc<SharedBody<T>>) -> Self {
        body.share_count.fetch_add(1, Ordering::AcqRel);
        Self { handle, body }
    }

    /// Handle the reference was acquired through
    pub fn handle(&self) -> GdiHandle {
        self.handle
    }

    /// Current share count of the referenced object
    pub fn share_count(&self) -> u32 {
        self.body.share_count()
    }

    /// Both references point at the same object body
    pub fn ptr_eq(&self, other: &SharedRef<T>) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl<T: ShareLockable> Clone for SharedRef<T> {
    fn clone(&self) -> Self {
        SharedRef::new(self.handle, self.body.clone())
    }
}

impl<T: ShareLockable> Drop for SharedRef<T> {
    fn drop(&mut self) {
        self.body.share_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: ShareLockable> Deref for SharedRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.body.body
    }
}

impl<T: ShareLockable + core::fmt::Debug> core::fmt::Debug for SharedRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedRef")
            .field("handle", &self.handle)
            .field("share_count", &self.share_count())
            .finish()
    }
}

// ============================================================================
// Handle Table
// ============================================================================

/// Handle table entry
struct Entry {
    handle: GdiHandle,
    object: GdiObject,
    owner: ProcessId,
    flags: ObjectFlags,
    user_attr: Option<Box<ObjectAttr>>,
}

/// Table slot; `unique` survives entry reuse
#[derive(Default)]
struct Slot {
    unique: u8,
    entry: Option<Entry>,
}

/// GDI handle table
pub struct HandleTable {
    slots: RwLock<Vec<Slot>>,
    max_objects: usize,
}

impl HandleTable {
    /// Create a table holding at most `max_objects` live objects
    pub fn new(max_objects: usize) -> Self {
        let max_objects = max_objects.min(MAX_HANDLE_INDEX);
        let mut slots = Vec::new();
        // Index 0 is never handed out so that no valid handle equals NULL
        slots.push(Slot::default());

        Self {
            slots: RwLock::new(slots),
            max_objects,
        }
    }

    /// Capacity in objects
    pub fn capacity(&self) -> usize {
        self.max_objects
    }

    fn insert(
        &self,
        obj_type: GdiObjectType,
        object: GdiObject,
        owner: ProcessId,
        flags: ObjectFlags,
    ) -> Result<GdiHandle, W32Status> {
        if !object.accepts(obj_type) {
            return Err(W32Status::InvalidHandle);
        }

        let mut slots = self.slots.write();

        let index = match slots.iter().skip(1).position(|s| s.entry.is_none()) {
            Some(free) => free + 1,
            None if slots.len() <= self.max_objects => {
                slots.push(Slot::default());
                slots.len() - 1
            }
            None => {
                log::warn!("[GDI/HMGR] Handle table full ({} objects)", self.max_objects);
                return Err(W32Status::OutOfHandles);
            }
        };

        let slot = &mut slots[index];
        let mut handle = GdiHandle::with_unique(index as u16, obj_type, slot.unique);
        if flags.contains(ObjectFlags::STOCK) {
            handle = handle.as_stock();
        }

        slot.entry = Some(Entry {
            handle,
            object,
            owner,
            flags,
            user_attr: None,
        });

        log::trace!("[GDI/HMGR] Allocated {:?} handle {}", obj_type, handle);

        Ok(handle)
    }

    /// Allocate a visible handle for an object
    pub fn alloc_object(
        &self,
        obj_type: GdiObjectType,
        object: GdiObject,
        owner: ProcessId,
    ) -> Result<GdiHandle, W32Status> {
        self.insert(obj_type, object, owner, ObjectFlags::empty())
    }

    /// Allocate a handle that only its DC may delete
    pub fn alloc_private(
        &self,
        obj_type: GdiObjectType,
        object: GdiObject,
        owner: ProcessId,
    ) -> Result<GdiHandle, W32Status> {
        self.insert(obj_type, object, owner, ObjectFlags::DC_PRIVATE)
    }

    /// Allocate a handle that stays invisible until [`publish`](Self::publish)
    pub fn alloc_pending(
        &self,
        obj_type: GdiObjectType,
        object: GdiObject,
        owner: ProcessId,
    ) -> Result<GdiHandle, W32Status> {
        self.insert(obj_type, object, owner, ObjectFlags::CREATE_IN_PROGRESS)
    }

    /// Allocate a public stock object handle
    pub fn alloc_stock(&self, obj_type: GdiObjectType, object: GdiObject) -> Result<GdiHandle, W32Status> {
        self.insert(obj_type, object, ProcessId::PUBLIC, ObjectFlags::STOCK)
    }

    /// Make a pending handle visible to lookups
    pub fn publish(&self, handle: GdiHandle) -> bool {
        let mut slots = self.slots.write();
        match Self::entry_mut(&mut slots, handle) {
            Some(entry) => {
                entry.flags.remove(ObjectFlags::CREATE_IN_PROGRESS);
                true
            }
            None => false,
        }
    }

    fn entry(slots: &[Slot], handle: GdiHandle) -> Option<&Entry> {
        let slot = slots.get(handle.index() as usize)?;
        slot.entry.as_ref().filter(|e| e.handle == handle)
    }

    fn entry_mut(slots: &mut [Slot], handle: GdiHandle) -> Option<&mut Entry> {
        let slot = slots.get_mut(handle.index() as usize)?;
        slot.entry.as_mut().filter(|e| e.handle == handle)
    }

    /// Validate a handle for use by a caller
    fn usable(slots: &[Slot], handle: GdiHandle) -> Result<&Entry, W32Status> {
        if !handle.is_valid() {
            return Err(W32Status::InvalidHandle);
        }
        let entry = Self::entry(slots, handle).ok_or(W32Status::InvalidHandle)?;
        if entry.flags.contains(ObjectFlags::CREATE_IN_PROGRESS) {
            return Err(W32Status::InvalidHandle);
        }
        if entry.flags.contains(ObjectFlags::DELETE_IN_PROGRESS) {
            return Err(W32Status::ObjectDead);
        }
        Ok(entry)
    }

    /// Look up an object body by handle
    pub fn get(&self, handle: GdiHandle) -> Result<GdiObject, W32Status> {
        let slots = self.slots.read();
        Self::usable(&slots, handle).map(|e| e.object.clone())
    }

    /// Look up a device context
    pub fn dc(&self, hdc: GdiHandle) -> Result<Arc<Mutex<Dc>>, W32Status> {
        match self.get(hdc)? {
            GdiObject::Dc(dc) => Ok(dc),
            _ => Err(W32Status::InvalidHandle),
        }
    }

    /// Look up a region
    pub fn region(&self, hrgn: GdiHandle) -> Result<Arc<Mutex<Region>>, W32Status> {
        match self.get(hrgn)? {
            GdiObject::Region(rgn) => Ok(rgn),
            _ => Err(W32Status::InvalidHandle),
        }
    }

    /// Look up a path
    pub fn path(&self, hpath: GdiHandle) -> Result<Arc<Mutex<Path>>, W32Status> {
        match self.get(hpath)? {
            GdiObject::Path(path) => Ok(path),
            _ => Err(W32Status::InvalidHandle),
        }
    }

    /// Take a share lock on a shareable object
    pub fn share_lock<T: ShareLockable>(&self, handle: GdiHandle) -> Result<SharedRef<T>, W32Status> {
        if !T::accepts(handle.object_type()) {
            return Err(W32Status::InvalidHandle);
        }
        let object = self.get(handle)?;
        let body = T::shared_body(&object).ok_or(W32Status::InvalidHandle)?;
        Ok(SharedRef::new(handle, body.clone()))
    }

    /// Share count of a shareable object, `None` for unknown handles
    pub fn share_count(&self, handle: GdiHandle) -> Option<u32> {
        let slots = self.slots.read();
        let entry = Self::entry(&slots, handle)?;
        match &entry.object {
            GdiObject::Surface(b) => Some(b.share_count()),
            GdiObject::Brush(b) => Some(b.share_count()),
            GdiObject::Palette(b) => Some(b.share_count()),
            GdiObject::Font(b) => Some(b.share_count()),
            _ => None,
        }
    }

    /// Mark an object as being deleted and hand back its body
    ///
    /// Pending (not yet published) handles may be freed by their creator.
    /// Stock objects are refused.
    pub fn begin_free(&self, handle: GdiHandle, expected: GdiObjectType) -> Result<GdiObject, W32Status> {
        if handle.object_type() != expected {
            return Err(W32Status::InvalidHandle);
        }

        let mut slots = self.slots.write();
        let entry = Self::entry_mut(&mut slots, handle).ok_or(W32Status::InvalidHandle)?;

        if entry.flags.contains(ObjectFlags::STOCK) {
            return Err(W32Status::InvalidHandle);
        }
        if entry.flags.contains(ObjectFlags::DELETE_IN_PROGRESS) {
            return Err(W32Status::ObjectDead);
        }

        entry.flags.insert(ObjectFlags::DELETE_IN_PROGRESS);
        Ok(entry.object.clone())
    }

    /// Reclaim the slot of an object marked by [`begin_free`](Self::begin_free)
    pub fn finish_free(&self, handle: GdiHandle) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(handle.index() as usize) else {
            return false;
        };

        let marked = matches!(
            &slot.entry,
            Some(e) if e.handle == handle && e.flags.contains(ObjectFlags::DELETE_IN_PROGRESS)
        );
        if !marked {
            return false;
        }

        slot.entry = None;
        slot.unique = slot.unique.wrapping_add(1) & 0x7F;
        log::trace!("[GDI/HMGR] Reclaimed handle {}", handle);
        true
    }

    /// Delete an object that needs no teardown beyond dropping its body
    pub fn free_object(&self, handle: GdiHandle, expected: GdiObjectType) -> bool {
        match self.begin_free(handle, expected) {
            Ok(_) => self.finish_free(handle),
            Err(_) => false,
        }
    }

    /// Change the owning process, returning the previous owner
    pub fn set_owner(&self, handle: GdiHandle, owner: ProcessId) -> Result<ProcessId, W32Status> {
        let mut slots = self.slots.write();
        let entry = Self::entry_mut(&mut slots, handle).ok_or(W32Status::InvalidHandle)?;

        if entry.flags.contains(ObjectFlags::STOCK) {
            return Err(W32Status::InvalidHandle);
        }
        if entry.flags.contains(ObjectFlags::DELETE_IN_PROGRESS) {
            return Err(W32Status::ObjectDead);
        }

        let previous = entry.owner;
        entry.owner = owner;
        Ok(previous)
    }

    /// Change the owning process
    pub fn set_ownership(&self, handle: GdiHandle, owner: ProcessId) -> bool {
        self.set_owner(handle, owner).is_ok()
    }

    /// Owning process of a live handle
    pub fn owner(&self, handle: GdiHandle) -> Option<ProcessId> {
        let slots = self.slots.read();
        Self::entry(&slots, handle).map(|e| e.owner)
    }

    /// Check whether the handle belongs to `pid`
    pub fn owned_by(&self, handle: GdiHandle, pid: ProcessId) -> bool {
        self.owner(handle) == Some(pid)
    }

    /// Object is currently being destroyed
    pub fn is_object_dead(&self, handle: GdiHandle) -> bool {
        let slots = self.slots.read();
        Self::entry(&slots, handle)
            .map(|e| e.flags.contains(ObjectFlags::DELETE_IN_PROGRESS))
            .unwrap_or(false)
    }

    /// Handle refers to a stock object
    pub fn is_stock(&self, handle: GdiHandle) -> bool {
        let slots = self.slots.read();
        Self::entry(&slots, handle)
            .map(|e| e.flags.contains(ObjectFlags::STOCK))
            .unwrap_or(false)
    }

    /// Handle belongs to a DC rather than to the application
    pub fn is_dc_private(&self, handle: GdiHandle) -> bool {
        let slots = self.slots.read();
        Self::entry(&slots, handle)
            .map(|e| e.flags.contains(ObjectFlags::DC_PRIVATE))
            .unwrap_or(false)
    }

    /// Attach process-local shadow data to a handle
    pub fn set_user_attr(&self, handle: GdiHandle, attr: ObjectAttr) -> bool {
        let mut slots = self.slots.write();
        match Self::entry_mut(&mut slots, handle) {
            Some(entry) => {
                entry.user_attr = Some(Box::new(attr));
                true
            }
            None => false,
        }
    }

    /// Copy of the shadow data attached to a handle
    pub fn user_attr(&self, handle: GdiHandle) -> Option<ObjectAttr> {
        let slots = self.slots.read();
        Self::entry(&slots, handle)?.user_attr.as_deref().cloned()
    }

    /// Detach and return the shadow data of a handle
    pub fn take_user_attr(&self, handle: GdiHandle) -> Option<Box<ObjectAttr>> {
        let mut slots = self.slots.write();
        Self::entry_mut(&mut slots, handle)?.user_attr.take()
    }

    /// Number of live objects
    pub fn count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.entry.is_some()).count()
    }

    /// Number of live objects of one type
    pub fn count_type(&self, obj_type: GdiObjectType) -> usize {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.handle.object_type() == obj_type)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdi::region::Region;
    use crate::Rect;

    fn region_object() -> GdiObject {
        GdiObject::Region(Arc::new(Mutex::new(Region::rect(Rect::new(0, 0, 4, 4)))))
    }

    fn brush_object() -> GdiObject {
        GdiObject::Brush(Arc::new(SharedBody::new(Brush::solid(crate::ColorRef::WHITE))))
    }

    #[test]
    fn test_alloc_and_free_reuses_slot() {
        let table = HandleTable::new(8);
        let h1 = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert_eq!(table.count(), 1);

        assert!(table.begin_free(h1, GdiObjectType::Region).is_ok());
        assert!(table.is_object_dead(h1));
        assert!(table.finish_free(h1));
        assert_eq!(table.count(), 0);

        let h2 = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert_eq!(h1.index(), h2.index());
        assert_ne!(h1, h2, "reuse counter must change");
        assert_eq!(table.get(h1).err(), Some(W32Status::InvalidHandle));
    }

    #[test]
    fn test_table_exhaustion() {
        let table = HandleTable::new(2);
        table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        let result = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1));
        assert_eq!(result.err(), Some(W32Status::OutOfHandles));
    }

    #[test]
    fn test_pending_handles_are_hidden() {
        let table = HandleTable::new(4);
        let h = table.alloc_pending(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert_eq!(table.get(h).err(), Some(W32Status::InvalidHandle));
        assert!(table.publish(h));
        assert!(table.get(h).is_ok());
    }

    #[test]
    fn test_mismatched_body_is_refused() {
        let table = HandleTable::new(4);
        let result = table.alloc_object(GdiObjectType::Brush, region_object(), ProcessId(1));
        assert_eq!(result.err(), Some(W32Status::InvalidHandle));
    }

    #[test]
    fn test_share_lock_counts() {
        let table = HandleTable::new(4);
        let h = table.alloc_object(GdiObjectType::Brush, brush_object(), ProcessId(1)).unwrap();

        let r1 = table.share_lock::<Brush>(h).unwrap();
        assert_eq!(table.share_count(h), Some(1));
        let r2 = r1.clone();
        assert_eq!(table.share_count(h), Some(2));
        assert!(r1.ptr_eq(&r2));
        drop(r1);
        drop(r2);
        assert_eq!(table.share_count(h), Some(0));
    }

    #[test]
    fn test_deleted_object_outlives_handle_while_shared() {
        let table = HandleTable::new(4);
        let h = table.alloc_object(GdiObjectType::Brush, brush_object(), ProcessId(1)).unwrap();
        let r = table.share_lock::<Brush>(h).unwrap();

        table.begin_free(h, GdiObjectType::Brush).unwrap();
        table.finish_free(h);

        assert!(table.share_lock::<Brush>(h).is_err());
        assert_eq!(r.color, crate::ColorRef::WHITE);
        assert_eq!(r.share_count(), 1);
    }

    #[test]
    fn test_share_lock_wrong_type() {
        let table = HandleTable::new(4);
        let h = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert_eq!(table.share_lock::<Brush>(h).err(), Some(W32Status::InvalidHandle));
    }

    #[test]
    fn test_stock_objects_are_protected() {
        let table = HandleTable::new(4);
        let h = table.alloc_stock(GdiObjectType::Brush, brush_object()).unwrap();
        assert!(h.is_stock());
        assert!(table.is_stock(h));
        assert_eq!(table.owner(h), Some(ProcessId::PUBLIC));
        assert!(table.begin_free(h, GdiObjectType::Brush).is_err());
        assert!(!table.set_ownership(h, ProcessId(7)));
    }

    #[test]
    fn test_ownership_and_dead_objects() {
        let table = HandleTable::new(4);
        let h = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert!(table.owned_by(h, ProcessId(1)));
        assert_eq!(table.set_owner(h, ProcessId(2)), Ok(ProcessId(1)));
        assert!(table.owned_by(h, ProcessId(2)));

        table.begin_free(h, GdiObjectType::Region).unwrap();
        assert_eq!(table.get(h).err(), Some(W32Status::ObjectDead));
        assert_eq!(table.set_owner(h, ProcessId(3)), Err(W32Status::ObjectDead));
        assert_eq!(table.begin_free(h, GdiObjectType::Region).err(), Some(W32Status::ObjectDead));
    }

    #[test]
    fn test_private_flag() {
        let table = HandleTable::new(4);
        let public = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        let private = table.alloc_private(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        assert!(!table.is_dc_private(public));
        assert!(table.is_dc_private(private));
        assert!(table.owned_by(private, ProcessId(1)));

        // Ownership follows the DC; the flag survives the move
        assert_eq!(table.set_owner(private, ProcessId(2)), Ok(ProcessId(1)));
        assert!(table.is_dc_private(private));
        assert!(table.free_object(private, GdiObjectType::Region));
        assert!(!table.is_dc_private(private));
    }

    #[test]
    fn test_user_attr_round_trip() {
        let table = HandleTable::new(4);
        let h = table.alloc_object(GdiObjectType::Region, region_object(), ProcessId(1)).unwrap();
        let attr = ObjectAttr::Region(RgnAttr::from_region(&Region::rect(Rect::new(0, 0, 4, 4))));

        assert!(table.set_user_attr(h, attr.clone()));
        assert_eq!(table.user_attr(h), Some(attr));
        assert!(table.take_user_attr(h).is_some());
        assert_eq!(table.user_attr(h), None);
    }
}
