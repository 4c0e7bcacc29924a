//! Font Objects
//!
//! Logical fonts as seen by the DC core. Realization and glyph rendering
//! live in the font engine; a DC only holds a counted reference and reads
//! the character set.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/fontgdi.cxx`

use alloc::string::String;
use alloc::sync::Arc;

use super::gdiobj::{GdiObject, HandleTable, ShareLockable, SharedBody};
use crate::{GdiHandle, GdiObjectType, ProcessId, W32Status};

/// Default font width
pub const DEFAULT_FONT_WIDTH: i32 = 8;

/// Default font height
pub const DEFAULT_FONT_HEIGHT: i32 = 16;

/// Font weight
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontWeight {
    DontCare = 0,
    Light = 300,
    #[default]
    Normal = 400,
    Bold = 700,
}

/// Character set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharSet {
    Ansi = 0,
    #[default]
    Default = 1,
    Symbol = 2,
    ShiftJis = 128,
    OEM = 255,
}

/// Logical font descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFont {
    /// Height (negative = character height, positive = cell height)
    pub height: i32,

    /// Width (0 = default aspect ratio)
    pub width: i32,

    /// Weight
    pub weight: FontWeight,

    /// Italic
    pub italic: bool,

    /// Character set
    pub charset: CharSet,

    /// Face name
    pub face_name: String,
}

impl LogFont {
    pub fn new(face_name: &str, height: i32, charset: CharSet) -> Self {
        Self {
            height,
            width: 0,
            weight: FontWeight::Normal,
            italic: false,
            charset,
            face_name: String::from(face_name),
        }
    }
}

/// Font object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    pub log_font: LogFont,
}

impl Font {
    pub fn charset(&self) -> CharSet {
        self.log_font.charset
    }
}

impl ShareLockable for Font {
    fn accepts(obj_type: GdiObjectType) -> bool {
        obj_type == GdiObjectType::Font
    }

    fn shared_body(obj: &GdiObject) -> Option<&Arc<SharedBody<Self>>> {
        match obj {
            GdiObject::Font(f) => Some(f),
            _ => None,
        }
    }
}

fn wrap(log_font: LogFont) -> GdiObject {
    GdiObject::Font(Arc::new(SharedBody::new(Font { log_font })))
}

/// Create a font from a logical descriptor
pub fn create_font_indirect(table: &HandleTable, log_font: LogFont, owner: ProcessId) -> Result<GdiHandle, W32Status> {
    table.alloc_object(GdiObjectType::Font, wrap(log_font), owner)
}

/// Create a stock font
pub(super) fn create_stock_font(table: &HandleTable, log_font: LogFont) -> Result<GdiHandle, W32Status> {
    table.alloc_stock(GdiObjectType::Font, wrap(log_font))
}
