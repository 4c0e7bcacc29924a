//! Coordinate Transform Defaults
//!
//! Fixed-point floats and the matrices installed into every new DC.
//!
//! # Transform Chain
//!
//! Logical coords → World transform → Page transform → Device coords
//!
//! Device space is kept in 28.4 fixed point, so the default world-to-device
//! matrix scales by 16 and the device-to-world matrix by 1/16.
//!
//! # References
//!
//! Based on Windows Server 2003:
//! - `windows/core/ntgdi/gre/xformobj.cxx` - Transform object
//! - `windows/core/ntgdi/gre/mapmode.cxx` - Mapping mode

use crate::Point;

// ============================================================================
// Constants
// ============================================================================

/// Graphics mode: Compatible (no world transform)
pub const GM_COMPATIBLE: u32 = 1;

/// Mapping mode: 1 logical unit = 1 device pixel
pub const MM_TEXT: u32 = 1;

// ============================================================================
// FLOATOBJ
// ============================================================================

/// Engine float: `mantissa / 2^31 * 2^(exponent - 1)`
///
/// Matches the bit layout drivers expect, so matrices can be handed to the
/// engine without conversion.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FloatObj {
    pub mantissa: i32,
    pub exponent: i32,
}

impl FloatObj {
    pub const ZERO: FloatObj = FloatObj::new(0, 0);
    pub const ONE: FloatObj = FloatObj::new(0x4000_0000, 2);
    pub const SIXTEEN: FloatObj = FloatObj::new(0x4000_0000, 6);
    pub const ONE_SIXTEENTH: FloatObj = FloatObj::new(0x4000_0000, -2);

    pub const fn new(mantissa: i32, exponent: i32) -> Self {
        Self { mantissa, exponent }
    }

    pub fn to_f32(self) -> f32 {
        if self.mantissa == 0 {
            return 0.0;
        }
        let mut value = self.mantissa as f32 / 2_147_483_648.0;
        let mut exp = self.exponent - 1;
        while exp > 0 {
            value *= 2.0;
            exp -= 1;
        }
        while exp < 0 {
            value *= 0.5;
            exp += 1;
        }
        value
    }
}

// ============================================================================
// Flags
// ============================================================================

bitflags::bitflags! {
    /// Matrix accelerator flags (MX_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MxFlags: u32 {
        /// No rotation or shear
        const SCALE = 0x0001;
        /// Diagonal elements are equal in magnitude
        const UNITY = 0x0002;
        /// M22 is negative
        const Y_NEGATE = 0x0004;
        /// Maps logical to 28.4 fixed
        const FORMAT_LTOFX = 0x0008;
        /// Maps 28.4 fixed to logical
        const FORMAT_FXTOL = 0x0010;
        /// Maps logical to logical
        const FORMAT_LTOL = 0x0020;
        /// Translation is zero
        const NO_TRANSLATION = 0x0040;
    }
}

bitflags::bitflags! {
    /// Transform state of a DC (flXform)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct XformFlags: u32 {
        const WORLD_TO_PAGE_IDENTITY = 0x0001;
        const DEVICE_TO_WORLD_INVALID = 0x0008;
        const WORLD_TRANSFORM_SET = 0x0100;
        const PAGE_TO_DEVICE_IDENTITY = 0x0800;
        const PAGE_TO_DEVICE_SCALE_IDENTITY = 0x1000;
    }
}

// ============================================================================
// MATRIX
// ============================================================================

/// Engine transform matrix
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Matrix {
    pub m11: FloatObj,
    pub m12: FloatObj,
    pub m21: FloatObj,
    pub m22: FloatObj,
    pub dx: FloatObj,
    pub dy: FloatObj,
    /// Translation in 28.4 fixed
    pub fx_dx: i32,
    pub fx_dy: i32,
    pub flags: MxFlags,
}

impl Matrix {
    const fn scale(factor: FloatObj, flags: MxFlags) -> Self {
        Self {
            m11: factor,
            m12: FloatObj::ZERO,
            m21: FloatObj::ZERO,
            m22: factor,
            dx: FloatObj::ZERO,
            dy: FloatObj::ZERO,
            fx_dx: 0,
            fx_dy: 0,
            flags,
        }
    }

    /// Apply the matrix to a point
    pub fn transform_point(&self, pt: Point) -> (f32, f32) {
        let (x, y) = (pt.x as f32, pt.y as f32);
        (
            x * self.m11.to_f32() + y * self.m21.to_f32() + self.dx.to_f32(),
            x * self.m12.to_f32() + y * self.m22.to_f32() + self.dy.to_f32(),
        )
    }
}

/// World to device: logical units to 28.4 fixed (flags 0x4b)
pub const WORLD_TO_DEVICE_DEFAULT: Matrix = Matrix::scale(
    FloatObj::SIXTEEN,
    MxFlags::NO_TRANSLATION
        .union(MxFlags::FORMAT_LTOFX)
        .union(MxFlags::UNITY)
        .union(MxFlags::SCALE),
);

/// Device to world: 28.4 fixed to logical units (flags 0x53)
pub const DEVICE_TO_WORLD_DEFAULT: Matrix = Matrix::scale(
    FloatObj::ONE_SIXTEENTH,
    MxFlags::NO_TRANSLATION
        .union(MxFlags::FORMAT_FXTOL)
        .union(MxFlags::UNITY)
        .union(MxFlags::SCALE),
);

/// World to page: identity (flags 0x63)
pub const WORLD_TO_PAGE_DEFAULT: Matrix = Matrix::scale(
    FloatObj::ONE,
    MxFlags::NO_TRANSLATION
        .union(MxFlags::FORMAT_LTOL)
        .union(MxFlags::UNITY)
        .union(MxFlags::SCALE),
);

/// Page-to-device scale installed at initialization
pub const PAGE_TO_DEVICE_SCALE_DEFAULT: FloatObj = FloatObj::SIXTEEN;

/// Transform state of a freshly initialized DC
pub const XFORM_FLAGS_DEFAULT: XformFlags = XformFlags::PAGE_TO_DEVICE_SCALE_IDENTITY
    .union(XformFlags::PAGE_TO_DEVICE_IDENTITY)
    .union(XformFlags::WORLD_TO_PAGE_IDENTITY);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floatobj_values() {
        assert_eq!(FloatObj::ZERO.to_f32(), 0.0);
        assert_eq!(FloatObj::ONE.to_f32(), 1.0);
        assert_eq!(FloatObj::SIXTEEN.to_f32(), 16.0);
        assert_eq!(FloatObj::ONE_SIXTEENTH.to_f32(), 0.0625);
    }

    #[test]
    fn test_default_matrix_flags() {
        assert_eq!(WORLD_TO_DEVICE_DEFAULT.flags.bits(), 0x4b);
        assert_eq!(DEVICE_TO_WORLD_DEFAULT.flags.bits(), 0x53);
        assert_eq!(WORLD_TO_PAGE_DEFAULT.flags.bits(), 0x63);
        assert_eq!(XFORM_FLAGS_DEFAULT.bits(), 0x1801);
    }

    #[test]
    fn test_default_matrices_are_inverse() {
        let fx = WORLD_TO_DEVICE_DEFAULT.transform_point(Point::new(3, -2));
        assert_eq!(fx, (48.0, -32.0));

        let back = DEVICE_TO_WORLD_DEFAULT.transform_point(Point::new(48, -32));
        assert_eq!(back, (3.0, -2.0));

        let page = WORLD_TO_PAGE_DEFAULT.transform_point(Point::new(7, 9));
        assert_eq!(page, (7.0, 9.0));
    }
}
