// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Geometry primitives used by size negotiation and the display transform.
//!
//! - [`Size`] - width × height in pixels
//! - [`RectF`] - floating point rectangle in viewport space
//! - [`Matrix`] - 3×3 affine matrix with post-multiplied scale and rotate

use std::fmt;

/// Frame or viewport size in pixels
///
/// # Example
///
/// ```
/// use capturekit::geometry::Size;
///
/// let size = Size::new(1920, 1080);
/// assert_eq!(size.to_string(), "1920x1080");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    /// Create a new size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The same size with width and height exchanged
    pub fn swapped(&self) -> Size {
        Size::new(self.height, self.width)
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Size::new(width, height)
    }
}

impl From<Size> for (u32, u32) {
    fn from(s: Size) -> Self {
        (s.width, s.height)
    }
}

/// Rectangle in floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        RectF {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin with the given size
    pub fn from_size(width: f32, height: f32) -> Self {
        RectF::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Move the rectangle by (dx, dy)
    pub fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

impl fmt::Display for RectF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RectF({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// 3×3 affine transform matrix.
///
/// Values are stored row-major as
/// `[scale_x, skew_x, trans_x, skew_y, scale_y, trans_y, persp_0, persp_1, persp_2]`
/// and a point `(x, y)` maps to
/// `(scale_x * x + skew_x * y + trans_x, skew_y * x + scale_y * y + trans_y)`.
///
/// `post_*` operations apply the new transform after the existing one, so
/// `m.post_scale(..)` yields `S * m`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    values: [f32; 9],
}

pub const MSCALE_X: usize = 0;
pub const MSKEW_X: usize = 1;
pub const MTRANS_X: usize = 2;
pub const MSKEW_Y: usize = 3;
pub const MSCALE_Y: usize = 4;
pub const MTRANS_Y: usize = 5;

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        values: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    pub fn identity() -> Self {
        Matrix::IDENTITY
    }

    pub fn from_values(values: [f32; 9]) -> Self {
        Matrix { values }
    }

    pub fn values(&self) -> [f32; 9] {
        self.values
    }

    pub fn is_identity(&self) -> bool {
        *self == Matrix::IDENTITY
    }

    /// Replace this matrix with one mapping `src` onto `dst`, scaling each
    /// axis independently so that `src` fills `dst` exactly.
    ///
    /// Returns false and resets to identity when `src` is empty. When `dst`
    /// is empty the matrix collapses everything to the origin.
    pub fn set_rect_to_rect_fill(&mut self, src: &RectF, dst: &RectF) -> bool {
        if src.is_empty() {
            *self = Matrix::IDENTITY;
            return false;
        }

        if dst.is_empty() {
            self.values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
            return true;
        }

        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        self.values = [
            sx,
            0.0,
            dst.left - src.left * sx,
            0.0,
            sy,
            dst.top - src.top * sy,
            0.0,
            0.0,
            1.0,
        ];
        true
    }

    /// Post-concatenate a scale about the pivot `(px, py)`
    pub fn post_scale(&mut self, sx: f32, sy: f32, px: f32, py: f32) {
        let scale = Matrix::from_values([
            sx,
            0.0,
            px - sx * px,
            0.0,
            sy,
            py - sy * py,
            0.0,
            0.0,
            1.0,
        ]);
        self.post_concat(&scale);
    }

    /// Post-concatenate a rotation of `degrees` about the pivot `(px, py)`
    pub fn post_rotate(&mut self, degrees: f32, px: f32, py: f32) {
        let (sin, cos) = sin_cos_degrees(degrees);
        let rotate = Matrix::from_values([
            cos,
            -sin,
            px - cos * px + sin * py,
            sin,
            cos,
            py - sin * px - cos * py,
            0.0,
            0.0,
            1.0,
        ]);
        self.post_concat(&rotate);
    }

    /// `self = other * self`
    pub fn post_concat(&mut self, other: &Matrix) {
        self.values = multiply(&other.values, &self.values);
    }

    /// Map a point through the matrix
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.values;
        let mx = m[MSCALE_X] * x + m[MSKEW_X] * y + m[MTRANS_X];
        let my = m[MSKEW_Y] * x + m[MSCALE_Y] * y + m[MTRANS_Y];
        let w = m[6] * x + m[7] * y + m[8];
        if w != 0.0 && w != 1.0 {
            (mx / w, my / w)
        } else {
            (mx, my)
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::IDENTITY
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.values;
        write!(
            f,
            "[{}, {}, {}][{}, {}, {}][{}, {}, {}]",
            v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]
        )
    }
}

fn multiply(a: &[f32; 9], b: &[f32; 9]) -> [f32; 9] {
    let mut out = [0.0f32; 9];
    for row in 0..3 {
        for col in 0..3 {
            out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
        }
    }
    out
}

// Quarter turns are snapped so that rotated matrices carry exact zeros.
fn sin_cos_degrees(degrees: f32) -> (f32, f32) {
    let turns = degrees.rem_euclid(360.0);
    if turns == 0.0 {
        (0.0, 1.0)
    } else if turns == 90.0 {
        (1.0, 0.0)
    } else if turns == 180.0 {
        (0.0, -1.0)
    } else if turns == 270.0 {
        (-1.0, 0.0)
    } else {
        turns.to_radians().sin_cos()
    }
}
