// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Display transform and sensor orientation.
//!
//! Preview frames arrive in sensor orientation while the viewport follows the
//! display. [`compute_transform`] produces the matrix the display surface
//! applies to its content so the preview covers the viewport (cropping, never
//! letterboxing) and appears upright. [`sensor_to_display_degrees`] reports
//! the clockwise rotation consumers must apply to raw frames.

use std::fmt;

use crate::device::Facing;
use crate::geometry::{Matrix, RectF, Size};

/// Display rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// Rotation from its quadrant index (0, 1, 2, 3 for 0°, 90°, 180°, 270°)
    pub fn from_quadrant(quadrant: i32) -> Option<Self> {
        match quadrant {
            0 => Some(Rotation::Rotation0),
            1 => Some(Rotation::Rotation90),
            2 => Some(Rotation::Rotation180),
            3 => Some(Rotation::Rotation270),
            _ => None,
        }
    }

    /// Quadrant index, 0 to 3
    pub fn quadrant(&self) -> i32 {
        match self {
            Rotation::Rotation0 => 0,
            Rotation::Rotation90 => 1,
            Rotation::Rotation180 => 2,
            Rotation::Rotation270 => 3,
        }
    }

    pub fn degrees(&self) -> i32 {
        self.quadrant() * 90
    }

    /// Rotation added to the preview transform, if any.
    ///
    /// Quarter turns use `(90 * (quadrant - 2)) % 360` with a truncating
    /// remainder, giving -90° for 90° and 90° for 270°. The values match the
    /// display convention observed on hardware and must not be replaced by
    /// the display rotation itself.
    pub fn preview_degrees(&self) -> Option<i32> {
        match self {
            Rotation::Rotation90 | Rotation::Rotation270 => Some((90 * (self.quadrant() - 2)) % 360),
            Rotation::Rotation180 => Some(180),
            Rotation::Rotation0 => None,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Compute the display transform for a preview of size `chosen` shown in a
/// viewport of size `viewport` on a display rotated by `rotation`.
///
/// The buffer rectangle is the chosen size with its axes swapped, centred on
/// the viewport. The viewport is first fitted onto that rectangle, then a
/// uniform cover scale `max(view_h / chosen_h, view_w / chosen_w)` and the
/// rotation are applied about the viewport centre. The result always replaces
/// the previous transform.
///
/// # Example
///
/// ```
/// use capturekit::geometry::Size;
/// use capturekit::transform::{compute_transform, Rotation};
///
/// let m = compute_transform(Size::new(1080, 1080), Size::new(1080, 1080), Rotation::Rotation0);
/// assert!(m.is_identity());
/// ```
pub fn compute_transform(chosen: Size, viewport: Size, rotation: Rotation) -> Matrix {
    let view_rect = RectF::from_size(viewport.width as f32, viewport.height as f32);
    let mut buffer_rect = RectF::from_size(chosen.height as f32, chosen.width as f32);

    let center_x = view_rect.center_x();
    let center_y = view_rect.center_y();
    let dx = center_x - buffer_rect.center_x();
    let dy = center_y - buffer_rect.center_y();
    buffer_rect.offset(dx, dy);

    let mut matrix = Matrix::identity();
    matrix.set_rect_to_rect_fill(&view_rect, &buffer_rect);

    let scale = cover_scale(chosen, viewport);
    matrix.post_scale(scale, scale, center_x, center_y);

    if let Some(degrees) = rotation.preview_degrees() {
        matrix.post_rotate(degrees as f32, center_x, center_y);
    }

    log::debug!(
        "transform for {} in {} at {}: dx = {}, dy = {}, scale = {}, rotate = {:?}",
        chosen,
        viewport,
        rotation,
        dx,
        dy,
        scale,
        rotation.preview_degrees()
    );
    matrix
}

fn cover_scale(chosen: Size, viewport: Size) -> f32 {
    if chosen.is_empty() {
        return 1.0;
    }
    let vertical = viewport.height as f32 / chosen.height as f32;
    let horizontal = viewport.width as f32 / chosen.width as f32;
    vertical.max(horizontal)
}

/// Clockwise rotation, in degrees, from sensor orientation to display
/// orientation.
///
/// Front facing sensors are mirrored, so their rotation is measured in the
/// opposite direction.
pub fn sensor_to_display_degrees(sensor_orientation: i32, rotation: Rotation, facing: Facing) -> i32 {
    let degrees = rotation.degrees();
    match facing {
        Facing::Front => (360 - (sensor_orientation + degrees) % 360) % 360,
        _ => (sensor_orientation - degrees + 360) % 360,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MSCALE_X, MSCALE_Y, MSKEW_X, MSKEW_Y};

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_quadrants() {
        for q in 0..4 {
            assert_eq!(Rotation::from_quadrant(q).map(|r| r.quadrant()), Some(q));
        }
        assert_eq!(Rotation::from_quadrant(4), None);
        assert_eq!(Rotation::from_quadrant(-1), None);
    }

    #[test]
    fn test_preview_degrees() {
        assert_eq!(Rotation::Rotation0.preview_degrees(), None);
        assert_eq!(Rotation::Rotation90.preview_degrees(), Some(-90));
        assert_eq!(Rotation::Rotation180.preview_degrees(), Some(180));
        assert_eq!(Rotation::Rotation270.preview_degrees(), Some(90));
    }

    #[test]
    fn test_square_identity() {
        let m = compute_transform(Size::new(720, 720), Size::new(720, 720), Rotation::Rotation0);
        assert!(m.is_identity(), "{}", m);
    }

    #[test]
    fn test_swapped_viewport_is_pure_scale() {
        // viewport equal to the swapped capture size: no fit, no rotation,
        // only the uniform cover scale about the centre
        let chosen = Size::new(1920, 1080);
        let m = compute_transform(chosen, chosen.swapped(), Rotation::Rotation0);
        let v = m.values();

        assert_eq!(v[MSKEW_X], 0.0);
        assert_eq!(v[MSKEW_Y], 0.0);
        assert_close(v[MSCALE_X], 1920.0 / 1080.0);
        assert_eq!(v[MSCALE_X], v[MSCALE_Y]);

        let (cx, cy) = m.map_point(540.0, 960.0);
        assert_close(cx, 540.0);
        assert_close(cy, 960.0);
    }

    #[test]
    fn test_cover_never_letterboxes() {
        let chosen = Size::new(1280, 720);
        let viewport = Size::new(1080, 1920);
        let m = compute_transform(chosen, viewport, Rotation::Rotation0);

        // viewport corners map outside or onto the viewport bounds
        let (x0, y0) = m.map_point(0.0, 0.0);
        let (x1, y1) = m.map_point(viewport.width as f32, viewport.height as f32);
        assert!(x0 <= 0.0 && y0 <= 0.0);
        assert!(x1 >= viewport.width as f32 && y1 >= viewport.height as f32);
    }

    #[test]
    fn test_landscape_rotation_quarter_turn() {
        let chosen = Size::new(1920, 1080);
        let viewport = Size::new(1920, 1080);
        let m = compute_transform(chosen, viewport, Rotation::Rotation90);
        let v = m.values();

        // a quarter turn moves scale into the skew terms
        assert_close(v[MSCALE_X], 0.0);
        assert_close(v[MSCALE_Y], 0.0);
        assert!(v[MSKEW_X] > 0.0);
        assert!(v[MSKEW_Y] < 0.0);

        // the centre is fixed
        let (cx, cy) = m.map_point(960.0, 540.0);
        assert_close(cx, 960.0);
        assert_close(cy, 540.0);
    }

    #[test]
    fn test_rotation_180_flips() {
        let chosen = Size::new(720, 720);
        let m = compute_transform(chosen, chosen, Rotation::Rotation180);
        let (x, y) = m.map_point(0.0, 0.0);
        assert_close(x, 720.0);
        assert_close(y, 720.0);
    }

    #[test]
    fn test_empty_viewport_does_not_panic() {
        let m = compute_transform(Size::new(1920, 1080), Size::new(0, 0), Rotation::Rotation90);
        assert_eq!(m.values()[8], 1.0);
    }

    #[test]
    fn test_sensor_orientation_back() {
        assert_eq!(sensor_to_display_degrees(90, Rotation::Rotation0, Facing::Back), 90);
        assert_eq!(sensor_to_display_degrees(90, Rotation::Rotation90, Facing::Back), 0);
        assert_eq!(sensor_to_display_degrees(90, Rotation::Rotation180, Facing::Back), 270);
        assert_eq!(sensor_to_display_degrees(90, Rotation::Rotation270, Facing::Back), 180);
        assert_eq!(sensor_to_display_degrees(0, Rotation::Rotation0, Facing::External), 0);
    }

    #[test]
    fn test_sensor_orientation_front_is_mirrored() {
        assert_eq!(sensor_to_display_degrees(270, Rotation::Rotation0, Facing::Front), 90);
        assert_eq!(sensor_to_display_degrees(270, Rotation::Rotation90, Facing::Front), 0);
        assert_eq!(sensor_to_display_degrees(270, Rotation::Rotation180, Facing::Front), 270);
        assert_eq!(sensor_to_display_degrees(270, Rotation::Rotation270, Facing::Front), 180);
    }
}
