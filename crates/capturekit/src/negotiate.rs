// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Preview resolution negotiation.
//!
//! [`choose`] picks one size out of the list a device reports:
//!
//! 1. candidates are sorted by descending width, then descending height
//! 2. candidates larger than `max` or smaller than `min` on either axis are
//!    removed (bounds are inclusive)
//! 3. an empty result falls back to the first size the device reported,
//!    before sorting
//! 4. an exact size request present among the survivors wins outright
//! 5. otherwise the survivor whose `height / width` is closest to the target
//!    ratio wins, earliest in sort order on ties
//!
//! # Example
//!
//! ```
//! use capturekit::geometry::Size;
//! use capturekit::negotiate::{choose, DeviceConstraints};
//!
//! let supported = [
//!     Size::new(3840, 2160),
//!     Size::new(1920, 1080),
//!     Size::new(1280, 720),
//!     Size::new(320, 240),
//! ];
//! let constraints = DeviceConstraints {
//!     viewport: Some(Size::new(1080, 1920)),
//!     max: Some(Size::new(1920, 1080)),
//!     min: Some(Size::new(640, 480)),
//!     ..Default::default()
//! };
//! let negotiation = choose(&supported, &constraints, Size::new(1920, 1080));
//! assert_eq!(negotiation.size, Size::new(1920, 1080));
//! assert!(!negotiation.fallback);
//! ```

use std::cmp::Ordering;

use crate::geometry::Size;

/// Size assumed when a device reports no sizes at all
pub const DEFAULT_PREVIEW_SIZE: Size = Size::new(1920, 1080);

/// Constraints applied to the device size list.
///
/// Immutable once handed to the preview builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceConstraints {
    /// Viewport the preview is shown in; its aspect ratio drives scoring
    pub viewport: Option<Size>,
    /// Size to use when the device supports it
    pub exact: Option<Size>,
    /// Largest acceptable size (inclusive, per axis)
    pub max: Option<Size>,
    /// Smallest acceptable size (inclusive, per axis)
    pub min: Option<Size>,
}

impl DeviceConstraints {
    /// Aspect ratio of the viewport normalised into (0, 1], if a usable
    /// viewport was given.
    pub fn viewport_aspect(&self) -> Option<f32> {
        self.viewport
            .filter(|v| !v.is_empty())
            .map(|v| normalize_ratio(v.width as f32 / v.height as f32))
    }

    fn rejects(&self, size: &Size) -> bool {
        if let Some(max) = self.max {
            if size.width > max.width || size.height > max.height {
                return true;
            }
        }
        if let Some(min) = self.min {
            if size.width < min.width || size.height < min.height {
                return true;
            }
        }
        false
    }
}

/// Result of [`choose`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Negotiation {
    /// The selected size
    pub size: Size,
    /// True when no candidate survived the constraints and `size` is the
    /// device default
    pub fallback: bool,
    /// Ratio the survivors were scored against; `None` for an exact match
    /// or a fallback
    pub target_ratio: Option<f32>,
}

/// Sort order used for candidates: descending width, then descending height.
pub fn sorted_candidates(supported: &[Size]) -> Vec<Size> {
    let mut sizes = supported.to_vec();
    sizes.sort_by(|a, b| match b.width.cmp(&a.width) {
        Ordering::Equal => b.height.cmp(&a.height),
        other => other,
    });
    sizes
}

/// Sorted candidates that satisfy the min/max bounds.
pub fn filter_candidates(supported: &[Size], constraints: &DeviceConstraints) -> Vec<Size> {
    let mut sizes = sorted_candidates(supported);
    log::debug!("candidate sizes: {}", join_sizes(&sizes));

    sizes.retain(|size| {
        let rejected = constraints.rejects(size);
        if rejected {
            log::debug!("remove {}", size);
        }
        !rejected
    });
    sizes
}

/// Choose the preview size for a device.
///
/// `default_hint` is only used when the device reported no sizes at all.
/// Never fails; check [`Negotiation::fallback`] to learn whether the
/// constraints could be honoured.
pub fn choose(
    supported: &[Size],
    constraints: &DeviceConstraints,
    default_hint: Size,
) -> Negotiation {
    let default_size = supported.first().copied().unwrap_or(default_hint);
    let sizes = filter_candidates(supported, constraints);

    if sizes.is_empty() {
        log::warn!(
            "can not find a suitable preview size, using default {}",
            default_size
        );
        return Negotiation {
            size: default_size,
            fallback: true,
            target_ratio: None,
        };
    }

    if let Some(exact) = constraints.exact {
        if sizes.contains(&exact) {
            log::debug!("exact preview size {} is supported", exact);
            return Negotiation {
                size: exact,
                fallback: false,
                target_ratio: None,
            };
        }
    }

    let mut best = sizes[0];
    let ratio = constraints
        .viewport_aspect()
        .unwrap_or_else(|| normalize_ratio(best.width as f32 / best.height as f32));
    log::debug!("target ratio = {}", ratio);

    for size in &sizes[1..] {
        if deviation(size, ratio) < deviation(&best, ratio) {
            best = *size;
        }
    }

    log::debug!("negotiated preview size {}", best);
    Negotiation {
        size: best,
        fallback: false,
        target_ratio: Some(ratio),
    }
}

fn normalize_ratio(ratio: f32) -> f32 {
    if ratio > 1.0 {
        1.0 / ratio
    } else {
        ratio
    }
}

fn deviation(size: &Size, ratio: f32) -> f32 {
    (size.height as f32 / size.width as f32 - ratio).abs()
}

fn join_sizes(sizes: &[Size]) -> String {
    sizes
        .iter()
        .map(Size::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
