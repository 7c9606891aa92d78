// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Application callbacks.
//!
//! All callbacks run on the session worker thread. They must return quickly
//! and must not call [`crate::preview::CameraPreview::stop`] or
//! [`crate::preview::CameraPreview::switch_device`]; those join the worker
//! thread and are refused from inside it.

use crate::{geometry::Size, Error};

/// Information reported when a device is ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDevice {
    pub device_id: String,
    /// Negotiated preview size
    pub size: Size,
    /// Clockwise rotation from sensor to display orientation
    pub display_orientation: i32,
    /// Whether the preview is mirrored on the display
    pub mirrored: bool,
}

/// Lifecycle notifications
pub trait CameraListener: Send + Sync {
    fn on_device_opened(&self, device: &OpenedDevice);

    fn on_device_closed(&self);

    fn on_device_error(&self, error: &Error);

    /// Non-fatal condition; capture continues
    fn on_device_warning(&self, warning: &Error) {
        log::warn!("{}", warning);
    }
}

/// Receives every accepted preview frame.
///
/// The plane slices borrow the pooled buffers and are overwritten by the next
/// frame; copy them out to keep them.
pub trait FrameConsumer: Send + Sync {
    fn on_frame(&self, y: &[u8], u: &[u8], v: &[u8], size: Size, luma_row_stride: usize);
}

impl<F> FrameConsumer for F
where
    F: Fn(&[u8], &[u8], &[u8], Size, usize) + Send + Sync,
{
    fn on_frame(&self, y: &[u8], u: &[u8], v: &[u8], size: Size, luma_row_stride: usize) {
        self(y, u, v, size, luma_row_stride)
    }
}
