// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! CaptureKit Library for Rust
//!
//! Camera device orchestration and preview frame pipeline. CaptureKit opens,
//! configures and tears down a capture device, picks the best supported
//! preview resolution, computes the display transform that corrects sensor
//! rotation and aspect-ratio mismatch, and copies planar YUV 4:2:0 frames out
//! of hardware-owned buffers into reusable buffers for application consumers.
//!
//! The hardware and the display are external collaborators described by the
//! traits in [`device`] and [`surface`]. The [`synthetic`] module provides a
//! software camera implementing those traits for tests and demos.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use capturekit::geometry::Size;
//! use capturekit::preview::CameraPreview;
//! use capturekit::surface::OffscreenSurface;
//! use capturekit::synthetic::SyntheticProvider;
//!
//! let surface = Arc::new(OffscreenSurface::new(Size::new(1080, 1920)));
//! let preview = CameraPreview::builder()
//!     .with_surface(surface)
//!     .with_provider(Arc::new(SyntheticProvider::default()))
//!     .with_viewport_size(Size::new(1080, 1920))
//!     .with_rotation(0)
//!     .with_frame_consumer(Arc::new(
//!         |y: &[u8], _u: &[u8], _v: &[u8], size: Size, stride: usize| {
//!             println!("frame {} luma={} stride={}", size, y.len(), stride);
//!         },
//!     ))
//!     .build()?;
//!
//! preview.start();
//! // ... frames flow to the consumer on the capture worker thread
//! preview.stop();
//! # Ok::<(), capturekit::Error>(())
//! ```
//!
//! # Threading
//!
//! Every device callback and every frame is handled on one worker thread per
//! session. [`preview::CameraPreview::stop`] joins that thread and must not be
//! called from a listener or frame consumer callback.

use std::{error, fmt, io, time::Duration};

use crate::geometry::Size;

/// Error type for CaptureKit operations
#[derive(Debug)]
pub enum Error {
    /// Invalid builder arguments, reported by
    /// [`preview::CameraPreviewBuilder::build`] before any resource is touched
    Configuration(String),

    /// The open/close gate could not be acquired within the bound
    ResourceTimeout(Duration),

    /// The device reported an error, disconnected, or refused a request
    Device {
        /// Device specific error code, when the device supplied one
        code: Option<i32>,
        /// Human readable cause
        reason: String,
    },

    /// Neither the requested device nor any other enumerated device could
    /// be used
    NoUsableDevice {
        /// Device asked for, if any
        requested: Option<String>,
    },

    /// No supported size survived the constraints; capture continues at the
    /// device default
    CapabilityMismatch {
        /// Device whose size list was filtered out
        device_id: String,
        /// Size used instead
        fallback: Size,
    },

    /// A frame plane did not match the pooled buffer length and was dropped
    TransientFrameDrop {
        /// Plane index (0 = Y, 1 = U, 2 = V)
        plane: usize,
        /// Pooled buffer length
        expected: usize,
        /// Bytes remaining in the incoming plane
        actual: usize,
    },

    /// I/O error from the operating system (worker thread creation)
    Io(io::Error),
}

impl Error {
    pub(crate) fn device(code: Option<i32>, reason: impl Into<String>) -> Self {
        Error::Device {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
            Error::ResourceTimeout(wait) => {
                write!(f, "timed out after {:?} waiting to lock camera opening", wait)
            }
            Error::Device {
                code: Some(code),
                reason,
            } => write!(f, "device error {}: {}", code, reason),
            Error::Device { code: None, reason } => write!(f, "device error: {}", reason),
            Error::NoUsableDevice {
                requested: Some(id),
            } => write!(f, "no usable camera device (requested {})", id),
            Error::NoUsableDevice { requested: None } => write!(f, "no usable camera device"),
            Error::CapabilityMismatch {
                device_id,
                fallback,
            } => write!(
                f,
                "no suitable preview size on device {}, using default {}",
                device_id, fallback
            ),
            Error::TransientFrameDrop {
                plane,
                expected,
                actual,
            } => write!(
                f,
                "plane {} holds {} bytes, pooled buffer holds {}",
                plane, actual, expected
            ),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// The geometry module provides sizes, rectangles and the affine matrix.
pub mod geometry;

/// The negotiate module selects the preview resolution.
pub mod negotiate;

/// The transform module computes the display transform and orientation.
pub mod transform;

/// The device module describes the camera hardware collaborator.
pub mod device;

/// The surface module describes the display surface collaborator.
pub mod surface;

/// The listener module provides the application callbacks.
pub mod listener;

/// The pool module provides the reusable plane buffers.
pub mod pool;

/// The pipeline module moves frames from the hardware into the pool.
pub mod pipeline;

mod gate;
mod lifecycle;

/// The preview module provides the public camera preview controller.
pub mod preview;

/// The synthetic module provides a software camera.
pub mod synthetic;

pub use lifecycle::SessionState;
