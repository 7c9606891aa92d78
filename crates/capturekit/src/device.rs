// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Camera hardware abstraction.
//!
//! This module defines the interface CaptureKit expects from the platform
//! camera stack:
//!
//! - [`CameraProvider`] - device enumeration, characteristics, image readers
//!   and asynchronous device open
//! - [`CameraDevice`] - an opened device that builds capture sessions
//! - [`CaptureSession`] - a configured session that runs a repeating request
//! - [`ImageReader`] - the off-screen consumer surface receiving YUV frames
//! - [`HardwareFrame`] - one hardware-owned frame; dropping it returns the
//!   buffer to the hardware queue
//!
//! Asynchronous results travel back as [`DeviceEvent`] values through the
//! [`EventSink`] handed to the provider. Every event is handled on the
//! session worker thread, never on the thread that produced it.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
};

use crate::{geometry::Size, lifecycle::Message, Error};

/// Identifier of the rear camera on two-camera devices
pub const DEVICE_ID_BACK: &str = "0";

/// Identifier of the front camera on two-camera devices
pub const DEVICE_ID_FRONT: &str = "1";

/// Direction a camera faces relative to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    Front,
    Back,
    External,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// Pixel layout of a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Three-plane YUV with 4:2:0 chroma subsampling; chroma planes may be
    /// interleaved (pixel stride 2)
    Yuv420,
    /// Packed YUV 4:2:2, single plane
    Yuyv,
    /// Compressed JPEG, single plane
    Jpeg,
    /// Any other platform specific code
    Other(u32),
}

impl PixelFormat {
    /// Number of planes the format carries
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Yuv420 => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Yuv420 => write!(f, "YUV_420"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
            PixelFormat::Jpeg => write!(f, "JPEG"),
            PixelFormat::Other(code) => write!(f, "0x{:08x}", code),
        }
    }
}

/// Static description of a camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCharacteristics {
    pub facing: Facing,
    /// Clockwise angle the sensor image must be rotated to be upright in the
    /// device's natural orientation: 0, 90, 180 or 270
    pub sensor_orientation: i32,
    /// Preview output sizes in the order the device reports them
    pub output_sizes: Vec<Size>,
}

/// Opaque handle to a surface frames can be rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTarget(u64);

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);

impl RenderTarget {
    /// Allocate a process-unique handle
    pub fn allocate() -> Self {
        RenderTarget(NEXT_TARGET.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Capture request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// Autofocus mode set on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusMode {
    Off,
    Auto,
    ContinuousVideo,
    ContinuousPicture,
}

/// Parameters of a repeating capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub autofocus: AutofocusMode,
    /// Surfaces every captured frame is delivered to
    pub targets: Vec<RenderTarget>,
}

impl CaptureRequest {
    /// Preview request with continuous autofocus
    pub fn preview(targets: Vec<RenderTarget>) -> Self {
        CaptureRequest {
            template: RequestTemplate::Preview,
            autofocus: AutofocusMode::ContinuousPicture,
            targets,
        }
    }
}

/// One plane of a hardware frame
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    /// Bytes remaining in the plane buffer
    pub data: &'a [u8],
    /// Bytes between the start of two rows
    pub row_stride: usize,
    /// Bytes between two horizontally adjacent samples
    pub pixel_stride: usize,
}

/// A frame owned by the hardware.
///
/// Implementations return the underlying buffer to the hardware queue when
/// dropped; holding on to a frame stalls capture once the image reader's
/// outstanding limit is reached.
pub trait HardwareFrame: Send {
    fn format(&self) -> PixelFormat;

    fn plane_count(&self) -> usize;

    fn plane(&self, index: usize) -> Option<Plane<'_>>;
}

/// Asynchronous results delivered by the hardware.
pub enum DeviceEvent {
    /// Open succeeded
    Opened(Box<dyn CameraDevice>),
    /// The device went away
    Disconnected,
    /// The device failed with a platform error code
    Error(i32),
    /// A session requested with [`CameraDevice::create_session`] is ready
    SessionConfigured(Box<dyn CaptureSession>),
    /// The session could not be configured
    SessionConfigureFailed,
    /// A new frame is available on an image reader
    FrameReady(Box<dyn HardwareFrame>),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(code) => write!(f, "Error({})", code),
            DeviceEvent::SessionConfigured(_) => write!(f, "SessionConfigured"),
            DeviceEvent::SessionConfigureFailed => write!(f, "SessionConfigureFailed"),
            DeviceEvent::FrameReady(frame) => write!(f, "FrameReady({})", frame.format()),
        }
    }
}

/// Channel into the session worker.
///
/// Cloned freely by hardware implementations; sending fails once the session
/// that created the sink has ended, in which case the event (and any frame or
/// device it carries) is dropped on the sending side.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Message>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        EventSink { tx }
    }

    /// Deliver an event to the worker. Returns false when the session is
    /// gone.
    pub fn send(&self, event: DeviceEvent) -> bool {
        self.tx.send(Message::Device(event)).is_ok()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Platform camera service
pub trait CameraProvider: Send + Sync {
    /// Identifiers of all cameras, in platform order
    fn device_ids(&self) -> Result<Vec<String>, Error>;

    fn characteristics(&self, device_id: &str) -> Result<DeviceCharacteristics, Error>;

    /// Create the off-screen consumer frames are copied from. Frames are
    /// delivered as [`DeviceEvent::FrameReady`] through `sink`.
    fn create_image_reader(
        &self,
        size: Size,
        format: PixelFormat,
        max_images: usize,
        sink: EventSink,
    ) -> Result<Box<dyn ImageReader>, Error>;

    /// Start opening a device. The outcome arrives later through `sink` as
    /// exactly one of [`DeviceEvent::Opened`], [`DeviceEvent::Disconnected`]
    /// or [`DeviceEvent::Error`]. An `Err` return means the request was
    /// refused and no event follows.
    fn open(&self, device_id: &str, sink: EventSink) -> Result<(), Error>;
}

/// An opened camera
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Start configuring a session over `targets`; the outcome arrives as
    /// [`DeviceEvent::SessionConfigured`] or
    /// [`DeviceEvent::SessionConfigureFailed`].
    fn create_session(&mut self, targets: &[RenderTarget], sink: EventSink) -> Result<(), Error>;

    fn close(&mut self);
}

/// A configured capture session
pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), Error>;

    fn close(&mut self);
}

/// Off-screen frame consumer
pub trait ImageReader: Send {
    fn target(&self) -> RenderTarget;

    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_targets_are_unique() {
        let a = RenderTarget::allocate();
        let b = RenderTarget::allocate();
        assert_ne!(a, b);
        assert_ne!(a.id(), 0);
    }

    #[test]
    fn test_plane_counts() {
        assert_eq!(PixelFormat::Yuv420.plane_count(), 3);
        assert_eq!(PixelFormat::Yuyv.plane_count(), 1);
        assert_eq!(format!("{}", PixelFormat::Other(0x3231564e)), "0x3231564e");
    }

    #[test]
    fn test_preview_request() {
        let target = RenderTarget::allocate();
        let request = CaptureRequest::preview(vec![target]);
        assert_eq!(request.template, RequestTemplate::Preview);
        assert_eq!(request.autofocus, AutofocusMode::ContinuousPicture);
        assert_eq!(request.targets, vec![target]);
    }
}
