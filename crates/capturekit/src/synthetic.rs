// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Software camera.
//!
//! [`SyntheticProvider`] implements the [`crate::device`] traits without any
//! hardware. Opened devices produce patterned frames on a producer thread at
//! a fixed rate, honour the image reader's outstanding-image limit and count
//! every frame acquired and released, which makes leaks and double releases
//! visible in tests.
//!
//! ```
//! use std::sync::Arc;
//! use capturekit::synthetic::{OpenBehavior, SyntheticProvider};
//!
//! let provider = Arc::new(SyntheticProvider::default().with_fps(60));
//! provider.set_open_behavior(OpenBehavior::Error(3));
//! assert_eq!(provider.devices().len(), 2);
//! ```

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    device::{
        CameraDevice, CameraProvider, CaptureRequest, CaptureSession, DeviceCharacteristics,
        DeviceEvent, EventSink, Facing, HardwareFrame, ImageReader, PixelFormat, Plane,
        RenderTarget, DEVICE_ID_BACK, DEVICE_ID_FRONT,
    },
    geometry::Size,
    Error,
};

/// Frame rate used unless [`SyntheticProvider::with_fps`] says otherwise
pub const DEFAULT_FPS: u32 = 30;

/// A camera offered by the synthetic provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticDevice {
    pub id: String,
    pub characteristics: DeviceCharacteristics,
}

impl SyntheticDevice {
    pub fn new(
        id: impl Into<String>,
        facing: Facing,
        sensor_orientation: i32,
        output_sizes: Vec<Size>,
    ) -> Self {
        SyntheticDevice {
            id: id.into(),
            characteristics: DeviceCharacteristics {
                facing,
                sensor_orientation,
                output_sizes,
            },
        }
    }
}

/// Outcome of the next [`CameraProvider::open`] calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenBehavior {
    /// The device opens
    #[default]
    Succeed,
    /// The device reports an error code instead of opening
    Error(i32),
    /// The device disconnects instead of opening
    Disconnect,
    /// The open request itself is refused
    Reject,
}

/// Frame counters of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed out by image readers
    pub acquired: u64,
    /// Frames returned to the hardware queue
    pub released: u64,
    /// Frames not produced because the reader had no free image
    pub skipped: u64,
}

impl FrameStats {
    /// Frames currently held outside the hardware queue
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Clone)]
struct ReaderSlot {
    size: Size,
    format: PixelFormat,
    max_images: usize,
    outstanding: Arc<AtomicUsize>,
    sink: EventSink,
}

#[derive(Default)]
struct State {
    behavior: OpenBehavior,
    readers: HashMap<RenderTarget, ReaderSlot>,
    /// Sink of the device that is currently open
    active: Option<EventSink>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    counters: Arc<Counters>,
    opens: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Software implementation of [`CameraProvider`]
pub struct SyntheticProvider {
    devices: Vec<SyntheticDevice>,
    fps: u32,
    format: Option<PixelFormat>,
    inner: Arc<Inner>,
}

impl Default for SyntheticProvider {
    /// A back camera `"0"` with a 90° sensor and a front camera `"1"` with a
    /// 270° sensor, both offering common 16:9 and 4:3 sizes
    fn default() -> Self {
        let sizes = vec![
            Size::new(3840, 2160),
            Size::new(1920, 1080),
            Size::new(1440, 1080),
            Size::new(1280, 720),
            Size::new(640, 480),
            Size::new(320, 240),
        ];
        SyntheticProvider::new(vec![
            SyntheticDevice::new(DEVICE_ID_BACK, Facing::Back, 90, sizes.clone()),
            SyntheticDevice::new(DEVICE_ID_FRONT, Facing::Front, 270, sizes),
        ])
    }
}

impl SyntheticProvider {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        SyntheticProvider {
            devices,
            fps: DEFAULT_FPS,
            format: None,
            inner: Arc::new(Inner::default()),
        }
    }

    /// Frames per second produced by every session, at least 1
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Produce frames in `format` regardless of what the reader asked for
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        self.inner.lock().behavior = behavior;
    }

    pub fn devices(&self) -> &[SyntheticDevice] {
        &self.devices
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn stats(&self) -> FrameStats {
        let counters = &self.inner.counters;
        FrameStats {
            acquired: counters.acquired.load(Ordering::SeqCst),
            released: counters.released.load(Ordering::SeqCst),
            skipped: counters.skipped.load(Ordering::SeqCst),
        }
    }

    /// Number of open requests received
    pub fn open_count(&self) -> u64 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Report an error on the open device. Returns false when no device is
    /// open.
    pub fn inject_error(&self, code: i32) -> bool {
        self.emit(DeviceEvent::Error(code))
    }

    /// Disconnect the open device. Returns false when no device is open.
    pub fn disconnect(&self) -> bool {
        self.emit(DeviceEvent::Disconnected)
    }

    fn emit(&self, event: DeviceEvent) -> bool {
        let sink = self.inner.lock().active.take();
        match sink {
            Some(sink) => sink.send(event),
            None => false,
        }
    }

    fn find(&self, device_id: &str) -> Result<&SyntheticDevice, Error> {
        self.devices
            .iter()
            .find(|device| device.id == device_id)
            .ok_or_else(|| Error::device(None, format!("unknown camera {}", device_id)))
    }
}

impl CameraProvider for SyntheticProvider {
    fn device_ids(&self) -> Result<Vec<String>, Error> {
        Ok(self.devices.iter().map(|device| device.id.clone()).collect())
    }

    fn characteristics(&self, device_id: &str) -> Result<DeviceCharacteristics, Error> {
        Ok(self.find(device_id)?.characteristics.clone())
    }

    fn create_image_reader(
        &self,
        size: Size,
        format: PixelFormat,
        max_images: usize,
        sink: EventSink,
    ) -> Result<Box<dyn ImageReader>, Error> {
        if size.is_empty() || max_images == 0 {
            return Err(Error::device(
                None,
                format!("invalid image reader: {} with {} images", size, max_images),
            ));
        }

        let target = RenderTarget::allocate();
        let slot = ReaderSlot {
            size,
            format: self.format.unwrap_or(format),
            max_images,
            outstanding: Arc::new(AtomicUsize::new(0)),
            sink,
        };
        self.inner.lock().readers.insert(target, slot);
        log::debug!("image reader {} at {} ({})", target.id(), size, format);

        Ok(Box::new(SyntheticReader {
            target,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn open(&self, device_id: &str, sink: EventSink) -> Result<(), Error> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.find(device_id)?;

        let behavior = self.inner.lock().behavior;
        log::debug!("open camera {}: {:?}", device_id, behavior);
        match behavior {
            OpenBehavior::Succeed => {
                self.inner.lock().active = Some(sink.clone());
                let device = SyntheticCamera {
                    id: device_id.to_string(),
                    fps: self.fps,
                    inner: Arc::clone(&self.inner),
                    closed: false,
                };
                sink.send(DeviceEvent::Opened(Box::new(device)));
            }
            OpenBehavior::Error(code) => {
                sink.send(DeviceEvent::Error(code));
            }
            OpenBehavior::Disconnect => {
                sink.send(DeviceEvent::Disconnected);
            }
            OpenBehavior::Reject => {
                return Err(Error::device(
                    None,
                    format!("camera service refused to open {}", device_id),
                ));
            }
        }
        Ok(())
    }
}

struct SyntheticReader {
    target: RenderTarget,
    inner: Arc<Inner>,
}

impl ImageReader for SyntheticReader {
    fn target(&self) -> RenderTarget {
        self.target
    }

    fn close(&mut self) {
        self.inner.lock().readers.remove(&self.target);
    }
}

impl Drop for SyntheticReader {
    fn drop(&mut self) {
        self.close();
    }
}

struct SyntheticCamera {
    id: String,
    fps: u32,
    inner: Arc<Inner>,
    closed: bool,
}

impl CameraDevice for SyntheticCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(&mut self, targets: &[RenderTarget], sink: EventSink) -> Result<(), Error> {
        if self.closed {
            return Err(Error::device(None, format!("camera {} is closed", self.id)));
        }

        let session = SyntheticSession {
            fps: self.fps,
            inner: Arc::clone(&self.inner),
            targets: targets.to_vec(),
            stop: Arc::new(AtomicBool::new(false)),
            producer: None,
        };
        sink.send(DeviceEvent::SessionConfigured(Box::new(session)));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.lock().active = None;
            log::debug!("camera {} closed", self.id);
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.close();
    }
}

struct SyntheticSession {
    fps: u32,
    inner: Arc<Inner>,
    targets: Vec<RenderTarget>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl SyntheticSession {
    fn stop_producer(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                log::error!("synthetic producer panicked");
            }
        }
    }
}

impl CaptureSession for SyntheticSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), Error> {
        if let Some(target) = request.targets.iter().find(|t| !self.targets.contains(t)) {
            return Err(Error::device(
                None,
                format!("target {} is not part of the session", target.id()),
            ));
        }

        self.stop_producer();

        let readers: Vec<ReaderSlot> = {
            let state = self.inner.lock();
            request
                .targets
                .iter()
                .filter_map(|target| state.readers.get(target).cloned())
                .collect()
        };

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);
        let counters = Arc::clone(&self.inner.counters);
        let interval = Duration::from_secs(1) / self.fps;

        let handle = thread::Builder::new()
            .name("synthetic-producer".to_string())
            .spawn(move || produce(readers, counters, interval, stop))?;
        self.producer = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        self.stop_producer();
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.stop_producer();
    }
}

fn produce(
    readers: Vec<ReaderSlot>,
    counters: Arc<Counters>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut sequence: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if stop.load(Ordering::SeqCst) {
            break;
        }

        for reader in &readers {
            if reader.outstanding.load(Ordering::SeqCst) >= reader.max_images {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            reader.outstanding.fetch_add(1, Ordering::SeqCst);
            counters.acquired.fetch_add(1, Ordering::SeqCst);
            let frame = SyntheticFrame::new(
                reader.format,
                reader.size,
                sequence,
                Arc::clone(&reader.outstanding),
                Arc::clone(&counters),
            );

            // a failed send drops the frame, which releases it
            if !reader.sink.send(DeviceEvent::FrameReady(Box::new(frame))) {
                log::debug!("session gone, stopping synthetic producer");
                return;
            }
        }
        sequence += 1;
    }
}

struct SyntheticPlane {
    data: Vec<u8>,
    row_stride: usize,
    pixel_stride: usize,
}

/// Patterned frame that returns itself to its reader when dropped
struct SyntheticFrame {
    format: PixelFormat,
    planes: Vec<SyntheticPlane>,
    outstanding: Arc<AtomicUsize>,
    counters: Arc<Counters>,
}

impl SyntheticFrame {
    fn new(
        format: PixelFormat,
        size: Size,
        sequence: u64,
        outstanding: Arc<AtomicUsize>,
        counters: Arc<Counters>,
    ) -> Self {
        let width = size.width as usize;
        let height = size.height as usize;
        let shift = sequence as usize;

        let planes = match format {
            PixelFormat::Yuv420 => {
                let mut luma = vec![0u8; width * height];
                for (row, line) in luma.chunks_exact_mut(width).enumerate() {
                    for (col, pixel) in line.iter_mut().enumerate() {
                        *pixel = ((col + row + shift) & 0xff) as u8;
                    }
                }
                let chroma = (width / 2) * (height / 2);
                vec![
                    SyntheticPlane {
                        data: luma,
                        row_stride: width,
                        pixel_stride: 1,
                    },
                    SyntheticPlane {
                        data: vec![128; chroma],
                        row_stride: width / 2,
                        pixel_stride: 1,
                    },
                    SyntheticPlane {
                        data: vec![128; chroma],
                        row_stride: width / 2,
                        pixel_stride: 1,
                    },
                ]
            }
            PixelFormat::Yuyv => vec![SyntheticPlane {
                data: vec![128; width * height * 2],
                row_stride: width * 2,
                pixel_stride: 2,
            }],
            PixelFormat::Jpeg | PixelFormat::Other(_) => vec![SyntheticPlane {
                data: vec![0; width * height],
                row_stride: width,
                pixel_stride: 1,
            }],
        };

        SyntheticFrame {
            format,
            planes,
            outstanding,
            counters,
        }
    }
}

impl HardwareFrame for SyntheticFrame {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> Option<Plane<'_>> {
        self.planes.get(index).map(|plane| Plane {
            data: &plane.data,
            row_stride: plane.row_stride,
            pixel_stride: plane.pixel_stride,
        })
    }
}

impl Drop for SyntheticFrame {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Message;
    use std::sync::mpsc;

    fn sink() -> (EventSink, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        (EventSink::new(tx), rx)
    }

    fn next_event(rx: &mpsc::Receiver<Message>) -> DeviceEvent {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Message::Device(event)) => event,
            Ok(_) => panic!("unexpected message"),
            Err(err) => panic!("no event: {}", err),
        }
    }

    #[test]
    fn test_default_devices() {
        let provider = SyntheticProvider::default();
        assert_eq!(provider.device_ids().unwrap(), vec!["0", "1"]);
        let front = provider.characteristics(DEVICE_ID_FRONT).unwrap();
        assert_eq!(front.facing, Facing::Front);
        assert_eq!(front.sensor_orientation, 270);
        assert!(provider.characteristics("9").is_err());
    }

    #[test]
    fn test_open_behaviors() {
        let provider = SyntheticProvider::default();
        let (sink, rx) = sink();

        provider.open("0", sink.clone()).unwrap();
        assert!(matches!(next_event(&rx), DeviceEvent::Opened(_)));

        provider.set_open_behavior(OpenBehavior::Error(5));
        provider.open("0", sink.clone()).unwrap();
        assert!(matches!(next_event(&rx), DeviceEvent::Error(5)));

        provider.set_open_behavior(OpenBehavior::Disconnect);
        provider.open("0", sink.clone()).unwrap();
        assert!(matches!(next_event(&rx), DeviceEvent::Disconnected));

        provider.set_open_behavior(OpenBehavior::Reject);
        assert!(provider.open("0", sink).is_err());
        assert_eq!(provider.open_count(), 4);
    }

    #[test]
    fn test_frames_respect_outstanding_limit() {
        let provider = SyntheticProvider::default().with_fps(200);
        let (sink, rx) = sink();

        let reader = provider
            .create_image_reader(Size::new(32, 16), PixelFormat::Yuv420, 2, sink.clone())
            .unwrap();
        provider.open("0", sink.clone()).unwrap();
        let mut device = match next_event(&rx) {
            DeviceEvent::Opened(device) => device,
            other => panic!("unexpected {:?}", other),
        };
        device
            .create_session(&[reader.target()], sink.clone())
            .unwrap();
        let mut session = match next_event(&rx) {
            DeviceEvent::SessionConfigured(session) => session,
            other => panic!("unexpected {:?}", other),
        };
        session
            .set_repeating_request(&CaptureRequest::preview(vec![reader.target()]))
            .unwrap();

        // hold two frames; the producer must skip until one is released
        let first = next_event(&rx);
        let second = next_event(&rx);
        thread::sleep(Duration::from_millis(50));
        assert!(provider.stats().skipped > 0);
        assert_eq!(provider.stats().outstanding(), 2);

        match &first {
            DeviceEvent::FrameReady(frame) => {
                assert_eq!(frame.plane_count(), 3);
                assert_eq!(frame.plane(0).map(|p| p.data.len()), Some(512));
                assert_eq!(frame.plane(1).map(|p| p.data.len()), Some(128));
            }
            other => panic!("unexpected {:?}", other),
        }
        drop(first);
        drop(second);

        session.close();
        device.close();
        for message in rx.try_iter() {
            drop(message);
        }

        let stats = provider.stats();
        assert_eq!(stats.acquired, stats.released);
    }

    #[test]
    fn test_inject_requires_open_device() {
        let provider = SyntheticProvider::default();
        assert!(!provider.inject_error(1));

        let (sink, rx) = sink();
        provider.open("1", sink).unwrap();
        let _device = next_event(&rx);
        assert!(provider.disconnect());
        assert!(matches!(next_event(&rx), DeviceEvent::Disconnected));
        assert!(!provider.disconnect());
    }
}
