// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture lifecycle state machine.
//!
//! One [`Lifecycle`] value is owned by the session worker thread and driven by
//! a single message loop. Public requests from [`crate::preview`] and every
//! hardware callback arrive as [`Message`] values on the same channel, so
//! device handles, the capture session and the frame pool are only ever
//! touched from the worker thread.
//!
//! Events that no longer fit the current state (a session configured after
//! the device was closed, a late open result) are refused by explicit state
//! guards and their resources closed.

use std::{
    cell::Cell,
    fmt, io,
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crate::{
    device::{
        CameraDevice, CameraProvider, CaptureRequest, CaptureSession, DeviceCharacteristics,
        DeviceEvent, EventSink, Facing, HardwareFrame, ImageReader, PixelFormat,
    },
    gate::OpenCloseGate,
    geometry::Size,
    listener::{CameraListener, FrameConsumer, OpenedDevice},
    negotiate::{self, DeviceConstraints},
    pipeline::FramePipeline,
    surface::DisplaySurface,
    transform::{compute_transform, sensor_to_display_degrees, Rotation},
    Error,
};

/// Outstanding images allowed on the image reader
const MAX_IMAGES: usize = 2;

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True when called from a session worker thread
pub(crate) fn on_worker_thread() -> bool {
    IN_WORKER.with(|flag| flag.get())
}

/// State of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Opening,
    Previewing,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Opening => write!(f, "opening"),
            SessionState::Previewing => write!(f, "previewing"),
            SessionState::Closing => write!(f, "closing"),
        }
    }
}

/// Messages accepted by the worker loop
pub(crate) enum Message {
    /// Open a device; the caller holds the open/close gate
    Open { device_id: Option<String> },
    ViewportChanged(Size),
    Device(DeviceEvent),
    /// Close the device; the caller holds the open/close gate and waits on
    /// `ack`
    Close { ack: mpsc::Sender<()> },
    Shutdown,
}

/// Settings fixed at construction
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionConfig {
    pub(crate) constraints: DeviceConstraints,
    pub(crate) rotation: Rotation,
    pub(crate) mirror: bool,
}

/// Snapshot of the session visible to other threads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Status {
    pub(crate) state: SessionState,
    /// Device of the current or most recent session
    pub(crate) device_id: Option<String>,
    pub(crate) size: Option<Size>,
    /// Set when the session ended on its own (error, disconnect, failed open)
    pub(crate) ended: bool,
}

/// Collaborators and settings shared between the controller and the worker
pub(crate) struct Shared {
    pub(crate) provider: Arc<dyn CameraProvider>,
    pub(crate) surface: Arc<dyn DisplaySurface>,
    pub(crate) listener: Option<Arc<dyn CameraListener>>,
    pub(crate) consumer: Option<Arc<dyn FrameConsumer>>,
    pub(crate) config: SessionConfig,
    pub(crate) gate: OpenCloseGate,
    status: Mutex<Status>,
}

impl Shared {
    pub(crate) fn new(
        provider: Arc<dyn CameraProvider>,
        surface: Arc<dyn DisplaySurface>,
        listener: Option<Arc<dyn CameraListener>>,
        consumer: Option<Arc<dyn FrameConsumer>>,
        config: SessionConfig,
    ) -> Self {
        Shared {
            provider,
            surface,
            listener,
            consumer,
            config,
            gate: OpenCloseGate::new(),
            status: Mutex::new(Status::default()),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.lock_status().clone()
    }

    pub(crate) fn update_status(&self, update: impl FnOnce(&mut Status)) {
        update(&mut self.lock_status());
    }

    /// Run `callback` against the listener, if one is registered
    pub(crate) fn notify(&self, callback: impl FnOnce(&dyn CameraListener)) {
        if let Some(listener) = &self.listener {
            callback(listener.as_ref());
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running session worker
pub(crate) struct Worker {
    tx: mpsc::Sender<Message>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub(crate) fn spawn(shared: Arc<Shared>) -> io::Result<Worker> {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx.clone());
        let handle = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || {
                IN_WORKER.with(|flag| flag.set(true));
                Lifecycle::new(shared, sink).run(rx);
            })?;
        log::debug!("capture worker started");
        Ok(Worker { tx, handle })
    }

    /// Another handle to the worker's queue
    pub(crate) fn sender(&self) -> mpsc::Sender<Message> {
        self.tx.clone()
    }

    /// Queue a message; false when the worker has exited
    pub(crate) fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Ask the loop to exit without waiting for it
    pub(crate) fn detach(self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    /// Stop the loop and wait for the thread to finish
    pub(crate) fn shutdown(self) {
        let _ = self.tx.send(Message::Shutdown);
        if self.handle.join().is_err() {
            log::error!("capture worker panicked");
        }
        log::debug!("capture worker stopped");
    }
}

pub(crate) struct Lifecycle {
    shared: Arc<Shared>,
    sink: EventSink,
    state: SessionState,
    device_id: Option<String>,
    facing: Facing,
    sensor_orientation: i32,
    chosen: Option<Size>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    reader: Option<Box<dyn ImageReader>>,
    request: Option<CaptureRequest>,
    pipeline: Option<FramePipeline>,
}

impl Lifecycle {
    pub(crate) fn new(shared: Arc<Shared>, sink: EventSink) -> Self {
        Lifecycle {
            shared,
            sink,
            state: SessionState::Idle,
            device_id: None,
            facing: Facing::Back,
            sensor_orientation: 0,
            chosen: None,
            device: None,
            session: None,
            reader: None,
            request: None,
            pipeline: None,
        }
    }

    fn run(mut self, rx: mpsc::Receiver<Message>) {
        while let Ok(message) = rx.recv() {
            if !self.handle(message) {
                break;
            }
        }
        self.teardown();
    }

    /// Process one message. Returns false once the loop should exit.
    pub(crate) fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Open { device_id } => self.open(device_id.as_deref()),
            Message::ViewportChanged(viewport) => self.apply_transform(viewport),
            Message::Device(event) => self.device_event(event),
            Message::Close { ack } => {
                self.close();
                let _ = ack.send(());
            }
            Message::Shutdown => return false,
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    fn device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(device) => self.opened(device),
            DeviceEvent::Disconnected => self.device_lost(None),
            DeviceEvent::Error(code) => self.device_lost(Some(Error::device(
                Some(code),
                "camera device reported an error",
            ))),
            DeviceEvent::SessionConfigured(session) => self.session_configured(session),
            DeviceEvent::SessionConfigureFailed => self.session_configure_failed(),
            DeviceEvent::FrameReady(frame) => self.frame_ready(frame),
        }
    }

    fn open(&mut self, requested: Option<&str>) {
        if self.state != SessionState::Idle {
            log::warn!("ignoring open request while {}", self.state);
            self.shared.gate.release();
            return;
        }

        self.shared.update_status(|status| status.ended = false);
        self.transition(SessionState::Opening);

        let (device_id, characteristics) = match self.select_device(requested) {
            Some(selected) => selected,
            None => {
                self.abort_open(Error::NoUsableDevice {
                    requested: requested.map(str::to_owned),
                });
                return;
            }
        };

        let negotiation = negotiate::choose(
            &characteristics.output_sizes,
            &self.shared.config.constraints,
            negotiate::DEFAULT_PREVIEW_SIZE,
        );
        if negotiation.fallback {
            let warning = Error::CapabilityMismatch {
                device_id: device_id.clone(),
                fallback: negotiation.size,
            };
            self.shared.notify(|listener| listener.on_device_warning(&warning));
        }
        let chosen = negotiation.size;

        let reader = match self.shared.provider.create_image_reader(
            chosen,
            PixelFormat::Yuv420,
            MAX_IMAGES,
            self.sink.clone(),
        ) {
            Ok(reader) => reader,
            Err(err) => {
                self.abort_open(err);
                return;
            }
        };

        log::info!(
            "opening camera {} ({} facing, sensor {}°) at {}",
            device_id,
            characteristics.facing,
            characteristics.sensor_orientation,
            chosen
        );
        self.facing = characteristics.facing;
        self.sensor_orientation = characteristics.sensor_orientation;
        self.chosen = Some(chosen);
        self.reader = Some(reader);
        self.pipeline = Some(FramePipeline::new(chosen, self.shared.consumer.clone()));
        self.device_id = Some(device_id.clone());
        self.shared.update_status(|status| {
            status.device_id = Some(device_id.clone());
            status.size = Some(chosen);
        });

        if let Err(err) = self.shared.provider.open(&device_id, self.sink.clone()) {
            self.abort_open(err);
        }
    }

    /// The requested device if it is usable, otherwise the first usable one
    fn select_device(&self, requested: Option<&str>) -> Option<(String, DeviceCharacteristics)> {
        let provider = &self.shared.provider;

        if let Some(id) = requested {
            match provider.characteristics(id) {
                Ok(characteristics) if !characteristics.output_sizes.is_empty() => {
                    return Some((id.to_string(), characteristics));
                }
                Ok(_) => log::warn!("camera {} reports no preview sizes", id),
                Err(err) => log::warn!("camera {} is not available: {}", id, err),
            }
        }

        let ids = match provider.device_ids() {
            Ok(ids) => ids,
            Err(err) => {
                log::error!("can not enumerate cameras: {}", err);
                return None;
            }
        };

        ids.into_iter()
            .filter(|id| Some(id.as_str()) != requested)
            .find_map(|id| match provider.characteristics(&id) {
                Ok(characteristics) if !characteristics.output_sizes.is_empty() => {
                    Some((id, characteristics))
                }
                Ok(_) => {
                    log::debug!("skip camera {}: no preview sizes", id);
                    None
                }
                Err(err) => {
                    log::debug!("skip camera {}: {}", id, err);
                    None
                }
            })
    }

    fn abort_open(&mut self, error: Error) {
        log::error!("can not open camera: {}", error);
        self.shared.gate.release();
        self.release_resources();
        self.end_session();
        self.shared.notify(|listener| listener.on_device_error(&error));
    }

    fn opened(&mut self, mut device: Box<dyn CameraDevice>) {
        let chosen = match (self.state, self.chosen) {
            (SessionState::Opening, Some(chosen)) => chosen,
            _ => {
                log::warn!("camera {} opened while {}, closing it", device.id(), self.state);
                device.close();
                return;
            }
        };

        self.shared.gate.release();
        log::info!("camera {} opened", device.id());
        self.transition(SessionState::Previewing);

        let surface = &self.shared.surface;
        surface.set_buffer_size(chosen);
        let mut targets = vec![surface.render_target()];
        if let Some(reader) = &self.reader {
            targets.push(reader.target());
        }

        let created = device.create_session(&targets, self.sink.clone());
        self.device = Some(device);
        if let Err(err) = created {
            self.fail(err);
            return;
        }
        self.request = Some(CaptureRequest::preview(targets));

        self.apply_transform(self.viewport());

        let opened = OpenedDevice {
            device_id: self.device_id.clone().unwrap_or_default(),
            size: chosen,
            display_orientation: sensor_to_display_degrees(
                self.sensor_orientation,
                self.shared.config.rotation,
                self.facing,
            ),
            mirrored: self.shared.config.mirror,
        };
        self.shared.notify(|listener| listener.on_device_opened(&opened));
    }

    /// Disconnect (`None`) or device error
    fn device_lost(&mut self, error: Option<Error>) {
        match self.state {
            SessionState::Opening => self.shared.gate.release(),
            SessionState::Previewing => {}
            _ => {
                log::debug!("ignoring device loss while {}", self.state);
                return;
            }
        }

        match &error {
            Some(err) => log::error!("camera {:?}: {}", self.device_id, err),
            None => log::warn!("camera {:?} disconnected", self.device_id),
        }
        self.release_resources();
        self.end_session();

        match error {
            Some(err) => self.shared.notify(|listener| listener.on_device_error(&err)),
            None => self.shared.notify(|listener| listener.on_device_closed()),
        }
    }

    /// Tear the session down after a failure while previewing
    fn fail(&mut self, error: Error) {
        log::error!("capture session failed: {}", error);
        self.release_resources();
        self.end_session();
        self.shared.notify(|listener| listener.on_device_error(&error));
    }

    fn session_configured(&mut self, mut session: Box<dyn CaptureSession>) {
        if self.state != SessionState::Previewing || self.device.is_none() {
            log::debug!("session configured while {}, closing it", self.state);
            session.close();
            return;
        }

        let submitted = match &self.request {
            Some(request) => session.set_repeating_request(request),
            None => Ok(()),
        };
        self.session = Some(session);

        match submitted {
            Ok(()) => log::debug!("repeating preview request started"),
            Err(err) => {
                log::error!("can not start preview: {}", err);
                self.shared.notify(|listener| listener.on_device_error(&err));
            }
        }
    }

    fn session_configure_failed(&mut self) {
        if self.state != SessionState::Previewing {
            log::debug!("ignoring session configure failure while {}", self.state);
            return;
        }
        let err = Error::device(None, "capture session configuration failed");
        log::error!("{}", err);
        self.shared.notify(|listener| listener.on_device_error(&err));
    }

    fn frame_ready(&mut self, frame: Box<dyn HardwareFrame>) {
        match (&self.state, self.pipeline.as_mut()) {
            (SessionState::Previewing, Some(pipeline)) => {
                pipeline.deliver(frame);
            }
            _ => log::trace!("discarding frame while {}", self.state),
        }
    }

    fn close(&mut self) {
        if self.state == SessionState::Idle {
            log::debug!("close requested while idle");
            return;
        }

        self.transition(SessionState::Closing);
        self.release_resources();
        self.transition(SessionState::Idle);
        log::info!("camera {:?} closed", self.device_id);
        self.shared.notify(|listener| listener.on_device_closed());
    }

    fn teardown(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        log::debug!("worker exiting while {}, releasing camera", self.state);
        if self.state == SessionState::Opening {
            self.shared.gate.release();
        }
        self.release_resources();
        self.transition(SessionState::Idle);
    }

    /// Close session, device and image reader, in that order, and discard
    /// the per-session state
    fn release_resources(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        self.request = None;
        if let Some(pipeline) = self.pipeline.take() {
            let counters = pipeline.counters();
            log::info!(
                "frames delivered = {}, dropped = {}, ignored = {}",
                counters.delivered,
                counters.dropped,
                counters.ignored
            );
        }
        self.chosen = None;
    }

    fn viewport(&self) -> Size {
        let viewport = self.shared.surface.viewport();
        if viewport.is_empty() {
            self.shared.config.constraints.viewport.unwrap_or(viewport)
        } else {
            viewport
        }
    }

    fn apply_transform(&self, viewport: Size) {
        if let Some(chosen) = self.chosen {
            let matrix = compute_transform(chosen, viewport, self.shared.config.rotation);
            self.shared.surface.set_transform(&matrix);
        }
    }

    fn end_session(&mut self) {
        self.transition(SessionState::Idle);
        self.shared.update_status(|status| status.ended = true);
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("session {} -> {}", self.state, state);
            self.state = state;
            self.shared.update_status(|status| status.state = state);
        }
    }
}
