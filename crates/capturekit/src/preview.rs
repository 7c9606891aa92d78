// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Camera preview controller.
//!
//! [`CameraPreview`] is the public face of the capture lifecycle. It owns the
//! session worker thread and serialises `start`, `stop` and `switch_device`
//! under one lock. Device failures never surface from these calls; they are
//! reported through [`CameraListener::on_device_error`].

use std::{
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, TryLockError},
    time::Duration,
};

use crate::{
    device::{CameraProvider, DEVICE_ID_BACK, DEVICE_ID_FRONT},
    geometry::Size,
    lifecycle::{on_worker_thread, Message, SessionConfig, Shared, Worker},
    listener::{CameraListener, FrameConsumer},
    negotiate::DeviceConstraints,
    surface::DisplaySurface,
    transform::Rotation,
    Error, SessionState,
};

/// Bound on waiting for the open/close gate when opening
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(2500);

/// Builder for [`CameraPreview`]
///
/// All checks happen in [`CameraPreviewBuilder::build`], before any thread
/// is started or any device touched.
pub struct CameraPreviewBuilder {
    surface: Option<Arc<dyn DisplaySurface>>,
    provider: Option<Arc<dyn CameraProvider>>,
    listener: Option<Arc<dyn CameraListener>>,
    consumer: Option<Arc<dyn FrameConsumer>>,
    device_id: Option<String>,
    preview_size: Option<Size>,
    max_preview_size: Option<Size>,
    min_preview_size: Option<Size>,
    viewport_size: Option<Size>,
    rotation: i32,
    mirror: bool,
    open_timeout: Duration,
}

impl Default for CameraPreviewBuilder {
    fn default() -> Self {
        CameraPreviewBuilder {
            surface: None,
            provider: None,
            listener: None,
            consumer: None,
            device_id: None,
            preview_size: None,
            max_preview_size: None,
            min_preview_size: None,
            viewport_size: None,
            rotation: 0,
            mirror: false,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

impl CameraPreviewBuilder {
    /// Display surface the preview is rendered on (required)
    pub fn with_surface(mut self, surface: Arc<dyn DisplaySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Camera service to open devices from (required)
    pub fn with_provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn CameraListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_frame_consumer(mut self, consumer: Arc<dyn FrameConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Device to open first; an unusable id falls back to the first usable
    /// device
    pub fn with_device_id(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_owned());
        self
    }

    /// Preview size to use when the device supports it
    pub fn with_preview_size(mut self, size: Size) -> Self {
        self.preview_size = Some(size);
        self
    }

    pub fn with_max_preview_size(mut self, size: Size) -> Self {
        self.max_preview_size = Some(size);
        self
    }

    pub fn with_min_preview_size(mut self, size: Size) -> Self {
        self.min_preview_size = Some(size);
        self
    }

    /// Viewport whose aspect ratio drives size negotiation
    pub fn with_viewport_size(mut self, size: Size) -> Self {
        self.viewport_size = Some(size);
        self
    }

    /// Display rotation as a quadrant: 0, 1, 2 or 3 for 0°, 90°, 180°, 270°
    pub fn with_rotation(mut self, quadrant: i32) -> Self {
        self.rotation = quadrant;
        self
    }

    /// Mirror the preview horizontally on the display
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<CameraPreview, Error> {
        let surface = self
            .surface
            .ok_or_else(|| Error::Configuration("a display surface is required".to_string()))?;
        let provider = self
            .provider
            .ok_or_else(|| Error::Configuration("a camera provider is required".to_string()))?;
        let rotation = Rotation::from_quadrant(self.rotation).ok_or_else(|| {
            Error::Configuration(format!(
                "rotation quadrant {} is outside 0..=3",
                self.rotation
            ))
        })?;

        let sizes = [
            ("preview", self.preview_size),
            ("max preview", self.max_preview_size),
            ("min preview", self.min_preview_size),
            ("viewport", self.viewport_size),
        ];
        for (name, size) in sizes {
            if let Some(size) = size.filter(Size::is_empty) {
                return Err(Error::Configuration(format!(
                    "{} size {} has a zero dimension",
                    name, size
                )));
            }
        }

        if let (Some(max), Some(min)) = (self.max_preview_size, self.min_preview_size) {
            if max.width < min.width || max.height < min.height {
                return Err(Error::Configuration(format!(
                    "max preview size {} is smaller than min preview size {}",
                    max, min
                )));
            }
        }

        if self.listener.is_none() {
            log::warn!("no camera listener, device events will only be logged");
        }
        if self.viewport_size.is_none() {
            log::warn!("no viewport size, the preview ratio follows the largest device size");
        }

        if self.mirror {
            surface.set_mirrored(true);
        }

        let config = SessionConfig {
            constraints: DeviceConstraints {
                viewport: self.viewport_size,
                exact: self.preview_size,
                max: self.max_preview_size,
                min: self.min_preview_size,
            },
            rotation,
            mirror: self.mirror,
        };

        Ok(CameraPreview {
            shared: Arc::new(Shared::new(
                provider,
                surface,
                self.listener,
                self.consumer,
                config,
            )),
            open_timeout: self.open_timeout,
            mailbox: Mutex::new(None),
            control: Mutex::new(Control {
                worker: None,
                pending_open: false,
                open_requested: false,
                device_id: self.device_id,
            }),
        })
    }
}

struct Control {
    worker: Option<Worker>,
    /// Start was requested before the surface was ready
    pending_open: bool,
    /// An open was handed to the current worker
    open_requested: bool,
    /// Device to request on the next open
    device_id: Option<String>,
}

/// Camera preview controller.
///
/// Dropping the preview stops it. `stop`, `switch_device` and `release` join
/// the worker thread and are refused when called from a listener or frame
/// consumer callback.
pub struct CameraPreview {
    shared: Arc<Shared>,
    open_timeout: Duration,
    /// Sender to the current worker. Never held while waiting, so callbacks
    /// on the worker can use it while `control` is held by a stop.
    mailbox: Mutex<Option<mpsc::Sender<Message>>>,
    control: Mutex<Control>,
}

impl CameraPreview {
    pub fn builder() -> CameraPreviewBuilder {
        CameraPreviewBuilder::default()
    }

    /// Start the preview. Does nothing when already started. When the
    /// surface is not available yet, the device is opened on
    /// [`CameraPreview::surface_available`].
    pub fn start(&self) {
        if on_worker_thread() {
            log::error!("start called from the capture worker thread, ignoring");
            return;
        }
        let mut control = self.lock();
        self.start_locked(&mut control);
    }

    /// Close the device and stop the worker thread. Blocks until both are
    /// done. Does nothing when not started.
    pub fn stop(&self) {
        if on_worker_thread() {
            log::error!("stop called from the capture worker thread, ignoring");
            return;
        }
        let mut control = self.lock();
        self.stop_locked(&mut control);
    }

    /// Switch between the back and front cameras by stopping and starting
    /// again.
    ///
    /// Only the back (`"0"`) and front (`"1"`) devices flip. Any other
    /// device, or none opened yet, restarts with the configured device.
    pub fn switch_device(&self) {
        if on_worker_thread() {
            log::error!("switch_device called from the capture worker thread, ignoring");
            return;
        }
        let mut control = self.lock();
        let current = self.shared.status().device_id;
        match current.as_deref() {
            Some(DEVICE_ID_BACK) => control.device_id = Some(DEVICE_ID_FRONT.to_string()),
            Some(DEVICE_ID_FRONT) => control.device_id = Some(DEVICE_ID_BACK.to_string()),
            _ => {}
        }
        log::info!("switching camera {:?} -> {:?}", current, control.device_id);

        self.stop_locked(&mut control);
        self.start_locked(&mut control);
    }

    /// Stop and release the preview; it can not be used afterwards.
    pub fn release(self) {
        self.stop();
    }

    /// The display surface became ready
    pub fn surface_available(&self) {
        let mut control = if on_worker_thread() {
            // a stop holding the lock waits on this thread
            match self.control.try_lock() {
                Ok(control) => control,
                Err(TryLockError::Poisoned(err)) => err.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    log::debug!("surface ready while the preview is stopping, ignoring");
                    return;
                }
            }
        } else {
            self.lock()
        };
        if control.pending_open && control.worker.is_some() {
            log::debug!("surface ready, opening camera");
            self.open_locked(&mut control);
        }
    }

    /// The display viewport changed size; the transform is recomputed
    pub fn surface_size_changed(&self, viewport: Size) {
        if let Some(tx) = self.lock_mailbox().as_ref() {
            let _ = tx.send(Message::ViewportChanged(viewport));
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.status().state
    }

    /// Device of the current or most recent session
    pub fn device_id(&self) -> Option<String> {
        self.shared.status().device_id
    }

    /// Negotiated size of the current or most recent session
    pub fn preview_size(&self) -> Option<Size> {
        self.shared.status().size
    }

    pub fn is_mirrored(&self) -> bool {
        self.shared.config.mirror
    }

    pub fn rotation(&self) -> Rotation {
        self.shared.config.rotation
    }

    fn start_locked(&self, control: &mut Control) {
        if control.worker.is_some() {
            if !self.shared.status().ended {
                log::debug!("preview already started");
                return;
            }
            log::debug!("previous session ended, restarting");
            self.shutdown_locked(control);
        }

        self.shared.update_status(|status| {
            status.state = SessionState::Idle;
            status.ended = false;
        });

        match Worker::spawn(Arc::clone(&self.shared)) {
            Ok(worker) => {
                *self.lock_mailbox() = Some(worker.sender());
                control.worker = Some(worker);
            }
            Err(err) => {
                let err = Error::from(err);
                log::error!("can not start capture worker: {}", err);
                self.shared.notify(|listener| listener.on_device_error(&err));
                return;
            }
        }

        if self.shared.surface.is_available() {
            self.open_locked(control);
        } else {
            log::debug!("surface not ready, deferring open");
            control.pending_open = true;
        }
    }

    fn open_locked(&self, control: &mut Control) {
        control.pending_open = false;

        if !self.shared.gate.try_acquire_for(self.open_timeout) {
            let err = Error::ResourceTimeout(self.open_timeout);
            log::error!("{}", err);
            self.shutdown_locked(control);
            self.shared.notify(|listener| listener.on_device_error(&err));
            return;
        }

        let message = Message::Open {
            device_id: control.device_id.clone(),
        };
        match &control.worker {
            Some(worker) if worker.send(message) => control.open_requested = true,
            _ => {
                log::error!("capture worker is not running");
                self.shared.gate.release();
            }
        }
    }

    fn stop_locked(&self, control: &mut Control) {
        let worker = match control.worker.take() {
            Some(worker) => worker,
            None => {
                log::debug!("preview not started");
                return;
            }
        };
        self.lock_mailbox().take();

        if control.open_requested && !self.shared.status().ended {
            self.shared.gate.acquire();
            let (ack, done) = mpsc::channel();
            if worker.send(Message::Close { ack }) {
                let _ = done.recv();
            }
            self.shared.gate.release();
        }

        worker.shutdown();
        control.pending_open = false;
        control.open_requested = false;
    }

    /// Stop the worker without closing a device through the listener
    fn shutdown_locked(&self, control: &mut Control) {
        self.lock_mailbox().take();
        if let Some(worker) = control.worker.take() {
            worker.shutdown();
        }
        control.pending_open = false;
        control.open_requested = false;
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mailbox(&self) -> MutexGuard<'_, Option<mpsc::Sender<Message>>> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CameraPreview {
    fn drop(&mut self) {
        if on_worker_thread() {
            // joining here would wait on the current thread
            let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Some(worker) = control.worker.take() {
                worker.detach();
            }
            return;
        }
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{listener::OpenedDevice, surface::OffscreenSurface, synthetic::SyntheticProvider};

    #[derive(Default)]
    struct Errors(Mutex<Vec<String>>);

    impl CameraListener for Errors {
        fn on_device_opened(&self, _: &OpenedDevice) {}

        fn on_device_closed(&self) {}

        fn on_device_error(&self, error: &Error) {
            self.0.lock().unwrap().push(match error {
                Error::ResourceTimeout(_) => "timeout".to_string(),
                other => other.to_string(),
            });
        }
    }

    fn builder() -> CameraPreviewBuilder {
        CameraPreview::builder()
            .with_surface(Arc::new(OffscreenSurface::new(Size::new(640, 480))))
            .with_provider(Arc::new(SyntheticProvider::default()))
    }

    #[test]
    fn test_build_requires_surface() {
        let result = CameraPreview::builder()
            .with_provider(Arc::new(SyntheticProvider::default()))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_build_requires_provider() {
        let result = CameraPreview::builder()
            .with_surface(Arc::new(OffscreenSurface::new(Size::new(640, 480))))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_build_rejects_bad_values() {
        assert!(builder().with_rotation(4).build().is_err());
        assert!(builder().with_rotation(-1).build().is_err());
        assert!(builder()
            .with_max_preview_size(Size::new(640, 480))
            .with_min_preview_size(Size::new(1280, 360))
            .build()
            .is_err());
        assert!(builder()
            .with_viewport_size(Size::new(0, 480))
            .build()
            .is_err());
        assert!(builder()
            .with_max_preview_size(Size::new(640, 480))
            .with_min_preview_size(Size::new(640, 480))
            .build()
            .is_ok());
    }

    #[test]
    fn test_mirror_applied_at_construction() {
        let surface = Arc::new(OffscreenSurface::new(Size::new(640, 480)));
        let preview = CameraPreview::builder()
            .with_surface(surface.clone())
            .with_provider(Arc::new(SyntheticProvider::default()))
            .with_mirror(true)
            .build()
            .unwrap();
        assert!(surface.is_mirrored());
        assert!(preview.is_mirrored());
    }

    #[test]
    fn test_open_timeout_reported() {
        let errors = Arc::new(Errors::default());
        let provider = Arc::new(SyntheticProvider::default());
        let preview = builder()
            .with_provider(provider.clone())
            .with_listener(errors.clone())
            .with_open_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        preview.shared.gate.acquire();
        preview.start();

        assert_eq!(*errors.0.lock().unwrap(), vec!["timeout"]);
        assert_eq!(preview.state(), SessionState::Idle);
        assert!(preview.lock().worker.is_none());
        assert_eq!(provider.open_count(), 0);

        // nothing to close
        preview.stop();
        preview.shared.gate.release();
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let errors = Arc::new(Errors::default());
        let preview = builder().with_listener(errors.clone()).build().unwrap();
        preview.stop();
        preview.stop();
        assert!(errors.0.lock().unwrap().is_empty());
        assert_eq!(preview.state(), SessionState::Idle);
    }
}
