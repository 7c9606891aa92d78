// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::metrics::{FrameMetrics, MetricsCollector};
use crate::utils::{self, parse_rotation, parse_size};
use capturekit::device::{CameraProvider, DEVICE_ID_BACK};
use capturekit::geometry::Size;
use capturekit::listener::{CameraListener, OpenedDevice};
use capturekit::preview::CameraPreview;
use capturekit::surface::OffscreenSurface;
use capturekit::synthetic::SyntheticProvider;
use capturekit::Error;
use clap::Args as ClapArgs;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Longest wait for the device to report it is open
const OPEN_WAIT: Duration = Duration::from_secs(5);

/// Longest wait between two frames once previewing
const FRAME_WAIT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Camera device identifier
    #[arg(short, long, default_value = DEVICE_ID_BACK)]
    device: String,

    /// Viewport size (WxH) the preview is displayed in
    #[arg(long, default_value = "1080x1920", value_parser = parse_size)]
    viewport: Size,

    /// Exact preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    size: Option<Size>,

    /// Maximum preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    max: Option<Size>,

    /// Minimum preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    min: Option<Size>,

    /// Display rotation as a quadrant (0-3) or degrees (0/90/180/270)
    #[arg(short, long, default_value = "0", value_parser = parse_rotation)]
    rotation: i32,

    /// Mirror the preview on the display
    #[arg(long)]
    mirror: bool,

    /// Synthetic camera frame rate
    #[arg(short = 'F', long, default_value = "30")]
    fps: u32,

    /// Number of frames to deliver (0=until Ctrl+C)
    #[arg(short, long, default_value = "0")]
    frames: u64,

    /// Switch between the front and back camera after N frames
    #[arg(long)]
    switch_at: Option<u64>,
}

enum SessionEvent {
    Opened(OpenedDevice),
    Closed,
    Failed(String),
}

/// Forwards listener callbacks to the command loop
struct Events {
    tx: Mutex<mpsc::Sender<SessionEvent>>,
}

impl Events {
    fn send(&self, event: SessionEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        // The loop may already be gone during shutdown
        let _ = tx.send(event);
    }
}

impl CameraListener for Events {
    fn on_device_opened(&self, device: &OpenedDevice) {
        self.send(SessionEvent::Opened(device.clone()));
    }

    fn on_device_closed(&self) {
        self.send(SessionEvent::Closed);
    }

    fn on_device_error(&self, error: &Error) {
        self.send(SessionEvent::Failed(error.to_string()));
    }
}

#[derive(Debug, Serialize)]
struct PreviewOutput {
    device_id: String,
    preview_size: String,
    display_orientation: i32,
    mirrored: bool,
    switches: u32,
    frames_acquired: u64,
    frames_released: u64,
    metrics: FrameMetrics,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::info!("Starting synthetic preview on device {}", args.device);
    log::debug!("Preview parameters: {:?}", args);

    if args.fps == 0 {
        return Err(CliError::InvalidArgs("Frame rate must be positive".to_string()));
    }

    let term = utils::install_signal_handler()?;

    let provider = Arc::new(SyntheticProvider::default().with_fps(args.fps));
    if !provider.device_ids()?.contains(&args.device) {
        return Err(CliError::CameraNotFound(args.device));
    }

    let surface = Arc::new(OffscreenSurface::new(args.viewport));
    let (tx, rx) = mpsc::channel();
    let events = Arc::new(Events { tx: Mutex::new(tx) });

    let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
    let delivered = Arc::new(AtomicU64::new(0));
    let consumer_metrics = Arc::clone(&metrics);
    let consumer_delivered = Arc::clone(&delivered);
    let consumer = Arc::new(
        move |y: &[u8], u: &[u8], v: &[u8], _size: Size, _stride: usize| {
            let bytes = (y.len() + u.len() + v.len()) as u64;
            consumer_metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_frame(bytes);
            consumer_delivered.fetch_add(1, Ordering::Relaxed);
        },
    );

    let mut builder = CameraPreview::builder()
        .with_provider(provider.clone())
        .with_surface(surface.clone())
        .with_listener(events)
        .with_frame_consumer(consumer)
        .with_device_id(&args.device)
        .with_viewport_size(args.viewport)
        .with_rotation(args.rotation)
        .with_mirror(args.mirror);
    if let Some(size) = args.size {
        builder = builder.with_preview_size(size);
    }
    if let Some(max) = args.max {
        builder = builder.with_max_preview_size(max);
    }
    if let Some(min) = args.min {
        builder = builder.with_min_preview_size(min);
    }
    let preview = builder.build()?;

    preview.start();

    let max_frames = if args.frames == 0 {
        u64::MAX
    } else {
        args.frames
    };
    log::info!(
        "Previewing {} frames (Ctrl+C to stop)...",
        if max_frames == u64::MAX {
            "unlimited".to_string()
        } else {
            max_frames.to_string()
        }
    );

    let mut opened: Option<OpenedDevice> = None;
    let mut awaiting_open = Instant::now();
    let mut last_progress = (0, Instant::now());
    let mut switches = 0;
    let mut switched = false;
    // Closes caused by our own switch, not by the device
    let mut expected_closes = 0;

    let result = loop {
        if term.load(Ordering::Relaxed) {
            log::info!("Received interrupt signal, stopping preview");
            break Ok(());
        }

        let count = delivered.load(Ordering::Relaxed);
        if count >= max_frames {
            break Ok(());
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(SessionEvent::Opened(device)) => {
                log::info!(
                    "Device {} opened at {}, orientation {}°{}",
                    device.device_id,
                    device.size,
                    device.display_orientation,
                    if device.mirrored { ", mirrored" } else { "" }
                );
                opened = Some(device);
                last_progress = (count, Instant::now());
                continue;
            }
            Ok(SessionEvent::Closed) if expected_closes > 0 => {
                expected_closes -= 1;
                continue;
            }
            Ok(SessionEvent::Closed) => {
                break Err(CliError::Device("camera disconnected".to_string()));
            }
            Ok(SessionEvent::Failed(reason)) => break Err(CliError::Device(reason)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                break Err(CliError::General("listener went away".to_string()));
            }
        }

        if opened.is_none() {
            if awaiting_open.elapsed() > OPEN_WAIT {
                break Err(CliError::Timeout(format!(
                    "device did not open within {:?}",
                    OPEN_WAIT
                )));
            }
            continue;
        }

        if count > last_progress.0 {
            last_progress = (count, Instant::now());
        } else if last_progress.1.elapsed() > FRAME_WAIT {
            break Err(CliError::Timeout(format!(
                "no frame delivered within {:?}",
                FRAME_WAIT
            )));
        }

        if let Some(switch_at) = args.switch_at {
            if !switched && count >= switch_at {
                log::info!("Switching camera after {} frames", count);
                preview.switch_device();
                expected_closes += 1;
                switched = true;
                switches += 1;
                opened = None;
                awaiting_open = Instant::now();
            }
        }
    };

    preview.stop();
    // An open may have been reported in the same poll that hit the frame limit
    for event in rx.try_iter() {
        if let SessionEvent::Opened(device) = event {
            opened = Some(device);
        }
    }
    let stats = provider.stats();
    if stats.outstanding() > 0 {
        log::warn!("{} frames were never released", stats.outstanding());
    }
    result?;

    let device = opened.ok_or_else(|| CliError::General("device never opened".to_string()))?;
    let mut metrics = metrics.lock().unwrap_or_else(PoisonError::into_inner);
    metrics.set_skipped_frames(stats.skipped);
    log::info!("Delivered {} frames total", metrics.frames());

    if json {
        let output = PreviewOutput {
            device_id: device.device_id,
            preview_size: device.size.to_string(),
            display_orientation: device.display_orientation,
            mirrored: device.mirrored,
            switches,
            frames_acquired: stats.acquired,
            frames_released: stats.released,
            metrics: metrics.finalize(),
        };
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("Failed to output JSON metrics: {}", e)))?;
        println!("{}", json);
    } else {
        println!("Device:            {}", device.device_id);
        println!("Preview size:      {}", device.size);
        println!("Orientation:       {}°", device.display_orientation);
        println!("Mirrored:          {}", device.mirrored);
        if switches > 0 {
            println!("Switches:          {}", switches);
        }
        println!(
            "Frames released:   {}/{}",
            stats.released, stats.acquired
        );
        metrics.print_text();
    }

    Ok(())
}
