// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Display surface abstraction.
//!
//! The display surface is owned by the application's UI layer. CaptureKit
//! only needs to know whether it is ready, how large it is, where to render
//! and which transform to apply. The UI layer forwards its own readiness and
//! resize notifications to [`crate::preview::CameraPreview::surface_available`]
//! and [`crate::preview::CameraPreview::surface_size_changed`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    device::RenderTarget,
    geometry::{Matrix, Size},
};

/// Display surface the preview is rendered on
pub trait DisplaySurface: Send + Sync {
    /// True once the surface can accept frames
    fn is_available(&self) -> bool;

    /// Current viewport size in pixels
    fn viewport(&self) -> Size;

    /// Handle the capture session renders preview frames into
    fn render_target(&self) -> RenderTarget;

    /// Size of the buffers the surface allocates for incoming frames
    fn set_buffer_size(&self, size: Size);

    /// Replace the whole content transform
    fn set_transform(&self, transform: &Matrix);

    /// Mirror the content horizontally
    fn set_mirrored(&self, mirrored: bool);
}

#[derive(Debug)]
struct OffscreenState {
    available: bool,
    viewport: Size,
    buffer_size: Option<Size>,
    transform: Matrix,
    transform_updates: usize,
    mirrored: bool,
}

/// Headless surface that records what it is told.
///
/// Useful for tests, benchmarks and command-line tools that run the capture
/// pipeline without a display.
#[derive(Debug)]
pub struct OffscreenSurface {
    target: RenderTarget,
    state: Mutex<OffscreenState>,
}

impl OffscreenSurface {
    /// Create an available surface with the given viewport
    pub fn new(viewport: Size) -> Self {
        OffscreenSurface {
            target: RenderTarget::allocate(),
            state: Mutex::new(OffscreenState {
                available: true,
                viewport,
                buffer_size: None,
                transform: Matrix::identity(),
                transform_updates: 0,
                mirrored: false,
            }),
        }
    }

    /// Create a surface that is not ready yet
    pub fn pending(viewport: Size) -> Self {
        let surface = OffscreenSurface::new(viewport);
        surface.set_available(false);
        surface
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Change the viewport size. The owner must also notify the preview.
    pub fn resize(&self, viewport: Size) {
        self.lock().viewport = viewport;
    }

    /// The last transform applied
    pub fn transform(&self) -> Matrix {
        self.lock().transform
    }

    /// Number of times a transform was applied
    pub fn transform_updates(&self) -> usize {
        self.lock().transform_updates
    }

    pub fn buffer_size(&self) -> Option<Size> {
        self.lock().buffer_size
    }

    pub fn is_mirrored(&self) -> bool {
        self.lock().mirrored
    }

    fn lock(&self) -> MutexGuard<'_, OffscreenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySurface for OffscreenSurface {
    fn is_available(&self) -> bool {
        self.lock().available
    }

    fn viewport(&self) -> Size {
        self.lock().viewport
    }

    fn render_target(&self) -> RenderTarget {
        self.target
    }

    fn set_buffer_size(&self, size: Size) {
        self.lock().buffer_size = Some(size);
    }

    fn set_transform(&self, transform: &Matrix) {
        let mut state = self.lock();
        state.transform = *transform;
        state.transform_updates += 1;
    }

    fn set_mirrored(&self, mirrored: bool) {
        self.lock().mirrored = mirrored;
    }
}
