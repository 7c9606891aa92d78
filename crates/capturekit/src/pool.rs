// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Reusable plane buffers.
//!
//! The pool holds one buffer per YUV plane. Buffers are sized from the first
//! frame of a session and reused for every later frame; a frame whose planes
//! do not match those lengths is rejected with
//! [`Error::TransientFrameDrop`] instead of resizing the pool.

use crate::{
    device::{HardwareFrame, Plane},
    Error,
};

const PLANES: usize = 3;

/// Row and pixel stride of one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneDescriptor {
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl From<&Plane<'_>> for PlaneDescriptor {
    fn from(plane: &Plane<'_>) -> Self {
        PlaneDescriptor {
            row_stride: plane.row_stride,
            pixel_stride: plane.pixel_stride,
        }
    }
}

/// Y, U and V buffers reused across the frames of one session
#[derive(Debug, Default)]
pub struct FrameBufferPool {
    buffers: Option<[Vec<u8>; PLANES]>,
    descriptors: [PlaneDescriptor; PLANES],
    stride_anomaly: bool,
    allocations: usize,
}

impl FrameBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the first frame has sized the buffers
    pub fn is_sized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Buffer lengths, once sized
    pub fn lengths(&self) -> Option<[usize; PLANES]> {
        self.buffers
            .as_ref()
            .map(|b| [b[0].len(), b[1].len(), b[2].len()])
    }

    /// Strides recorded from the first frame
    pub fn descriptors(&self) -> Option<[PlaneDescriptor; PLANES]> {
        self.buffers.as_ref().map(|_| self.descriptors)
    }

    /// Number of times buffers were allocated since creation
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn luma_row_stride(&self) -> usize {
        self.descriptors[0].row_stride
    }

    /// Y, U and V contents of the last copied frame
    pub fn planes(&self) -> Option<(&[u8], &[u8], &[u8])> {
        self.buffers
            .as_ref()
            .map(|b| (b[0].as_slice(), b[1].as_slice(), b[2].as_slice()))
    }

    /// Discard the buffers; the next frame sizes them again
    pub fn reset(&mut self) {
        self.buffers = None;
        self.descriptors = [PlaneDescriptor::default(); PLANES];
        self.stride_anomaly = false;
    }

    /// Copy the three planes of `frame` into the pooled buffers.
    ///
    /// The frame itself is left untouched; the caller releases it.
    pub fn fill(&mut self, frame: &dyn HardwareFrame) -> Result<(), Error> {
        let mut planes = [Plane {
            data: &[],
            row_stride: 0,
            pixel_stride: 0,
        }; PLANES];

        for (index, slot) in planes.iter_mut().enumerate() {
            *slot = frame
                .plane(index)
                .ok_or_else(|| Error::TransientFrameDrop {
                    plane: index,
                    expected: self.lengths().map_or(0, |l| l[index]),
                    actual: 0,
                })?;
        }

        if self.buffers.is_none() {
            self.allocate(&planes);
        }

        if let Some(lengths) = self.lengths() {
            for (index, (expected, plane)) in lengths.iter().zip(planes.iter()).enumerate() {
                if *expected != plane.data.len() {
                    return Err(Error::TransientFrameDrop {
                        plane: index,
                        expected: *expected,
                        actual: plane.data.len(),
                    });
                }
            }
        }

        let changed = planes
            .iter()
            .zip(self.descriptors.iter())
            .any(|(plane, known)| PlaneDescriptor::from(plane) != *known);
        if changed && !self.stride_anomaly {
            log::warn!(
                "plane strides changed mid-session, keeping {:?}",
                self.descriptors
            );
            self.stride_anomaly = true;
        }

        if let Some(buffers) = self.buffers.as_mut() {
            for (buffer, plane) in buffers.iter_mut().zip(planes.iter()) {
                buffer.copy_from_slice(plane.data);
            }
        }

        Ok(())
    }

    fn allocate(&mut self, planes: &[Plane<'_>; PLANES]) {
        for (index, plane) in planes.iter().enumerate() {
            log::info!(
                "plane {}: {} bytes, row-stride = {}, pixel-stride = {}",
                index,
                plane.data.len(),
                plane.row_stride,
                plane.pixel_stride
            );
            self.descriptors[index] = PlaneDescriptor::from(plane);
        }
        self.allocations += 1;
        self.buffers = Some([
            vec![0u8; planes[0].data.len()],
            vec![0u8; planes[1].data.len()],
            vec![0u8; planes[2].data.len()],
        ]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::PixelFormat;
    use rand::{self, Rng};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Planar frame that counts its own release
    pub(crate) struct TestFrame {
        pub(crate) format: PixelFormat,
        pub(crate) planes: Vec<Vec<u8>>,
        pub(crate) strides: Vec<PlaneDescriptor>,
        pub(crate) released: Arc<AtomicUsize>,
    }

    impl TestFrame {
        pub(crate) fn yuv(width: usize, height: usize, fill: u8, released: &Arc<AtomicUsize>) -> Self {
            let luma = width * height;
            TestFrame {
                format: PixelFormat::Yuv420,
                planes: vec![vec![fill; luma], vec![fill; luma / 4], vec![fill; luma / 4]],
                strides: vec![
                    PlaneDescriptor {
                        row_stride: width,
                        pixel_stride: 1,
                    },
                    PlaneDescriptor {
                        row_stride: width / 2,
                        pixel_stride: 1,
                    },
                    PlaneDescriptor {
                        row_stride: width / 2,
                        pixel_stride: 1,
                    },
                ],
                released: Arc::clone(released),
            }
        }
    }

    impl HardwareFrame for TestFrame {
        fn format(&self) -> PixelFormat {
            self.format
        }

        fn plane_count(&self) -> usize {
            self.planes.len()
        }

        fn plane(&self, index: usize) -> Option<Plane<'_>> {
            let data = self.planes.get(index)?;
            let stride = self.strides.get(index).copied().unwrap_or_default();
            Some(Plane {
                data,
                row_stride: stride.row_stride,
                pixel_stride: stride.pixel_stride,
            })
        }
    }

    impl Drop for TestFrame {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_first_frame_sizes_pool() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        assert!(!pool.is_sized());

        let frame = TestFrame::yuv(64, 48, 7, &released);
        pool.fill(&frame).unwrap();

        assert_eq!(pool.lengths(), Some([3072, 768, 768]));
        assert_eq!(pool.luma_row_stride(), 64);
        let (y, u, v) = pool.planes().unwrap();
        assert!(y.iter().chain(u).chain(v).all(|&b| b == 7));
    }

    #[test]
    fn test_lengths_constant_across_varying_frames() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        pool.fill(&TestFrame::yuv(64, 48, 0, &released)).unwrap();
        let lengths = pool.lengths();

        let mut rng = rand::rng();
        let mut accepted = 0;
        let mut dropped = 0;
        for i in 0..1000 {
            let frame = if rng.random_bool(0.3) {
                let w = rng.random_range(1..32usize) * 4;
                let h = rng.random_range(1..32usize) * 4;
                TestFrame::yuv(w, h, i as u8, &released)
            } else {
                TestFrame::yuv(64, 48, i as u8, &released)
            };
            let same_shape = frame.planes[0].len() == 64 * 48;

            match pool.fill(&frame) {
                Ok(()) => {
                    assert!(same_shape);
                    accepted += 1;
                }
                Err(Error::TransientFrameDrop { expected, .. }) => {
                    assert!(!same_shape);
                    assert_eq!(expected, 64 * 48);
                    dropped += 1;
                }
                Err(err) => panic!("unexpected error: {}", err),
            }
            assert_eq!(pool.lengths(), lengths);
        }

        assert_eq!(accepted + dropped, 1000);
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn test_chroma_mismatch_is_dropped() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        pool.fill(&TestFrame::yuv(16, 16, 1, &released)).unwrap();

        let mut frame = TestFrame::yuv(16, 16, 2, &released);
        frame.planes[2].pop();
        match pool.fill(&frame) {
            Err(Error::TransientFrameDrop {
                plane,
                expected,
                actual,
            }) => {
                assert_eq!(plane, 2);
                assert_eq!(expected, 64);
                assert_eq!(actual, 63);
            }
            other => panic!("expected drop, got {:?}", other),
        }

        // the previous content is untouched
        let (y, _, _) = pool.planes().unwrap();
        assert!(y.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_missing_plane_is_dropped() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        let mut frame = TestFrame::yuv(16, 16, 1, &released);
        frame.planes.truncate(1);
        assert!(matches!(
            pool.fill(&frame),
            Err(Error::TransientFrameDrop { plane: 1, .. })
        ));
        assert!(!pool.is_sized());
    }

    #[test]
    fn test_stride_change_keeps_prior_value() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        pool.fill(&TestFrame::yuv(16, 16, 1, &released)).unwrap();

        let mut frame = TestFrame::yuv(16, 16, 3, &released);
        frame.strides[0].row_stride = 32;
        pool.fill(&frame).unwrap();

        assert_eq!(pool.luma_row_stride(), 16);
        let (y, _, _) = pool.planes().unwrap();
        assert!(y.iter().all(|&b| b == 3));
    }

    #[test]
    fn test_reset_allows_new_size() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pool = FrameBufferPool::new();
        pool.fill(&TestFrame::yuv(16, 16, 1, &released)).unwrap();
        pool.reset();
        pool.fill(&TestFrame::yuv(32, 16, 1, &released)).unwrap();

        assert_eq!(pool.lengths(), Some([512, 128, 128]));
        assert_eq!(pool.allocations(), 2);
    }
}
