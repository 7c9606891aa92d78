// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Frame delivery from the image reader to the application consumer.
//!
//! Every hardware frame handed to [`FramePipeline::deliver`] is released
//! exactly once, whether it is forwarded, dropped or ignored. The release
//! happens before the consumer runs so a slow consumer never holds a
//! hardware buffer.

use std::sync::Arc;

use crate::{
    device::{HardwareFrame, PixelFormat},
    geometry::Size,
    listener::FrameConsumer,
    pool::FrameBufferPool,
    Error,
};

/// What happened to a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Copied and forwarded to the consumer
    Delivered,
    /// Plane lengths did not match the pool
    Dropped,
    /// No consumer, or a format the pool does not handle
    Ignored,
}

/// Running counts of frame outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub delivered: u64,
    pub dropped: u64,
    pub ignored: u64,
}

/// Per-session frame path
pub struct FramePipeline {
    pool: FrameBufferPool,
    size: Size,
    consumer: Option<Arc<dyn FrameConsumer>>,
    counters: FrameCounters,
}

impl FramePipeline {
    /// Pipeline for frames of the negotiated `size`
    pub fn new(size: Size, consumer: Option<Arc<dyn FrameConsumer>>) -> Self {
        FramePipeline {
            pool: FrameBufferPool::new(),
            size,
            consumer,
            counters: FrameCounters::default(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    /// Copy `frame` into the pool, release it, then forward the pooled planes.
    pub fn deliver(&mut self, frame: Box<dyn HardwareFrame>) -> FrameOutcome {
        let consumer = match &self.consumer {
            Some(consumer) if frame.format() == PixelFormat::Yuv420 => Arc::clone(consumer),
            Some(_) => {
                log::trace!("ignoring {} frame", frame.format());
                self.counters.ignored += 1;
                return FrameOutcome::Ignored;
            }
            None => {
                self.counters.ignored += 1;
                return FrameOutcome::Ignored;
            }
        };

        let copied = self.pool.fill(frame.as_ref());
        drop(frame);

        match copied {
            Ok(()) => {}
            Err(err @ Error::TransientFrameDrop { .. }) => {
                log::debug!("frame dropped: {}", err);
                self.counters.dropped += 1;
                return FrameOutcome::Dropped;
            }
            Err(err) => {
                log::warn!("frame dropped: {}", err);
                self.counters.dropped += 1;
                return FrameOutcome::Dropped;
            }
        }

        if let Some((y, u, v)) = self.pool.planes() {
            consumer.on_frame(y, u, v, self.size, self.pool.luma_row_stride());
        }
        self.counters.delivered += 1;
        FrameOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::tests::TestFrame;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(usize, Size, usize)>>,
        released_at_call: Mutex<Vec<usize>>,
        released: Arc<AtomicUsize>,
    }

    impl FrameConsumer for Recorder {
        fn on_frame(&self, y: &[u8], _u: &[u8], _v: &[u8], size: Size, luma_row_stride: usize) {
            self.frames
                .lock()
                .unwrap()
                .push((y.len(), size, luma_row_stride));
            self.released_at_call
                .lock()
                .unwrap()
                .push(self.released.load(Ordering::SeqCst));
        }
    }

    #[test]
    fn test_frame_released_before_consumer() {
        let recorder = Arc::new(Recorder::default());
        let released = Arc::clone(&recorder.released);
        let mut pipeline = FramePipeline::new(
            Size::new(32, 16),
            Some(recorder.clone() as Arc<dyn FrameConsumer>),
        );

        let outcome = pipeline.deliver(Box::new(TestFrame::yuv(32, 16, 9, &released)));
        assert_eq!(outcome, FrameOutcome::Delivered);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.released_at_call.lock().unwrap(), vec![1]);
        assert_eq!(
            *recorder.frames.lock().unwrap(),
            vec![(512, Size::new(32, 16), 32)]
        );
    }

    #[test]
    fn test_every_path_releases_once() {
        let recorder = Arc::new(Recorder::default());
        let released = Arc::clone(&recorder.released);
        let mut pipeline = FramePipeline::new(
            Size::new(32, 16),
            Some(recorder.clone() as Arc<dyn FrameConsumer>),
        );

        pipeline.deliver(Box::new(TestFrame::yuv(32, 16, 0, &released)));

        let mut short = TestFrame::yuv(32, 16, 0, &released);
        short.planes[1].truncate(10);
        assert_eq!(pipeline.deliver(Box::new(short)), FrameOutcome::Dropped);

        let mut packed = TestFrame::yuv(32, 16, 0, &released);
        packed.format = PixelFormat::Yuyv;
        assert_eq!(pipeline.deliver(Box::new(packed)), FrameOutcome::Ignored);

        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(
            pipeline.counters(),
            FrameCounters {
                delivered: 1,
                dropped: 1,
                ignored: 1
            }
        );
        assert_eq!(recorder.frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_consumer_ignores() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FramePipeline::new(Size::new(32, 16), None);
        assert_eq!(
            pipeline.deliver(Box::new(TestFrame::yuv(32, 16, 0, &released))),
            FrameOutcome::Ignored
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!pipeline.pool().is_sized());
    }
}
